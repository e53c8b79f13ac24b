//! Operator commands typed into the client's console.
//!
//! Each command only flips a flag or field in the engine; none of them
//! touch synchronization state directly.

use std::path::PathBuf;
use std::str::FromStr;

use tokio::sync::watch;
use utylink_sync::EngineHandle;

use crate::UtylinkError;

/// A parsed console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    /// Rebuild received items from the server.
    Resync,
    /// Toggle deathlink.
    DeathLink,
    /// Toggle position sharing.
    Online,
    /// Move the interface directory.
    SavePath(PathBuf),
    /// Show engine status.
    Status,
    Help,
    Exit,
}

/// Why a console line isn't a command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseCommandError {
    #[error("commands start with '/'; try /help")]
    NotACommand,
    #[error("unknown command /{0}; try /help")]
    Unknown(String),
    #[error("/{0} needs an argument")]
    MissingArgument(&'static str),
}

impl FromStr for OperatorCommand {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('/') else {
            return Err(ParseCommandError::NotACommand);
        };
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        match name.to_ascii_lowercase().as_str() {
            "resync" => Ok(Self::Resync),
            "deathlink" => Ok(Self::DeathLink),
            "online" => Ok(Self::Online),
            "savepath" if arg.is_empty() => Err(ParseCommandError::MissingArgument("savepath")),
            "savepath" => Ok(Self::SavePath(PathBuf::from(arg))),
            "status" => Ok(Self::Status),
            "help" => Ok(Self::Help),
            "exit" | "quit" => Ok(Self::Exit),
            _ => Err(ParseCommandError::Unknown(name.to_string())),
        }
    }
}

pub const HELP: &str = "\
/resync          rebuild received items from the server
/deathlink       toggle deathlink
/online          toggle sharing your position with other players
/savepath <dir>  use another interface directory
/status          show connection and progress
/exit            disconnect and quit";

impl OperatorCommand {
    /// Applies the command. Returns a line to show the operator.
    pub async fn apply(
        self,
        engine: &EngineHandle,
        exit: &watch::Sender<bool>,
    ) -> Result<String, UtylinkError> {
        let reply = match self {
            Self::Resync => {
                engine.resync().await?;
                "Syncing items.".to_string()
            }
            Self::DeathLink => {
                let enabled = engine.set_deathlink(None).await?;
                format!("Deathlink {}.", if enabled { "enabled" } else { "disabled" })
            }
            Self::Online => {
                let enabled = engine.set_online(None).await?;
                format!("Online mode {}.", if enabled { "enabled" } else { "disabled" })
            }
            Self::SavePath(dir) => {
                let shown = dir.display().to_string();
                engine.set_interface_dir(dir).await?;
                format!("Changed to the following directory: {shown}")
            }
            Self::Status => {
                let status = engine.status().await?;
                match status.slot {
                    Some(slot) => format!(
                        "Slot {slot}: {} items, {} locations, {}/3 routes{}. Tags: {}",
                        status.items_received,
                        status.locations_checked,
                        status.routes_completed,
                        if status.finished { ", goal complete" } else { "" },
                        status.tags.join(", "),
                    ),
                    None => format!("Not connected. Tags: {}", status.tags.join(", ")),
                }
            }
            Self::Help => HELP.to_string(),
            Self::Exit => {
                exit.send_replace(true);
                "Exiting.".to_string()
            }
        };
        Ok(reply)
    }
}
