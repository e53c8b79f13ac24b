//! Artifact schema: file names, classification, and text formats.
//!
//! The game polls the interface directory just like we do, so these
//! names are a contract with the game-side patch and must not drift.

use std::path::Path;

use utylink_protocol::SlotId;

/// Inbound death, written by us for the game to consume.
pub const INBOUND_DEATH: &str = "WelcomeToTheDead.youDied";
/// Outbound death, written by the game when the player dies.
pub const OUTBOUND_DEATH: &str = "DontBeMad.mad";
/// Scouting request, written by the game.
pub const SCOUT_REQUEST: &str = "scout";
/// Append-only log of locally completed locations.
pub const CHECK_LOG: &str = "check.spot";
/// The player's own position, written by the game.
pub const SELF_POSITION: &str = "spots.mine";

const PEER_PREFIX: &str = "FRISK";
const PEER_EXT: &str = "playerspot";
const ITEM_EXT: &str = "item";
const VICTORY_EXT: &str = "victory";
const HINT_EXT: &str = "hint";

/// Extensions that hold no state worth keeping across sessions.
const TRANSIENT_EXTS: &[&str] = &[
    "item", "victory", "route", "playerspot", "mad", "youDied", "LV", "mine", "flag", "hint",
];

/// What a file in the interface directory is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    Item,
    InboundDeath,
    OutboundDeath,
    ScoutRequest,
    CheckLog,
    /// A route victory marker; carries the file stem (e.g. `pacifist`).
    Victory(String),
    PeerPosition,
    SelfPosition,
    Hint,
    /// Some other per-session file the game leaves behind.
    Transient,
    /// Not ours. Never touched.
    Other,
}

impl Artifact {
    /// Classifies a bare file name.
    pub fn classify(file_name: &str) -> Self {
        match file_name {
            CHECK_LOG => return Self::CheckLog,
            SCOUT_REQUEST => return Self::ScoutRequest,
            SELF_POSITION => return Self::SelfPosition,
            INBOUND_DEATH => return Self::InboundDeath,
            OUTBOUND_DEATH => return Self::OutboundDeath,
            _ => {}
        }

        let path = Path::new(file_name);
        let (Some(stem), Some(ext)) = (
            path.file_stem().and_then(|s| s.to_str()),
            path.extension().and_then(|s| s.to_str()),
        ) else {
            return Self::Other;
        };

        match ext {
            ITEM_EXT => Self::Item,
            VICTORY_EXT => Self::Victory(stem.to_string()),
            HINT_EXT => Self::Hint,
            PEER_EXT if stem.starts_with(PEER_PREFIX) => Self::PeerPosition,
            ext if TRANSIENT_EXTS.contains(&ext) => Self::Transient,
            _ => Self::Other,
        }
    }

    /// `true` for everything a lifecycle purge removes.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Other)
    }
}

/// A received item, materialized for the game to pick up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemArtifact {
    /// Where the item was found; negative for non-location grants.
    pub location: i64,
    /// Who sent it.
    pub player: SlotId,
    /// The game-side item value written as the file's content.
    pub value: i64,
}

impl ItemArtifact {
    pub fn file_name(&self) -> String {
        format!("{}PLR{}.{ITEM_EXT}", self.location, self.player)
    }
}

/// File name of the hint artifact for a local location id.
pub fn hint_file_name(local_location: i64) -> String {
    format!("{local_location}.{HINT_EXT}")
}

/// A player's on-screen position as relayed between clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerPosition {
    pub player: SlotId,
    pub x: String,
    pub y: String,
    pub room: String,
    pub sprite: String,
    pub frame: String,
}

impl PeerPosition {
    pub fn file_name(&self) -> String {
        format!("{PEER_PREFIX}{}.{PEER_EXT}", self.player)
    }

    /// The five fields, one per line.
    pub fn to_text(&self) -> String {
        format!(
            "{}\n{}\n{}\n{}\n{}\n",
            self.x, self.y, self.room, self.sprite, self.frame
        )
    }

    /// Parses the five-line position format. `None` if a field is missing.
    pub fn from_text(player: SlotId, text: &str) -> Option<Self> {
        let mut lines = text.lines().map(str::trim);
        Some(Self {
            player,
            x: lines.next()?.to_string(),
            y: lines.next()?.to_string(),
            room: lines.next()?.to_string(),
            sprite: lines.next()?.to_string(),
            frame: lines.next()?.to_string(),
        })
    }
}

/// Parses newline-separated location ids, skipping lines that aren't
/// integers. The game may be mid-write when we read, so a torn last line
/// is expected now and then.
pub fn parse_id_lines(source: &Path, text: &str) -> Vec<i64> {
    text.lines()
        .enumerate()
        .filter_map(|(n, line)| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            match line.parse() {
                Ok(id) => Some(id),
                Err(_) => {
                    tracing::warn!(
                        file = %source.display(),
                        line = n + 1,
                        content = line,
                        "skipping malformed location id"
                    );
                    None
                }
            }
        })
        .collect()
}
