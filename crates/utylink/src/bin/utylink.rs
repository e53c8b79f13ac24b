use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;
use utylink::prelude::*;
use utylink::DEFAULT_SERVER;

#[derive(Parser)]
#[command(name = "utylink", version)]
#[command(about = "Archipelago client for Undertale Yellow")]
struct Args {
    /// Server address, `host:port` or a ws:// URL.
    #[arg(long, short, default_value = DEFAULT_SERVER)]
    connect: String,

    /// Slot name to connect as.
    #[arg(long, short)]
    name: String,

    #[arg(long)]
    password: Option<String>,

    /// Interface directory shared with the game.
    #[arg(long)]
    savepath: Option<PathBuf>,

    /// Start with deathlink enabled.
    #[arg(long)]
    deathlink: bool,

    /// Don't share positions with other players.
    #[arg(long)]
    offline: bool,

    /// Polling rate in Hz.
    #[arg(long, default_value_t = 10)]
    tick_rate: u32,
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();

    let mut builder = Client::builder()
        .server(&args.connect)
        .slot_name(&args.name)
        .password(args.password)
        .deathlink(args.deathlink)
        .online(!args.offline)
        .tick_rate(args.tick_rate);
    if let Some(dir) = args.savepath {
        builder = builder.interface_dir(dir);
    }
    let client = match builder.build() {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "cannot start");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(dir = %client.config().interface_dir.display(), "interface directory");

    let (exit_tx, exit_rx) = watch::channel(false);
    let engine = client.engine();

    tokio::spawn(console(engine, exit_tx));

    match client.run(exit_rx).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "client stopped with an error");
            ExitCode::FAILURE
        }
    }
}

/// Reads operator commands from stdin until EOF; Ctrl-C exits.
async fn console(engine: EngineHandle, exit: watch::Sender<bool>) {
    let mut lines = stdin_lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                exit.send_replace(true);
                return;
            }
            line = lines.recv(), if stdin_open => {
                let Some(line) = line else {
                    stdin_open = false;
                    continue;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let reply = match line.parse::<OperatorCommand>() {
                    Ok(cmd) => cmd.apply(&engine, &exit).await.unwrap_or_else(|e| e.to_string()),
                    Err(e) => e.to_string(),
                };
                println!("{reply}");
            }
        }
    }
}

/// Blocking stdin reads on a plain thread, so a pending read never holds
/// up runtime shutdown.
fn stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}
