//! Engine actor: runs a [`SyncEngine`] in its own Tokio task.
//!
//! Server messages, lifecycle hooks and operator commands arrive on one
//! mpsc channel; the watcher and relay ticks come from two
//! [`TickScheduler`]s. A single `select!` loop serializes all of them, so
//! the engine's state never needs a lock.

use std::path::PathBuf;

use tokio::sync::{mpsc, oneshot, watch};
use utylink_bridge::LocalBridge;
use utylink_protocol::{ClientCommand, ServerCommand};
use utylink_tick::{TickConfig, TickScheduler};

use crate::engine::{EngineStatus, SyncEngine};
use crate::tags::TagSet;
use crate::SyncError;

/// Settings for [`spawn_engine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Polling rate of the item/location watcher.
    pub watcher: TickConfig,
    /// Polling rate of the position relay.
    pub relay: TickConfig,
    /// Capacity of the command channel.
    pub channel_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::with_rate(10)
    }
}

impl EngineConfig {
    /// Both pollers at `tick_rate_hz`.
    pub fn with_rate(tick_rate_hz: u32) -> Self {
        let tick = TickConfig {
            start_paused: true,
            ..TickConfig::with_rate(tick_rate_hz)
        };
        Self {
            watcher: tick.clone(),
            relay: tick,
            channel_size: 256,
        }
    }
}

/// Commands sent to the engine actor.
///
/// Variants with a `reply` are answered once the engine has applied them.
pub(crate) enum EngineCommand {
    Server(ServerCommand),
    Connecting {
        reply: oneshot::Sender<Result<(), SyncError>>,
    },
    ConnectionClosed {
        reply: oneshot::Sender<Result<(), SyncError>>,
    },
    Resync,
    /// `None` toggles.
    SetDeathLink {
        enabled: Option<bool>,
        reply: oneshot::Sender<bool>,
    },
    SetOnline {
        enabled: Option<bool>,
        reply: oneshot::Sender<bool>,
    },
    SetInterfaceDir {
        dir: PathBuf,
        reply: oneshot::Sender<Result<(), SyncError>>,
    },
    Status {
        reply: oneshot::Sender<EngineStatus>,
    },
    Shutdown {
        reply: oneshot::Sender<Result<(), SyncError>>,
    },
}

/// Handle to a running engine actor. Cheap to clone.
#[derive(Clone)]
pub struct EngineHandle {
    sender: mpsc::Sender<EngineCommand>,
    items_changed: watch::Receiver<u64>,
}

impl EngineHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> EngineCommand,
    ) -> Result<T, SyncError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| SyncError::EngineUnavailable)?;
        reply_rx.await.map_err(|_| SyncError::EngineUnavailable)
    }

    /// Forwards a server command (fire-and-forget, in order).
    pub async fn server(&self, cmd: ServerCommand) -> Result<(), SyncError> {
        self.sender
            .send(EngineCommand::Server(cmd))
            .await
            .map_err(|_| SyncError::EngineUnavailable)
    }

    /// Lifecycle hook: a connection is about to be opened. Returns once
    /// the interface directory has been purged.
    pub async fn connecting(&self) -> Result<(), SyncError> {
        self.request(|reply| EngineCommand::Connecting { reply }).await?
    }

    /// Lifecycle hook: the connection ended.
    pub async fn connection_closed(&self) -> Result<(), SyncError> {
        self.request(|reply| EngineCommand::ConnectionClosed { reply }).await?
    }

    /// Requests a manual resync on the next watcher tick.
    pub async fn resync(&self) -> Result<(), SyncError> {
        self.sender
            .send(EngineCommand::Resync)
            .await
            .map_err(|_| SyncError::EngineUnavailable)
    }

    /// Sets (or with `None`, toggles) deathlink. Returns the new state.
    pub async fn set_deathlink(&self, enabled: Option<bool>) -> Result<bool, SyncError> {
        self.request(|reply| EngineCommand::SetDeathLink { enabled, reply }).await
    }

    /// Sets (or with `None`, toggles) position sharing. Returns the new state.
    pub async fn set_online(&self, enabled: Option<bool>) -> Result<bool, SyncError> {
        self.request(|reply| EngineCommand::SetOnline { enabled, reply }).await
    }

    pub async fn set_interface_dir(&self, dir: PathBuf) -> Result<(), SyncError> {
        self.request(|reply| EngineCommand::SetInterfaceDir { dir, reply }).await?
    }

    pub async fn status(&self) -> Result<EngineStatus, SyncError> {
        self.request(|reply| EngineCommand::Status { reply }).await
    }

    /// Purges the interface directory and stops the actor.
    pub async fn shutdown(&self) -> Result<(), SyncError> {
        self.request(|reply| EngineCommand::Shutdown { reply }).await?
    }

    /// Watch counter bumped once per accepted item batch.
    pub fn items_changed(&self) -> watch::Receiver<u64> {
        self.items_changed.clone()
    }
}

struct EngineActor<B: LocalBridge> {
    engine: SyncEngine<B>,
    watcher: TickScheduler,
    relay: TickScheduler,
    receiver: mpsc::Receiver<EngineCommand>,
}

impl<B: LocalBridge> EngineActor<B> {
    async fn run(mut self) {
        tracing::info!(dir = %self.engine.bridge().root().display(), "sync engine started");

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => {
                    let Some(cmd) = cmd else {
                        break;
                    };
                    if !self.handle(cmd) {
                        break;
                    }
                }
                _ = self.watcher.wait_for_tick() => {
                    if let Err(e) = self.engine.watcher_tick() {
                        tracing::error!(error = %e, "watcher tick failed");
                    }
                    self.watcher.record_tick_end();
                }
                _ = self.relay.wait_for_tick() => {
                    if let Err(e) = self.engine.relay_tick() {
                        tracing::error!(error = %e, "relay tick failed");
                    }
                    self.relay.record_tick_end();
                }
            }
            self.sync_schedulers();
        }

        tracing::info!("sync engine stopped");
    }

    /// Applies one command. Returns `false` when the actor should stop.
    fn handle(&mut self, cmd: EngineCommand) -> bool {
        match cmd {
            EngineCommand::Server(cmd) => {
                let name = cmd.name();
                if let Err(e) = self.engine.handle(cmd) {
                    tracing::error!(cmd = name, error = %e, "failed to apply server command");
                }
            }
            EngineCommand::Connecting { reply } => {
                let _ = reply.send(self.engine.on_connecting());
            }
            EngineCommand::ConnectionClosed { reply } => {
                let _ = reply.send(self.engine.on_session_closed());
            }
            EngineCommand::Resync => self.engine.request_resync(),
            EngineCommand::SetDeathLink { enabled, reply } => {
                let enabled = enabled.unwrap_or(!self.engine.tags().deathlink());
                self.engine.set_deathlink(enabled);
                let _ = reply.send(self.engine.tags().deathlink());
            }
            EngineCommand::SetOnline { enabled, reply } => {
                let enabled = enabled.unwrap_or(!self.engine.tags().online());
                self.engine.set_online(enabled);
                let _ = reply.send(self.engine.tags().online());
            }
            EngineCommand::SetInterfaceDir { dir, reply } => {
                let _ = reply.send(self.engine.set_interface_dir(dir));
            }
            EngineCommand::Status { reply } => {
                let _ = reply.send(self.engine.status());
            }
            EngineCommand::Shutdown { reply } => {
                let _ = reply.send(self.engine.on_shutdown());
                return false;
            }
        }
        true
    }

    /// Pollers run only while a session exists.
    fn sync_schedulers(&mut self) {
        if self.engine.has_session() {
            self.watcher.resume();
            self.relay.resume();
        } else {
            self.watcher.pause();
            self.relay.pause();
        }
    }
}

/// Spawns the engine actor.
///
/// Returns the handle and the receiving end of the outbox: every batch
/// the engine wants sent to the server arrives there, one `Vec` per frame.
pub fn spawn_engine<B: LocalBridge>(
    bridge: B,
    tags: TagSet,
    config: EngineConfig,
) -> (EngineHandle, mpsc::UnboundedReceiver<Vec<ClientCommand>>) {
    let (tx, rx) = mpsc::channel(config.channel_size.max(1));
    let (outbox, outbound) = mpsc::unbounded_channel();

    let engine = SyncEngine::new(bridge, tags, outbox);
    let items_changed = engine.items_changed();
    let actor = EngineActor {
        engine,
        watcher: TickScheduler::new("watcher", config.watcher),
        relay: TickScheduler::new("relay", config.relay),
        receiver: rx,
    };

    tokio::spawn(actor.run());

    (
        EngineHandle {
            sender: tx,
            items_changed,
        },
        outbound,
    )
}
