//! `Client` builder and the network session loop.
//!
//! The client owns the connection to the coordination server. It ties the
//! layers together: transport → protocol → sync engine. Each connection
//! goes through the same steps:
//!   1. Tell the engine we're connecting (it purges the interface directory)
//!   2. Open the socket and wait for `RoomInfo`
//!   3. Send `GetDataPackage` + `Connect`
//!   4. Loop: forward server commands to the engine, engine batches to
//!      the server
//!   5. On close, tell the engine, back off, and go again

use std::path::PathBuf;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{mpsc, watch};
use utylink_bridge::FsBridge;
use utylink_protocol::{
    ClientCommand, Codec, Connect, ITEMS_HANDLING_ALL, JsonCodec, NetworkVersion, RoomInfo,
    ServerCommand,
};
use utylink_sync::game::GAME;
use utylink_sync::{EngineConfig, EngineHandle, TagSet, spawn_engine};
use utylink_transport::{Connection, Connector, TransportError, WebSocketConnector};

use crate::UtylinkError;
use crate::config::{ClientConfig, ReconnectPolicy};

/// How long the server gets for each handshake step: answering the
/// WebSocket upgrade, then sending `RoomInfo`.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Builder for configuring a [`Client`].
///
/// # Example
///
/// ```rust,ignore
/// let client = Client::builder()
///     .server("archipelago.gg:38281")
///     .slot_name("Clover")
///     .deathlink(true)
///     .build()?;
/// client.run(exit_rx).await
/// ```
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    /// Starts from an existing configuration.
    pub fn from_config(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn server(mut self, addr: &str) -> Self {
        self.config.server = addr.to_string();
        self
    }

    pub fn slot_name(mut self, name: &str) -> Self {
        self.config.slot_name = name.to_string();
        self
    }

    pub fn password(mut self, password: Option<String>) -> Self {
        self.config.password = password.filter(|p| !p.is_empty());
        self
    }

    pub fn interface_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.interface_dir = dir.into();
        self
    }

    pub fn deathlink(mut self, enabled: bool) -> Self {
        self.config.deathlink = enabled;
        self
    }

    pub fn online(mut self, enabled: bool) -> Self {
        self.config.online = enabled;
        self
    }

    pub fn tick_rate(mut self, hz: u32) -> Self {
        self.config.tick_rate_hz = hz;
        self
    }

    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.config.reconnect = policy;
        self
    }

    /// Validates the configuration and starts the sync engine, using the
    /// WebSocket connector. Must be called inside a Tokio runtime.
    pub fn build(self) -> Result<Client, UtylinkError> {
        self.build_with(WebSocketConnector)
    }

    /// Like [`build`](Self::build) with a custom connector.
    pub fn build_with<C: Connector>(self, connector: C) -> Result<Client<C>, UtylinkError> {
        let config = self.config;
        if config.slot_name.trim().is_empty() {
            return Err(UtylinkError::Config("slot name is required".into()));
        }
        if config.tick_rate_hz == 0 {
            return Err(UtylinkError::Config("tick rate must be at least 1 Hz".into()));
        }

        let tags = TagSet::new(config.deathlink, config.online);
        let (engine, outbound) = spawn_engine(
            FsBridge::new(&config.interface_dir),
            tags,
            EngineConfig::with_rate(config.tick_rate_hz),
        );

        Ok(Client {
            config,
            connector,
            codec: JsonCodec,
            uuid: generate_uuid(),
            engine,
            outbound,
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// How a single connection ended without an error.
enum SessionEnd {
    /// The server closed the socket.
    Closed,
    /// The exit signal was raised.
    Exit,
}

/// A multiworld client bound to one slot.
///
/// Call [`run()`](Self::run) to connect and keep the game in sync until
/// the exit signal is raised.
pub struct Client<C: Connector = WebSocketConnector> {
    config: ClientConfig,
    connector: C,
    codec: JsonCodec,
    /// Identifies this client process to the server across reconnects.
    uuid: String,
    engine: EngineHandle,
    outbound: mpsc::UnboundedReceiver<Vec<ClientCommand>>,
}

impl Client {
    /// Creates a new builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }
}

impl<C> Client<C>
where
    C: Connector<Error = TransportError>,
    C::Connection: Connection<Error = TransportError>,
{
    /// Handle for operator commands.
    pub fn engine(&self) -> EngineHandle {
        self.engine.clone()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connects and reconnects until `exit` becomes `true`, then purges the
    /// interface directory and stops the engine.
    ///
    /// Returns an error only for failures that retrying can't fix, such as
    /// the server refusing the slot.
    pub async fn run(mut self, mut exit: watch::Receiver<bool>) -> Result<(), UtylinkError> {
        let url = self.config.server_url();
        let mut attempt = 0;

        let result = loop {
            let exiting = *exit.borrow();
            if exiting {
                break Ok(());
            }

            if let Err(e) = self.engine.connecting().await {
                tracing::error!(error = %e, "failed to prepare interface directory");
            }
            // Anything queued for a previous connection is stale.
            while self.outbound.try_recv().is_ok() {}

            let mut established = false;
            let end = self.session(&url, &mut exit, &mut established).await;

            if let Err(e) = self.engine.connection_closed().await {
                tracing::error!(error = %e, "failed to clean up after disconnect");
            }

            match end {
                Ok(SessionEnd::Exit) => break Ok(()),
                Ok(SessionEnd::Closed) => tracing::info!("disconnected from server"),
                Err(UtylinkError::ConnectionRefused(errors)) => {
                    tracing::error!(?errors, "server refused the connection");
                    break Err(UtylinkError::ConnectionRefused(errors));
                }
                Err(UtylinkError::Sync(e)) => break Err(e.into()),
                Err(e) => tracing::warn!(error = %e, "connection lost"),
            }

            if established {
                attempt = 0;
            }
            let delay = self.config.reconnect.delay(attempt);
            attempt = attempt.saturating_add(1);
            tracing::info!(delay_ms = delay.as_millis() as u64, attempt, "reconnecting");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = exit_requested(&mut exit) => break Ok(()),
            }
        };

        if let Err(e) = self.engine.shutdown().await {
            tracing::error!(error = %e, "engine shutdown failed");
        }
        tracing::info!("client stopped");
        result
    }

    /// Runs one connection from connect to close.
    async fn session(
        &mut self,
        url: &str,
        exit: &mut watch::Receiver<bool>,
        established: &mut bool,
    ) -> Result<SessionEnd, UtylinkError> {
        tracing::info!(%url, slot = %self.config.slot_name, "connecting");
        let conn = tokio::select! {
            conn = tokio::time::timeout(HANDSHAKE_TIMEOUT, self.connector.connect(url)) => {
                conn.map_err(|_| UtylinkError::Handshake("timed out opening the connection".into()))??
            }
            _ = exit_requested(exit) => return Ok(SessionEnd::Exit),
        };
        let conn_id = conn.id();

        tokio::select! {
            handshake = self.handshake(&conn) => handshake?,
            _ = exit_requested(exit) => {
                let _ = conn.close().await;
                return Ok(SessionEnd::Exit);
            }
        }

        loop {
            tokio::select! {
                frame = conn.recv() => {
                    let Some(text) = frame? else {
                        tracing::debug!(%conn_id, "server closed the connection");
                        return Ok(SessionEnd::Closed);
                    };
                    for cmd in self.decode(&text) {
                        match cmd {
                            ServerCommand::ConnectionRefused { errors } => {
                                return Err(UtylinkError::ConnectionRefused(errors));
                            }
                            ServerCommand::Connected(connected) => {
                                *established = true;
                                tracing::info!(%conn_id, slot = %connected.slot, "slot connected");
                                self.engine.server(ServerCommand::Connected(connected)).await?;
                            }
                            other => self.engine.server(other).await?,
                        }
                    }
                }
                batch = self.outbound.recv() => {
                    let Some(batch) = batch else {
                        return Err(utylink_sync::SyncError::EngineUnavailable.into());
                    };
                    let text = self.codec.encode(&batch)?;
                    conn.send(&text).await?;
                }
                _ = exit_requested(exit) => {
                    tracing::info!(%conn_id, "disconnecting");
                    let _ = conn.close().await;
                    return Ok(SessionEnd::Exit);
                }
            }
        }
    }

    /// Waits for `RoomInfo`, then asks for the data package and claims
    /// the slot.
    async fn handshake(&self, conn: &C::Connection) -> Result<(), UtylinkError> {
        let room = tokio::time::timeout(HANDSHAKE_TIMEOUT, self.wait_for_room_info(conn))
            .await
            .map_err(|_| UtylinkError::Handshake("timed out waiting for RoomInfo".into()))??;
        tracing::info!(seed = %room.seed_name, games = ?room.games, "room info received");
        if room.password && self.config.password.is_none() {
            tracing::warn!("room is password protected but no password was given");
        }

        let tags = self.engine.status().await?.tags;
        let batch = vec![
            ClientCommand::GetDataPackage {
                games: vec![GAME.to_string()],
            },
            ClientCommand::Connect(Connect {
                password: self.config.password.clone(),
                game: GAME.to_string(),
                name: self.config.slot_name.clone(),
                uuid: self.uuid.clone(),
                version: NetworkVersion::current(),
                items_handling: ITEMS_HANDLING_ALL,
                tags,
                slot_data: true,
            }),
        ];
        conn.send(&self.codec.encode(&batch)?).await?;
        Ok(())
    }

    async fn wait_for_room_info(&self, conn: &C::Connection) -> Result<RoomInfo, UtylinkError> {
        loop {
            let Some(text) = conn.recv().await? else {
                return Err(UtylinkError::Handshake(
                    "connection closed before RoomInfo".into(),
                ));
            };
            for cmd in self.decode(&text) {
                match cmd {
                    ServerCommand::RoomInfo(room) => return Ok(room),
                    other => tracing::debug!(cmd = other.name(), "ignoring command before RoomInfo"),
                }
            }
        }
    }

    /// Decodes one frame, dropping (and logging) commands that don't parse.
    fn decode(&self, text: &str) -> Vec<ServerCommand> {
        match self.codec.decode_batch(text) {
            Ok(cmds) => cmds
                .into_iter()
                .filter_map(|cmd| {
                    cmd.inspect_err(|e| tracing::warn!(error = %e, "dropping undecodable command"))
                        .ok()
                })
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "dropping undecodable frame");
                Vec::new()
            }
        }
    }
}

/// Resolves once `exit` is `true` or its sender is gone.
async fn exit_requested(exit: &mut watch::Receiver<bool>) {
    let _ = exit.wait_for(|exit| *exit).await;
}

/// Random 128-bit client id as 32 hex characters.
fn generate_uuid() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_uuid_format() {
        let uuid = generate_uuid();
        assert_eq!(uuid.len(), 32);
        assert!(uuid.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(uuid, generate_uuid());
    }

    #[tokio::test]
    async fn test_build_requires_slot_name() {
        let err = Client::builder().build().err().unwrap();
        assert!(matches!(err, UtylinkError::Config(_)));
    }

    #[tokio::test]
    async fn test_builder_sets_fields() {
        let dir = tempfile::tempdir().unwrap();
        let client = Client::builder()
            .server("example.com")
            .slot_name("Clover")
            .password(Some(String::new()))
            .interface_dir(dir.path())
            .deathlink(true)
            .build()
            .unwrap();
        assert_eq!(client.config().server_url(), "ws://example.com:38281");
        assert_eq!(client.config().password, None);
        let status = client.engine().status().await.unwrap();
        assert_eq!(status.tags, vec!["AP", "DeathLink", "Online"]);
        assert_eq!(status.interface_dir, dir.path());
    }
}
