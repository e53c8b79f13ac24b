//! Client configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Server used when none is given.
pub const DEFAULT_SERVER: &str = "localhost:38281";

/// Port assumed when an address doesn't name one.
pub const DEFAULT_PORT: u16 = 38281;

/// Name of the interface directory under the platform's local data dir.
pub const INTERFACE_DIR_NAME: &str = "Undertale_Yellow_AP";

/// Where the game's patch reads and writes interface files by default.
///
/// Falls back to the working directory on platforms without a local data
/// directory.
pub fn default_interface_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(INTERFACE_DIR_NAME)
}

/// Delay between reconnect attempts: starts at `initial` and doubles
/// after every failed attempt, up to `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

/// Everything the client needs to run.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address; `host:port` or a full `ws://` URL.
    pub server: String,
    /// Slot (player) name to connect as.
    pub slot_name: String,
    pub password: Option<String>,
    /// The game's interface directory.
    pub interface_dir: PathBuf,
    /// Initial deathlink preference.
    pub deathlink: bool,
    /// Initial position-sharing preference.
    pub online: bool,
    /// Polling rate of the watchers, in Hz.
    pub tick_rate_hz: u32,
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            slot_name: String::new(),
            password: None,
            interface_dir: default_interface_dir(),
            deathlink: false,
            online: true,
            tick_rate_hz: 10,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// The WebSocket URL for [`server`](Self::server).
    ///
    /// A bare `host` or `host:port` becomes `ws://host:port`, using
    /// [`DEFAULT_PORT`] when no port is given. Anything with a scheme is
    /// passed through unchanged.
    pub fn server_url(&self) -> String {
        let server = self.server.trim();
        if server.contains("://") {
            return server.to_string();
        }
        if has_port(server) {
            format!("ws://{server}")
        } else {
            format!("ws://{server}:{DEFAULT_PORT}")
        }
    }
}

fn has_port(addr: &str) -> bool {
    // `[::1]:38281` or `host:38281`; a bare IPv6 address has several colons.
    let host_end = addr.rfind(']').map_or(0, |i| i + 1);
    match addr[host_end..].rsplit_once(':') {
        Some((host, port)) => {
            (host_end > 0 || !host.contains(':')) && port.parse::<u16>().is_ok()
        }
        None => false,
    }
}
