//! Filesystem bridge between utylink and the running game.
//!
//! The game has no API. It reads and writes small text files in one
//! directory, and so do we. This crate turns those files into typed
//! records and back; it holds no synchronization rules of its own.
//!
//! The [`LocalBridge`] trait is the seam: the engine only sees the trait,
//! so polling files could later give way to a socket without touching the
//! synchronization logic. [`FsBridge`] is the directory implementation.

mod artifact;
mod error;
mod fs;

pub use artifact::{
    Artifact, CHECK_LOG, INBOUND_DEATH, ItemArtifact, OUTBOUND_DEATH, PeerPosition, SCOUT_REQUEST,
    SELF_POSITION, hint_file_name, parse_id_lines,
};
pub use error::BridgeError;
pub use fs::FsBridge;

use std::path::{Path, PathBuf};

use utylink_protocol::SlotId;

/// What one pass over the interface directory found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scan {
    /// The game reported a death.
    pub outbound_death: bool,
    pub scout_request: bool,
    pub check_log: bool,
    pub self_position: bool,
    /// Number of peer-position artifacts present.
    pub peer_positions: usize,
    /// Stems of all victory markers, e.g. `["neutral", "pacifist"]`.
    pub victories: Vec<String>,
    /// Number of item artifacts not yet consumed by the game.
    pub items: usize,
}

/// Typed access to the game's interface directory.
///
/// Local location ids are used throughout; translating to the server's
/// numbering is the engine's job.
pub trait LocalBridge: Send + 'static {
    /// The interface directory.
    fn root(&self) -> &Path;

    /// Points the bridge at a different directory. Takes effect for the
    /// next operation; nothing is moved.
    fn set_root(&mut self, root: PathBuf);

    /// Creates the interface directory if it doesn't exist.
    fn ensure_root(&self) -> Result<(), BridgeError>;

    /// Lists the directory once. A missing directory scans as empty.
    fn scan(&self) -> Result<Scan, BridgeError>;

    /// Removes every per-session artifact. Returns how many were removed.
    fn purge_transient(&self) -> Result<usize, BridgeError>;

    /// Removes all item artifacts. Returns how many were removed.
    fn clear_items(&self) -> Result<usize, BridgeError>;

    /// Writes (or overwrites) one item artifact.
    fn write_item(&self, item: &ItemArtifact) -> Result<(), BridgeError>;

    /// Materializes the inbound death marker, overwriting any present.
    fn write_inbound_death(&self) -> Result<(), BridgeError>;

    /// Deletes the game's death marker. Returns `true` if one existed.
    fn take_outbound_death(&self) -> Result<bool, BridgeError>;

    /// Reads and deletes the scouting request. The file is removed even
    /// if it could not be parsed.
    fn take_scout_request(&self) -> Result<Vec<i64>, BridgeError>;

    /// Reads the whole check log. The file is left in place.
    fn read_check_log(&self) -> Result<Vec<i64>, BridgeError>;

    /// Appends ids to the check log, creating it if needed.
    fn append_check_log(&self, ids: &[i64]) -> Result<(), BridgeError>;

    /// Writes a hint preview for a local location.
    fn write_hint(&self, local_location: i64, preview: &str) -> Result<(), BridgeError>;

    /// Writes (or overwrites) a peer's position artifact.
    fn write_peer_position(&self, position: &PeerPosition) -> Result<(), BridgeError>;

    /// Deletes all peer-position artifacts. Returns how many were removed.
    fn remove_peer_positions(&self) -> Result<usize, BridgeError>;

    /// Reads the player's own position, tagged with `player`. `None` if
    /// the file is absent or incomplete.
    fn read_self_position(&self, player: SlotId) -> Result<Option<PeerPosition>, BridgeError>;
}
