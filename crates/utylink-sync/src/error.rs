//! Error types for the sync engine.

use utylink_bridge::BridgeError;

/// Errors that can occur while synchronizing.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Reading or writing the interface directory failed.
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// The engine task has stopped and no longer accepts commands.
    #[error("sync engine is unavailable")]
    EngineUnavailable,
}
