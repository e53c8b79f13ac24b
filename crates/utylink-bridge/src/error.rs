//! Error types for the filesystem bridge.

use std::path::PathBuf;

/// Errors that can occur while reading or writing interface artifacts.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// A filesystem operation on `path` failed.
    #[error("{action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The interface directory path exists but is not a directory.
    #[error("interface path {} is not a directory", .0.display())]
    InvalidRoot(PathBuf),
}

impl BridgeError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }
}
