//! Unified error type for utylink.

use utylink_protocol::ProtocolError;
use utylink_sync::SyncError;
use utylink_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates the `From` impls,
/// so `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum UtylinkError {
    /// Connecting, sending or receiving failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    /// The server refused our `Connect`. Retrying won't help.
    #[error("connection refused by server: {}", .0.join(", "))]
    ConnectionRefused(Vec<String>),

    /// The server didn't follow the expected handshake.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The client configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err: UtylinkError = TransportError::ConnectionClosed("gone".into()).into();
        assert!(matches!(err, UtylinkError::Transport(_)));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err: UtylinkError = ProtocolError::InvalidMessage("bad".into()).into();
        assert!(matches!(err, UtylinkError::Protocol(_)));
    }

    #[test]
    fn test_from_sync_error() {
        let err: UtylinkError = SyncError::EngineUnavailable.into();
        assert!(matches!(err, UtylinkError::Sync(_)));
    }

    #[test]
    fn test_connection_refused_lists_reasons() {
        let err = UtylinkError::ConnectionRefused(vec!["InvalidSlot".into(), "InvalidGame".into()]);
        assert_eq!(
            err.to_string(),
            "connection refused by server: InvalidSlot, InvalidGame"
        );
    }
}
