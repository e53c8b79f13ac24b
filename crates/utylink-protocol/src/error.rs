//! Error types for the protocol layer.

/// Errors that can occur while encoding or decoding server traffic.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into text).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning text into a Rust type).
    ///
    /// Common causes: malformed JSON, missing required fields, or a
    /// command whose shape changed between server versions.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message parsed but is not valid at the protocol level,
    /// e.g. a frame that is not a JSON array of commands.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
