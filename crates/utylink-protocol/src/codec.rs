//! Codec trait and the JSON implementation used by the coordination server.
//!
//! The server exchanges WebSocket text frames, each holding a JSON array
//! of commands. The protocol layer only needs something that implements
//! [`Codec`]; [`JsonCodec`] is the one the server actually speaks.

use serde::{Serialize, de::DeserializeOwned};

use crate::{ProtocolError, ServerCommand};

/// A codec that can encode Rust types to frame text and decode them back.
///
/// `Send + Sync + 'static` because the codec lives inside long-running
/// client tasks.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into frame text.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError>;

    /// Deserializes frame text back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the text is malformed or
    /// doesn't match the expected shape of `T`.
    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T, ProtocolError>;
}

/// A [`Codec`] backed by `serde_json`.
///
/// ## Example
///
/// ```rust
/// use utylink_protocol::{ClientCommand, Codec, JsonCodec};
///
/// let codec = JsonCodec;
/// let text = codec.encode(&vec![ClientCommand::Sync]).unwrap();
/// assert_eq!(text, r#"[{"cmd":"Sync"}]"#);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError> {
        serde_json::to_string(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }
}

impl JsonCodec {
    /// Decodes one server frame into its commands, one result per command.
    ///
    /// A single command with an unexpected shape does not poison the rest
    /// of the frame: it comes back as an `Err` in its slot while its
    /// neighbours still decode. Only a frame that isn't a JSON array at
    /// all fails as a whole.
    pub fn decode_batch(
        &self,
        text: &str,
    ) -> Result<Vec<Result<ServerCommand, ProtocolError>>, ProtocolError> {
        let raw: serde_json::Value = self.decode(text)?;
        let serde_json::Value::Array(items) = raw else {
            return Err(ProtocolError::InvalidMessage(
                "server frame is not a command array".into(),
            ));
        };
        Ok(items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(ProtocolError::Decode))
            .collect())
    }
}
