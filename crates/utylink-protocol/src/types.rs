//! Command types for the coordination server's wire format.
//!
//! Every frame is a JSON array of command objects. Each object names its
//! command in a `"cmd"` field, which maps directly onto serde's internally
//! tagged enums: `{"cmd": "Sync"}` is [`ClientCommand::Sync`].

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A player's slot number within one multiworld session.
///
/// Slot 0 is the server itself (used as the sender of starting items and
/// other non-player grants).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SlotId(pub u32);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Items handling flags sent on connect: remote items, own-world items
/// and starting inventory all arrive through `ReceivedItems`.
pub const ITEMS_HANDLING_ALL: u8 = 0b111;

/// Hint mode for `LocationScouts`: create hints and announce only new ones.
pub const SCOUT_HINT_NEW_ONLY: u8 = 2;

/// An item placed at a location, as the server reports it.
///
/// `location` may be negative for grants that don't come from a world
/// location (starting inventory, server commands).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkItem {
    pub item: i64,
    pub location: i64,
    pub player: SlotId,
    #[serde(default)]
    pub flags: u32,
}

/// Version triple sent with `Connect`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkVersion {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
    #[serde(default = "version_class")]
    pub class: String,
}

fn version_class() -> String {
    "Version".to_string()
}

impl NetworkVersion {
    /// The protocol version this client implements.
    pub fn current() -> Self {
        Self {
            major: 0,
            minor: 5,
            build: 1,
            class: version_class(),
        }
    }
}

/// Client progress reported through `StatusUpdate`. Travels as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ClientStatus {
    Unknown,
    Connected,
    Ready,
    Playing,
    Goal,
}

impl From<ClientStatus> for u8 {
    fn from(status: ClientStatus) -> Self {
        match status {
            ClientStatus::Unknown => 0,
            ClientStatus::Connected => 5,
            ClientStatus::Ready => 10,
            ClientStatus::Playing => 20,
            ClientStatus::Goal => 30,
        }
    }
}

impl TryFrom<u8> for ClientStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Unknown),
            5 => Ok(Self::Connected),
            10 => Ok(Self::Ready),
            20 => Ok(Self::Playing),
            30 => Ok(Self::Goal),
            other => Err(format!("unknown client status {other}")),
        }
    }
}

/// One step of a data storage `Set`. The server applies the steps in
/// order to the stored value (or `default` if the key is absent).
///
/// Serialized as `{"operation": "max", "value": 1}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", content = "value", rename_all = "lowercase")]
pub enum DataStorageOperation {
    Replace(Value),
    Default,
    Add(Value),
    Max(Value),
    Min(Value),
}

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// Body of the `Connect` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connect {
    pub password: Option<String>,
    pub game: String,
    pub name: String,
    pub uuid: String,
    pub version: NetworkVersion,
    pub items_handling: u8,
    pub tags: Vec<String>,
    pub slot_data: bool,
}

/// Commands the client sends to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum ClientCommand {
    /// Claim a slot. First command after `RoomInfo`.
    Connect(Connect),

    /// Replace the client's capability tag set mid-session.
    ConnectUpdate { tags: Vec<String> },

    /// Ask the server to resend every received item from index 0.
    Sync,

    /// Report completed locations. The server unions them into its set,
    /// so resending known ids is harmless.
    LocationChecks { locations: Vec<i64> },

    /// Ask what's at the given locations, optionally creating hints.
    LocationScouts {
        locations: Vec<i64>,
        create_as_hint: u8,
    },

    /// Report client progress (e.g. goal completion).
    StatusUpdate { status: ClientStatus },

    /// Relay arbitrary data to other clients matching the filters.
    Bounce {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        games: Option<Vec<String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        slots: Option<Vec<SlotId>>,
        tags: Vec<String>,
        data: Value,
    },

    /// Read data storage keys; answered by `Retrieved`.
    Get { keys: Vec<String> },

    /// Modify a data storage key.
    Set {
        key: String,
        default: Value,
        want_reply: bool,
        operations: Vec<DataStorageOperation>,
    },

    /// Subscribe to changes of data storage keys; changes arrive as `SetReply`.
    SetNotify { keys: Vec<String> },

    /// Request item/location name tables for the given games.
    GetDataPackage { games: Vec<String> },
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// Body of `RoomInfo`, the first message after the socket opens.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RoomInfo {
    #[serde(default)]
    pub password: bool,
    #[serde(default)]
    pub games: Vec<String>,
    #[serde(default)]
    pub seed_name: String,
}

/// A player entry from `Connected`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkPlayer {
    #[serde(default)]
    pub team: u32,
    pub slot: SlotId,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub name: String,
}

/// Body of `Connected`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connected {
    #[serde(default)]
    pub team: u32,
    pub slot: SlotId,
    #[serde(default)]
    pub players: Vec<NetworkPlayer>,
    #[serde(default)]
    pub missing_locations: Vec<i64>,
    #[serde(default)]
    pub checked_locations: Vec<i64>,
    #[serde(default)]
    pub slot_data: Value,
}

/// Name tables for one game.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GameData {
    #[serde(default)]
    pub item_name_to_id: HashMap<String, i64>,
    #[serde(default)]
    pub location_name_to_id: HashMap<String, i64>,
    #[serde(default)]
    pub checksum: Option<String>,
}

/// Body of `DataPackage`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DataPackage {
    #[serde(default)]
    pub games: HashMap<String, GameData>,
}

/// One fragment of a `PrintJSON` message.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JsonMessagePart {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Commands the server sends to the client.
///
/// Anything the client doesn't understand decodes to [`ServerCommand::Unknown`]
/// and is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum ServerCommand {
    RoomInfo(RoomInfo),

    ConnectionRefused {
        #[serde(default)]
        errors: Vec<String>,
    },

    Connected(Connected),

    /// Items starting at `index` in the slot's received-item list.
    ReceivedItems { index: usize, items: Vec<NetworkItem> },

    /// Answer to `LocationScouts`.
    LocationInfo { locations: Vec<NetworkItem> },

    RoomUpdate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        checked_locations: Option<Vec<i64>>,
    },

    #[serde(rename = "PrintJSON")]
    PrintJson {
        #[serde(default)]
        data: Vec<JsonMessagePart>,
    },

    DataPackage { data: DataPackage },

    Bounced {
        #[serde(default)]
        tags: Vec<String>,
        #[serde(default)]
        data: Value,
    },

    /// Answer to `Get`. Missing keys come back as `null`.
    Retrieved {
        #[serde(default)]
        keys: serde_json::Map<String, Value>,
    },

    /// A watched or `want_reply` key changed.
    SetReply {
        key: String,
        #[serde(default)]
        value: Value,
    },

    InvalidPacket {
        #[serde(default)]
        text: String,
    },

    #[serde(other)]
    Unknown,
}

impl ServerCommand {
    /// The wire name of this command, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RoomInfo(_) => "RoomInfo",
            Self::ConnectionRefused { .. } => "ConnectionRefused",
            Self::Connected(_) => "Connected",
            Self::ReceivedItems { .. } => "ReceivedItems",
            Self::LocationInfo { .. } => "LocationInfo",
            Self::RoomUpdate { .. } => "RoomUpdate",
            Self::PrintJson { .. } => "PrintJSON",
            Self::DataPackage { .. } => "DataPackage",
            Self::Bounced { .. } => "Bounced",
            Self::Retrieved { .. } => "Retrieved",
            Self::SetReply { .. } => "SetReply",
            Self::InvalidPacket { .. } => "InvalidPacket",
            Self::Unknown => "Unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_status_travels_as_integer() {
        assert_eq!(serde_json::to_string(&ClientStatus::Goal).unwrap(), "30");
        let status: ClientStatus = serde_json::from_str("20").unwrap();
        assert_eq!(status, ClientStatus::Playing);
        assert!(serde_json::from_str::<ClientStatus>("7").is_err());
    }

    #[test]
    fn test_slot_id_is_transparent() {
        assert_eq!(serde_json::to_string(&SlotId(4)).unwrap(), "4");
        assert_eq!(SlotId(4).to_string(), "4");
    }

    #[test]
    fn test_max_operation_shape() {
        let op = DataStorageOperation::Max(Value::from(1));
        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            serde_json::json!({"operation": "max", "value": 1})
        );
    }

    #[test]
    fn test_server_command_name() {
        assert_eq!(ServerCommand::Unknown.name(), "Unknown");
        assert_eq!(
            ServerCommand::PrintJson { data: vec![] }.name(),
            "PrintJSON"
        );
    }
}
