//! Wire protocol for talking to the multiworld coordination server.
//!
//! - **Types** ([`ClientCommand`], [`ServerCommand`], [`NetworkItem`], …):
//!   the commands that travel inside each frame.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how frames are converted
//!   to and from text.
//! - **Errors** ([`ProtocolError`]): what can go wrong while doing so.
//!
//! The protocol layer knows nothing about sockets or game files; it only
//! describes messages.
//!
//! ```text
//! Transport (text frames) → Protocol (commands) → Sync engine
//! ```

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{
    ClientCommand, ClientStatus, Connect, Connected, DataPackage, DataStorageOperation, GameData,
    ITEMS_HANDLING_ALL, JsonMessagePart, NetworkItem, NetworkPlayer, NetworkVersion, RoomInfo,
    SCOUT_HINT_NEW_ONLY, ServerCommand, SlotId,
};
