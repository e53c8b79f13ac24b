//! # utylink
//!
//! Multiworld client for Undertale Yellow.
//!
//! The game has no network code of its own; a patch makes it read and
//! write small files in an interface directory. utylink connects to an
//! Archipelago server and keeps that directory in sync with the slot's
//! state: items received, locations checked, route completion, other
//! players' positions and deaths.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use utylink::prelude::*;
//!
//! # async fn run() -> Result<(), UtylinkError> {
//! let (_exit_tx, exit_rx) = tokio::sync::watch::channel(false);
//! let client = Client::builder()
//!     .server("localhost:38281")
//!     .slot_name("Clover")
//!     .build()?;
//! client.run(exit_rx).await
//! # }
//! ```

mod client;
mod commands;
mod config;
mod error;

pub use client::{Client, ClientBuilder};
pub use commands::{HELP, OperatorCommand, ParseCommandError};
pub use config::{
    ClientConfig, DEFAULT_PORT, DEFAULT_SERVER, INTERFACE_DIR_NAME, ReconnectPolicy,
    default_interface_dir,
};
pub use error::UtylinkError;

/// Common imports for applications embedding the client.
pub mod prelude {
    pub use crate::{Client, ClientBuilder, ClientConfig, OperatorCommand, UtylinkError};
    pub use utylink_sync::{EngineHandle, EngineStatus};
}
