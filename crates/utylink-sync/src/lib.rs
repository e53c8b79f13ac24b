//! Synchronization engine for utylink.
//!
//! Keeps what the game sees in its interface directory consistent with
//! what the multiworld server holds: received items, checked locations,
//! route completion, peer positions and deaths.
//!
//! # Key types
//!
//! - [`SyncEngine`]: message handlers and tick bodies, plain sync code
//! - [`spawn_engine`] / [`EngineHandle`]: the engine running as an actor
//! - [`RouteProgress`]: max-merged route completion flags
//! - [`DeathLinkCoordinator`]: pending-death bookkeeping
//! - [`ItemPlacer`]: artifact numbering and generic item expansion

mod actor;
mod deathlink;
mod engine;
mod error;
pub mod game;
mod items;
mod routes;
mod session;
mod tags;

pub use actor::{EngineConfig, EngineHandle, spawn_engine};
pub use deathlink::DeathLinkCoordinator;
pub use engine::{EngineStatus, Outbox, SyncEngine};
pub use error::SyncError;
pub use items::{ItemPlacer, key_piece_rewards};
pub use routes::{Route, RouteProgress, raise_command, subscribe_commands};
pub use session::{Goal, Session};
pub use tags::TagSet;
