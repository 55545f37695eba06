//! Auction rooms for Gavel.
//!
//! Each room runs as an isolated Tokio task (actor model) that owns the
//! room's state, applies one action at a time, persists the result, and
//! only then broadcasts it.
//!
//! # Key types
//!
//! - [`AuctionEngine`]: the pure state machine (join, start, bid, pass,
//!   timeout, settle, decide)
//! - [`RoomManager`]: creates rooms, revives them from the store, routes actions
//! - [`RoomHandle`]: send commands to a running room actor
//! - [`RoomStore`] / [`Broadcaster`]: persistence and fan-out seams
//! - [`rules`]: increments, budget, roster and foreign-cap checks

mod broadcast;
mod config;
mod engine;
mod error;
mod manager;
mod model;
mod room;
pub mod rules;
mod store;

pub use broadcast::{Broadcaster, ChannelBroadcaster, EventSender};
pub use config::{AuctionSettings, DEFAULT_BUDGET, RoomConfig};
pub use engine::{Action, AuctionEngine, TimerDirective, Transition};
pub use error::{AuctionError, RuleViolation, StoreError};
pub use manager::{ROOM_ID_LEN, RoomManager};
pub use model::Room;
pub use room::{RoomHandle, RoomInfo};
pub use store::{MemoryRoomStore, RoomStore};
