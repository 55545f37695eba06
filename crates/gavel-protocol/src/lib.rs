//! Wire vocabulary for Gavel auction rooms.
//!
//! This crate defines everything that crosses a process boundary:
//!
//! - **Types** ([`RoomId`], [`TeamName`], [`Amount`], [`PlayerLot`], ...):
//!   the pieces a room is built from and that clients see in events.
//! - **Messages** ([`ClientMessage`], [`ServerEvent`], [`Envelope`]):
//!   the closed sets of requests and events.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how envelopes become
//!   bytes and back.
//! - **Errors** ([`ProtocolError`]).
//!
//! The protocol layer knows nothing about connections, timers or rooms.
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Room (auction state)
//! ```

mod codec;
mod error;
mod messages;
mod types;

/// Protocol version a client must announce in its handshake.
pub const PROTOCOL_VERSION: u32 = 1;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use messages::{
    ClientMessage, Envelope, ErrorKind, Message, ServerEvent, UnsoldReason,
};
pub use types::{
    Amount, ConnectionRef, League, PlayerLot, Recipient, RoomId, RoomState,
    RosterEntry, Team, TeamName, TeamSummary,
};
