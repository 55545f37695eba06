//! Transport layer for Gavel.
//!
//! The [`Transport`] and [`Connection`] traits keep the server independent
//! of the wire: the auction only ever sees whole messages as bytes.
//!
//! Framing belongs to the transport. A `recv` yields exactly one message
//! as the peer sent it, and a `send` delivers one message the peer will
//! read back whole, so the protocol layer never deals with partial reads.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;

/// Opaque identifier for a connection, unique within the process.
///
/// Ids are never reused while the process runs, so a stale id held by a
/// room after its team reconnected cannot be mistaken for the new socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wraps a raw id. Transports hand these out from a process-wide counter.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts new incoming connections.
///
/// The server owns its transport and calls `accept` in a loop, spawning a
/// task per connection. An `accept` error is logged and the loop keeps
/// going, so one failed upgrade never takes the listener down.
pub trait Transport: Send + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Waits for and accepts the next incoming connection.
    ///
    /// Returns once any transport-level handshake has finished. The
    /// application `Handshake` message is still to come.
    fn accept(&mut self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send;

    /// The address the transport is listening on.
    fn local_addr(&self) -> Result<SocketAddr, Self::Error>;
}

/// A single connection carrying whole messages.
///
/// `send` and `recv` may run concurrently from the same task (for example
/// in two branches of a `select!`); neither blocks the other.
pub trait Connection: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Sends one message to the remote peer.
    fn send(&self, data: &[u8]) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Receives the next message from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(&self) -> impl Future<Output = Result<Option<Vec<u8>>, Self::Error>> + Send;

    /// Closes the connection.
    fn close(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// This connection's id, fixed for its lifetime.
    fn id(&self) -> ConnectionId;
}
