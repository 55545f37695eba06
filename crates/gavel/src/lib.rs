//! # Gavel
//!
//! A live, multi-team player auction server.
//!
//! Teams join a room, the host starts the auction, and players go under
//! the hammer one at a time with a countdown that resets on every bid.
//! Each room is owned by a single actor, so every bid, pass and timeout
//! is applied in order and persisted before it is announced.
//!
//! ```rust,no_run
//! # async fn run() -> Result<(), gavel::GavelError> {
//! let server = gavel::GavelServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod catalog;
mod config;
mod error;
mod handler;
mod server;

pub use catalog::{DEFAULT_BASE_PRICE, LotCatalog};
pub use config::{DEFAULT_BIND, ServerArgs, ServerConfig};
pub use error::GavelError;
pub use server::{GavelServer, GavelServerBuilder};

/// Re-exports for clients and embedders.
pub mod prelude {
    pub use gavel_protocol::{
        Amount, ClientMessage, Codec, Envelope, ErrorKind, JsonCodec, League, Message,
        PROTOCOL_VERSION, PlayerLot, RoomId, RoomState, ServerEvent, TeamName, UnsoldReason,
    };
    pub use gavel_room::{AuctionSettings, RoomConfig};

    pub use crate::{GavelError, GavelServer, GavelServerBuilder, LotCatalog, ServerConfig};
}
