//! Error types for the room layer.

use gavel_protocol::{Amount, ErrorKind, RoomId, RoomState};
use gavel_timer::{TimerError, TimerToken};

/// Why a bid or pass was refused. Shown to the requester as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleViolation {
    #[error("you are already the highest bidder")]
    AlreadyHighestBidder,

    #[error("your team is full ({capacity} players)")]
    RosterFull { capacity: usize },

    #[error("cannot bid {needed}: only {budget} left")]
    InsufficientBudget { needed: Amount, budget: Amount },

    #[error("your team already has {cap} foreign player(s)")]
    ForeignCapReached { cap: usize },

    #[error("you cannot pass on your own bid")]
    CannotPassOwnBid,

    #[error("you have already passed on this lot")]
    AlreadyPassed,
}

/// Errors from a [`RoomStore`](crate::RoomStore).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// The stored version moved on since this copy was loaded.
    #[error("room {room_id} was written concurrently (stored v{stored}, saving v{saving})")]
    Conflict {
        room_id: RoomId,
        stored: u64,
        saving: u64,
    },

    #[error("room {0} already exists")]
    AlreadyExists(RoomId),

    #[error("room store unavailable: {0}")]
    Unavailable(String),
}

/// Errors from auction operations.
#[derive(Debug, thiserror::Error)]
pub enum AuctionError {
    /// Malformed or missing request fields.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The action isn't legal for this room or team right now.
    #[error("{0}")]
    Precondition(String),

    /// The room is in a state that doesn't accept this action.
    #[error("room is {0}; action not allowed")]
    InvalidState(RoomState),

    #[error(transparent)]
    Rule(#[from] RuleViolation),

    /// Expiry from a deadline that has since been replaced or cleared.
    #[error("stale timer {0}")]
    StaleTimer(TimerToken),

    #[error(transparent)]
    Persistence(#[from] StoreError),

    #[error(transparent)]
    Timer(#[from] TimerError),

    #[error("room {0} not found")]
    NotFound(RoomId),

    /// The room's actor stopped or its queue is closed.
    #[error("room {0} is unavailable")]
    Unavailable(RoomId),
}

impl AuctionError {
    /// Where this error sits in the client-facing taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Precondition(_) | Self::InvalidState(_) | Self::NotFound(_) => {
                ErrorKind::Precondition
            }
            Self::Rule(_) => ErrorKind::BusinessRule,
            Self::StaleTimer(_) => ErrorKind::StaleTimer,
            Self::Persistence(_) | Self::Timer(_) => ErrorKind::Persistence,
            Self::Unavailable(_) => ErrorKind::Unavailable,
        }
    }

    pub(crate) fn precondition(reason: impl Into<String>) -> Self {
        Self::Precondition(reason.into())
    }
}
