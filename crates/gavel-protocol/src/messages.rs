//! Inbound requests, outbound events, and the envelope that carries them.
//!
//! Both directions are closed sets of tagged variants, each with a fully
//! typed payload. `ClientMessage` is what a team can ask for;
//! `ServerEvent` is everything the server can tell a team.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{
    Amount, League, PlayerLot, RoomId, RoomState, TeamName, TeamSummary,
};

// ---------------------------------------------------------------------------
// ClientMessage
// ---------------------------------------------------------------------------

/// A request from a client.
///
/// `#[serde(tag = "type")]` produces internally tagged JSON:
///   `{ "type": "PlaceBid", "room_id": "AbC123", "team_name": "Chennai" }`
///
/// Every room action names the team making it. Callers are assumed to be
/// identified already; the server does no authentication of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// First message on a connection.
    Handshake { version: u32 },

    /// Create a room with the sender as host.
    CreateRoom {
        team_name: TeamName,
        league: League,
        teams_expected: usize,
        team_capacity: usize,
        foreign_cap: usize,
        /// Starting budget for every team. Defaults server-side when absent.
        #[serde(default)]
        budget: Option<Amount>,
    },

    /// Register in a room, or rebind a team that is already registered.
    JoinRoom { room_id: RoomId, team_name: TeamName },

    /// Host only: open bidding on the first lot.
    StartAuction { room_id: RoomId, team_name: TeamName },

    /// Raise the current lot by one increment.
    PlaceBid { room_id: RoomId, team_name: TeamName },

    /// Decline the current lot.
    PassOnLot { room_id: RoomId, team_name: TeamName },

    /// Host only: re-auction the unsold backlog or finish.
    DecideUnsold {
        room_id: RoomId,
        team_name: TeamName,
        #[serde(rename = "continue")]
        proceed: bool,
    },

    /// Keep-alive.
    Heartbeat { client_time: u64 },

    /// Client is going away.
    Leave,
}

// ---------------------------------------------------------------------------
// ServerEvent
// ---------------------------------------------------------------------------

/// How a failed request is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed or missing request fields.
    Validation,
    /// Not legal in the room's current state.
    Precondition,
    /// Budget, capacity, foreign cap, self-outbid, duplicate pass.
    BusinessRule,
    /// Timer expiry from a superseded deadline. Never sent to clients.
    StaleTimer,
    /// The room store rejected a write; safe to retry.
    Persistence,
    /// The room is not reachable right now.
    Unavailable,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::Precondition => "precondition",
            Self::BusinessRule => "business rule",
            Self::StaleTimer => "stale timer",
            Self::Persistence => "persistence",
            Self::Unavailable => "unavailable",
        };
        f.write_str(s)
    }
}

/// Why a lot left the auction without a buyer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason")]
pub enum UnsoldReason {
    /// Nobody bid.
    NoBids,
    /// The winning team's roster filled up before settlement.
    RosterFull { team: TeamName, capacity: usize },
    /// The winning team hit its foreign-player cap before settlement.
    ForeignCap { team: TeamName, cap: usize },
    /// The winning team can no longer afford its own bid.
    InsufficientBudget { team: TeamName },
    /// The recorded winner is not a member of the room.
    WinnerMissing { team: TeamName },
    /// The winner failed some other check at settlement.
    Ineligible { team: TeamName, detail: String },
}

impl fmt::Display for UnsoldReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoBids => write!(f, "no bids"),
            Self::RosterFull { team, capacity } => {
                write!(f, "{team} already has {capacity} players")
            }
            Self::ForeignCap { team, cap } => {
                write!(f, "{team} already has {cap} foreign player(s)")
            }
            Self::InsufficientBudget { team } => {
                write!(f, "{team} cannot cover the bid")
            }
            Self::WinnerMissing { team } => write!(f, "{team} is not in this room"),
            Self::Ineligible { team, detail } => write!(f, "{team} cannot take the lot: {detail}"),
        }
    }
}

/// An event from the server.
///
/// Tagged with `event` rather than `type` so clients can tell the two
/// directions apart at a glance when reading logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum ServerEvent {
    /// Reply to `Handshake`.
    HandshakeAck { server_time: u64 },

    /// Reply to `CreateRoom`, sent to the host only.
    RoomCreated { room_id: RoomId },

    /// Team list changed (join, reconnect).
    LobbyUpdate {
        room_id: RoomId,
        teams: Vec<TeamSummary>,
        teams_expected: usize,
    },

    /// Bidding opened.
    AuctionStarted { room_id: RoomId },

    /// A new lot is under the hammer; bid state is empty.
    CurrentLot { lot: PlayerLot, lots_remaining: usize },

    /// A fresh countdown was armed.
    CountdownStarted { deadline_ms: u64, window_ms: u64 },

    /// A bid was accepted.
    BidUpdate {
        highest_bid: Amount,
        highest_bidder: TeamName,
        last_bidder: TeamName,
    },

    /// A team passed on the current lot.
    PassUpdate {
        team: TeamName,
        passed_teams: Vec<TeamName>,
    },

    /// Settlement sold the lot.
    LotSold {
        lot: PlayerLot,
        team: TeamName,
        price: Amount,
        remaining_budget: Amount,
    },

    /// Settlement moved the lot to the unsold backlog.
    LotUnsold { lot: PlayerLot, reason: UnsoldReason },

    /// Host only: every lot has been through the hammer once and some
    /// remain unsold.
    UnsoldDecisionRequired { remaining: usize },

    /// Terminal: final rosters.
    AuctionFinished { teams: Vec<TeamSummary> },

    /// A team's connection came or went.
    TeamConnection { team: TeamName, connected: bool },

    /// Full state, sent to a team that rejoins a running auction.
    AuctionSnapshot {
        room_id: RoomId,
        state: RoomState,
        current_lot: Option<PlayerLot>,
        highest_bid: Amount,
        highest_bidder: Option<TeamName>,
        last_bidder: Option<TeamName>,
        passed_teams: Vec<TeamName>,
        teams: Vec<TeamSummary>,
        unsold_count: usize,
        deadline_ms: Option<u64>,
    },

    /// The request was refused. Sent to the requester only.
    Rejected { kind: ErrorKind, reason: String },

    /// A write to the room store failed and the room was rolled back.
    TransientFailure { room_id: RoomId, message: String },

    /// Reply to `Heartbeat`.
    HeartbeatAck { client_time: u64, server_time: u64 },
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The content of an envelope: a request or an event.
///
/// Adjacently tagged: `{ "type": "Client", "data": { ... } }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Message {
    Client(ClientMessage),
    Server(ServerEvent),
}

/// The top-level wire wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Per-direction sequence number.
    pub seq: u64,
    /// Milliseconds since the sender's connection started.
    pub timestamp: u64,
    pub message: Message,
}

impl Envelope {
    /// Wraps a server event.
    pub fn server(seq: u64, timestamp: u64, event: ServerEvent) -> Self {
        Self {
            seq,
            timestamp,
            message: Message::Server(event),
        }
    }

    /// Wraps a client request.
    pub fn client(seq: u64, timestamp: u64, msg: ClientMessage) -> Self {
        Self {
            seq,
            timestamp,
            message: Message::Client(msg),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
