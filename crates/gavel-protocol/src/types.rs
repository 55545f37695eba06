//! Core vocabulary shared by the wire format and the room model.
//!
//! Every type here can travel "on the wire": it is what clients see in
//! events and what the room store persists. The room crate builds its
//! aggregate (`Room`) out of these pieces.

use std::fmt;
use std::ops::Add;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for an auction room.
///
/// Room ids are short opaque strings (six alphanumeric characters when
/// generated by the server). `#[serde(transparent)]` keeps the JSON form a
/// plain string rather than `{ "0": "..." }`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// The name a team registered under. Unique within a room.
///
/// Team names double as the caller's identity: every inbound request
/// carries the name of the team making it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamName(pub String);

impl TeamName {
    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the name is empty or only whitespace.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for TeamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TeamName {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Transport-level handle for a team's live connection.
///
/// Opaque to the auction engine: it is stored so a reconnect can rebind
/// it, and compared so a late disconnect from a replaced connection
/// doesn't clobber the new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionRef(pub u64);

impl fmt::Display for ConnectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Amount
// ---------------------------------------------------------------------------

/// A sum of money in hundredths of a crore.
///
/// Bids move in steps of 0.5, 1 and 2 crore, and budgets are shown with
/// two decimals, so integer hundredths represent every reachable value
/// exactly. `Amount(250)` is 2.5 crore.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(pub u64);

impl Amount {
    /// Zero crore.
    pub const ZERO: Amount = Amount(0);

    /// Builds an amount from whole crores.
    pub const fn crores(crores: u64) -> Self {
        Self(crores * 100)
    }

    /// Builds an amount from hundredths of a crore.
    pub const fn from_hundredths(hundredths: u64) -> Self {
        Self(hundredths)
    }

    /// The raw value in hundredths of a crore.
    pub const fn hundredths(self) -> u64 {
        self.0
    }

    /// Returns `true` for a zero amount.
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Subtracts `rhs`, returning `None` if the result would be negative.
    pub fn checked_sub(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_sub(rhs.0).map(Amount)
    }

    /// Subtracts `rhs`, clamping at zero.
    pub fn saturating_sub(self, rhs: Amount) -> Amount {
        Amount(self.0.saturating_sub(rhs.0))
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl std::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Amount {
        iter.fold(Amount::ZERO, |acc, a| acc + a)
    }
}

/// Prints as crores with two decimals, e.g. `2.50 Cr`.
impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02} Cr", self.0 / 100, self.0 % 100)
    }
}

// ---------------------------------------------------------------------------
// League
// ---------------------------------------------------------------------------

/// The league a room auctions players for.
///
/// The league decides which nation counts as "local"; every other nation
/// counts against a team's foreign cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum League {
    #[default]
    #[serde(rename = "IPL")]
    Ipl,
    #[serde(rename = "BBL")]
    Bbl,
    #[serde(rename = "Hundreds")]
    Hundreds,
}

impl League {
    /// The nation whose players are not counted as foreign.
    pub fn local_nation(self) -> &'static str {
        match self {
            Self::Ipl => "India",
            Self::Bbl => "Australia",
            Self::Hundreds => "England",
        }
    }
}

impl fmt::Display for League {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ipl => write!(f, "IPL"),
            Self::Bbl => write!(f, "BBL"),
            Self::Hundreds => write!(f, "Hundreds"),
        }
    }
}

// ---------------------------------------------------------------------------
// Lots and rosters
// ---------------------------------------------------------------------------

/// A single player up for auction.
///
/// `name`, `base_price`, `nation` and `role` are fixed when the room is
/// created. The `sold*` fields are only written by settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerLot {
    pub name: String,
    pub base_price: Amount,
    #[serde(default)]
    pub nation: String,
    #[serde(default)]
    pub role: String,
    /// Franchise the player was drafted from, if known.
    #[serde(default)]
    pub franchise: String,
    #[serde(default)]
    pub sold: bool,
    #[serde(default)]
    pub sold_to: Option<TeamName>,
    #[serde(default)]
    pub sold_price: Amount,
}

impl PlayerLot {
    /// Creates an unsold lot.
    pub fn new(
        name: impl Into<String>,
        base_price: Amount,
        nation: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_price,
            nation: nation.into(),
            role: role.into(),
            franchise: String::new(),
            sold: false,
            sold_to: None,
            sold_price: Amount::ZERO,
        }
    }

    /// Clears the settlement fields so the lot can go under the hammer again.
    pub fn reset_sale(&mut self) {
        self.sold = false;
        self.sold_to = None;
        self.sold_price = Amount::ZERO;
    }
}

/// A lot a team won, together with what it paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub lot: PlayerLot,
    pub price_paid: Amount,
}

/// A participant in an auction room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub name: TeamName,
    /// Money left to spend. Never increases once bidding starts.
    pub budget: Amount,
    pub roster: Vec<RosterEntry>,
    /// `None` while the team is disconnected.
    #[serde(default)]
    pub connection: Option<ConnectionRef>,
}

impl Team {
    /// Creates a team with an empty roster.
    pub fn new(name: TeamName, budget: Amount, connection: Option<ConnectionRef>) -> Self {
        Self {
            name,
            budget,
            roster: Vec::new(),
            connection,
        }
    }

    /// Total spent on the roster so far.
    pub fn spent(&self) -> Amount {
        self.roster.iter().map(|e| e.price_paid).sum()
    }
}

/// The client-facing view of a team: no transport details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamSummary {
    pub name: TeamName,
    pub budget: Amount,
    pub roster: Vec<RosterEntry>,
    pub foreign_count: usize,
    pub connected: bool,
}

// ---------------------------------------------------------------------------
// RoomState
// ---------------------------------------------------------------------------

/// Lifecycle state of an auction room.
///
/// ```text
/// Lobby ──start──→ Bidding ──(pass/timeout)──→ Settling
///                     ↑                          │
///                     ├──────(lots remain)───────┤
///                     │                          ├──(unsold backlog)──→ AwaitingUnsoldDecision
///                     └────(decide: continue)────┘                          │
///                                                └──(nothing left)──→ Finished ←──(decide: stop)
/// ```
///
/// `Settling` is transient: it is entered and left inside one operation,
/// so no persisted room is ever observed in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RoomState {
    #[default]
    Lobby,
    Bidding,
    Settling,
    AwaitingUnsoldDecision,
    Finished,
}

impl RoomState {
    /// Returns `true` if new teams may still register.
    pub fn is_joinable(self) -> bool {
        matches!(self, Self::Lobby)
    }

    /// Returns `true` once the room can no longer change.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished)
    }
}

impl fmt::Display for RoomState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lobby => write!(f, "Lobby"),
            Self::Bidding => write!(f, "Bidding"),
            Self::Settling => write!(f, "Settling"),
            Self::AwaitingUnsoldDecision => write!(f, "AwaitingUnsoldDecision"),
            Self::Finished => write!(f, "Finished"),
        }
    }
}

// ---------------------------------------------------------------------------
// Recipient
// ---------------------------------------------------------------------------

/// Who an outbound event is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    /// Every team subscribed to the room.
    All,
    /// A single team (host prompts, reconnect snapshots).
    Team(TeamName),
    /// Every team except one.
    AllExcept(TeamName),
}

// =========================================================================
// Tests
// =========================================================================
