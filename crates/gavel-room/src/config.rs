//! Room and auction settings.

use std::time::Duration;

use gavel_protocol::{Amount, League};
use serde::{Deserialize, Serialize};

use crate::AuctionError;

/// Starting budget when the host doesn't pick one.
pub const DEFAULT_BUDGET: Amount = Amount::crores(120);

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Fixed at room creation and persisted with the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomConfig {
    pub league: League,

    /// The room starts only once exactly this many teams have joined.
    pub teams_expected: usize,

    /// Roster size at which a team stops bidding.
    pub team_capacity: usize,

    /// Maximum roster slots for players from outside the league's nation.
    pub foreign_cap: usize,

    /// Budget every team starts with.
    pub starting_budget: Amount,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            league: League::Ipl,
            teams_expected: 2,
            team_capacity: 15,
            foreign_cap: 4,
            starting_budget: DEFAULT_BUDGET,
        }
    }
}

impl RoomConfig {
    /// Rejects configs no auction could run under.
    pub fn validate(&self) -> Result<(), AuctionError> {
        if self.teams_expected == 0 {
            return Err(AuctionError::Validation(
                "teams_expected must be at least 1".into(),
            ));
        }
        if self.team_capacity == 0 {
            return Err(AuctionError::Validation(
                "team_capacity must be at least 1".into(),
            ));
        }
        if self.foreign_cap > self.team_capacity {
            return Err(AuctionError::Validation(format!(
                "foreign_cap {} exceeds team_capacity {}",
                self.foreign_cap, self.team_capacity
            )));
        }
        if self.starting_budget.is_zero() {
            return Err(AuctionError::Validation(
                "starting_budget must be positive".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// AuctionSettings
// ---------------------------------------------------------------------------

/// Process-wide knobs shared by every room.
#[derive(Debug, Clone)]
pub struct AuctionSettings {
    /// Countdown armed for each lot and reset by each accepted bid.
    pub bid_window: Duration,

    /// Seeds lot draws. `None` draws from the OS.
    pub rng_seed: Option<u64>,

    /// Command queue depth per room actor.
    pub channel_size: usize,
}

impl Default for AuctionSettings {
    fn default() -> Self {
        Self {
            bid_window: Duration::from_secs(20),
            rng_seed: None,
            channel_size: 64,
        }
    }
}
