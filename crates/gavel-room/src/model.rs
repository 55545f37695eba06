//! The room aggregate.
//!
//! A [`Room`] is read, changed, and written back as one unit. Nothing
//! outside the room's own actor ever holds a mutable reference to it.

use std::collections::{BTreeSet, HashSet};

use gavel_protocol::{
    Amount, ConnectionRef, PlayerLot, RoomId, RoomState, Team, TeamName, TeamSummary,
};
use gavel_timer::Deadline;
use serde::{Deserialize, Serialize};

use crate::RoomConfig;
use crate::rules::{self, RosterLimits};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub room_id: RoomId,
    pub config: RoomConfig,
    pub state: RoomState,
    /// Registration order. The first team is the host.
    pub teams: Vec<Team>,
    /// Lots still to go under the hammer in this pass.
    pub lots: Vec<PlayerLot>,
    /// Lots that went unsold, candidates for a second pass.
    pub unsold_lots: Vec<PlayerLot>,
    /// Index into `lots`, set only while bidding.
    pub current_lot_index: Option<usize>,
    pub highest_bid: Amount,
    pub highest_bidder: Option<TeamName>,
    pub last_bidder: Option<TeamName>,
    pub passed_teams: BTreeSet<TeamName>,
    pub timer_deadline: Option<Deadline>,
    /// Store version this copy was loaded at; 0 before the first save.
    #[serde(default)]
    pub version: u64,
}

impl Room {
    /// A new room in the lobby with `host` as its only team.
    pub fn new(
        room_id: RoomId,
        config: RoomConfig,
        host: TeamName,
        connection: Option<ConnectionRef>,
        lots: Vec<PlayerLot>,
    ) -> Self {
        let host = Team::new(host, config.starting_budget, connection);
        Self {
            room_id,
            config,
            state: RoomState::Lobby,
            teams: vec![host],
            lots,
            unsold_lots: Vec::new(),
            current_lot_index: None,
            highest_bid: Amount::ZERO,
            highest_bidder: None,
            last_bidder: None,
            passed_teams: BTreeSet::new(),
            timer_deadline: None,
            version: 0,
        }
    }

    pub fn host(&self) -> Option<&Team> {
        self.teams.first()
    }

    pub fn is_host(&self, name: &TeamName) -> bool {
        self.host().is_some_and(|t| &t.name == name)
    }

    pub fn team(&self, name: &TeamName) -> Option<&Team> {
        self.teams.iter().find(|t| &t.name == name)
    }

    pub fn team_mut(&mut self, name: &TeamName) -> Option<&mut Team> {
        self.teams.iter_mut().find(|t| &t.name == name)
    }

    pub fn is_full(&self) -> bool {
        self.teams.len() >= self.config.teams_expected
    }

    pub fn current_lot(&self) -> Option<&PlayerLot> {
        self.current_lot_index.and_then(|i| self.lots.get(i))
    }

    pub fn limits(&self) -> RosterLimits {
        RosterLimits::new(
            self.config.league,
            self.config.team_capacity,
            self.config.foreign_cap,
        )
    }

    /// Teams that could still win the current lot.
    pub fn active_teams(&self) -> impl Iterator<Item = &Team> {
        let capacity = self.config.team_capacity;
        self.teams.iter().filter(move |t| rules::is_active(t, capacity))
    }

    /// Active teams that have not passed on the current lot.
    pub fn still_interested(&self) -> Vec<&TeamName> {
        self.active_teams()
            .map(|t| &t.name)
            .filter(|name| !self.passed_teams.contains(*name))
            .collect()
    }

    pub fn summaries(&self) -> Vec<TeamSummary> {
        let local = self.config.league.local_nation();
        self.teams
            .iter()
            .map(|t| TeamSummary {
                name: t.name.clone(),
                budget: t.budget,
                roster: t.roster.clone(),
                foreign_count: rules::foreign_count(t, local),
                connected: t.connection.is_some(),
            })
            .collect()
    }

    /// Lots across the pool, the unsold backlog, and every roster.
    ///
    /// Constant for the life of a room.
    pub fn lot_count(&self) -> usize {
        self.lots.len()
            + self.unsold_lots.len()
            + self.teams.iter().map(|t| t.roster.len()).sum::<usize>()
    }

    /// Verifies every structural invariant of a settled (persistable) room.
    pub fn check_invariants(&self) -> Result<(), String> {
        match &self.highest_bidder {
            None if !self.highest_bid.is_zero() => {
                return Err(format!("highest bid {} with no bidder", self.highest_bid));
            }
            Some(bidder) if self.highest_bid.is_zero() => {
                return Err(format!("{bidder} is highest bidder at zero"));
            }
            Some(bidder) if self.team(bidder).is_none() => {
                return Err(format!("highest bidder {bidder} is not in the room"));
            }
            Some(bidder) if self.passed_teams.contains(bidder) => {
                return Err(format!("highest bidder {bidder} has passed"));
            }
            _ => {}
        }

        let mut seen = HashSet::new();
        let limits = self.limits();
        for team in &self.teams {
            if !seen.insert(&team.name) {
                return Err(format!("team {} registered twice", team.name));
            }
            if team.roster.len() > limits.capacity {
                return Err(format!(
                    "team {} has {} players, capacity {}",
                    team.name,
                    team.roster.len(),
                    limits.capacity
                ));
            }
            let foreign = rules::foreign_count(team, limits.local_nation);
            if foreign > limits.foreign_cap {
                return Err(format!(
                    "team {} has {foreign} foreign players, cap {}",
                    team.name, limits.foreign_cap
                ));
            }
        }

        let bidding = self.state == RoomState::Bidding;
        match self.current_lot_index {
            Some(i) if !bidding => {
                return Err(format!("lot index {i} set in state {}", self.state));
            }
            Some(i) if i >= self.lots.len() => {
                return Err(format!("lot index {i} out of {} lots", self.lots.len()));
            }
            None if bidding => return Err("bidding with no current lot".into()),
            _ => {}
        }

        if self.state == RoomState::Settling {
            return Err("room left in transient Settling state".into());
        }
        if self.timer_deadline.is_some() && !bidding {
            return Err(format!("deadline armed in state {}", self.state));
        }
        Ok(())
    }
}
