//! The auction state machine.
//!
//! [`AuctionEngine::apply`] takes a room and one action and either changes
//! the room and returns what to announce, or returns an error and leaves
//! the room as it found it. It does no I/O: the caller arms timers,
//! persists the result and delivers the events.

use gavel_protocol::{
    Amount, ConnectionRef, PlayerLot, Recipient, RoomState, RosterEntry, ServerEvent, Team,
    TeamName, UnsoldReason,
};
use gavel_timer::TimerToken;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::model::Room;
use crate::rules;
use crate::{AuctionError, RuleViolation};

/// Everything that can happen to a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Register a team, or rebind an existing team's connection.
    Join {
        team: TeamName,
        connection: Option<ConnectionRef>,
    },
    Start {
        requester: TeamName,
    },
    Bid {
        team: TeamName,
    },
    Pass {
        team: TeamName,
    },
    DecideUnsold {
        requester: TeamName,
        proceed: bool,
    },
    /// Drop a team's connection. With `Some(connection)`, only if that is
    /// still the connection bound to the team.
    Disconnect {
        team: TeamName,
        connection: Option<ConnectionRef>,
    },
    /// The room's countdown elapsed.
    Timeout {
        token: TimerToken,
    },
}

/// What the caller should do with the room's countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerDirective {
    /// Leave it alone.
    Keep,
    /// Arm a fresh full-length countdown, replacing any current one.
    Arm,
    /// Disarm it.
    Cancel,
}

/// The outcome of one accepted action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub outbound: Vec<(Recipient, ServerEvent)>,
    pub timer: TimerDirective,
}

impl Transition {
    fn keep(outbound: Vec<(Recipient, ServerEvent)>) -> Self {
        Self {
            outbound,
            timer: TimerDirective::Keep,
        }
    }

    /// An accepted action that changes nothing.
    pub fn noop() -> Self {
        Self::keep(Vec::new())
    }
}

/// Applies actions to rooms. Owns the random source for lot draws.
#[derive(Debug, Clone)]
pub struct AuctionEngine {
    rng: StdRng,
}

impl AuctionEngine {
    /// A seeded engine draws the same lots in the same order every run.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { rng }
    }

    /// Applies one action to `room`.
    ///
    /// On `Err` the room is exactly as it was passed in.
    pub fn apply(&mut self, room: &mut Room, action: Action) -> Result<Transition, AuctionError> {
        match action {
            Action::Join { team, connection } => self.join(room, team, connection),
            Action::Start { requester } => self.start(room, &requester),
            Action::Bid { team } => self.bid(room, team),
            Action::Pass { team } => self.pass(room, team),
            Action::DecideUnsold { requester, proceed } => {
                self.decide_unsold(room, &requester, proceed)
            }
            Action::Disconnect { team, connection } => Self::disconnect(room, &team, connection),
            Action::Timeout { token } => self.timeout(room, token),
        }
    }

    // -----------------------------------------------------------------------
    // Lobby
    // -----------------------------------------------------------------------

    fn join(
        &mut self,
        room: &mut Room,
        name: TeamName,
        connection: Option<ConnectionRef>,
    ) -> Result<Transition, AuctionError> {
        if name.is_blank() {
            return Err(AuctionError::Validation("team name is required".into()));
        }

        if let Some(team) = room.team_mut(&name) {
            team.connection = connection;
            info!(room_id = %room.room_id, team = %name, "team reconnected");
            return Ok(Transition::keep(Self::rejoin_events(room, name)));
        }

        if !room.state.is_joinable() {
            return Err(AuctionError::InvalidState(room.state));
        }
        if room.is_full() {
            return Err(AuctionError::precondition(format!(
                "room {} is full",
                room.room_id
            )));
        }

        room.teams.push(Team::new(
            name.clone(),
            room.config.starting_budget,
            connection,
        ));
        info!(
            room_id = %room.room_id,
            team = %name,
            teams = room.teams.len(),
            expected = room.config.teams_expected,
            "team joined"
        );
        Ok(Transition::keep(vec![(Recipient::All, Self::lobby_update(room))]))
    }

    fn rejoin_events(room: &Room, name: TeamName) -> Vec<(Recipient, ServerEvent)> {
        if room.state.is_joinable() {
            return vec![(Recipient::All, Self::lobby_update(room))];
        }
        vec![
            (Recipient::Team(name.clone()), Self::snapshot(room)),
            (
                Recipient::AllExcept(name.clone()),
                ServerEvent::TeamConnection {
                    team: name,
                    connected: true,
                },
            ),
        ]
    }

    fn start(&mut self, room: &mut Room, requester: &TeamName) -> Result<Transition, AuctionError> {
        if room.state != RoomState::Lobby {
            return Err(AuctionError::InvalidState(room.state));
        }
        if !room.is_host(requester) {
            return Err(AuctionError::precondition("only the host can start the auction"));
        }
        if room.teams.len() != room.config.teams_expected {
            return Err(AuctionError::precondition(format!(
                "all teams have not joined yet ({}/{})",
                room.teams.len(),
                room.config.teams_expected
            )));
        }
        if room.lots.is_empty() {
            return Err(AuctionError::precondition("no lots to auction"));
        }

        let mut outbound = vec![(
            Recipient::All,
            ServerEvent::AuctionStarted {
                room_id: room.room_id.clone(),
            },
        )];
        outbound.push(self.open_next_lot(room));
        info!(room_id = %room.room_id, lots = room.lots.len(), "auction started");
        Ok(Transition {
            outbound,
            timer: TimerDirective::Arm,
        })
    }

    // -----------------------------------------------------------------------
    // Bidding
    // -----------------------------------------------------------------------

    fn bidding_lot(room: &Room) -> Result<&PlayerLot, AuctionError> {
        if room.state != RoomState::Bidding {
            return Err(AuctionError::InvalidState(room.state));
        }
        room.current_lot()
            .ok_or_else(|| AuctionError::InvalidState(room.state))
    }

    fn bid(&mut self, room: &mut Room, name: TeamName) -> Result<Transition, AuctionError> {
        let lot = Self::bidding_lot(room)?;
        let team = room
            .team(&name)
            .ok_or_else(|| AuctionError::precondition(format!("{name} is not in this room")))?;

        if room.highest_bidder.as_ref() == Some(&name) {
            return Err(RuleViolation::AlreadyHighestBidder.into());
        }
        let amount = rules::next_bid_amount(room.highest_bid, lot.base_price);
        if amount.is_zero() {
            return Err(AuctionError::precondition(format!("{} has no base price", lot.name)));
        }
        rules::can_accept_bid(team, lot, amount, &room.limits())?;

        room.highest_bid = amount;
        room.highest_bidder = Some(name.clone());
        room.last_bidder = Some(name.clone());
        room.passed_teams.remove(&name);
        debug!(room_id = %room.room_id, team = %name, %amount, "bid accepted");

        let outbound = vec![(
            Recipient::All,
            ServerEvent::BidUpdate {
                highest_bid: amount,
                highest_bidder: name.clone(),
                last_bidder: name.clone(),
            },
        )];

        // Nobody left who could outbid.
        if room.still_interested() == [&name] {
            return Ok(self.settle(room, outbound));
        }
        Ok(Transition {
            outbound,
            timer: TimerDirective::Arm,
        })
    }

    fn pass(&mut self, room: &mut Room, name: TeamName) -> Result<Transition, AuctionError> {
        Self::bidding_lot(room)?;
        let team = room
            .team(&name)
            .ok_or_else(|| AuctionError::precondition(format!("{name} is not in this room")))?;

        if !rules::is_active(team, room.config.team_capacity) {
            debug!(room_id = %room.room_id, team = %name, "pass from inactive team ignored");
            return Ok(Transition::noop());
        }
        if room.highest_bidder.as_ref() == Some(&name) {
            return Err(RuleViolation::CannotPassOwnBid.into());
        }
        if !room.passed_teams.insert(name.clone()) {
            return Err(RuleViolation::AlreadyPassed.into());
        }
        debug!(room_id = %room.room_id, team = %name, "team passed");

        let outbound = vec![(
            Recipient::All,
            ServerEvent::PassUpdate {
                team: name.clone(),
                passed_teams: room.passed_teams.iter().cloned().collect(),
            },
        )];

        let interested = room.still_interested();
        let all_passed = interested.is_empty();
        let only_passer_active = {
            let mut active = room.active_teams();
            matches!((active.next(), active.next()), (Some(t), None) if t.name == name)
        };
        let only_leader_left = match (interested.as_slice(), &room.highest_bidder) {
            ([last], Some(leader)) => *last == leader,
            _ => false,
        };

        if all_passed || only_passer_active || only_leader_left {
            return Ok(self.settle(room, outbound));
        }
        Ok(Transition::keep(outbound))
    }

    fn timeout(&mut self, room: &mut Room, token: TimerToken) -> Result<Transition, AuctionError> {
        let current = room.timer_deadline.map(|d| d.token);
        if room.state != RoomState::Bidding || current != Some(token) {
            return Err(AuctionError::StaleTimer(token));
        }
        debug!(room_id = %room.room_id, %token, "countdown elapsed");
        Ok(self.settle(room, Vec::new()))
    }

    // -----------------------------------------------------------------------
    // Settlement
    // -----------------------------------------------------------------------

    /// Resolves the current lot and moves the room on.
    ///
    /// Runs to completion inside one `apply`, so `Settling` is never
    /// visible outside it.
    fn settle(&mut self, room: &mut Room, mut outbound: Vec<(Recipient, ServerEvent)>) -> Transition {
        room.state = RoomState::Settling;
        let Some(index) = room.current_lot_index.take() else {
            // Unreachable from Bidding; treat as an empty pool.
            return self.advance(room, outbound);
        };
        let mut lot = room.lots.remove(index);
        let limits = room.limits();
        let price = room.highest_bid;

        let verdict = match room.highest_bidder.take() {
            None => Err(UnsoldReason::NoBids),
            Some(winner) => match room.team_mut(&winner) {
                None => Err(UnsoldReason::WinnerMissing { team: winner }),
                Some(team) => match rules::can_accept_bid(team, &lot, price, &limits) {
                    Err(violation) => Err(unsold_reason(winner, violation)),
                    Ok(()) => {
                        team.budget = team.budget.saturating_sub(price);
                        lot.sold = true;
                        lot.sold_to = Some(winner.clone());
                        lot.sold_price = price;
                        team.roster.push(RosterEntry {
                            lot: lot.clone(),
                            price_paid: price,
                        });
                        Ok((winner, team.budget))
                    }
                },
            },
        };

        match verdict {
            Ok((team, remaining_budget)) => {
                info!(room_id = %room.room_id, lot = %lot.name, %team, %price, "lot sold");
                outbound.push((
                    Recipient::All,
                    ServerEvent::LotSold {
                        lot,
                        team,
                        price,
                        remaining_budget,
                    },
                ));
            }
            Err(reason) => {
                info!(room_id = %room.room_id, lot = %lot.name, %reason, "lot unsold");
                lot.reset_sale();
                room.unsold_lots.push(lot.clone());
                outbound.push((Recipient::All, ServerEvent::LotUnsold { lot, reason }));
            }
        }

        room.highest_bid = Amount::ZERO;
        room.last_bidder = None;
        room.passed_teams.clear();
        self.advance(room, outbound)
    }

    /// Picks what comes after a settled lot.
    fn advance(&mut self, room: &mut Room, mut outbound: Vec<(Recipient, ServerEvent)>) -> Transition {
        if !room.lots.is_empty() {
            outbound.push(self.open_next_lot(room));
            return Transition {
                outbound,
                timer: TimerDirective::Arm,
            };
        }

        room.timer_deadline = None;
        if !room.unsold_lots.is_empty() {
            room.state = RoomState::AwaitingUnsoldDecision;
            info!(
                room_id = %room.room_id,
                unsold = room.unsold_lots.len(),
                "pool exhausted, waiting for host"
            );
            if let Some(host) = room.host() {
                outbound.push((
                    Recipient::Team(host.name.clone()),
                    ServerEvent::UnsoldDecisionRequired {
                        remaining: room.unsold_lots.len(),
                    },
                ));
            }
        } else {
            outbound.push(Self::finish(room));
        }
        Transition {
            outbound,
            timer: TimerDirective::Cancel,
        }
    }

    /// Draws the next lot uniformly from the pool and opens bidding on it.
    fn open_next_lot(&mut self, room: &mut Room) -> (Recipient, ServerEvent) {
        let index = self.rng.random_range(0..room.lots.len());
        room.current_lot_index = Some(index);
        room.state = RoomState::Bidding;
        let lot = room.lots[index].clone();
        debug!(room_id = %room.room_id, lot = %lot.name, "lot opened");
        (
            Recipient::All,
            ServerEvent::CurrentLot {
                lot,
                lots_remaining: room.lots.len(),
            },
        )
    }

    fn finish(room: &mut Room) -> (Recipient, ServerEvent) {
        room.state = RoomState::Finished;
        info!(room_id = %room.room_id, "auction finished");
        (
            Recipient::All,
            ServerEvent::AuctionFinished {
                teams: room.summaries(),
            },
        )
    }

    // -----------------------------------------------------------------------
    // Unsold backlog / connections
    // -----------------------------------------------------------------------

    fn decide_unsold(
        &mut self,
        room: &mut Room,
        requester: &TeamName,
        proceed: bool,
    ) -> Result<Transition, AuctionError> {
        if room.state != RoomState::AwaitingUnsoldDecision {
            return Err(AuctionError::InvalidState(room.state));
        }
        if !room.is_host(requester) {
            return Err(AuctionError::precondition("only the host can decide on unsold lots"));
        }

        if !proceed {
            return Ok(Transition {
                outbound: vec![Self::finish(room)],
                timer: TimerDirective::Cancel,
            });
        }

        room.lots = std::mem::take(&mut room.unsold_lots);
        for lot in &mut room.lots {
            lot.reset_sale();
        }
        info!(room_id = %room.room_id, lots = room.lots.len(), "re-auctioning unsold lots");
        Ok(Transition {
            outbound: vec![self.open_next_lot(room)],
            timer: TimerDirective::Arm,
        })
    }

    fn disconnect(
        room: &mut Room,
        name: &TeamName,
        connection: Option<ConnectionRef>,
    ) -> Result<Transition, AuctionError> {
        let room_id = room.room_id.clone();
        let team = room
            .team_mut(name)
            .ok_or_else(|| AuctionError::precondition(format!("{name} is not in this room")))?;

        let stale = connection.is_some() && team.connection != connection;
        if stale || team.connection.is_none() {
            debug!(%room_id, team = %name, "disconnect for unbound connection ignored");
            return Ok(Transition::noop());
        }
        team.connection = None;
        info!(%room_id, team = %name, "team disconnected");

        let mut outbound = vec![(
            Recipient::AllExcept(name.clone()),
            ServerEvent::TeamConnection {
                team: name.clone(),
                connected: false,
            },
        )];
        if room.state.is_joinable() {
            outbound.push((Recipient::All, Self::lobby_update(room)));
        }
        Ok(Transition::keep(outbound))
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    fn lobby_update(room: &Room) -> ServerEvent {
        ServerEvent::LobbyUpdate {
            room_id: room.room_id.clone(),
            teams: room.summaries(),
            teams_expected: room.config.teams_expected,
        }
    }

    /// Everything a reconnecting client needs to redraw the auction.
    pub fn snapshot(room: &Room) -> ServerEvent {
        ServerEvent::AuctionSnapshot {
            room_id: room.room_id.clone(),
            state: room.state,
            current_lot: room.current_lot().cloned(),
            highest_bid: room.highest_bid,
            highest_bidder: room.highest_bidder.clone(),
            last_bidder: room.last_bidder.clone(),
            passed_teams: room.passed_teams.iter().cloned().collect(),
            teams: room.summaries(),
            unsold_count: room.unsold_lots.len(),
            deadline_ms: room.timer_deadline.map(|d| d.expires_at_ms),
        }
    }
}

fn unsold_reason(team: TeamName, violation: RuleViolation) -> UnsoldReason {
    match violation {
        RuleViolation::RosterFull { capacity } => UnsoldReason::RosterFull { team, capacity },
        RuleViolation::ForeignCapReached { cap } => UnsoldReason::ForeignCap { team, cap },
        RuleViolation::InsufficientBudget { .. } => UnsoldReason::InsufficientBudget { team },
        other @ (RuleViolation::AlreadyHighestBidder
        | RuleViolation::CannotPassOwnBid
        | RuleViolation::AlreadyPassed) => UnsoldReason::Ineligible {
            team,
            detail: other.to_string(),
        },
    }
}

// =========================================================================
// Tests
// =========================================================================
