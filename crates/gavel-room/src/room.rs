//! Room actor: one Tokio task per room that owns the room's state.
//!
//! Every operation on a room, including its own timer expiries, goes
//! through the actor's queue and runs to completion before the next one
//! starts. An operation is finished only once its result is persisted.

use std::sync::Arc;

use gavel_protocol::{Recipient, RoomId, RoomState, ServerEvent};
use gavel_timer::{DeadlineStore, TimerExpired, TimerService};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::engine::{Action, AuctionEngine, TimerDirective};
use crate::model::Room;
use crate::{AuctionError, AuctionSettings, Broadcaster, RoomStore};

/// Collaborators shared by every room actor in a process.
pub(crate) struct Services<S, B, D: DeadlineStore> {
    pub store: S,
    pub broadcaster: B,
    pub timers: TimerService<D>,
    pub settings: AuctionSettings,
}

#[derive(Debug)]
pub(crate) enum RoomCommand {
    Apply {
        action: Action,
        reply: oneshot::Sender<Result<(), AuctionError>>,
    },
    Snapshot {
        reply: oneshot::Sender<Room>,
    },
    Info {
        reply: oneshot::Sender<RoomInfo>,
    },
    Shutdown,
}

/// Room metadata, without rosters or lots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub room_id: RoomId,
    pub state: RoomState,
    pub team_count: usize,
    pub teams_expected: usize,
    pub lots_remaining: usize,
    pub unsold_count: usize,
    pub version: u64,
}

impl RoomInfo {
    fn of(room: &Room) -> Self {
        Self {
            room_id: room.room_id.clone(),
            state: room.state,
            team_count: room.teams.len(),
            teams_expected: room.config.teams_expected,
            lots_remaining: room.lots.len(),
            unsold_count: room.unsold_lots.len(),
            version: room.version,
        }
    }
}

/// Handle to a running room actor. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    room_id: RoomId,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Returns `true` once the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    fn unavailable(&self) -> AuctionError {
        AuctionError::Unavailable(self.room_id.clone())
    }

    /// Queues an action and waits for its persisted outcome.
    pub async fn apply(&self, action: Action) -> Result<(), AuctionError> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::Apply { action, reply })
            .await
            .map_err(|_| self.unavailable())?;
        rx.await.map_err(|_| self.unavailable())?
    }

    /// A copy of the room as of the last completed operation.
    pub async fn snapshot(&self) -> Result<Room, AuctionError> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::Snapshot { reply })
            .await
            .map_err(|_| self.unavailable())?;
        rx.await.map_err(|_| self.unavailable())
    }

    pub async fn info(&self) -> Result<RoomInfo, AuctionError> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::Info { reply })
            .await
            .map_err(|_| self.unavailable())?;
        rx.await.map_err(|_| self.unavailable())
    }

    pub async fn shutdown(&self) -> Result<(), AuctionError> {
        self.sender
            .send(RoomCommand::Shutdown)
            .await
            .map_err(|_| self.unavailable())
    }
}

struct RoomActor<S, B, D: DeadlineStore> {
    room: Room,
    engine: AuctionEngine,
    services: Arc<Services<S, B, D>>,
    receiver: mpsc::Receiver<RoomCommand>,
    expiries: mpsc::Receiver<TimerExpired>,
}

impl<S, B, D> RoomActor<S, B, D>
where
    S: RoomStore,
    B: Broadcaster,
    D: DeadlineStore,
{
    async fn run(mut self) {
        info!(room_id = %self.room.room_id, state = %self.room.state, "room actor started");

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => {
                    let Some(cmd) = cmd else { break };
                    match cmd {
                        RoomCommand::Apply { action, reply } => {
                            let result = self.execute(action).await;
                            let _ = reply.send(result);
                        }
                        RoomCommand::Snapshot { reply } => {
                            let _ = reply.send(self.room.clone());
                        }
                        RoomCommand::Info { reply } => {
                            let _ = reply.send(RoomInfo::of(&self.room));
                        }
                        RoomCommand::Shutdown => {
                            info!(room_id = %self.room.room_id, "room shutting down");
                            break;
                        }
                    }
                }
                Some(expired) = self.expiries.recv() => {
                    match self.execute(Action::Timeout { token: expired.token }).await {
                        Ok(()) => {}
                        Err(AuctionError::StaleTimer(token)) => {
                            debug!(room_id = %self.room.room_id, %token, "stale expiry dropped");
                        }
                        Err(err) => {
                            warn!(room_id = %self.room.room_id, error = %err, "expiry not applied");
                        }
                    }
                }
            }
        }

        self.services.timers.release(&self.room.room_id).await;
        info!(room_id = %self.room.room_id, "room actor stopped");
    }

    /// Runs one action: engine, timer, store, then broadcast.
    ///
    /// Nothing is broadcast and `self.room` is not replaced unless the
    /// store accepted the new state.
    async fn execute(&mut self, action: Action) -> Result<(), AuctionError> {
        let mut next = self.room.clone();
        let transition = self.engine.apply(&mut next, action)?;
        let mut outbound = transition.outbound;

        if next == self.room && transition.timer == TimerDirective::Keep {
            self.dispatch(outbound);
            return Ok(());
        }

        if let Err(err) = self
            .apply_timer(&mut next, transition.timer, &mut outbound)
            .await
        {
            warn!(room_id = %self.room.room_id, error = %err, "timer update failed, action aborted");
            self.announce_failure(&err);
            return Err(err);
        }

        match self.services.store.save(&next).await {
            Ok(version) => {
                next.version = version;
                self.room = next;
                debug_assert!(
                    self.room.check_invariants().is_ok(),
                    "invariant broken: {:?}",
                    self.room.check_invariants()
                );
                self.dispatch(outbound);
                Ok(())
            }
            Err(err) => {
                warn!(room_id = %self.room.room_id, error = %err, "save failed, rolling back");
                let err = AuctionError::from(err);
                self.roll_back(transition.timer).await;
                self.announce_failure(&err);
                Err(err)
            }
        }
    }

    async fn apply_timer(
        &self,
        next: &mut Room,
        directive: TimerDirective,
        outbound: &mut Vec<(Recipient, ServerEvent)>,
    ) -> Result<(), AuctionError> {
        let timers = &self.services.timers;
        match directive {
            TimerDirective::Keep => {}
            TimerDirective::Arm => {
                let window = self.services.settings.bid_window;
                let deadline = timers.arm(&next.room_id, window).await?;
                next.timer_deadline = Some(deadline);
                outbound.push((
                    Recipient::All,
                    ServerEvent::CountdownStarted {
                        deadline_ms: deadline.expires_at_ms,
                        window_ms: window.as_millis() as u64,
                    },
                ));
            }
            TimerDirective::Cancel => {
                timers.cancel(&next.room_id).await?;
                next.timer_deadline = None;
            }
        }
        Ok(())
    }

    /// Restores the last durable room and the countdown that goes with it.
    async fn roll_back(&mut self, directive: TimerDirective) {
        let room_id = self.room.room_id.clone();
        let mut reloaded = false;
        match self.services.store.load(&room_id).await {
            Ok(durable) if durable != self.room => {
                info!(%room_id, version = durable.version, "reloaded newer durable copy");
                self.room = durable;
                reloaded = true;
            }
            Ok(_) => {}
            Err(err) => warn!(%room_id, error = %err, "reload after failed save also failed"),
        }

        if directive == TimerDirective::Keep && !reloaded {
            return;
        }
        let timers = &self.services.timers;
        let restored = match self.room.timer_deadline {
            Some(deadline) => timers.resume(&room_id, deadline).await,
            None => timers.cancel(&room_id).await,
        };
        if let Err(err) = restored {
            warn!(%room_id, error = %err, "could not restore countdown");
        }
    }

    fn announce_failure(&self, err: &AuctionError) {
        self.services.broadcaster.publish(
            &self.room.room_id,
            &ServerEvent::TransientFailure {
                room_id: self.room.room_id.clone(),
                message: err.to_string(),
            },
        );
    }

    fn dispatch(&self, outbound: Vec<(Recipient, ServerEvent)>) {
        let room_id = &self.room.room_id;
        let broadcaster = &self.services.broadcaster;
        for (recipient, event) in outbound {
            match recipient {
                Recipient::All => broadcaster.publish(room_id, &event),
                Recipient::Team(team) => broadcaster.publish_to(room_id, &team, &event),
                Recipient::AllExcept(excluded) => {
                    for team in self.room.teams.iter().filter(|t| t.name != excluded) {
                        broadcaster.publish_to(room_id, &team.name, &event);
                    }
                }
            }
        }
    }
}

/// Spawns an actor for `room` and resumes its countdown, if it had one.
pub(crate) async fn spawn_room<S, B, D>(
    room: Room,
    services: Arc<Services<S, B, D>>,
) -> Result<RoomHandle, AuctionError>
where
    S: RoomStore,
    B: Broadcaster,
    D: DeadlineStore,
{
    let room_id = room.room_id.clone();
    let expiries = services.timers.subscribe(room_id.clone()).await;
    if let Some(deadline) = room.timer_deadline {
        if let Err(err) = services.timers.resume(&room_id, deadline).await {
            services.timers.release(&room_id).await;
            return Err(err.into());
        }
    }

    let (tx, rx) = mpsc::channel(services.settings.channel_size);
    let actor = RoomActor {
        engine: AuctionEngine::new(services.settings.rng_seed),
        room,
        services,
        receiver: rx,
        expiries,
    };
    tokio::spawn(actor.run());

    Ok(RoomHandle { room_id, sender: tx })
}
