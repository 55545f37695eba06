//! Room manager: creates rooms, finds their actors, and routes actions.
//!
//! This is the inbound action surface. Callers name a room and a team;
//! the manager finds (or revives from the store) the room's actor and
//! queues the action there.

use std::collections::HashMap;
use std::sync::Arc;

use gavel_protocol::{ConnectionRef, PlayerLot, RoomId, RoomState, TeamName};
use gavel_timer::{DeadlineStore, MemoryDeadlineStore, TimerService};
use rand::Rng;
use rand::distr::Alphanumeric;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::engine::Action;
use crate::model::Room;
use crate::room::{RoomHandle, RoomInfo, Services, spawn_room};
use crate::{
    AuctionError, AuctionSettings, Broadcaster, ChannelBroadcaster, MemoryRoomStore, RoomConfig,
    RoomStore, StoreError,
};

/// Length of generated room ids.
pub const ROOM_ID_LEN: usize = 6;

const MAX_ID_ATTEMPTS: usize = 32;

/// Owns every live room actor in the process.
pub struct RoomManager<S = MemoryRoomStore, B = ChannelBroadcaster, D = MemoryDeadlineStore>
where
    S: RoomStore,
    B: Broadcaster,
    D: DeadlineStore,
{
    services: Arc<Services<S, B, D>>,
    rooms: Mutex<HashMap<RoomId, RoomHandle>>,
    /// Per-room gates so one room is revived at most once at a time.
    reviving: Mutex<HashMap<RoomId, Arc<Mutex<()>>>>,
}

impl<S, B, D> RoomManager<S, B, D>
where
    S: RoomStore,
    B: Broadcaster,
    D: DeadlineStore,
{
    pub fn new(store: S, broadcaster: B, timers: TimerService<D>, settings: AuctionSettings) -> Self {
        Self {
            services: Arc::new(Services {
                store,
                broadcaster,
                timers,
                settings,
            }),
            rooms: Mutex::new(HashMap::new()),
            reviving: Mutex::new(HashMap::new()),
        }
    }

    pub fn broadcaster(&self) -> &B {
        &self.services.broadcaster
    }

    pub fn settings(&self) -> &AuctionSettings {
        &self.services.settings
    }

    /// Creates a room in the lobby with `host` as its first team.
    pub async fn create_room(
        &self,
        config: RoomConfig,
        host: TeamName,
        connection: Option<ConnectionRef>,
        lots: Vec<PlayerLot>,
    ) -> Result<RoomId, AuctionError> {
        config.validate()?;
        if host.is_blank() {
            return Err(AuctionError::Validation("team name is required".into()));
        }
        if let Some(free) = lots.iter().find(|lot| lot.base_price.is_zero()) {
            return Err(AuctionError::Validation(format!(
                "{} has no base price",
                free.name
            )));
        }

        let room_id = self.fresh_room_id().await?;
        let mut room = Room::new(room_id.clone(), config, host.clone(), connection, lots);
        room.version = self.services.store.save(&room).await?;

        let handle = spawn_room(room, Arc::clone(&self.services)).await?;
        self.rooms.lock().await.insert(room_id.clone(), handle);
        info!(%room_id, %host, "room created");
        Ok(room_id)
    }

    async fn fresh_room_id(&self) -> Result<RoomId, AuctionError> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let candidate: String = rand::rng()
                .sample_iter(&Alphanumeric)
                .take(ROOM_ID_LEN)
                .map(char::from)
                .collect();
            let candidate = RoomId(candidate);
            if !self.services.store.exists(&candidate).await? {
                return Ok(candidate);
            }
        }
        Err(StoreError::Unavailable("could not allocate a free room id".into()).into())
    }

    /// The live actor for `room_id`, reviving it from the store if needed.
    ///
    /// The store is read with only this room's revival gate held, so a
    /// slow or missing room never stalls lookups of other rooms.
    async fn handle(&self, room_id: &RoomId) -> Result<RoomHandle, AuctionError> {
        if let Some(handle) = self.live_handle(room_id).await {
            return Ok(handle);
        }

        let gate = Arc::clone(self.reviving.lock().await.entry(room_id.clone()).or_default());
        let revived = {
            let _revival = gate.lock().await;
            self.revive(room_id).await
        };

        let mut gates = self.reviving.lock().await;
        // Two references: the map's and ours. More means someone is waiting.
        if Arc::strong_count(&gate) <= 2 {
            gates.remove(room_id);
        }
        revived
    }

    async fn live_handle(&self, room_id: &RoomId) -> Option<RoomHandle> {
        self.rooms
            .lock()
            .await
            .get(room_id)
            .filter(|h| !h.is_closed())
            .cloned()
    }

    /// Loads and spawns the room. Callers hold the room's revival gate.
    async fn revive(&self, room_id: &RoomId) -> Result<RoomHandle, AuctionError> {
        if let Some(handle) = self.live_handle(room_id).await {
            return Ok(handle);
        }

        let room = match self.services.store.load(room_id).await {
            Ok(room) => room,
            Err(StoreError::NotFound(_)) => return Err(AuctionError::NotFound(room_id.clone())),
            Err(err) => return Err(err.into()),
        };
        let handle = spawn_room(room, Arc::clone(&self.services)).await?;
        self.rooms
            .lock()
            .await
            .insert(room_id.clone(), handle.clone());
        info!(%room_id, "room actor revived from store");
        Ok(handle)
    }

    async fn dispatch(&self, room_id: &RoomId, action: Action) -> Result<(), AuctionError> {
        self.handle(room_id).await?.apply(action).await
    }

    /// Registers a team, or rebinds an already registered team's connection.
    pub async fn join_room(
        &self,
        room_id: &RoomId,
        team: TeamName,
        connection: Option<ConnectionRef>,
    ) -> Result<(), AuctionError> {
        self.dispatch(room_id, Action::Join { team, connection }).await
    }

    pub async fn start_auction(&self, room_id: &RoomId, requester: TeamName) -> Result<(), AuctionError> {
        self.dispatch(room_id, Action::Start { requester }).await
    }

    pub async fn place_bid(&self, room_id: &RoomId, team: TeamName) -> Result<(), AuctionError> {
        self.dispatch(room_id, Action::Bid { team }).await
    }

    pub async fn pass_on_lot(&self, room_id: &RoomId, team: TeamName) -> Result<(), AuctionError> {
        self.dispatch(room_id, Action::Pass { team }).await
    }

    pub async fn decide_unsold(
        &self,
        room_id: &RoomId,
        requester: TeamName,
        proceed: bool,
    ) -> Result<(), AuctionError> {
        self.dispatch(room_id, Action::DecideUnsold { requester, proceed })
            .await
    }

    /// Marks a team disconnected. With `Some(connection)`, only if that
    /// connection is still the one bound to the team.
    pub async fn disconnect(
        &self,
        room_id: &RoomId,
        team: TeamName,
        connection: Option<ConnectionRef>,
    ) -> Result<(), AuctionError> {
        self.dispatch(room_id, Action::Disconnect { team, connection })
            .await
    }

    /// The room as of its last completed operation.
    pub async fn room_snapshot(&self, room_id: &RoomId) -> Result<Room, AuctionError> {
        self.handle(room_id).await?.snapshot().await
    }

    pub async fn room_info(&self, room_id: &RoomId) -> Result<RoomInfo, AuctionError> {
        self.handle(room_id).await?.info().await
    }

    /// Stops a finished room's actor and drops its subscribers. The stored
    /// room is left for archival.
    pub async fn destroy_room(&self, room_id: &RoomId) -> Result<(), AuctionError> {
        let handle = self.handle(room_id).await?;
        let info = handle.info().await?;
        if info.state != RoomState::Finished {
            return Err(AuctionError::InvalidState(info.state));
        }
        self.rooms.lock().await.remove(room_id);
        handle.shutdown().await?;
        self.services.broadcaster.close_room(room_id);
        info!(%room_id, "room destroyed");
        Ok(())
    }

    /// Revives every room with a recorded deadline. Returns how many.
    ///
    /// Run once at startup so countdowns that were pending when the
    /// process stopped still fire.
    pub async fn recover(&self) -> Result<usize, AuctionError> {
        let live = self.services.timers.live_deadlines().await?;
        let mut revived = 0;
        for (room_id, deadline) in live {
            match self.handle(&room_id).await {
                Ok(_) => revived += 1,
                Err(err) => {
                    warn!(%room_id, token = %deadline.token, error = %err, "could not recover room");
                }
            }
        }
        info!(revived, "recovery complete");
        Ok(revived)
    }

    /// Number of live room actors.
    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.len()
    }

    pub async fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.lock().await.keys().cloned().collect()
    }
}
