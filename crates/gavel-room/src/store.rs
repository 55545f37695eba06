//! Durable storage for room aggregates.
//!
//! The engine reads and writes whole rooms. Saves are versioned: a save
//! succeeds only if the stored copy is still at the version the room was
//! loaded at, so a writer working from a stale copy gets
//! [`StoreError::Conflict`] instead of clobbering newer state.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use gavel_protocol::RoomId;

use crate::StoreError;
use crate::model::Room;

/// Whole-aggregate room persistence.
///
/// Implementations share state across clones. Every method returns a
/// `Send` future so room actors can run on any runtime worker.
pub trait RoomStore: Clone + Send + Sync + 'static {
    /// Loads a room, or [`StoreError::NotFound`].
    fn load(&self, room_id: &RoomId) -> impl Future<Output = Result<Room, StoreError>> + Send;

    /// Writes a room and returns its new version.
    ///
    /// A room at version 0 is created (and must not already exist).
    /// Otherwise `room.version` must match the stored version.
    fn save(&self, room: &Room) -> impl Future<Output = Result<u64, StoreError>> + Send;

    fn exists(&self, room_id: &RoomId) -> impl Future<Output = Result<bool, StoreError>> + Send;
}

/// In-process [`RoomStore`] for tests and single-node deployments.
#[derive(Debug, Clone, Default)]
pub struct MemoryRoomStore {
    rooms: Arc<Mutex<HashMap<RoomId, Room>>>,
}

impl MemoryRoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rooms.
    pub fn len(&self) -> usize {
        self.rooms.lock().map(|r| r.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_rooms<T>(
        &self,
        f: impl FnOnce(&mut HashMap<RoomId, Room>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut rooms = self
            .rooms
            .lock()
            .map_err(|_| StoreError::Unavailable("room map lock poisoned".into()))?;
        f(&mut rooms)
    }

    fn save_now(&self, room: &Room) -> Result<u64, StoreError> {
        self.with_rooms(|rooms| {
            let stored = rooms.get(&room.room_id).map(|r| r.version);
            match stored {
                None if room.version != 0 => Err(StoreError::NotFound(room.room_id.clone())),
                Some(_) if room.version == 0 => {
                    Err(StoreError::AlreadyExists(room.room_id.clone()))
                }
                Some(stored) if stored != room.version => Err(StoreError::Conflict {
                    room_id: room.room_id.clone(),
                    stored,
                    saving: room.version,
                }),
                _ => {
                    let mut copy = room.clone();
                    copy.version = room.version + 1;
                    let version = copy.version;
                    rooms.insert(room.room_id.clone(), copy);
                    Ok(version)
                }
            }
        })
    }
}

impl RoomStore for MemoryRoomStore {
    async fn load(&self, room_id: &RoomId) -> Result<Room, StoreError> {
        self.with_rooms(|rooms| {
            rooms
                .get(room_id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(room_id.clone()))
        })
    }

    async fn save(&self, room: &Room) -> Result<u64, StoreError> {
        self.save_now(room)
    }

    async fn exists(&self, room_id: &RoomId) -> Result<bool, StoreError> {
        self.with_rooms(|rooms| Ok(rooms.contains_key(room_id)))
    }
}
