//! Per-room countdown deadlines for Gavel.
//!
//! Each room has at most one armed deadline. Arming again replaces the
//! previous one; expiry is delivered to the room's subscriber as a
//! [`TimerExpired`] carrying the [`TimerToken`] it was armed with, so the
//! room can drop anything from a superseded deadline.
//!
//! Deadlines are written through a [`DeadlineStore`] before they are
//! scheduled. After a restart, [`TimerService::live_deadlines`] lists
//! what was pending and [`TimerService::resume`] picks it back up with
//! the original token.
//!
//! # Integration
//!
//! The expiry receiver is meant to sit inside a room actor's
//! `tokio::select!` loop:
//!
//! ```ignore
//! let mut expiries = timers.subscribe(room_id.clone()).await;
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         Some(expired) = expiries.recv() => { /* settle if token matches */ }
//!     }
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use gavel_protocol::RoomId;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Tokens and deadlines
// ---------------------------------------------------------------------------

/// Identifies one arming of a room's countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimerToken(pub u64);

impl TimerToken {
    /// A fresh random token.
    pub fn random() -> Self {
        Self(rand::rng().random())
    }
}

impl fmt::Display for TimerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// An armed countdown: when it expires, and which arming it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deadline {
    pub token: TimerToken,
    /// Milliseconds since the Unix epoch.
    pub expires_at_ms: u64,
}

impl Deadline {
    /// Time left until expiry, zero once elapsed.
    pub fn remaining(&self, now_ms: u64) -> Duration {
        Duration::from_millis(self.expires_at_ms.saturating_sub(now_ms))
    }

    pub fn is_elapsed(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms
    }
}

/// Delivered to a room's subscriber when an armed deadline elapses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerExpired {
    pub room_id: RoomId,
    pub token: TimerToken,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from the timer service.
#[derive(Debug, thiserror::Error)]
pub enum TimerError {
    /// The deadline store could not be read or written.
    #[error("deadline store unavailable: {0}")]
    Store(String),

    /// Arming requires a subscriber to deliver the expiry to.
    #[error("no expiry subscriber for room {0}")]
    NotSubscribed(RoomId),
}

// ---------------------------------------------------------------------------
// Deadline store
// ---------------------------------------------------------------------------

/// Durable record of armed deadlines, keyed by room.
///
/// Cheap to clone; clones share the same records. Every method returns a
/// `Send` future so a networked backend can do its I/O without holding up
/// the runtime. A backend with native expiry (a key-value store with TTLs,
/// say) should keep each record for at least its remaining time plus the
/// service's redelivery delay, so a deadline that lapses while the process
/// is down is still found on restart.
pub trait DeadlineStore: Clone + Send + Sync + 'static {
    /// Writes or replaces the room's deadline.
    fn put(
        &self,
        room_id: &RoomId,
        deadline: &Deadline,
    ) -> impl Future<Output = Result<(), TimerError>> + Send;

    /// The room's deadline, if one is recorded.
    fn get(
        &self,
        room_id: &RoomId,
    ) -> impl Future<Output = Result<Option<Deadline>, TimerError>> + Send;

    /// Removes the room's deadline. Removing nothing is not an error.
    fn remove(&self, room_id: &RoomId) -> impl Future<Output = Result<(), TimerError>> + Send;

    /// Every recorded deadline.
    fn live(&self) -> impl Future<Output = Result<Vec<(RoomId, Deadline)>, TimerError>> + Send;
}

/// In-process [`DeadlineStore`].
///
/// Records live as long as the store (or any clone) does. Good for tests
/// and single-process deployments where "restart" means re-creating the
/// service around the same store.
#[derive(Debug, Clone, Default)]
pub struct MemoryDeadlineStore {
    records: Arc<Mutex<HashMap<RoomId, Deadline>>>,
}

impl MemoryDeadlineStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_records<T>(
        &self,
        f: impl FnOnce(&mut HashMap<RoomId, Deadline>) -> T,
    ) -> Result<T, TimerError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| TimerError::Store("deadline records lock poisoned".into()))?;
        Ok(f(&mut records))
    }
}

impl DeadlineStore for MemoryDeadlineStore {
    async fn put(&self, room_id: &RoomId, deadline: &Deadline) -> Result<(), TimerError> {
        self.with_records(|r| {
            r.insert(room_id.clone(), *deadline);
        })
    }

    async fn get(&self, room_id: &RoomId) -> Result<Option<Deadline>, TimerError> {
        self.with_records(|r| r.get(room_id).copied())
    }

    async fn remove(&self, room_id: &RoomId) -> Result<(), TimerError> {
        self.with_records(|r| {
            r.remove(room_id);
        })
    }

    async fn live(&self) -> Result<Vec<(RoomId, Deadline)>, TimerError> {
        self.with_records(|r| r.iter().map(|(id, d)| (id.clone(), *d)).collect())
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TimerConfig {
    /// How long to wait before delivering a deadline that had already
    /// lapsed when it was resumed (typically: it expired during a
    /// restart).
    pub redelivery_delay: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            redelivery_delay: Duration::from_secs(1),
        }
    }
}

impl TimerConfig {
    /// Longest allowed redelivery delay.
    pub const MAX_REDELIVERY_DELAY: Duration = Duration::from_secs(60);

    /// Clamps out-of-range values. Called by [`TimerService::new`].
    pub fn validated(mut self) -> Self {
        if self.redelivery_delay > Self::MAX_REDELIVERY_DELAY {
            warn!(
                delay_ms = self.redelivery_delay.as_millis() as u64,
                max_ms = Self::MAX_REDELIVERY_DELAY.as_millis() as u64,
                "redelivery_delay exceeds maximum, clamping"
            );
            self.redelivery_delay = Self::MAX_REDELIVERY_DELAY;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Epoch milliseconds that advance with Tokio's clock.
///
/// Anchored to the system clock once, then driven by `tokio::time`, so
/// paused-time tests see deadlines move exactly as the scheduler does.
#[derive(Debug, Clone, Copy)]
struct Clock {
    anchor_ms: u64,
    anchor: Instant,
}

impl Clock {
    fn start() -> Self {
        let anchor_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self {
            anchor_ms,
            anchor: Instant::now(),
        }
    }

    fn now_ms(&self) -> u64 {
        self.anchor_ms + self.anchor.elapsed().as_millis() as u64
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

struct Armed {
    deadline: Deadline,
    task: JoinHandle<()>,
}

struct Slot {
    sink: mpsc::Sender<TimerExpired>,
    armed: Option<Armed>,
}

/// Schedules one countdown per room and delivers expiries.
///
/// Shared behind an `Arc` by every room actor in the process.
pub struct TimerService<D: DeadlineStore = MemoryDeadlineStore> {
    store: D,
    config: TimerConfig,
    clock: Clock,
    slots: AsyncMutex<HashMap<RoomId, Slot>>,
}

impl<D: DeadlineStore> TimerService<D> {
    pub fn new(store: D, config: TimerConfig) -> Self {
        let config = config.validated();
        debug!(
            redelivery_ms = config.redelivery_delay.as_millis() as u64,
            "timer service created"
        );
        Self {
            store,
            config,
            clock: Clock::start(),
            slots: AsyncMutex::new(HashMap::new()),
        }
    }

    /// Current time in epoch milliseconds, on the same clock deadlines use.
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn config(&self) -> &TimerConfig {
        &self.config
    }

    /// Registers the receiver for a room's expiries.
    ///
    /// Subscribing again replaces the previous receiver and cancels any
    /// in-process countdown (the stored record is left alone).
    pub async fn subscribe(&self, room_id: RoomId) -> mpsc::Receiver<TimerExpired> {
        let (tx, rx) = mpsc::channel(4);
        let mut slots = self.slots.lock().await;
        let previous = slots.insert(
            room_id.clone(),
            Slot {
                sink: tx,
                armed: None,
            },
        );
        if let Some(armed) = previous.and_then(|s| s.armed) {
            armed.task.abort();
        }
        trace!(%room_id, "timer subscriber registered");
        rx
    }

    /// Arms a fresh countdown for `duration`, replacing any previous one.
    ///
    /// The record is written before anything in process changes: if the
    /// store refuses it, the previous countdown stays armed.
    pub async fn arm(&self, room_id: &RoomId, duration: Duration) -> Result<Deadline, TimerError> {
        let deadline = Deadline {
            token: TimerToken::random(),
            expires_at_ms: self.now_ms() + duration.as_millis() as u64,
        };
        self.install(room_id, deadline, duration).await?;
        debug!(%room_id, token = %deadline.token, window_ms = duration.as_millis() as u64, "deadline armed");
        Ok(deadline)
    }

    /// Re-arms a deadline that was armed before, keeping its token.
    ///
    /// A deadline that already lapsed fires after the configured
    /// redelivery delay.
    pub async fn resume(&self, room_id: &RoomId, deadline: Deadline) -> Result<(), TimerError> {
        let now = self.now_ms();
        let delay = if deadline.is_elapsed(now) {
            self.config.redelivery_delay
        } else {
            deadline.remaining(now)
        };
        self.install(room_id, deadline, delay).await?;
        debug!(
            %room_id,
            token = %deadline.token,
            delay_ms = delay.as_millis() as u64,
            lapsed = deadline.is_elapsed(now),
            "deadline resumed"
        );
        Ok(())
    }

    /// Writes the record, then swaps the in-process countdown.
    ///
    /// The store call runs without the slot map locked, so a slow store
    /// only holds up the room being armed. Calls for one room are
    /// serialized by its owner.
    async fn install(
        &self,
        room_id: &RoomId,
        deadline: Deadline,
        delay: Duration,
    ) -> Result<(), TimerError> {
        if !self.slots.lock().await.contains_key(room_id) {
            return Err(TimerError::NotSubscribed(room_id.clone()));
        }

        self.store.put(room_id, &deadline).await?;

        let mut slots = self.slots.lock().await;
        let slot = slots
            .get_mut(room_id)
            .ok_or_else(|| TimerError::NotSubscribed(room_id.clone()))?;
        if let Some(previous) = slot.armed.take() {
            previous.task.abort();
        }

        let sink = slot.sink.clone();
        let expired = TimerExpired {
            room_id: room_id.clone(),
            token: deadline.token,
        };
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            trace!(room_id = %expired.room_id, token = %expired.token, "deadline elapsed");
            if sink.send(expired).await.is_err() {
                debug!("expiry dropped: room no longer listening");
            }
        });
        slot.armed = Some(Armed { deadline, task });
        Ok(())
    }

    /// Disarms the room's countdown and deletes its record.
    pub async fn cancel(&self, room_id: &RoomId) -> Result<(), TimerError> {
        self.store.remove(room_id).await?;
        let mut slots = self.slots.lock().await;
        if let Some(armed) = slots.get_mut(room_id).and_then(|s| s.armed.take()) {
            armed.task.abort();
            debug!(%room_id, token = %armed.deadline.token, "deadline cancelled");
        }
        Ok(())
    }

    /// Time left on the room's countdown, `None` when nothing is armed.
    pub async fn remaining(&self, room_id: &RoomId) -> Option<Duration> {
        let slots = self.slots.lock().await;
        let armed = slots.get(room_id)?.armed.as_ref()?;
        Some(armed.deadline.remaining(self.now_ms()))
    }

    /// Drops the room's subscriber and in-process countdown.
    ///
    /// The stored record is kept so a later owner can resume it.
    pub async fn release(&self, room_id: &RoomId) {
        if let Some(slot) = self.slots.lock().await.remove(room_id) {
            if let Some(armed) = slot.armed {
                armed.task.abort();
            }
            trace!(%room_id, "timer subscriber released");
        }
    }

    /// Every deadline in the store, for recovery after a restart.
    pub async fn live_deadlines(&self) -> Result<Vec<(RoomId, Deadline)>, TimerError> {
        self.store.live().await
    }

    /// The stored deadline for one room.
    pub async fn stored_deadline(&self, room_id: &RoomId) -> Result<Option<Deadline>, TimerError> {
        self.store.get(room_id).await
    }
}

// =========================================================================
// Tests
// =========================================================================
