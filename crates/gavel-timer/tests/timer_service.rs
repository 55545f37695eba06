//! Integration tests for the per-room countdown service.
//!
//! Every test runs with Tokio's clock paused, so sleeps resolve as soon as
//! the runtime is otherwise idle and timings are exact.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use gavel_protocol::RoomId;
use gavel_timer::{
    Deadline, DeadlineStore, MemoryDeadlineStore, TimerConfig, TimerError, TimerService,
    TimerToken,
};
use tokio::sync::Notify;
use tokio::time::{Instant, timeout};

// =========================================================================
// Helpers
// =========================================================================

const WINDOW: Duration = Duration::from_secs(20);

fn service() -> TimerService {
    TimerService::new(MemoryDeadlineStore::new(), TimerConfig::default())
}

fn room(id: &str) -> RoomId {
    RoomId::from(id)
}

/// Store wrapper whose writes can be switched to fail.
#[derive(Clone, Default)]
struct FlakyStore {
    inner: MemoryDeadlineStore,
    failing: Arc<AtomicBool>,
}

impl FlakyStore {
    fn fail_writes(&self, on: bool) {
        self.failing.store(on, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), TimerError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(TimerError::Store("injected failure".into()))
        } else {
            Ok(())
        }
    }
}

impl DeadlineStore for FlakyStore {
    async fn put(&self, room_id: &RoomId, deadline: &Deadline) -> Result<(), TimerError> {
        self.check()?;
        self.inner.put(room_id, deadline).await
    }

    async fn get(&self, room_id: &RoomId) -> Result<Option<Deadline>, TimerError> {
        self.inner.get(room_id).await
    }

    async fn remove(&self, room_id: &RoomId) -> Result<(), TimerError> {
        self.check()?;
        self.inner.remove(room_id).await
    }

    async fn live(&self) -> Result<Vec<(RoomId, Deadline)>, TimerError> {
        self.inner.live().await
    }
}

/// Store whose writes for one room stall until the test lets them go.
#[derive(Clone)]
struct StallingStore {
    inner: MemoryDeadlineStore,
    stalled_room: RoomId,
    entered: Arc<Notify>,
    stall: Duration,
}

impl StallingStore {
    fn new(stalled_room: &str, stall: Duration) -> Self {
        Self {
            inner: MemoryDeadlineStore::new(),
            stalled_room: room(stalled_room),
            entered: Arc::new(Notify::new()),
            stall,
        }
    }

    async fn maybe_stall(&self, room_id: &RoomId) {
        if *room_id == self.stalled_room {
            self.entered.notify_one();
            tokio::time::sleep(self.stall).await;
        }
    }
}

impl DeadlineStore for StallingStore {
    async fn put(&self, room_id: &RoomId, deadline: &Deadline) -> Result<(), TimerError> {
        self.maybe_stall(room_id).await;
        self.inner.put(room_id, deadline).await
    }

    async fn get(&self, room_id: &RoomId) -> Result<Option<Deadline>, TimerError> {
        self.inner.get(room_id).await
    }

    async fn remove(&self, room_id: &RoomId) -> Result<(), TimerError> {
        self.maybe_stall(room_id).await;
        self.inner.remove(room_id).await
    }

    async fn live(&self) -> Result<Vec<(RoomId, Deadline)>, TimerError> {
        self.inner.live().await
    }
}

// =========================================================================
// Arming and expiry
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_arm_fires_once_with_its_token() {
    let timers = service();
    let id = room("R1");
    let mut rx = timers.subscribe(id.clone()).await;

    let start = Instant::now();
    let deadline = timers.arm(&id, WINDOW).await.unwrap();

    let expired = rx.recv().await.unwrap();
    assert_eq!(expired.room_id, id);
    assert_eq!(expired.token, deadline.token);
    assert_eq!(start.elapsed(), WINDOW);

    // Nothing else is delivered for this arming.
    assert!(timeout(Duration::from_secs(120), rx.recv()).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_arm_without_subscriber_is_rejected() {
    let timers = service();
    let err = timers.arm(&room("nobody"), WINDOW).await.unwrap_err();
    assert!(matches!(err, TimerError::NotSubscribed(_)));
}

#[tokio::test(start_paused = true)]
async fn test_arm_records_deadline_in_store() {
    let store = MemoryDeadlineStore::new();
    let timers = TimerService::new(store.clone(), TimerConfig::default());
    let id = room("R1");
    let _rx = timers.subscribe(id.clone()).await;

    let deadline = timers.arm(&id, WINDOW).await.unwrap();
    assert_eq!(store.get(&id).await.unwrap(), Some(deadline));
    assert_eq!(deadline.expires_at_ms, timers.now_ms() + 20_000);
}

#[tokio::test(start_paused = true)]
async fn test_rearm_replaces_previous_deadline() {
    let timers = service();
    let id = room("R1");
    let mut rx = timers.subscribe(id.clone()).await;

    let start = Instant::now();
    let first = timers.arm(&id, WINDOW).await.unwrap();
    tokio::time::sleep(Duration::from_secs(15)).await;
    let second = timers.arm(&id, WINDOW).await.unwrap();
    assert_ne!(first.token, second.token);

    let expired = rx.recv().await.unwrap();
    assert_eq!(expired.token, second.token);
    assert_eq!(start.elapsed(), Duration::from_secs(35));
    assert!(timeout(Duration::from_secs(120), rx.recv()).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_rooms_fire_independently() {
    let timers = service();
    let a = room("A");
    let b = room("B");
    let mut rx_a = timers.subscribe(a.clone()).await;
    let mut rx_b = timers.subscribe(b.clone()).await;

    timers.arm(&a, Duration::from_secs(5)).await.unwrap();
    let token_b = timers.arm(&b, Duration::from_secs(10)).await.unwrap().token;
    timers.cancel(&a).await.unwrap();

    assert_eq!(rx_b.recv().await.unwrap().token, token_b);
    assert!(timeout(Duration::from_secs(60), rx_a.recv()).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_slow_store_write_does_not_hold_up_other_rooms() {
    let store = StallingStore::new("SLOW", Duration::from_secs(2));
    let entered = Arc::clone(&store.entered);
    let timers = Arc::new(TimerService::new(store, TimerConfig::default()));
    let slow = room("SLOW");
    let fast = room("FAST");
    let _rx_slow = timers.subscribe(slow.clone()).await;
    let _rx_fast = timers.subscribe(fast.clone()).await;

    let background = Arc::clone(&timers);
    let stalled = tokio::spawn(async move { background.arm(&slow, WINDOW).await });
    entered.notified().await;

    let start = Instant::now();
    timers.arm(&fast, WINDOW).await.unwrap();
    timers.cancel(&fast).await.unwrap();
    assert!(start.elapsed() < Duration::from_secs(1));

    stalled.await.unwrap().unwrap();
    assert!(timers.remaining(&room("SLOW")).await.is_some());
}

// =========================================================================
// Cancel / remaining / release
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_delivery_and_clears_record() {
    let store = MemoryDeadlineStore::new();
    let timers = TimerService::new(store.clone(), TimerConfig::default());
    let id = room("R1");
    let mut rx = timers.subscribe(id.clone()).await;

    timers.arm(&id, WINDOW).await.unwrap();
    timers.cancel(&id).await.unwrap();

    assert_eq!(store.get(&id).await.unwrap(), None);
    assert_eq!(timers.remaining(&id).await, None);
    assert!(timeout(Duration::from_secs(60), rx.recv()).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_with_nothing_armed_is_ok() {
    let timers = service();
    timers.cancel(&room("idle")).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_remaining_counts_down() {
    let timers = service();
    let id = room("R1");
    let _rx = timers.subscribe(id.clone()).await;

    timers.arm(&id, WINDOW).await.unwrap();
    tokio::time::sleep(Duration::from_secs(8)).await;
    assert_eq!(timers.remaining(&id).await, Some(Duration::from_secs(12)));
}

#[tokio::test(start_paused = true)]
async fn test_release_keeps_stored_record() {
    let store = MemoryDeadlineStore::new();
    let timers = TimerService::new(store.clone(), TimerConfig::default());
    let id = room("R1");
    let mut rx = timers.subscribe(id.clone()).await;

    let deadline = timers.arm(&id, WINDOW).await.unwrap();
    timers.release(&id).await;

    assert_eq!(store.get(&id).await.unwrap(), Some(deadline));
    // Sender side is gone with the slot.
    assert!(rx.recv().await.is_none());
}

// =========================================================================
// Restart recovery
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_live_deadlines_survive_service_restart() {
    let store = MemoryDeadlineStore::new();
    let id = room("R1");

    let armed = {
        let before = TimerService::new(store.clone(), TimerConfig::default());
        let _rx = before.subscribe(id.clone()).await;
        let d = before.arm(&id, WINDOW).await.unwrap();
        before.release(&id).await;
        d
    };

    let after = TimerService::new(store, TimerConfig::default());
    assert_eq!(after.live_deadlines().await.unwrap(), vec![(id.clone(), armed)]);
    assert_eq!(after.stored_deadline(&id).await.unwrap(), Some(armed));
}

#[tokio::test(start_paused = true)]
async fn test_resume_keeps_token_and_remaining_time() {
    let timers = service();
    let id = room("R1");
    let mut rx = timers.subscribe(id.clone()).await;

    let pending = Deadline {
        token: TimerToken(42),
        expires_at_ms: timers.now_ms() + 15_000,
    };
    let start = Instant::now();
    timers.resume(&id, pending).await.unwrap();
    assert_eq!(timers.remaining(&id).await, Some(Duration::from_secs(15)));

    let expired = rx.recv().await.unwrap();
    assert_eq!(expired.token, TimerToken(42));
    assert_eq!(start.elapsed(), Duration::from_secs(15));
}

#[tokio::test(start_paused = true)]
async fn test_resume_lapsed_deadline_fires_after_redelivery_delay() {
    let timers = TimerService::new(
        MemoryDeadlineStore::new(),
        TimerConfig {
            redelivery_delay: Duration::from_millis(250),
        },
    );
    let id = room("R1");
    let mut rx = timers.subscribe(id.clone()).await;

    let lapsed = Deadline {
        token: TimerToken(77),
        expires_at_ms: timers.now_ms().saturating_sub(60_000),
    };
    let start = Instant::now();
    timers.resume(&id, lapsed).await.unwrap();

    assert_eq!(rx.recv().await.unwrap().token, TimerToken(77));
    assert_eq!(start.elapsed(), Duration::from_millis(250));
}

// =========================================================================
// Store failures
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_failed_store_write_keeps_previous_deadline_armed() {
    let store = FlakyStore::default();
    let timers = TimerService::new(store.clone(), TimerConfig::default());
    let id = room("R1");
    let mut rx = timers.subscribe(id.clone()).await;

    let first = timers.arm(&id, WINDOW).await.unwrap();
    store.fail_writes(true);
    let err = timers.arm(&id, Duration::from_secs(5)).await.unwrap_err();
    assert!(matches!(err, TimerError::Store(_)));

    assert_eq!(rx.recv().await.unwrap().token, first.token);
    assert_eq!(store.get(&id).await.unwrap(), Some(first));
}
