//! Fan-out of room events to connected teams.
//!
//! Delivery is fire-and-forget. The room never waits on a client and never
//! learns whether an event arrived.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use gavel_protocol::{ConnectionRef, RoomId, ServerEvent, TeamName};
use tokio::sync::mpsc;
use tracing::{trace, warn};

/// Channel a connection handler reads its outbound events from.
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

/// Delivers events to a room's subscribers.
pub trait Broadcaster: Clone + Send + Sync + 'static {
    /// Sends to every team subscribed to the room.
    fn publish(&self, room_id: &RoomId, event: &ServerEvent);

    /// Sends to one team in the room.
    fn publish_to(&self, room_id: &RoomId, team: &TeamName, event: &ServerEvent);

    /// Forgets every subscriber of a room that has been torn down.
    fn close_room(&self, room_id: &RoomId);
}

struct Subscriber {
    connection: ConnectionRef,
    sender: EventSender,
}

type Subscriptions = HashMap<RoomId, HashMap<TeamName, Subscriber>>;

/// [`Broadcaster`] over per-connection unbounded channels.
///
/// One subscriber per team per room; subscribing again replaces the
/// previous connection.
#[derive(Clone, Default)]
pub struct ChannelBroadcaster {
    subscriptions: Arc<Mutex<Subscriptions>>,
}

impl ChannelBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &self,
        room_id: &RoomId,
        team: &TeamName,
        connection: ConnectionRef,
        sender: EventSender,
    ) {
        let Ok(mut subs) = self.subscriptions.lock() else {
            warn!(%room_id, %team, "subscription map poisoned, subscribe dropped");
            return;
        };
        subs.entry(room_id.clone())
            .or_default()
            .insert(team.clone(), Subscriber { connection, sender });
        trace!(%room_id, %team, %connection, "subscribed");
    }

    /// Removes the team's subscription if it still belongs to `connection`.
    pub fn unsubscribe(&self, room_id: &RoomId, team: &TeamName, connection: ConnectionRef) {
        let Ok(mut subs) = self.subscriptions.lock() else {
            return;
        };
        if let Some(room) = subs.get_mut(room_id) {
            if room.get(team).is_some_and(|s| s.connection == connection) {
                room.remove(team);
            }
            if room.is_empty() {
                subs.remove(room_id);
            }
        }
    }

    pub fn subscriber_count(&self, room_id: &RoomId) -> usize {
        self.subscriptions
            .lock()
            .map(|subs| subs.get(room_id).map_or(0, HashMap::len))
            .unwrap_or_default()
    }
}

impl Broadcaster for ChannelBroadcaster {
    fn publish(&self, room_id: &RoomId, event: &ServerEvent) {
        let Ok(subs) = self.subscriptions.lock() else {
            warn!(%room_id, "subscription map poisoned, event dropped");
            return;
        };
        if let Some(room) = subs.get(room_id) {
            for sub in room.values() {
                let _ = sub.sender.send(event.clone());
            }
        }
    }

    fn publish_to(&self, room_id: &RoomId, team: &TeamName, event: &ServerEvent) {
        let Ok(subs) = self.subscriptions.lock() else {
            warn!(%room_id, %team, "subscription map poisoned, event dropped");
            return;
        };
        if let Some(sub) = subs.get(room_id).and_then(|room| room.get(team)) {
            let _ = sub.sender.send(event.clone());
        }
    }

    fn close_room(&self, room_id: &RoomId) {
        if let Ok(mut subs) = self.subscriptions.lock() {
            if subs.remove(room_id).is_some() {
                trace!(%room_id, "room subscriptions dropped");
            }
        }
    }
}
