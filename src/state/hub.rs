//! Per-room broadcast fan-out.
//!
//! The hub carries notifications, never state: subscribers react by
//! refetching authoritative rows from the store, so dropped or duplicated
//! deliveries are harmless.

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::dto::sse::ServerEvent;

/// Injectable publish/subscribe registry keyed by room code.
///
/// One Tokio broadcast channel per room with at least one subscriber;
/// publishing to a room nobody watches is a no-op. A failed delivery only
/// affects the lagging subscriber (it observes a `Lagged` error on its own
/// receiver), never its siblings.
pub struct RoomHub {
    channels: DashMap<String, broadcast::Sender<ServerEvent>>,
    capacity: usize,
}

impl RoomHub {
    /// Build a hub whose per-room channels buffer `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity,
        }
    }

    /// Register a subscriber for a room, creating its channel on first use.
    pub fn subscribe(&self, room_code: &str) -> broadcast::Receiver<ServerEvent> {
        self.channels
            .entry(room_code.to_owned())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Fan an event out to every current subscriber of a room.
    pub fn publish(&self, room_code: &str, event: ServerEvent) {
        let Some(sender) = self.channels.get(room_code) else {
            return;
        };

        if sender.send(event).is_err() {
            // Every receiver is gone; drop the entry on the next prune.
            tracing::debug!(room = room_code, "publish with no live subscribers");
        }
    }

    /// Drop a room's channel once its last subscriber disconnected.
    pub fn prune(&self, room_code: &str) {
        self.channels
            .remove_if(room_code, |_, sender| sender.receiver_count() == 0);
    }

    /// Number of live subscribers for a room.
    pub fn subscriber_count(&self, room_code: &str) -> usize {
        self.channels
            .get(room_code)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: &str) -> ServerEvent {
        ServerEvent::new(Some(kind.to_string()), "{}".to_string())
    }

    #[tokio::test]
    async fn publish_reaches_every_room_subscriber() {
        let hub = RoomHub::new(8);
        let mut first = hub.subscribe("AAAA");
        let mut second = hub.subscribe("AAAA");
        let mut other_room = hub.subscribe("BBBB");

        hub.publish("AAAA", event("mid-missions-assigned"));

        assert_eq!(
            first.recv().await.unwrap().event.as_deref(),
            Some("mid-missions-assigned")
        );
        assert_eq!(
            second.recv().await.unwrap().event.as_deref(),
            Some("mid-missions-assigned")
        );
        assert!(other_room.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_noop() {
        let hub = RoomHub::new(8);
        hub.publish("GHOST", event("player-left"));
        assert_eq!(hub.subscriber_count("GHOST"), 0);
    }

    #[tokio::test]
    async fn prune_removes_only_empty_channels() {
        let hub = RoomHub::new(8);
        let receiver = hub.subscribe("AAAA");

        hub.prune("AAAA");
        assert_eq!(hub.subscriber_count("AAAA"), 1);

        drop(receiver);
        hub.prune("AAAA");
        assert!(hub.channels.get("AAAA").is_none());
    }
}
