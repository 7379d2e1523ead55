//! Event bus — pub/sub over a Tokio broadcast channel.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use super::types::ForumEvent;

/// Channel capacity for broadcast.
const CHANNEL_CAPACITY: usize = 256;

/// Shared reference to EventBus.
pub type SharedEventBus = Arc<EventBus>;

/// Broadcast bus the engine publishes every committed state change on.
/// Publication is fire-and-forget: a bus with no subscribers drops events,
/// and a slow subscriber that lags past the channel capacity loses the
/// oldest ones — consumers re-query the ledger when in doubt.
pub struct EventBus {
    sender: broadcast::Sender<ForumEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Create a shared reference to this event bus.
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: ForumEvent) {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(count) => debug!(event_type, receivers = count, "event published"),
            Err(_) => debug!(event_type, "event published (no receivers)"),
        }
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<ForumEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(ForumEvent::HealthPing {
            timestamp: Utc::now(),
        });

        assert_eq!(rx1.recv().await.unwrap().event_type(), "health_ping");
        assert_eq!(rx2.recv().await.unwrap().event_type(), "health_ping");
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let bus = EventBus::new();
        assert!(!bus.has_subscribers());
        bus.publish(ForumEvent::HealthPing {
            timestamp: Utc::now(),
        });
    }
}
