//! In-process publish/subscribe fan-out (§4.11). Built on
//! `tokio::sync::broadcast`, whose bounded ring buffer already gives the
//! drop-oldest-under-backpressure behaviour the spec calls for: a lagging
//! subscriber's next `recv()` returns `Lagged(n)` and resumes from the
//! oldest still-buffered event rather than blocking the publisher.

use osc_core::config::CoreConfig;
use tokio::sync::broadcast;

use crate::event::Event;

/// A single subscription. Exposed as a stream-like handle rather than the
/// raw `broadcast::Receiver` so callers don't need the `tokio::sync`
/// dependency directly.
pub struct Subscription {
    inner: broadcast::Receiver<Event>,
}

impl Subscription {
    /// Waits for the next event published since this subscription was
    /// created. Returns `None` only if every sender has been dropped, which
    /// does not happen while the owning `EventBroker` is alive.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.inner.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event subscriber lagged, dropping oldest events");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Fans out domain events to every live `Subscription`. Cloning an
/// `EventBroker` is cheap and shares the same underlying channel, matching
/// the teacher's convention for cheaply-cloneable service handles.
#[derive(Clone)]
pub struct EventBroker {
    sender: broadcast::Sender<Event>,
}

impl EventBroker {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn from_config(config: &CoreConfig) -> Self {
        Self::new(config.event_broker_capacity)
    }

    /// Publishes an event. A subscriber count of zero is not an error: the
    /// event is simply dropped, matching "subscribers receive only events
    /// published after their subscription."
    pub fn publish(&self, event: Event) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            inner: self.sender.subscribe(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventType;
    use osc_core::ids::SpaceId;
    use serde_json::json;

    #[tokio::test]
    async fn subscriber_only_sees_events_after_subscribing() {
        let broker = EventBroker::new(8);
        broker.publish(Event::new(EventType::ChatMessageNew, SpaceId::new("s1"), json!({"early": true})));

        let mut sub = broker.subscribe();
        broker.publish(Event::new(EventType::ChatMessageNew, SpaceId::new("s1"), json!({"late": true})));

        let received = sub.recv().await.unwrap();
        assert_eq!(received.data, json!({"late": true}));
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_to_most_recent_instead_of_blocking_publisher() {
        let broker = EventBroker::new(2);
        let mut sub = broker.subscribe();
        for i in 0..10 {
            broker.publish(Event::new(EventType::NoticeCreated, SpaceId::new("s1"), json!({"i": i})));
        }
        // publisher never blocked; subscriber resumes from whatever survived the ring buffer.
        let received = sub.recv().await.unwrap();
        assert!(received.data["i"].as_i64().unwrap() >= 8);
    }
}
