//! Handle-based publish/subscribe bus.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::event::{EventHandler, PluginEvent};

/// Registration handle returned by [`EventBus::subscribe`].
///
/// The handle is the only way to remove a subscription; handlers have no
/// usable identity of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

struct Subscription {
    id: SubscriptionId,
    handler: Arc<dyn EventHandler>,
}

#[derive(Default)]
struct BusState {
    /// Append-ordered subscriber lists per event-type string.
    subscribers: HashMap<String, Vec<Subscription>>,
    /// Reverse index so a handle alone is enough to unsubscribe.
    index: HashMap<SubscriptionId, String>,
}

/// In-process publish/subscribe bus for host and plugin events.
///
/// Publishing never blocks on subscriber completion: each matching handler
/// runs on its own detached task and its outcome is logged, not returned.
/// A subscription added concurrently with a publish may miss the event in
/// flight; no delivery guarantee is made for that race.
#[derive(Default)]
pub struct EventBus {
    state: RwLock<BusState>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.state.read().map(|s| s.index.len()).unwrap_or_default();
        f.debug_struct("EventBus")
            .field("subscription_count", &count)
            .finish()
    }
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for an event type.
    ///
    /// Registration always succeeds and appends to the end of the event
    /// type's subscriber list. The returned handle can later be passed to
    /// [`unsubscribe`](Self::unsubscribe).
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn subscribe(
        &self,
        event_type: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> SubscriptionId {
        let event_type = event_type.into();
        let id = SubscriptionId::new();
        let name = handler.name().to_string();

        let mut state = self.state.write().expect("lock poisoned");
        let list = state.subscribers.entry(event_type.clone()).or_default();
        list.push(Subscription { id, handler });
        let total = list.len();
        state.index.insert(id, event_type.clone());
        drop(state);

        debug!(
            event_type = %event_type,
            handler = %name,
            total_subscribers = total,
            "Subscribed to event"
        );
        id
    }

    /// Remove a subscription by handle.
    ///
    /// Returns `true` if the subscription existed and was removed.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.state.write().expect("lock poisoned");
        let Some(event_type) = state.index.remove(&id) else {
            return false;
        };
        if let Some(subs) = state.subscribers.get_mut(&event_type) {
            subs.retain(|s| s.id != id);
            if subs.is_empty() {
                state.subscribers.remove(&event_type);
            }
        }
        drop(state);

        debug!(event_type = %event_type, "Unsubscribed from event");
        true
    }

    /// Publish an event to all current subscribers of its type.
    ///
    /// The subscriber list is snapshotted under a read lock, then every
    /// handler is dispatched on its own detached task. Handler errors are
    /// logged at `warn` and never reach the publisher. Returns the number
    /// of subscribers the event was dispatched to; zero subscribers is a
    /// safe no-op.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn publish(&self, event_type: impl Into<String>, payload: Value) -> usize {
        let event = Arc::new(PluginEvent::new(event_type, payload));

        let snapshot: Vec<(SubscriptionId, Arc<dyn EventHandler>)> = {
            let state = self.state.read().expect("lock poisoned");
            state
                .subscribers
                .get(&event.event_type)
                .map(|subs| {
                    subs.iter()
                        .map(|s| (s.id, Arc::clone(&s.handler)))
                        .collect()
                })
                .unwrap_or_default()
        };

        debug!(
            event_type = %event.event_type,
            subscribers = snapshot.len(),
            "Publishing event"
        );

        let count = snapshot.len();
        for (id, handler) in snapshot {
            let event = Arc::clone(&event);
            tokio::spawn(async move {
                if let Err(e) = handler.handle(Arc::clone(&event)).await {
                    warn!(
                        subscription_id = ?id,
                        handler = %handler.name(),
                        event_type = %event.event_type,
                        error = %e,
                        "Event handler failed"
                    );
                }
            });
        }
        count
    }

    /// Number of subscribers currently registered for an event type.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn subscriber_count(&self, event_type: &str) -> usize {
        self.state
            .read()
            .expect("lock poisoned")
            .subscribers
            .get(event_type)
            .map_or(0, Vec::len)
    }

    /// Total number of subscriptions across all event types.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().expect("lock poisoned").index.len()
    }

    /// Check whether the bus has no subscriptions at all.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().expect("lock poisoned").index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{FnHandler, HandlerError};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    /// Handler that reports every delivery on a channel.
    fn reporting_handler(
        name: &str,
        tx: mpsc::UnboundedSender<Arc<PluginEvent>>,
    ) -> Arc<dyn EventHandler> {
        Arc::new(FnHandler::new(name, move |event| {
            let tx = tx.clone();
            async move {
                tx.send(event).map_err(|e| Box::new(e) as HandlerError)?;
                Ok(())
            }
        }))
    }

    #[tokio::test]
    async fn test_publish_with_no_subscribers_is_noop() {
        let bus = EventBus::new();
        assert_eq!(bus.publish("nobody.cares", Value::Null), 0);
        assert!(bus.is_empty());
    }

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let bus = EventBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        for i in 0..3 {
            bus.subscribe("player.connect", reporting_handler(&format!("sub{i}"), tx.clone()));
        }

        let dispatched = bus.publish("player.connect", serde_json::json!({"name": "steve"}));
        assert_eq!(dispatched, 3);

        for _ in 0..3 {
            let event = timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("delivery timed out")
                .expect("channel closed");
            assert_eq!(event.event_type, "player.connect");
            assert_eq!(event.payload["name"], "steve");
        }
    }

    #[tokio::test]
    async fn test_publish_only_matches_event_type() {
        let bus = EventBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        bus.subscribe("player.connect", reporting_handler("connect", tx.clone()));
        bus.subscribe("player.disconnect", reporting_handler("disconnect", tx));

        assert_eq!(bus.publish("player.connect", Value::Null), 1);

        let event = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("delivery timed out")
            .expect("channel closed");
        assert_eq!(event.event_type, "player.connect");

        // The disconnect subscriber must not have been dispatched to.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handle = bus.subscribe("server.tick", reporting_handler("tick", tx));
        assert_eq!(bus.subscriber_count("server.tick"), 1);

        assert!(bus.unsubscribe(handle));
        assert_eq!(bus.subscriber_count("server.tick"), 0);
        assert_eq!(bus.publish("server.tick", Value::Null), 0);
        assert!(rx.try_recv().is_err());

        // A handle is spent after its first removal.
        assert!(!bus.unsubscribe(handle));
    }

    #[tokio::test]
    async fn test_unsubscribe_leaves_other_subscriptions_intact() {
        let bus = EventBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let first = bus.subscribe("server.tick", reporting_handler("first", tx.clone()));
        bus.subscribe("server.tick", reporting_handler("second", tx));
        bus.unsubscribe(first);

        assert_eq!(bus.publish("server.tick", Value::Null), 1);
        let event = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("delivery timed out")
            .expect("channel closed");
        assert_eq!(event.event_type, "server.tick");
    }

    #[tokio::test]
    async fn test_failing_handler_does_not_affect_peers() {
        let bus = EventBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        bus.subscribe(
            "risky",
            Arc::new(FnHandler::new("faulty", |_event| async move {
                Err::<(), HandlerError>("deliberate failure".into())
            })),
        );
        bus.subscribe("risky", reporting_handler("steady", tx));

        assert_eq!(bus.publish("risky", Value::Null), 2);

        let event = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("delivery timed out")
            .expect("channel closed");
        assert_eq!(event.event_type, "risky");
    }

    #[tokio::test]
    async fn test_publisher_not_blocked_by_slow_subscriber() {
        let bus = EventBus::new();
        let gate = Arc::new(tokio::sync::Notify::new());
        let gate_clone = Arc::clone(&gate);

        bus.subscribe(
            "slow",
            Arc::new(FnHandler::new("sleeper", move |_event| {
                let gate = Arc::clone(&gate_clone);
                async move {
                    // Blocks until the test releases it. If publish waited on
                    // handlers this test would deadlock and time out.
                    gate.notified().await;
                    Ok(())
                }
            })),
        );

        let dispatched = bus.publish("slow", Value::Null);
        assert_eq!(dispatched, 1);
        gate.notify_one();
    }

    #[tokio::test]
    async fn test_subscription_handles_are_distinct() {
        let bus = EventBus::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let a = bus.subscribe("e", reporting_handler("a", tx.clone()));
        let b = bus.subscribe("e", reporting_handler("b", tx));
        assert_ne!(a, b);
        assert_eq!(bus.len(), 2);
    }
}
