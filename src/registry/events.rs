//! Registry events and the best-effort event bus.
//!
//! Each subscription owns a bounded queue. Publishing never waits: when a
//! subscriber's queue is full the event is dropped for that subscriber and a
//! warning is logged. Delivery is at-most-once.

use crate::core::{now, JsonMap, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

/// Well-known event types.
pub mod event_types {
    /// A plugin was registered or refreshed
    pub const REGISTERED: &str = "plugin.registered";
    /// A plugin was removed
    pub const UNREGISTERED: &str = "plugin.unregistered";
    /// A plugin's status changed
    pub const STATUS_CHANGED: &str = "plugin.status_changed";
    /// A plugin's health snapshot changed
    pub const HEALTH_UPDATED: &str = "plugin.health_updated";
    /// A plugin's metrics snapshot changed
    pub const METRICS_UPDATED: &str = "plugin.metrics_updated";
}

/// An immutable notification about a plugin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PluginEvent {
    /// Unique event ID
    pub id: String,
    /// Event type, e.g. `plugin.registered`
    pub event_type: String,
    /// Subject plugin
    pub plugin_id: String,
    /// Event payload
    #[serde(default)]
    pub payload: JsonMap,
    /// When the event was produced
    pub timestamp: Timestamp,
}

impl PluginEvent {
    /// Create a new event.
    pub fn new(event_type: &str, plugin_id: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type: event_type.to_string(),
            plugin_id: plugin_id.to_string(),
            payload: JsonMap::new(),
            timestamp: now(),
        }
    }

    /// Add a payload field.
    pub fn with_payload(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }
}

/// Subscription identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub Uuid);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Receiving end of a subscription.
pub struct Subscription {
    /// Subscription ID, used to unsubscribe
    pub id: SubscriptionId,
    receiver: mpsc::Receiver<PluginEvent>,
}

impl Subscription {
    /// Wait for the next event. `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<PluginEvent> {
        self.receiver.recv().await
    }

    /// Take the next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<PluginEvent> {
        self.receiver.try_recv().ok()
    }

    /// Drain everything currently queued.
    pub fn drain(&mut self) -> Vec<PluginEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.try_recv() {
            events.push(event);
        }
        events
    }
}

struct Subscriber {
    /// Empty means every type
    event_types: HashSet<String>,
    sender: mpsc::Sender<PluginEvent>,
}

impl Subscriber {
    fn wants(&self, event_type: &str) -> bool {
        self.event_types.is_empty() || self.event_types.contains(event_type)
    }
}

/// Outcome of a publish.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers the event was queued for
    pub delivered: usize,
    /// Subscribers whose queue was full
    pub dropped: usize,
}

/// Fan-out of registry events to bounded subscriber queues.
pub struct EventBus {
    /// Queue capacity per subscription
    capacity: usize,
    /// Active subscribers
    subscribers: RwLock<HashMap<SubscriptionId, Subscriber>>,
}

impl EventBus {
    /// Create a bus whose subscriptions hold at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Get the per-subscription capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Subscribe to the given event types. An empty list subscribes to all.
    pub async fn subscribe(&self, event_types: &[&str]) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let id = SubscriptionId(Uuid::new_v4());
        let subscriber = Subscriber {
            event_types: event_types.iter().map(|t| t.to_string()).collect(),
            sender,
        };
        self.subscribers.write().await.insert(id, subscriber);
        debug!(subscription = %id, ?event_types, "subscribed");
        Subscription { id, receiver }
    }

    /// Remove a subscription. Returns false if it did not exist.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.write().await.remove(&id).is_some()
    }

    /// Queue the event for every interested subscriber without waiting.
    pub async fn publish(&self, event: &PluginEvent) -> PublishReport {
        let mut report = PublishReport::default();
        let mut closed = Vec::new();
        {
            let subscribers = self.subscribers.read().await;
            for (id, subscriber) in subscribers.iter() {
                if !subscriber.wants(&event.event_type) {
                    continue;
                }
                match subscriber.sender.try_send(event.clone()) {
                    Ok(()) => report.delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        report.dropped += 1;
                        warn!(
                            subscription = %id,
                            event_type = %event.event_type,
                            plugin_id = %event.plugin_id,
                            "event queue full, dropping event"
                        );
                    }
                    Err(TrySendError::Closed(_)) => closed.push(*id),
                }
            }
        }

        if !closed.is_empty() {
            let mut subscribers = self.subscribers.write().await;
            for id in closed {
                subscribers.remove(&id);
            }
        }
        report
    }

    /// Number of active subscriptions.
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Drop every subscription.
    pub async fn close(&self) {
        self.subscribers.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[tokio::test]
    async fn test_subscriber_receives_matching_types() {
        let bus = EventBus::new(8);
        let mut sub = bus.subscribe(&[event_types::REGISTERED]).await;

        bus.publish(&PluginEvent::new(event_types::REGISTERED, "p1")).await;
        bus.publish(&PluginEvent::new(event_types::STATUS_CHANGED, "p1")).await;

        let events = sub.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, event_types::REGISTERED);
    }

    #[tokio::test]
    async fn test_empty_type_list_receives_everything() {
        let bus = EventBus::new(8);
        let mut sub = bus.subscribe(&[]).await;

        bus.publish(&PluginEvent::new(event_types::REGISTERED, "p1")).await;
        bus.publish(&PluginEvent::new(event_types::UNREGISTERED, "p1")).await;

        assert_eq!(sub.drain().len(), 2);
    }

    #[tokio::test]
    async fn test_full_queue_drops_events() {
        let capacity = 3;
        let bus = EventBus::new(capacity);
        let mut sub = bus.subscribe(&[]).await;

        let mut dropped = 0;
        for i in 0..10 {
            let report = bus
                .publish(&PluginEvent::new(event_types::REGISTERED, &format!("p{i}")))
                .await;
            dropped += report.dropped;
        }

        let events = sub.drain();
        assert!(events.len() <= capacity);
        assert_eq!(dropped, 10 - events.len());

        let unique: HashSet<_> = events.iter().map(|e| e.id.clone()).collect();
        assert_eq!(unique.len(), events.len());
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let bus = EventBus::new(4);
        let sub = bus.subscribe(&[]).await;
        assert_eq!(bus.subscriber_count().await, 1);

        assert!(bus.unsubscribe(sub.id).await);
        assert!(!bus.unsubscribe(sub.id).await);
        assert_eq!(bus.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_pruned() {
        let bus = EventBus::new(4);
        let sub = bus.subscribe(&[]).await;
        drop(sub);

        let report = bus.publish(&PluginEvent::new(event_types::REGISTERED, "p1")).await;
        assert_eq!(report.delivered, 0);
        assert_eq!(bus.subscriber_count().await, 0);
    }

    #[test]
    fn test_event_payload() {
        let event = PluginEvent::new(event_types::STATUS_CHANGED, "p1")
            .with_payload("old_status", "registered")
            .with_payload("new_status", "active");
        assert_eq!(event.payload["new_status"], serde_json::json!("active"));
        assert!(!event.id.is_empty());
    }
}
