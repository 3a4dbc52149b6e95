//! Per-context event bus
//!
//! Each plugin context owns one bus. Dispatch is synchronous and in
//! registration order; a panicking handler is caught and logged without
//! disturbing the remaining handlers or the publisher. Messages land in a
//! bounded history (oldest-entry eviction) that the host can query.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, RwLock};
use tracing::warn;
use uuid::Uuid;

pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// A published message as recorded in history and handed to handlers
#[derive(Debug, Clone, Serialize)]
pub struct EventMessage {
    pub event: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub target: Option<String>,
}

pub type EventHandler = Arc<dyn Fn(&EventMessage) + Send + Sync>;

struct HandlerEntry {
    id: Uuid,
    registered_at: DateTime<Utc>,
    handler: EventHandler,
}

/// Bus-wide counters plus the most recent messages
#[derive(Debug, Clone, Serialize)]
pub struct EventStats {
    pub total_events: u64,
    pub total_handlers: usize,
    pub handlers_by_event: HashMap<String, usize>,
    pub recent_messages: Vec<EventMessage>,
}

/// Conjunctive history filter; unset fields match everything
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub event: Option<String>,
    pub source: Option<String>,
    pub target: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// One active subscription key and its handler ids
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionInfo {
    pub event: String,
    pub handler_ids: Vec<Uuid>,
    pub oldest_registered_at: Option<DateTime<Utc>>,
}

pub struct PluginEventBus {
    handlers: RwLock<HashMap<String, Vec<HandlerEntry>>>,
    history: RwLock<VecDeque<EventMessage>>,
    capacity: usize,
    total_published: RwLock<u64>,
    source: String,
}

impl PluginEventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            history: RwLock::new(VecDeque::with_capacity(capacity.min(64))),
            capacity: capacity.max(1),
            total_published: RwLock::new(0),
            source: "plugin".to_string(),
        }
    }

    /// Register a handler for an event; returns the generated handler id
    /// used for unsubscription. Multiple handlers per event are invoked in
    /// registration order.
    pub fn subscribe(&self, event: &str, handler: EventHandler) -> Uuid {
        let id = Uuid::new_v4();
        self.handlers
            .write()
            .unwrap()
            .entry(event.to_string())
            .or_default()
            .push(HandlerEntry {
                id,
                registered_at: Utc::now(),
                handler,
            });
        id
    }

    /// Remove a handler; drops the event key once its list is empty.
    /// Returns `false` if no matching handler existed.
    pub fn unsubscribe(&self, event: &str, handler_id: Uuid) -> bool {
        let mut handlers = self.handlers.write().unwrap();
        let Some(entries) = handlers.get_mut(event) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| e.id != handler_id);
        let removed = entries.len() < before;
        if entries.is_empty() {
            handlers.remove(event);
        }
        removed
    }

    /// Publish to every handler registered under `event`.
    pub fn publish(&self, event: &str, data: serde_json::Value) {
        let message = EventMessage {
            event: event.to_string(),
            data,
            timestamp: Utc::now(),
            source: self.source.clone(),
            target: None,
        };
        self.record(&message);
        self.dispatch(event, &message);
    }

    /// Publish to the composite `"{event}:{target}"` namespace; targeted
    /// subscriptions are distinct from plain `event` subscriptions.
    pub fn publish_to_target(&self, event: &str, data: serde_json::Value, target: &str) {
        let message = EventMessage {
            event: event.to_string(),
            data,
            timestamp: Utc::now(),
            source: self.source.clone(),
            target: Some(target.to_string()),
        };
        self.record(&message);
        self.dispatch(&format!("{event}:{target}"), &message);
    }

    fn record(&self, message: &EventMessage) {
        let mut history = self.history.write().unwrap();
        if history.len() == self.capacity {
            history.pop_front();
        }
        history.push_back(message.clone());
        *self.total_published.write().unwrap() += 1;
    }

    fn dispatch(&self, key: &str, message: &EventMessage) {
        // Clone the handler list out of the lock so handlers can themselves
        // subscribe or publish without deadlocking.
        let snapshot: Vec<(Uuid, EventHandler)> = {
            let handlers = self.handlers.read().unwrap();
            match handlers.get(key) {
                Some(entries) => entries
                    .iter()
                    .map(|e| (e.id, e.handler.clone()))
                    .collect(),
                None => return,
            }
        };

        for (id, handler) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| handler(message))).is_err() {
                warn!(
                    event = %message.event,
                    handler_id = %id,
                    "Event handler panicked; continuing with remaining handlers"
                );
            }
        }
    }

    pub fn stats(&self) -> EventStats {
        let handlers = self.handlers.read().unwrap();
        let history = self.history.read().unwrap();
        let handlers_by_event: HashMap<String, usize> = handlers
            .iter()
            .map(|(event, entries)| (event.clone(), entries.len()))
            .collect();
        EventStats {
            total_events: *self.total_published.read().unwrap(),
            total_handlers: handlers.values().map(Vec::len).sum(),
            handlers_by_event,
            recent_messages: history.iter().rev().take(10).rev().cloned().collect(),
        }
    }

    pub fn history(&self, filter: &EventFilter) -> Vec<EventMessage> {
        let history = self.history.read().unwrap();
        let mut matched: Vec<EventMessage> = history
            .iter()
            .filter(|m| filter.event.as_ref().is_none_or(|e| &m.event == e))
            .filter(|m| filter.source.as_ref().is_none_or(|s| &m.source == s))
            .filter(|m| filter.target.as_ref().is_none_or(|t| m.target.as_ref() == Some(t)))
            .filter(|m| filter.since.is_none_or(|since| m.timestamp >= since))
            .cloned()
            .collect();
        if let Some(limit) = filter.limit
            && matched.len() > limit
        {
            matched.drain(0..matched.len() - limit);
        }
        matched
    }

    pub fn active_subscriptions(&self) -> Vec<SubscriptionInfo> {
        let handlers = self.handlers.read().unwrap();
        let mut subscriptions: Vec<SubscriptionInfo> = handlers
            .iter()
            .map(|(event, entries)| SubscriptionInfo {
                event: event.clone(),
                handler_ids: entries.iter().map(|e| e.id).collect(),
                oldest_registered_at: entries.iter().map(|e| e.registered_at).min(),
            })
            .collect();
        subscriptions.sort_by(|a, b| a.event.cmp(&b.event));
        subscriptions
    }

    pub fn clear_history(&self) {
        self.history.write().unwrap().clear();
    }

    pub fn clear_all_handlers(&self) {
        self.handlers.write().unwrap().clear();
    }
}

impl Default for PluginEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_handler(counter: Arc<AtomicUsize>) -> EventHandler {
        Arc::new(move |_msg| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn publish_delivers_payload_to_subscriber() {
        let bus = PluginEventBus::new();
        let seen: Arc<RwLock<Option<serde_json::Value>>> = Arc::new(RwLock::new(None));
        let seen_clone = seen.clone();

        bus.subscribe(
            "greeting",
            Arc::new(move |msg| {
                *seen_clone.write().unwrap() = Some(msg.data.clone());
            }),
        );
        bus.publish("greeting", json!({"message": "hello"}));

        assert_eq!(
            seen.read().unwrap().clone(),
            Some(json!({"message": "hello"}))
        );
    }

    #[test]
    fn two_handlers_each_receive_one_call_per_publish() {
        let bus = PluginEventBus::new();
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));

        bus.subscribe("evt", counting_handler(a.clone()));
        bus.subscribe("evt", counting_handler(b.clone()));

        bus.publish("evt", json!(1));
        bus.publish("evt", json!(2));

        assert_eq!(a.load(Ordering::SeqCst), 2);
        assert_eq!(b.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribed_handler_stops_receiving() {
        let bus = PluginEventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let id = bus.subscribe("evt", counting_handler(counter.clone()));

        bus.publish("evt", json!(null));
        assert!(bus.unsubscribe("evt", id));
        bus.publish("evt", json!(null));

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        // Event key is removed once its handler list drains
        assert!(bus.active_subscriptions().is_empty());
    }

    #[test]
    fn panicking_handler_does_not_stop_the_rest() {
        let bus = PluginEventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));

        bus.subscribe("evt", Arc::new(|_| panic!("handler bug")));
        bus.subscribe("evt", counting_handler(counter.clone()));

        bus.publish("evt", json!(null));

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn targeted_publish_uses_composite_namespace() {
        let bus = PluginEventBus::new();
        let plain = Arc::new(AtomicUsize::new(0));
        let targeted = Arc::new(AtomicUsize::new(0));

        bus.subscribe("sync", counting_handler(plain.clone()));
        bus.subscribe("sync:agent", counting_handler(targeted.clone()));

        bus.publish_to_target("sync", json!(null), "agent");

        assert_eq!(plain.load(Ordering::SeqCst), 0);
        assert_eq!(targeted.load(Ordering::SeqCst), 1);

        let history = bus.history(&EventFilter {
            target: Some("agent".to_string()),
            ..Default::default()
        });
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].event, "sync");
    }

    #[test]
    fn history_is_bounded_with_oldest_eviction() {
        let bus = PluginEventBus::with_capacity(3);
        for i in 0..5 {
            bus.publish("tick", json!(i));
        }

        let history = bus.history(&EventFilter::default());
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].data, json!(2));
        assert_eq!(history[2].data, json!(4));

        let stats = bus.stats();
        assert_eq!(stats.total_events, 5);
    }

    #[test]
    fn history_filters_are_conjunctive() {
        let bus = PluginEventBus::new();
        bus.publish("a", json!(1));
        bus.publish("b", json!(2));
        bus.publish_to_target("a", json!(3), "agent");

        let filtered = bus.history(&EventFilter {
            event: Some("a".to_string()),
            target: Some("agent".to_string()),
            ..Default::default()
        });
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].data, json!(3));

        let limited = bus.history(&EventFilter {
            limit: Some(2),
            ..Default::default()
        });
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[1].data, json!(3));
    }

    #[test]
    fn stats_count_handlers_by_event() {
        let bus = PluginEventBus::new();
        bus.subscribe("a", Arc::new(|_| {}));
        bus.subscribe("a", Arc::new(|_| {}));
        bus.subscribe("b", Arc::new(|_| {}));

        let stats = bus.stats();
        assert_eq!(stats.total_handlers, 3);
        assert_eq!(stats.handlers_by_event.get("a"), Some(&2));
        assert_eq!(stats.handlers_by_event.get("b"), Some(&1));
    }

    #[test]
    fn teardown_clears_handlers_and_history() {
        let bus = PluginEventBus::new();
        bus.subscribe("a", Arc::new(|_| {}));
        bus.publish("a", json!(null));

        bus.clear_all_handlers();
        bus.clear_history();

        assert!(bus.active_subscriptions().is_empty());
        assert!(bus.history(&EventFilter::default()).is_empty());
    }
}
