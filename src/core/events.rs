// Event System for the QuantDesk analytics engine
// Per-engine pub/sub bus: direct callbacks, a broadcast channel and bounded history

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

// ============================================================================
// Event Priority
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventPriority {
    Critical = 1,  // Position lifecycle
    High = 2,      // Alerts, structure breaks
    Medium = 3,    // Sweeps, regime changes
    Low = 4,       // Fair value gaps, bias flips
    Info = 5,      // Instrument resets
}

impl fmt::Display for EventPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// Event
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub event_type: String,
    pub timestamp: i64,
    pub data: HashMap<String, serde_json::Value>,
    pub source: String,
    pub priority: EventPriority,
    pub event_id: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        timestamp: i64,
        data: HashMap<String, serde_json::Value>,
        source: &str,
        priority: EventPriority,
    ) -> Self {
        Self {
            event_type: event_type.to_string(),
            timestamp,
            data,
            source: source.to_string(),
            priority,
            event_id: Uuid::new_v4().to_string(),
        }
    }

    /// Build an event whose payload is the fields of a serializable value.
    /// Non-object values land under a single "data" key.
    pub fn from_payload<T: Serialize>(
        event_type: &str,
        timestamp: i64,
        payload: &T,
        source: &str,
        priority: EventPriority,
    ) -> Self {
        let data = match serde_json::to_value(payload) {
            Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
            Ok(other) => HashMap::from([("data".to_string(), other)]),
            Err(_) => HashMap::new(),
        };
        Self::new(event_type, timestamp, data, source, priority)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Event(type={}, source={}, priority={:?}, id={})",
            self.event_type,
            self.source,
            self.priority,
            &self.event_id[..8]
        )
    }
}

// ============================================================================
// Event Bus
// ============================================================================

type EventCallback = Arc<dyn Fn(&Event) + Send + Sync>;

pub struct EventBus {
    tx: broadcast::Sender<Event>,
    subscribers: RwLock<HashMap<String, Vec<EventCallback>>>,
    wildcard_subscribers: RwLock<Vec<EventCallback>>,
    event_history: RwLock<VecDeque<Event>>,
    max_history: usize,
    stats: RwLock<EventBusStats>,
}

#[derive(Debug, Clone, Default)]
struct EventBusStats {
    total_published: u64,
    total_delivered: u64,
}

impl EventBus {
    pub fn new(max_history: usize) -> Self {
        let (tx, _rx) = broadcast::channel(1024);

        Self {
            tx,
            subscribers: RwLock::new(HashMap::new()),
            wildcard_subscribers: RwLock::new(Vec::new()),
            event_history: RwLock::new(VecDeque::with_capacity(max_history.min(1024))),
            max_history,
            stats: RwLock::new(EventBusStats::default()),
        }
    }

    /// Subscribe to events by type, or "*" for all events
    pub fn subscribe<F>(&self, event_type: &str, callback: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let callback: EventCallback = Arc::new(callback);

        if event_type == "*" {
            self.wildcard_subscribers.write().push(callback);
        } else {
            self.subscribers
                .write()
                .entry(event_type.to_string())
                .or_default()
                .push(callback);
        }

        tracing::debug!(event_type = %event_type, "Subscribed to events");
    }

    /// Publish event to all subscribers
    pub fn publish(&self, event: Event) {
        self.stats.write().total_published += 1;

        {
            let mut history = self.event_history.write();
            history.push_back(event.clone());
            while history.len() > self.max_history {
                history.pop_front();
            }
        }

        // No receivers is not an error
        let _ = self.tx.send(event.clone());

        // Snapshot callbacks so subscribers may subscribe from inside a callback
        let mut callbacks: Vec<EventCallback> = self
            .subscribers
            .read()
            .get(&event.event_type)
            .cloned()
            .unwrap_or_default();
        callbacks.extend(self.wildcard_subscribers.read().iter().cloned());

        for callback in &callbacks {
            callback(&event);
        }
        self.stats.write().total_delivered += callbacks.len() as u64;
    }

    /// Get a receiver for all events published after this call
    pub fn subscribe_channel(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Recent events, newest first
    pub fn get_recent_events(&self, event_type: Option<&str>, limit: Option<usize>) -> Vec<Event> {
        let history = self.event_history.read();
        let limit = limit.unwrap_or(100);

        history
            .iter()
            .rev()
            .filter(|e| event_type.map_or(true, |et| e.event_type == et))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn get_stats(&self) -> EventBusStatsSnapshot {
        let stats = self.stats.read();
        let subscribers = self.subscribers.read();
        let wildcard = self.wildcard_subscribers.read();

        EventBusStatsSnapshot {
            total_published: stats.total_published,
            total_delivered: stats.total_delivered,
            subscriber_count: subscribers.values().map(Vec::len).sum::<usize>() + wildcard.len(),
            event_types: subscribers.keys().cloned().collect(),
            history_size: self.event_history.read().len(),
        }
    }

    pub fn clear_history(&self) {
        self.event_history.write().clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[derive(Debug, Clone)]
pub struct EventBusStatsSnapshot {
    pub total_published: u64,
    pub total_delivered: u64,
    pub subscriber_count: usize,
    pub event_types: Vec<String>,
    pub history_size: usize,
}
