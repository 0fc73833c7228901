//! # Event Bus
//!
//! Synchronous publish/subscribe with exact, wildcard (`prefix.*`) and global
//! (`*`) subscriptions.
//!
//! ## Dispatch
//!
//! `publish` records the event in a bounded history, collects every matching
//! subscription, orders them by priority (highest first, registration order on
//! ties) and calls them one after the other on the publishing thread. The
//! subscription set is copied out under the bus lock and the lock is released
//! before any handler runs, so handlers may subscribe, unsubscribe or publish.
//!
//! A failing or panicking handler is logged and counted; the others still run.
//!
//! ## Suspension
//!
//! While suspended, `publish` does nothing: no history, no dispatch. It only
//! counts the suppressed call in the metrics.
//!
//! ## Usage
//!
//! ```rust
//! use maison_core::events::{handler_fn, EventBus, EventData};
//!
//! let bus = EventBus::new();
//! let invalidate = handler_fn("cache_invalidation", |event| {
//!     println!("invalidating after {}", event.topic());
//!     Ok(())
//! });
//! bus.subscribe("stock.*", invalidate, 10);
//!
//! let delivered = bus.publish("stock.modifie", EventData::new(), "inventaire");
//! assert_eq!(delivered, 1);
//! ```

use super::handler::{same_handler, EventHandler};
use super::metrics::{BusMetrics, TopicMetrics};
use super::record::{EventData, EventRecord};
use super::topic::{PatternKind, TopicPattern};
use crate::config::EventBusConfig;
use crate::logging::log_bus_operation;
use crate::registry::{HealthCheck, ServiceHealth};
use crate::utils::panic_message;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Public view of one subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subscription {
    pub pattern: String,
    pub name: String,
    pub priority: i32,
}

#[derive(Clone)]
struct SubscriptionSlot {
    handler: Arc<dyn EventHandler>,
    name: String,
    priority: i32,
    sequence: u64,
}

struct PatternSubscriptions {
    pattern: TopicPattern,
    /// Sorted by priority descending
    slots: Vec<SubscriptionSlot>,
}

struct BusState {
    subscriptions: HashMap<String, PatternSubscriptions>,
    history: VecDeque<EventRecord>,
    metrics: BTreeMap<String, TopicMetrics>,
    suppressed_publishes: u64,
    next_sequence: u64,
}

impl BusState {
    fn new(history_capacity: usize) -> Self {
        Self {
            subscriptions: HashMap::new(),
            history: VecDeque::with_capacity(history_capacity),
            metrics: BTreeMap::new(),
            suppressed_publishes: 0,
            next_sequence: 0,
        }
    }

    fn record_history(&mut self, event: EventRecord, capacity: usize) {
        while self.history.len() >= capacity {
            self.history.pop_front();
        }
        self.history.push_back(event);
    }

    fn matching(&self, topic: &str) -> Vec<SubscriptionSlot> {
        let mut matched: Vec<SubscriptionSlot> = self
            .subscriptions
            .values()
            .filter(|subs| subs.pattern.matches(topic))
            .flat_map(|subs| subs.slots.iter().cloned())
            .collect();
        matched.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.sequence.cmp(&b.sequence)));
        matched
    }

    fn count_by_kind(&self, kind: PatternKind) -> usize {
        self.subscriptions
            .values()
            .filter(|subs| subs.pattern.kind() == kind)
            .map(|subs| subs.slots.len())
            .sum()
    }
}

/// Synchronous, priority-ordered event bus
pub struct EventBus {
    state: Mutex<BusState>,
    suspended: AtomicBool,
    history_capacity: usize,
}

impl EventBus {
    /// Create a bus with the default history capacity
    pub fn new() -> Self {
        Self::with_config(&EventBusConfig::default())
    }

    pub fn with_config(config: &EventBusConfig) -> Self {
        let history_capacity = config.history_capacity.max(1);
        Self {
            state: Mutex::new(BusState::new(history_capacity)),
            suspended: AtomicBool::new(false),
            history_capacity,
        }
    }

    /// Subscribe `handler` to an exact topic, a `prefix.*` pattern or `*`
    pub fn subscribe(
        &self,
        pattern: &str,
        handler: Arc<dyn EventHandler>,
        priority: i32,
    ) -> Subscription {
        let name = handler.name().to_string();
        let mut state = self.state.lock();
        let sequence = state.next_sequence;
        state.next_sequence += 1;

        let entry = state
            .subscriptions
            .entry(pattern.to_string())
            .or_insert_with(|| PatternSubscriptions {
                pattern: TopicPattern::parse(pattern),
                slots: Vec::new(),
            });
        entry.slots.push(SubscriptionSlot {
            handler,
            name: name.clone(),
            priority,
            sequence,
        });
        entry.slots.sort_by(|a, b| b.priority.cmp(&a.priority));

        debug!(pattern = %pattern, handler = %name, priority = priority, "Subscribed handler");
        Subscription {
            pattern: pattern.to_string(),
            name,
            priority,
        }
    }

    /// Remove `handler` from `pattern`. Returns `false` when it was not subscribed there.
    pub fn unsubscribe(&self, pattern: &str, handler: &Arc<dyn EventHandler>) -> bool {
        let mut state = self.state.lock();
        let Some(entry) = state.subscriptions.get_mut(pattern) else {
            return false;
        };
        let Some(position) = entry
            .slots
            .iter()
            .position(|slot| same_handler(&slot.handler, handler))
        else {
            return false;
        };

        let removed = entry.slots.remove(position);
        if entry.slots.is_empty() {
            state.subscriptions.remove(pattern);
        }
        debug!(pattern = %pattern, handler = %removed.name, "Unsubscribed handler");
        true
    }

    /// Publish an event built from `topic`, `data` and `source`.
    ///
    /// Returns the number of handlers that completed without error.
    pub fn publish(&self, topic: &str, data: EventData, source: &str) -> usize {
        self.publish_event(EventRecord::new(topic, data, source))
    }

    /// Publish a caller-built record
    pub fn publish_event(&self, event: EventRecord) -> usize {
        if self.is_suspended() {
            self.state.lock().suppressed_publishes += 1;
            debug!(topic = %event.topic(), "Bus suspended - publish suppressed");
            return 0;
        }

        let handlers = {
            let mut state = self.state.lock();
            state.record_history(event.clone(), self.history_capacity);
            state.matching(event.topic())
        };

        let started = Instant::now();
        let mut errors = 0usize;
        for slot in &handlers {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| slot.handler.handle(&event)));
            let failure = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err.to_string(),
                Err(payload) => format!("handler panicked: {}", panic_message(payload.as_ref())),
            };
            errors += 1;
            error!(
                topic = %event.topic(),
                event_id = %event.id(),
                handler = %slot.name,
                error = %failure,
                "Event handler failed"
            );
        }
        let elapsed = started.elapsed();

        self.state
            .lock()
            .metrics
            .entry(event.topic().to_string())
            .or_default()
            .record(handlers.len(), errors, elapsed);

        let delivered = handlers.len() - errors;
        log_bus_operation("publish", event.topic(), delivered, errors);
        delivered
    }

    /// Most recent events (oldest first), optionally restricted to one exact topic
    pub fn get_history(&self, topic: Option<&str>, limit: usize) -> Vec<EventRecord> {
        let state = self.state.lock();
        let matching: Vec<&EventRecord> = state
            .history
            .iter()
            .filter(|event| topic.map_or(true, |wanted| event.topic() == wanted))
            .collect();
        let skip = matching.len().saturating_sub(limit);
        matching.into_iter().skip(skip).cloned().collect()
    }

    pub fn clear_history(&self) {
        self.state.lock().history.clear();
    }

    pub fn get_metrics(&self) -> BusMetrics {
        let state = self.state.lock();
        let exact = state.count_by_kind(PatternKind::Exact);
        let wildcard = state.count_by_kind(PatternKind::Wildcard);
        let global = state.count_by_kind(PatternKind::Global);

        BusMetrics {
            topics: state.metrics.clone(),
            exact_subscriptions: exact,
            wildcard_subscriptions: wildcard,
            global_subscriptions: global,
            total_subscriptions: exact + wildcard + global,
            history_len: state.history.len(),
            history_capacity: self.history_capacity,
            suspended: self.is_suspended(),
            suppressed_publishes: state.suppressed_publishes,
        }
    }

    /// Subscriptions registered under exactly `pattern`, in dispatch order
    pub fn subscriptions(&self, pattern: &str) -> Vec<Subscription> {
        self.state
            .lock()
            .subscriptions
            .get(pattern)
            .map(|entry| {
                entry
                    .slots
                    .iter()
                    .map(|slot| Subscription {
                        pattern: pattern.to_string(),
                        name: slot.name.clone(),
                        priority: slot.priority,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self, pattern: &str) -> usize {
        self.state
            .lock()
            .subscriptions
            .get(pattern)
            .map_or(0, |entry| entry.slots.len())
    }

    /// Patterns with at least one subscription, sorted
    pub fn patterns(&self) -> Vec<String> {
        let mut patterns: Vec<String> = self.state.lock().subscriptions.keys().cloned().collect();
        patterns.sort();
        patterns
    }

    /// Drop every subscription, the history and the metrics
    pub fn reset(&self) {
        let mut state = self.state.lock();
        *state = BusState::new(self.history_capacity);
        info!("Event bus reset");
    }

    pub fn suspend(&self) {
        self.suspended.store(true, Ordering::Release);
        info!("Event bus suspended");
    }

    pub fn resume(&self) {
        self.suspended.store(false, Ordering::Release);
        info!("Event bus resumed");
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthCheck for EventBus {
    fn health_check(&self) -> ServiceHealth {
        if self.is_suspended() {
            ServiceHealth::degraded("event bus is suspended")
        } else {
            ServiceHealth::healthy()
        }
    }
}
