use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Dispatch counters for one topic
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TopicMetrics {
    pub emissions: u64,
    pub handlers_invoked: u64,
    pub handler_errors: u64,
    pub total_dispatch_ms: f64,
    pub last_emission: Option<DateTime<Utc>>,
}

impl TopicMetrics {
    pub(crate) fn record(&mut self, invoked: usize, errors: usize, elapsed: Duration) {
        self.emissions += 1;
        self.handlers_invoked += invoked as u64;
        self.handler_errors += errors as u64;
        self.total_dispatch_ms += elapsed.as_secs_f64() * 1000.0;
        self.last_emission = Some(Utc::now());
    }

    pub fn average_dispatch_ms(&self) -> f64 {
        if self.emissions == 0 {
            0.0
        } else {
            self.total_dispatch_ms / self.emissions as f64
        }
    }
}

/// Snapshot returned by `EventBus::get_metrics`
#[derive(Debug, Clone, Serialize)]
pub struct BusMetrics {
    pub topics: BTreeMap<String, TopicMetrics>,
    pub exact_subscriptions: usize,
    pub wildcard_subscriptions: usize,
    pub global_subscriptions: usize,
    pub total_subscriptions: usize,
    pub history_len: usize,
    pub history_capacity: usize,
    pub suspended: bool,
    pub suppressed_publishes: u64,
}

impl BusMetrics {
    pub fn total_emissions(&self) -> u64 {
        self.topics.values().map(|topic| topic.emissions).sum()
    }

    pub fn total_handler_errors(&self) -> u64 {
        self.topics.values().map(|topic| topic.handler_errors).sum()
    }
}
