//! # System Constants
//!
//! Defaults, well-known names and shared enums used across the registry, the
//! event bus and the retry queue.

use serde::{Deserialize, Serialize};

/// Compiled defaults backing `CoreConfig::default()`
pub mod defaults {
    pub const BUS_HISTORY_CAPACITY: usize = 100;
    pub const QUEUE_CAPACITY: usize = 1000;
    pub const QUEUE_MAX_ATTEMPTS: u32 = 5;
    pub const QUEUE_PERSISTENCE_PATH: &str = "data/.file_attente.json";
    pub const BACKOFF_BASE_SECONDS: u64 = 1;
    pub const BACKOFF_MAX_SECONDS: u64 = 60;
    pub const BACKOFF_MULTIPLIER: f64 = 2.0;
    /// Upper bound accepted for `backoff.max_seconds` (one day)
    pub const BACKOFF_MAX_SECONDS_LIMIT: u64 = 86_400;
}

/// Registry names of the infrastructure singletons installed by `AppContext`
pub mod services {
    pub const EVENT_BUS: &str = "event_bus";
    pub const RETRY_QUEUE: &str = "retry_queue";
    pub const INFRASTRUCTURE_TAG: &str = "infrastructure";
}

/// Topics published by the domain services
pub mod topics {
    pub const STOCK_MODIFIE: &str = "stock.modifie";
    pub const STOCK_AJOUTE: &str = "stock.ajoute";
    pub const RECETTE_PLANIFIEE: &str = "recette.planifiee";
    pub const DEPENSES_MODIFIEE: &str = "depenses.modifiee";
    pub const ENTRETIEN_ROUTINE_CREEE: &str = "entretien.routine_creee";

    /// Matches every topic
    pub const ALL: &str = "*";
    /// Suffix turning a topic prefix into a wildcard pattern
    pub const WILDCARD_SUFFIX: &str = ".*";
    pub const SEPARATOR: char = '.';
}

/// Health verdict for a single service or for the whole registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Check if this health status indicates normal operation
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    /// Worst of two statuses
    pub fn combine(self, other: HealthStatus) -> HealthStatus {
        use HealthStatus::*;
        match (self, other) {
            (Unhealthy, _) | (_, Unhealthy) => Unhealthy,
            (Degraded, _) | (_, Degraded) => Degraded,
            _ => Healthy,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        };
        f.write_str(label)
    }
}
