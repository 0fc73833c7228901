//! # Maison Core Configuration
//!
//! Typed configuration for the registry, event bus and retry queue. Every field
//! has a default so an empty file (or no file at all) yields a working setup;
//! [`ConfigLoader`] layers an optional TOML file and `MAISON__*` environment
//! variables on top.
//!
//! ```rust,no_run
//! use maison_core::config::ConfigLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::load(None)?;
//! println!("queue file: {}", config.retry_queue.persistence_path.display());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::defaults;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigLoader;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CoreConfig {
    /// Service registry settings
    pub registry: RegistryConfig,

    /// Event bus settings
    pub event_bus: EventBusConfig,

    /// Retry queue settings
    pub retry_queue: RetryQueueConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RegistryConfig {
    /// Log a warning when a live singleton is re-registered
    pub warn_on_reregister: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            warn_on_reregister: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EventBusConfig {
    /// Number of events kept in the history ring
    pub history_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            history_capacity: defaults::BUS_HISTORY_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RetryQueueConfig {
    /// Maximum number of live operations before the oldest is evicted
    pub capacity: usize,
    /// Attempts allowed when `enqueue` is not given an explicit maximum
    pub default_max_attempts: u32,
    /// Snapshot file location
    pub persistence_path: PathBuf,
    /// Write snapshots to `persistence_path`; an in-memory store is used otherwise
    pub persist: bool,
    /// Backoff between attempts
    pub backoff: BackoffConfig,
}

impl Default for RetryQueueConfig {
    fn default() -> Self {
        Self {
            capacity: defaults::QUEUE_CAPACITY,
            default_max_attempts: defaults::QUEUE_MAX_ATTEMPTS,
            persistence_path: PathBuf::from(defaults::QUEUE_PERSISTENCE_PATH),
            persist: true,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Exponential backoff settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_seconds: u64,
    pub max_seconds: u64,
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_seconds: defaults::BACKOFF_BASE_SECONDS,
            max_seconds: defaults::BACKOFF_MAX_SECONDS,
            multiplier: defaults::BACKOFF_MULTIPLIER,
        }
    }
}

impl BackoffConfig {
    pub fn base(&self) -> Duration {
        Duration::from_secs(self.base_seconds)
    }

    pub fn max(&self) -> Duration {
        Duration::from_secs(self.max_seconds)
    }
}

impl CoreConfig {
    /// Reject values that would make a component unusable
    pub fn validate(&self) -> ConfigResult<()> {
        if self.event_bus.history_capacity == 0 {
            return Err(invalid(
                "event_bus.history_capacity",
                &self.event_bus.history_capacity,
                "history capacity must be at least 1",
            ));
        }

        let queue = &self.retry_queue;
        if queue.capacity == 0 {
            return Err(invalid(
                "retry_queue.capacity",
                &queue.capacity,
                "queue capacity must be at least 1",
            ));
        }
        if queue.default_max_attempts == 0 {
            return Err(invalid(
                "retry_queue.default_max_attempts",
                &queue.default_max_attempts,
                "an operation needs at least one attempt",
            ));
        }
        if !(queue.backoff.multiplier >= 1.0) {
            return Err(invalid(
                "retry_queue.backoff.multiplier",
                &queue.backoff.multiplier,
                "multiplier must be >= 1.0",
            ));
        }
        if queue.backoff.base_seconds > queue.backoff.max_seconds {
            return Err(invalid(
                "retry_queue.backoff.base_seconds",
                &queue.backoff.base_seconds,
                "base delay exceeds max_seconds",
            ));
        }
        if queue.backoff.max_seconds > defaults::BACKOFF_MAX_SECONDS_LIMIT {
            return Err(invalid(
                "retry_queue.backoff.max_seconds",
                &queue.backoff.max_seconds,
                "maximum delay is one day (86400 seconds)",
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, value: &dyn std::fmt::Display, context: &str) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        context: context.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_constants() {
        let config = CoreConfig::default();
        assert_eq!(config.event_bus.history_capacity, 100);
        assert_eq!(config.retry_queue.capacity, 1000);
        assert_eq!(config.retry_queue.default_max_attempts, 5);
        assert_eq!(config.retry_queue.backoff.base(), Duration::from_secs(1));
        assert_eq!(config.retry_queue.backoff.max(), Duration::from_secs(60));
        assert_eq!(
            config.retry_queue.persistence_path,
            PathBuf::from("data/.file_attente.json")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_capacity() {
        let mut config = CoreConfig::default();
        config.retry_queue.capacity = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("retry_queue.capacity"));
    }

    #[test]
    fn validate_rejects_inverted_backoff_bounds() {
        let mut config = CoreConfig::default();
        config.retry_queue.backoff.base_seconds = 120;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_backoff_cap_over_one_day() {
        let mut config = CoreConfig::default();
        config.retry_queue.backoff.max_seconds = 86_400;
        assert!(config.validate().is_ok());

        config.retry_queue.backoff.base_seconds = 10_000_000_000_000;
        config.retry_queue.backoff.max_seconds = 10_000_000_000_000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("retry_queue.backoff.max_seconds"));
    }

    #[test]
    fn validate_rejects_shrinking_multiplier() {
        let mut config = CoreConfig::default();
        config.retry_queue.backoff.multiplier = 0.5;
        assert!(config.validate().is_err());

        config.retry_queue.backoff.multiplier = f64::NAN;
        assert!(config.validate().is_err());
    }
}
