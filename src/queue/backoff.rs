//! # Backoff Policy
//!
//! Exponential delay between retry attempts:
//! `delay(n) = min(base * multiplier^(n-1), max)` for the `n`-th failed attempt.
//! With the defaults (1s, x2, 60s) the sequence is 1, 2, 4, 8, 16, 32, 60, 60, ...

use crate::config::BackoffConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay after the first failed attempt, in seconds
    pub base_seconds: u64,
    /// Maximum delay cap in seconds
    pub max_seconds: u64,
    /// Exponential multiplier (default: 2.0)
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from(&BackoffConfig::default())
    }
}

impl From<&BackoffConfig> for BackoffPolicy {
    fn from(config: &BackoffConfig) -> Self {
        Self {
            base_seconds: config.base_seconds,
            max_seconds: config.max_seconds,
            multiplier: config.multiplier,
        }
    }
}

impl BackoffPolicy {
    /// Delay in whole seconds after `attempts` failed attempts (1-based)
    pub fn delay_seconds(&self, attempts: u32) -> u64 {
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let exponential_delay = self.base_seconds as f64 * self.multiplier.powi(exponent);

        // Apply maximum cap; NaN and infinity fall back to the cap
        if exponential_delay.is_finite() {
            exponential_delay.min(self.max_seconds as f64) as u64
        } else {
            self.max_seconds
        }
    }

    pub fn delay(&self, attempts: u32) -> Duration {
        Duration::from_secs(self.delay_seconds(attempts))
    }
}
