//! Health probing for registered services.

use crate::constants::HealthStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Capability implemented by services that can report their own health.
///
/// Registered through `ServiceRegistry::register_checked` or
/// `ServiceRegistry::register_instance_checked`.
pub trait HealthCheck: Send + Sync {
    fn health_check(&self) -> ServiceHealth;
}

/// Result of probing one service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: HealthStatus,
    pub message: Option<String>,
}

impl ServiceHealth {
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            message: None,
        }
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Degraded,
            message: Some(message.into()),
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
        }
    }
}

/// Registry-wide health report.
///
/// Only instantiated services with a probe take part in `status`; services that
/// were never built are listed in `uninstantiated`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalHealthReport {
    pub status: HealthStatus,
    pub services: BTreeMap<String, ServiceHealth>,
    pub uninstantiated: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

impl GlobalHealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status.is_healthy()
    }

    /// Names of probed services that did not report healthy
    pub fn failing_services(&self) -> Vec<&str> {
        self.services
            .iter()
            .filter(|(_, health)| !health.status.is_healthy())
            .map(|(name, _)| name.as_str())
            .collect()
    }
}
