//! # Application Context
//!
//! Builds the infrastructure once at process start and hands it to every
//! component that needs it. The bus and the queue are also registered in the
//! registry (tag `infrastructure`) so domain code can look them up by name.
//!
//! ```rust
//! use maison_core::config::CoreConfig;
//! use maison_core::context::AppContext;
//!
//! let mut config = CoreConfig::default();
//! config.retry_queue.persist = false;
//!
//! let context = AppContext::bootstrap(config).expect("valid configuration");
//! assert!(context.status().health.is_healthy());
//! ```

use crate::config::CoreConfig;
use crate::constants::services::{EVENT_BUS, INFRASTRUCTURE_TAG, RETRY_QUEUE};
use crate::error::Result;
use crate::events::EventBus;
use crate::queue::{CallbackRegistry, QueueStats, RetryQueue};
use crate::registry::{GlobalHealthReport, ServiceRegistry};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Shared infrastructure handles
#[derive(Clone)]
pub struct AppContext {
    config: Arc<CoreConfig>,
    registry: Arc<ServiceRegistry>,
    event_bus: Arc<EventBus>,
    retry_queue: Arc<RetryQueue>,
}

/// Point-in-time summary of the infrastructure
#[derive(Debug, Clone, Serialize)]
pub struct ContextStatus {
    pub health: GlobalHealthReport,
    pub registered_services: usize,
    pub instantiated_services: usize,
    pub bus_subscriptions: usize,
    pub bus_emissions: u64,
    pub bus_handler_errors: u64,
    pub bus_suspended: bool,
    pub queue: QueueStats,
}

impl AppContext {
    /// Validate `config` and build the context with an empty callback table
    pub fn bootstrap(config: CoreConfig) -> Result<Self> {
        Self::bootstrap_with_callbacks(config, Arc::new(CallbackRegistry::new()))
    }

    /// Validate `config` and build the context around an existing callback table
    pub fn bootstrap_with_callbacks(
        config: CoreConfig,
        callbacks: Arc<CallbackRegistry>,
    ) -> Result<Self> {
        let started = Instant::now();
        info!("🚀 BOOTSTRAP: Starting infrastructure bootstrap");

        config.validate()?;

        let registry = Arc::new(ServiceRegistry::with_config(config.registry.clone()));
        let event_bus = Arc::new(EventBus::with_config(&config.event_bus));
        let retry_queue = Arc::new(RetryQueue::open(&config.retry_queue, callbacks));

        registry.register_instance_checked(EVENT_BUS, event_bus.clone(), &[INFRASTRUCTURE_TAG]);
        registry.register_instance_checked(
            RETRY_QUEUE,
            retry_queue.clone(),
            &[INFRASTRUCTURE_TAG],
        );

        info!(
            persist = config.retry_queue.persist,
            queued_operations = retry_queue.len(),
            duration_ms = started.elapsed().as_secs_f64() * 1000.0,
            "🎉 BOOTSTRAP: Infrastructure ready"
        );

        Ok(Self {
            config: Arc::new(config),
            registry,
            event_bus,
            retry_queue,
        })
    }

    /// Context with an in-memory queue, for tests
    pub fn for_testing() -> Result<Self> {
        let mut config = CoreConfig::default();
        config.retry_queue.persist = false;
        Self::bootstrap(config)
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn retry_queue(&self) -> &Arc<RetryQueue> {
        &self.retry_queue
    }

    pub fn callbacks(&self) -> &Arc<CallbackRegistry> {
        self.retry_queue.callbacks()
    }

    pub fn status(&self) -> ContextStatus {
        let registry_stats = self.registry.stats();
        let bus_metrics = self.event_bus.get_metrics();

        ContextStatus {
            health: self.registry.health_check_global(),
            registered_services: registry_stats.total_services,
            instantiated_services: registry_stats.instantiated_services,
            bus_subscriptions: bus_metrics.total_subscriptions,
            bus_emissions: bus_metrics.total_emissions(),
            bus_handler_errors: bus_metrics.total_handler_errors(),
            bus_suspended: bus_metrics.suspended,
            queue: self.retry_queue.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::HealthStatus;
    use crate::error::CoreError;
    use crate::events::EventData;

    #[test]
    fn test_bootstrap_registers_infrastructure() {
        let context = AppContext::for_testing().unwrap();
        let registry = context.registry();

        let bus = registry.get_typed::<EventBus>(EVENT_BUS).unwrap();
        assert!(Arc::ptr_eq(&bus, context.event_bus()));
        let queue = registry.get_typed::<RetryQueue>(RETRY_QUEUE).unwrap();
        assert!(Arc::ptr_eq(&queue, context.retry_queue()));

        let infrastructure = registry.by_tag(INFRASTRUCTURE_TAG).unwrap();
        assert_eq!(infrastructure.len(), 2);
    }

    #[test]
    fn test_status_reflects_components() {
        let context = AppContext::for_testing().unwrap();
        context.event_bus().publish("stock.modifie", EventData::new(), "test");

        let status = context.status();
        assert!(status.health.is_healthy());
        assert_eq!(status.registered_services, 2);
        assert_eq!(status.bus_emissions, 1);
        assert_eq!(status.queue.en_file, 0);

        context.event_bus().suspend();
        assert_eq!(context.status().health.status, HealthStatus::Degraded);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = CoreConfig::default();
        config.retry_queue.persist = false;
        config.retry_queue.capacity = 0;

        let err = AppContext::bootstrap(config).err().unwrap();
        assert!(matches!(err, CoreError::Configuration(_)));
    }
}
