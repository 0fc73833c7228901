//! # Service Registry
//!
//! Name-addressed lazy singletons shared by every domain service.
//!
//! ## Overview
//!
//! A service is registered once with a zero-argument factory (or a pre-built
//! instance) and built on first `get`. Construction happens exactly once per name
//! even when many threads race for it, and a thread building one service never
//! blocks threads asking for another.
//!
//! ## Locking
//!
//! - one structural `RwLock` over the name → entry map, held only long enough to
//!   clone an entry handle (or for the whole of `reset_all`)
//! - one lazy cell per entry; its `get_or_try_init` serialises the first callers
//!   of that entry only
//!
//! A failed construction leaves the cell empty, so the next `get` runs the factory
//! again.
//!
//! ## Usage
//!
//! ```rust
//! use maison_core::registry::ServiceRegistry;
//!
//! struct InventaireService { seuil: u32 }
//!
//! let registry = ServiceRegistry::new();
//! registry.register("inventaire", || Ok::<_, std::io::Error>(InventaireService { seuil: 3 }), &["domaine"]);
//!
//! let service = registry.get_typed::<InventaireService>("inventaire").unwrap();
//! assert_eq!(service.seuil, 3);
//! ```

use crate::config::RegistryConfig;
use crate::constants::HealthStatus;
use crate::error::{BoxError, RegistryError};
use crate::logging::log_registry_operation;
use crate::registry::health::{GlobalHealthReport, HealthCheck, ServiceHealth};
use crate::utils::panic_message;
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::any::{type_name, Any};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A constructed singleton, shared by every caller of `get`
pub type ServiceInstance = Arc<dyn Any + Send + Sync>;

type Factory = Arc<dyn Fn() -> Result<ServiceInstance, BoxError> + Send + Sync>;
type HealthProbe = Arc<dyn Fn(&ServiceInstance) -> ServiceHealth + Send + Sync>;

struct ServiceEntry {
    name: String,
    factory: Factory,
    probe: Option<HealthProbe>,
    tags: BTreeSet<String>,
    registered_at: DateTime<Utc>,
    /// Swapped for a fresh cell on reset
    cell: RwLock<Arc<OnceCell<ServiceInstance>>>,
    created_at: Mutex<Option<DateTime<Utc>>>,
    construction_ms: Mutex<Option<f64>>,
    access_count: AtomicU64,
    last_access: Mutex<Option<DateTime<Utc>>>,
}

impl ServiceEntry {
    fn new(name: &str, factory: Factory, probe: Option<HealthProbe>, tags: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            factory,
            probe,
            tags: tags.iter().map(|tag| tag.to_string()).collect(),
            registered_at: Utc::now(),
            cell: RwLock::new(Arc::new(OnceCell::new())),
            created_at: Mutex::new(None),
            construction_ms: Mutex::new(None),
            access_count: AtomicU64::new(0),
            last_access: Mutex::new(None),
        }
    }

    fn with_instance(
        name: &str,
        instance: ServiceInstance,
        probe: Option<HealthProbe>,
        tags: &[&str],
    ) -> Self {
        let retained = instance.clone();
        let factory: Factory = Arc::new(move || Ok(retained.clone()));
        let entry = Self::new(name, factory, probe, tags);
        // A fresh cell cannot already be set
        let _ = entry.cell.read().set(instance);
        *entry.created_at.lock() = Some(entry.registered_at);
        *entry.construction_ms.lock() = Some(0.0);
        entry
    }

    fn current(&self) -> Option<ServiceInstance> {
        self.cell.read().get().cloned()
    }

    fn is_instantiated(&self) -> bool {
        self.cell.read().get().is_some()
    }

    fn instance(&self) -> Result<ServiceInstance, RegistryError> {
        let cell = self.cell.read().clone();
        let instance = match cell.get() {
            Some(instance) => instance.clone(),
            None => cell.get_or_try_init(|| self.construct())?.clone(),
        };
        self.touch();
        Ok(instance)
    }

    fn construct(&self) -> Result<ServiceInstance, RegistryError> {
        let started = Instant::now();
        let instance = (self.factory)().map_err(|source| {
            warn!(service = %self.name, error = %source, "Service construction failed");
            RegistryError::Construction {
                name: self.name.clone(),
                source,
            }
        })?;
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        *self.created_at.lock() = Some(Utc::now());
        *self.construction_ms.lock() = Some(duration_ms);
        log_registry_operation("construct", &self.name, "created", Some(duration_ms));
        Ok(instance)
    }

    fn touch(&self) {
        self.access_count.fetch_add(1, Ordering::Relaxed);
        *self.last_access.lock() = Some(Utc::now());
    }

    fn reset(&self) -> bool {
        let mut cell = self.cell.write();
        let was_built = cell.get().is_some();
        *cell = Arc::new(OnceCell::new());
        *self.created_at.lock() = None;
        *self.construction_ms.lock() = None;
        was_built
    }

    fn info(&self) -> ServiceInfo {
        ServiceInfo {
            name: self.name.clone(),
            tags: self.tags.iter().cloned().collect(),
            instantiated: self.is_instantiated(),
            has_health_probe: self.probe.is_some(),
            registered_at: self.registered_at,
            created_at: *self.created_at.lock(),
            construction_ms: *self.construction_ms.lock(),
            access_count: self.access_count.load(Ordering::Relaxed),
            last_access: *self.last_access.lock(),
        }
    }
}

/// Snapshot of one registry entry
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub name: String,
    pub tags: Vec<String>,
    pub instantiated: bool,
    pub has_health_probe: bool,
    pub registered_at: DateTime<Utc>,
    pub created_at: Option<DateTime<Utc>>,
    pub construction_ms: Option<f64>,
    pub access_count: u64,
    pub last_access: Option<DateTime<Utc>>,
}

/// Registry-wide statistics
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub total_services: usize,
    pub instantiated_services: usize,
    pub total_accesses: u64,
    pub services: Vec<ServiceInfo>,
}

/// Thread-safe registry of lazily constructed singletons
pub struct ServiceRegistry {
    entries: RwLock<HashMap<String, Arc<ServiceEntry>>>,
    config: RegistryConfig,
}

impl ServiceRegistry {
    /// Create a new, empty registry
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Register a factory under `name`.
    ///
    /// Returns `false` without touching anything when `name` already holds a live
    /// instance. A factory registered earlier but never built is replaced.
    pub fn register<T, E, F>(&self, name: &str, factory: F, tags: &[&str]) -> bool
    where
        T: Any + Send + Sync,
        E: Into<BoxError>,
        F: Fn() -> Result<T, E> + Send + Sync + 'static,
    {
        self.insert_entry(ServiceEntry::new(name, erase_factory(factory), None, tags))
    }

    /// Register a factory for a service that can probe its own health
    pub fn register_checked<T, E, F>(&self, name: &str, factory: F, tags: &[&str]) -> bool
    where
        T: HealthCheck + Any,
        E: Into<BoxError>,
        F: Fn() -> Result<T, E> + Send + Sync + 'static,
    {
        self.insert_entry(ServiceEntry::new(
            name,
            erase_factory(factory),
            Some(probe_for::<T>()),
            tags,
        ))
    }

    /// Register an already built instance
    pub fn register_instance<T>(&self, name: &str, instance: Arc<T>, tags: &[&str]) -> bool
    where
        T: Any + Send + Sync,
    {
        self.insert_entry(ServiceEntry::with_instance(name, instance, None, tags))
    }

    /// Register an already built instance that can probe its own health
    pub fn register_instance_checked<T>(&self, name: &str, instance: Arc<T>, tags: &[&str]) -> bool
    where
        T: HealthCheck + Any,
    {
        self.insert_entry(ServiceEntry::with_instance(
            name,
            instance,
            Some(probe_for::<T>()),
            tags,
        ))
    }

    fn insert_entry(&self, entry: ServiceEntry) -> bool {
        let mut entries = self.entries.write();

        if let Some(existing) = entries.get(&entry.name) {
            if existing.is_instantiated() {
                if self.config.warn_on_reregister {
                    warn!(
                        service = %entry.name,
                        "Service already instantiated - registration ignored"
                    );
                } else {
                    debug!(service = %entry.name, "Service already instantiated - registration ignored");
                }
                return false;
            }
            debug!(service = %entry.name, "Replacing factory of unbuilt service");
        }

        info!(
            service = %entry.name,
            tags = ?entry.tags,
            prebuilt = entry.is_instantiated(),
            "Registered service"
        );
        entries.insert(entry.name.clone(), Arc::new(entry));
        true
    }

    fn entry(&self, name: &str) -> Result<Arc<ServiceEntry>, RegistryError> {
        self.entries
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotRegistered(name.to_string()))
    }

    /// Get the singleton registered under `name`, building it on first access
    pub fn get(&self, name: &str) -> Result<ServiceInstance, RegistryError> {
        self.entry(name)?.instance()
    }

    /// Get the singleton registered under `name` as a concrete type
    pub fn get_typed<T>(&self, name: &str) -> Result<Arc<T>, RegistryError>
    where
        T: Any + Send + Sync,
    {
        self.get(name)?
            .downcast::<T>()
            .map_err(|_| RegistryError::TypeMismatch {
                name: name.to_string(),
                expected: type_name::<T>(),
            })
    }

    /// Build (if needed) and return every service tagged `tag`
    pub fn by_tag(&self, tag: &str) -> Result<HashMap<String, ServiceInstance>, RegistryError> {
        let tagged: Vec<Arc<ServiceEntry>> = self
            .entries
            .read()
            .values()
            .filter(|entry| entry.tags.contains(tag))
            .cloned()
            .collect();

        tagged
            .into_iter()
            .map(|entry| Ok((entry.name.clone(), entry.instance()?)))
            .collect()
    }

    /// Drop the instance of `name`; the next `get` rebuilds it
    pub fn reset(&self, name: &str) -> Result<(), RegistryError> {
        let entry = self.entry(name)?;
        if entry.reset() {
            log_registry_operation("reset", name, "cleared", None);
        }
        Ok(())
    }

    /// Drop every instance, keeping registrations
    pub fn reset_all(&self) {
        let entries = self.entries.write();
        let cleared = entries.values().filter(|entry| entry.reset()).count();
        info!(cleared = cleared, "Reset all service instances");
    }

    /// Remove `name` entirely. Returns whether it was registered.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self.entries.write().remove(name).is_some();
        if removed {
            log_registry_operation("unregister", name, "removed", None);
        }
        removed
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    pub fn is_instantiated(&self, name: &str) -> bool {
        self.entries
            .read()
            .get(name)
            .map(|entry| entry.is_instantiated())
            .unwrap_or(false)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Probe every instantiated service exposing a health check
    pub fn health_check_global(&self) -> GlobalHealthReport {
        let entries: Vec<Arc<ServiceEntry>> = self.entries.read().values().cloned().collect();

        let mut services = BTreeMap::new();
        let mut uninstantiated = Vec::new();
        let mut worst = HealthStatus::Healthy;

        for entry in entries {
            let Some(instance) = entry.current() else {
                uninstantiated.push(entry.name.clone());
                continue;
            };
            let Some(probe) = &entry.probe else {
                continue;
            };

            let health = panic::catch_unwind(AssertUnwindSafe(|| probe(&instance)))
                .unwrap_or_else(|payload| {
                    ServiceHealth::unhealthy(format!(
                        "health probe panicked: {}",
                        panic_message(payload.as_ref())
                    ))
                });

            if !health.status.is_healthy() {
                warn!(
                    service = %entry.name,
                    status = %health.status,
                    message = ?health.message,
                    "Service reported unhealthy"
                );
            }
            worst = worst.combine(health.status);
            services.insert(entry.name.clone(), health);
        }

        // Global status is capped at Degraded
        let status = match worst {
            HealthStatus::Unhealthy => HealthStatus::Degraded,
            other => other,
        };

        uninstantiated.sort();
        GlobalHealthReport {
            status,
            services,
            uninstantiated,
            checked_at: Utc::now(),
        }
    }

    /// Per-entry statistics, sorted by name
    pub fn stats(&self) -> RegistryStats {
        let mut services: Vec<ServiceInfo> =
            self.entries.read().values().map(|entry| entry.info()).collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));

        RegistryStats {
            total_services: services.len(),
            instantiated_services: services.iter().filter(|info| info.instantiated).count(),
            total_accesses: services.iter().map(|info| info.access_count).sum(),
            services,
        }
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn erase_factory<T, E, F>(factory: F) -> Factory
where
    T: Any + Send + Sync,
    E: Into<BoxError>,
    F: Fn() -> Result<T, E> + Send + Sync + 'static,
{
    Arc::new(move || {
        factory()
            .map(|service| Arc::new(service) as ServiceInstance)
            .map_err(Into::into)
    })
}

fn probe_for<T: HealthCheck + Any>() -> HealthProbe {
    Arc::new(|instance: &ServiceInstance| match (**instance).downcast_ref::<T>() {
        Some(service) => service.health_check(),
        None => ServiceHealth::unhealthy(format!("instance is not a {}", type_name::<T>())),
    })
}
