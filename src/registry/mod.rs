//! # Registry Infrastructure
//!
//! Name-addressed singletons shared across the application.
//!
//! ## Available Types
//!
//! - **ServiceRegistry**: lazy, exactly-once construction of named services
//! - **HealthCheck**: capability a service implements to take part in
//!   `ServiceRegistry::health_check_global`
//!
//! ## Architecture
//!
//! ```text
//! ServiceRegistry
//! ├── RwLock<HashMap<name, ServiceEntry>>   (structural changes, reset_all)
//! └── ServiceEntry
//!     ├── factory / optional health probe / tags
//!     └── OnceCell<instance>                (per-entry construction)
//! ```

pub mod health;
pub mod service_registry;

pub use health::{GlobalHealthReport, HealthCheck, ServiceHealth};
pub use service_registry::{RegistryStats, ServiceInfo, ServiceInstance, ServiceRegistry};
