#![allow(clippy::doc_markdown)] // Allow domain terms like maison, recette in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Maison Core
//!
//! In-process service infrastructure shared by every domain module of the Maison
//! home-management application (recipes, inventory, planning, household upkeep).
//!
//! ## Overview
//!
//! Three independent components, all safe to call from many threads at once and
//! all running on the calling thread:
//!
//! - **Service Registry**: name to lazily constructed singleton, built exactly
//!   once even under concurrent first access
//! - **Event Bus**: synchronous publish/subscribe with exact, `prefix.*` and `*`
//!   subscriptions dispatched by priority
//! - **Retry Queue**: failed operations retried with exponential backoff and
//!   persisted as a JSON snapshot that survives restarts
//!
//! [`context::AppContext`] builds all three once and registers the bus and the
//! queue in the registry.
//!
//! ## Module Organization
//!
//! - [`registry`] - Lazy singletons and health probing
//! - [`events`] - Event bus, records, handlers and topic patterns
//! - [`queue`] - Retry queue, callbacks, persistence and backoff
//! - [`context`] - Application context bootstrap
//! - [`config`] - Layered configuration
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust
//! use maison_core::config::CoreConfig;
//! use maison_core::context::AppContext;
//! use maison_core::events::{handler_fn, EventData};
//!
//! # fn main() -> maison_core::Result<()> {
//! let mut config = CoreConfig::default();
//! config.retry_queue.persist = false;
//! let context = AppContext::bootstrap(config)?;
//!
//! context.event_bus().subscribe(
//!     "depenses.*",
//!     handler_fn("budget_cache", |_event| Ok(())),
//!     0,
//! );
//! let delivered = context
//!     .event_bus()
//!     .publish("depenses.modifiee", EventData::new(), "budget");
//! assert_eq!(delivered, 1);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod events;
pub mod logging;
pub mod queue;
pub mod registry;
pub mod utils;

pub use config::{BackoffConfig, CoreConfig, EventBusConfig, RegistryConfig, RetryQueueConfig};
pub use constants::HealthStatus;
pub use context::{AppContext, ContextStatus};
pub use error::{CallbackError, CoreError, HandlerError, QueueError, RegistryError, Result};
pub use events::{handler_fn, EventBus, EventData, EventHandler, EventRecord};
pub use queue::{CallbackRegistry, OperationStatus, Payload, QueueOperation, RetryQueue};
pub use registry::{HealthCheck, ServiceHealth, ServiceRegistry};
