//! # Retry Queue
//!
//! Persisted list of failed operations retried with exponential backoff.
//!
//! ## Core Components
//!
//! - **RetryQueue**: enqueue, sweep, inspection and lifetime statistics
//! - **CallbackRegistry**: names resolved to functions when an operation runs
//! - **QueueStore**: snapshot persistence (`JsonFileStore`, `MemoryStore`)
//! - **BackoffPolicy**: `min(base * multiplier^(n-1), max)` delays
//! - **Clock**: time source (`SystemClock`, `ManualClock`)
//!
//! ## Usage
//!
//! ```rust
//! use maison_core::queue::{CallbackRegistry, Payload, RetryQueue};
//! use std::sync::Arc;
//!
//! let callbacks = Arc::new(CallbackRegistry::new());
//! callbacks.register("recettes.creer", |_payload| Ok(()));
//!
//! let queue = RetryQueue::in_memory(callbacks);
//! queue.enqueue("recette.creer", Payload::new(), "recettes.creer", Some(3));
//!
//! let summary = queue.process_batch();
//! assert_eq!(summary.succeeded, 1);
//! assert!(queue.is_empty());
//! ```

pub mod backoff;
pub mod callbacks;
pub mod clock;
pub mod operation;
pub mod retry_queue;
pub mod store;

pub use backoff::BackoffPolicy;
pub use callbacks::{Callback, CallbackRegistry};
pub use clock::{Clock, ManualClock, SystemClock};
pub use operation::{OperationStatus, Payload, QueueOperation};
pub use retry_queue::{BatchSummary, QueueStats, RetryQueue};
pub use store::{JsonFileStore, MemoryStore, QueueStore};
