//! # Event System
//!
//! In-process publish/subscribe used by the domain services to announce state
//! changes (`stock.modifie`, `depenses.modifiee`, ...) to cache-invalidation and
//! notification listeners.
//!
//! ## Core Components
//!
//! - **EventBus**: subscription table, bounded history and dispatch metrics
//! - **EventRecord**: immutable event with a generated or caller-supplied id
//! - **EventHandler**: handler capability; closures via [`handler_fn`]
//! - **TopicPattern**: exact, `prefix.*` and `*` matching on topic segments

pub mod bus;
pub mod handler;
pub mod metrics;
pub mod record;
pub mod topic;

pub use bus::{EventBus, Subscription};
pub use handler::{handler_fn, EventHandler, FnHandler};
pub use metrics::{BusMetrics, TopicMetrics};
pub use record::{EventData, EventRecord};
pub use topic::{PatternKind, TopicPattern};
