use super::record::EventRecord;
use crate::error::HandlerError;
use std::sync::Arc;

/// Receiver of published events.
///
/// Handlers run synchronously on the publishing thread. An `Err` (or a panic)
/// is logged and counted by the bus; the remaining handlers still run.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &EventRecord) -> Result<(), HandlerError>;

    /// Name used in logs and subscription listings
    fn name(&self) -> &str {
        "anonymous_handler"
    }
}

/// Closure-backed handler
pub struct FnHandler<F> {
    name: String,
    handler: F,
}

impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&EventRecord) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, event: &EventRecord) -> Result<(), HandlerError> {
        (self.handler)(event)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Wrap a closure as a shareable handler.
///
/// Keep the returned `Arc` to unsubscribe later; identity is by pointer.
pub fn handler_fn<F>(name: impl Into<String>, handler: F) -> Arc<dyn EventHandler>
where
    F: Fn(&EventRecord) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    Arc::new(FnHandler {
        name: name.into(),
        handler,
    })
}

/// Pointer identity, ignoring vtables
pub(crate) fn same_handler(a: &Arc<dyn EventHandler>, b: &Arc<dyn EventHandler>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
