//! # Callback Registry
//!
//! Name to function table used by the retry queue. Operations only store the
//! callback name, so they survive a restart; the function is looked up each
//! time the operation is processed. An unknown name is an ordinary failed
//! attempt.

use super::operation::Payload;
use crate::error::{BoxError, CallbackError};
use crate::utils::panic_message;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

/// Function retried by the queue
pub type Callback = Arc<dyn Fn(&Payload) -> Result<(), BoxError> + Send + Sync>;

#[derive(Default)]
pub struct CallbackRegistry {
    callbacks: RwLock<HashMap<String, Callback>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` under `name`, replacing any previous function
    pub fn register<F>(&self, name: &str, callback: F)
    where
        F: Fn(&Payload) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let replaced = self
            .callbacks
            .write()
            .insert(name.to_string(), Arc::new(callback))
            .is_some();
        if replaced {
            warn!(callback = %name, "Replacing registered callback");
        } else {
            debug!(callback = %name, "Registered callback");
        }
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.callbacks.write().remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.callbacks.read().contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.callbacks.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn resolve(&self, name: &str) -> Result<Callback, CallbackError> {
        self.callbacks
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| CallbackError::Unresolved(name.to_string()))
    }

    /// Resolve and run `name`, turning errors and panics into a `CallbackError`.
    ///
    /// The table lock is released before the callback runs.
    pub fn invoke(&self, name: &str, payload: &Payload) -> Result<(), CallbackError> {
        let callback = self.resolve(name)?;
        match panic::catch_unwind(AssertUnwindSafe(|| callback(payload))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(CallbackError::Failed(err.to_string())),
            Err(payload) => Err(CallbackError::Panicked(panic_message(payload.as_ref()))),
        }
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("callbacks", &self.names())
            .finish()
    }
}
