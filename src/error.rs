//! Error types for the Maison core.
//!
//! Each component owns a narrow error enum; [`CoreError`] folds them together for
//! callers that drive several components at once (bootstrap, the inspection binary).

use crate::config::ConfigurationError;
use thiserror::Error;

/// Boxed error produced by service factories and event handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by the service registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Service '{0}' is not registered")]
    NotRegistered(String),
    #[error("Service '{name}' failed to construct: {source}")]
    Construction {
        name: String,
        #[source]
        source: BoxError,
    },
    #[error("Service '{name}' is not of the expected type {expected}")]
    TypeMismatch { name: String, expected: &'static str },
}

/// Error returned by an event handler. Never propagated to the publisher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

/// Failure of one retry-queue attempt.
///
/// Resolution and execution failures share the same retry path; only the
/// rendered message is kept on the operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallbackError {
    #[error("Callback '{0}' is not registered")]
    Unresolved(String),
    #[error("{0}")]
    Failed(String),
    #[error("Callback panicked: {0}")]
    Panicked(String),
}

impl CallbackError {
    pub fn failed(message: impl Into<String>) -> Self {
        CallbackError::Failed(message.into())
    }
}

/// Persistence failures of a queue store.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Queue serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

pub type Result<T> = std::result::Result<T, CoreError>;
