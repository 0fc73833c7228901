use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Arguments handed to a callback
pub type Payload = Map<String, Value>;

/// Lifecycle of a queued operation.
///
/// A failed attempt that will be retried goes back to `Pending` with
/// `last_error` set. `Succeeded` and `Abandoned` are terminal and purged at the
/// end of the sweep that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OperationStatus {
    #[serde(rename = "en_attente")]
    Pending,
    #[serde(rename = "en_cours")]
    Running,
    #[serde(rename = "reussie")]
    Succeeded,
    #[serde(rename = "abandonnee")]
    Abandoned,
}

impl OperationStatus {
    /// Persisted name
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "en_attente",
            OperationStatus::Running => "en_cours",
            OperationStatus::Succeeded => "reussie",
            OperationStatus::Abandoned => "abandonnee",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationStatus::Succeeded | OperationStatus::Abandoned)
    }

    /// Parse either the persisted name or the English variant name
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "en_attente" | "pending" => Some(OperationStatus::Pending),
            "en_cours" | "running" => Some(OperationStatus::Running),
            "reussie" | "succeeded" => Some(OperationStatus::Succeeded),
            "abandonnee" | "abandoned" => Some(OperationStatus::Abandoned),
            _ => None,
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed operation awaiting retry, as persisted in the snapshot file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueOperation {
    pub id: u64,
    /// Label of the domain operation (`recette.creer`)
    pub operation: String,
    /// Name looked up in the `CallbackRegistry` when the operation is processed
    pub callback: String,
    pub payload: Payload,
    #[serde(rename = "statut")]
    pub status: OperationStatus,
    #[serde(rename = "tentatives")]
    pub attempts: u32,
    #[serde(rename = "max_tentatives")]
    pub max_attempts: u32,
    #[serde(rename = "derniere_erreur", default)]
    pub last_error: Option<String>,
    #[serde(rename = "cree_le")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "prochaine_tentative")]
    pub next_attempt_at: DateTime<Utc>,
    #[serde(rename = "backoff_secondes", default)]
    pub backoff_seconds: u64,
}

impl QueueOperation {
    pub(crate) fn new(
        id: u64,
        operation: &str,
        callback: &str,
        payload: Payload,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            operation: operation.to_string(),
            callback: callback.to_string(),
            payload,
            status: OperationStatus::Pending,
            attempts: 0,
            max_attempts,
            last_error: None,
            created_at: now,
            next_attempt_at: now,
            backoff_seconds: 0,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == OperationStatus::Pending && self.next_attempt_at <= now
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}
