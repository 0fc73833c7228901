use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicI64, Ordering};

/// String-keyed event payload
pub type EventData = Map<String, Value>;

static LAST_ID_MILLIS: AtomicI64 = AtomicI64::new(0);

/// Strictly increasing millisecond stamp, shared by every bus in the process
fn next_id_millis(now: DateTime<Utc>) -> i64 {
    let now_ms = now.timestamp_millis();
    let previous = LAST_ID_MILLIS
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
            Some(now_ms.max(last + 1))
        })
        .unwrap_or(now_ms);
    now_ms.max(previous + 1)
}

/// A published event. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    id: String,
    topic: String,
    data: EventData,
    source: String,
    timestamp: DateTime<Utc>,
}

impl EventRecord {
    /// Build a record with an id derived from the topic and a unique millisecond stamp
    pub fn new(topic: impl Into<String>, data: EventData, source: impl Into<String>) -> Self {
        let topic = topic.into();
        let timestamp = Utc::now();
        let id = format!("{}_{}", topic, next_id_millis(timestamp));
        Self {
            id,
            topic,
            data,
            source: source.into(),
            timestamp,
        }
    }

    /// Build a record keeping a caller-supplied id
    pub fn with_id(
        id: impl Into<String>,
        topic: impl Into<String>,
        data: EventData,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            topic: topic.into(),
            data,
            source: source.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn data(&self) -> &EventData {
        &self.data
    }

    /// Single payload field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    fn data(value: Value) -> EventData {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn generated_ids_are_unique_and_prefixed() {
        let ids: HashSet<String> = (0..50)
            .map(|_| EventRecord::new("stock.modifie", EventData::new(), "test").id().to_string())
            .collect();
        assert_eq!(ids.len(), 50);
        assert!(ids.iter().all(|id| id.starts_with("stock.modifie_")));
    }

    #[test]
    fn caller_id_is_kept() {
        let record = EventRecord::with_id("evt-1", "recette.planifiee", data(json!({"nom": "Tarte"})), "planning");
        assert_eq!(record.id(), "evt-1");
        assert_eq!(record.get("nom"), Some(&json!("Tarte")));
        assert_eq!(record.source(), "planning");
    }
}
