//! # Retry Queue
//!
//! Failed operations are kept in a bounded list and retried with exponential
//! backoff until they succeed or run out of attempts.
//!
//! ## Sweep
//!
//! `process_batch` works in three phases:
//!
//! 1. Under the state lock, every due `Pending` operation is marked `Running`
//!    with its attempt count incremented, and the snapshot is persisted.
//! 2. With the state lock released, each callback is resolved by name and run.
//!    A callback may therefore enqueue new operations.
//! 3. Each outcome is applied under the lock. Operations removed in the
//!    meantime are skipped. Terminal operations are purged and the snapshot
//!    persisted again.
//!
//! A second lock serialises sweeps so one operation never runs twice at once.
//!
//! Persistence is best-effort: store failures are logged and surface through
//! the health probe, never as errors to the caller.

use super::backoff::BackoffPolicy;
use super::callbacks::CallbackRegistry;
use super::clock::{Clock, SystemClock};
use super::operation::{OperationStatus, Payload, QueueOperation};
use super::store::{JsonFileStore, MemoryStore, QueueStore};
use crate::config::RetryQueueConfig;
use crate::logging::{log_error, log_queue_operation};
use crate::registry::{HealthCheck, ServiceHealth};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Outcome of one `process_batch` call
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    /// Callbacks invoked
    pub processed: usize,
    pub succeeded: usize,
    /// Failed and rescheduled
    pub retrying: usize,
    pub abandoned: usize,
    /// Live operations after the purge
    pub remaining: usize,
    pub duration_ms: f64,
}

/// Lifetime totals plus the live breakdown
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueStats {
    pub total_ajoutees: u64,
    pub total_reussies: u64,
    pub total_echouees: u64,
    pub total_abandonnees: u64,
    pub total_evincees: u64,
    /// Live operations
    pub en_file: usize,
    pub capacite: usize,
    pub par_statut: BTreeMap<String, usize>,
    pub par_operation: BTreeMap<String, usize>,
}

#[derive(Debug, Default)]
struct Totals {
    enqueued: u64,
    succeeded: u64,
    failed: u64,
    abandoned: u64,
    evicted: u64,
}

struct QueueState {
    operations: Vec<QueueOperation>,
    next_id: u64,
    totals: Totals,
    last_persist_error: Option<String>,
}

/// Work item copied out of the state for phase 2
struct DueOperation {
    id: u64,
    label: String,
    callback: String,
    payload: Payload,
}

pub struct RetryQueue {
    state: Mutex<QueueState>,
    sweep: Mutex<()>,
    store: Arc<dyn QueueStore>,
    callbacks: Arc<CallbackRegistry>,
    clock: Arc<dyn Clock>,
    backoff: BackoffPolicy,
    capacity: usize,
    default_max_attempts: u32,
}

impl RetryQueue {
    /// Open the queue described by `config` on the wall clock.
    ///
    /// Uses a `JsonFileStore` at `persistence_path` when `persist` is set and a
    /// `MemoryStore` otherwise.
    pub fn open(config: &RetryQueueConfig, callbacks: Arc<CallbackRegistry>) -> Self {
        let store: Arc<dyn QueueStore> = if config.persist {
            Arc::new(JsonFileStore::new(&config.persistence_path))
        } else {
            Arc::new(MemoryStore::new())
        };
        Self::with_parts(config, store, callbacks, Arc::new(SystemClock))
    }

    /// In-memory queue with default settings
    pub fn in_memory(callbacks: Arc<CallbackRegistry>) -> Self {
        Self::with_parts(
            &RetryQueueConfig::default(),
            Arc::new(MemoryStore::new()),
            callbacks,
            Arc::new(SystemClock),
        )
    }

    /// Open a queue over an explicit store and clock.
    ///
    /// The last snapshot is loaded; `Running` operations are reclassified
    /// `Pending` and the id counter moves past the highest id seen. A snapshot
    /// that cannot be read is logged and the queue starts empty.
    pub fn with_parts(
        config: &RetryQueueConfig,
        store: Arc<dyn QueueStore>,
        callbacks: Arc<CallbackRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let operations = match store.load() {
            Ok(mut operations) => {
                let mut recovered = 0usize;
                for op in operations
                    .iter_mut()
                    .filter(|op| op.status == OperationStatus::Running)
                {
                    op.status = OperationStatus::Pending;
                    recovered += 1;
                }
                if recovered > 0 {
                    info!(
                        store = %store.describe(),
                        recovered = recovered,
                        "Recovered interrupted operations as pending"
                    );
                }
                operations
            }
            Err(e) => {
                log_error(
                    "retry_queue",
                    "load",
                    &e.to_string(),
                    Some(&store.describe()),
                );
                Vec::new()
            }
        };

        let next_id = operations.iter().map(|op| op.id).max().unwrap_or(0) + 1;
        debug!(
            store = %store.describe(),
            operations = operations.len(),
            next_id = next_id,
            "Retry queue opened"
        );

        Self {
            state: Mutex::new(QueueState {
                operations,
                next_id,
                totals: Totals::default(),
                last_persist_error: None,
            }),
            sweep: Mutex::new(()),
            store,
            callbacks,
            clock,
            backoff: BackoffPolicy::from(&config.backoff),
            capacity: config.capacity.max(1),
            default_max_attempts: config.default_max_attempts.max(1),
        }
    }

    /// Queue a failed operation for retry. Returns its id.
    ///
    /// `max_attempts` falls back to the configured default. When the queue is
    /// full the oldest operation is evicted.
    pub fn enqueue(
        &self,
        operation: &str,
        payload: Payload,
        callback: &str,
        max_attempts: Option<u32>,
    ) -> u64 {
        let max_attempts = max_attempts.unwrap_or(self.default_max_attempts).max(1);
        let now = self.clock.now();

        let mut state = self.state.lock();
        while state.operations.len() >= self.capacity {
            let evicted = state.operations.remove(0);
            state.totals.evicted += 1;
            warn!(
                operation_id = evicted.id,
                label = %evicted.operation,
                status = %evicted.status,
                capacity = self.capacity,
                "Retry queue full - evicting oldest operation"
            );
        }

        let id = state.next_id;
        state.next_id += 1;
        state.operations.push(QueueOperation::new(
            id,
            operation,
            callback,
            payload,
            max_attempts,
            now,
        ));
        state.totals.enqueued += 1;
        self.persist(&mut state);
        drop(state);

        log_queue_operation("enqueue", Some(id), operation, OperationStatus::Pending.as_str());
        id
    }

    /// Run every due operation once
    pub fn process_batch(&self) -> BatchSummary {
        let _sweep = self.sweep.lock();
        let started = Instant::now();
        let mut summary = BatchSummary::default();

        let due = self.claim_due();

        for job in due {
            let outcome = self.callbacks.invoke(&job.callback, &job.payload);
            summary.processed += 1;

            let mut state = self.state.lock();
            let now = self.clock.now();
            let QueueState {
                operations, totals, ..
            } = &mut *state;
            let Some(op) = operations.iter_mut().find(|op| op.id == job.id) else {
                debug!(operation_id = job.id, "Operation removed while running - outcome dropped");
                continue;
            };

            match outcome {
                Ok(()) => {
                    op.status = OperationStatus::Succeeded;
                    op.last_error = None;
                    totals.succeeded += 1;
                    summary.succeeded += 1;
                    log_queue_operation("process", Some(job.id), &job.label, op.status.as_str());
                }
                Err(err) => {
                    totals.failed += 1;
                    op.last_error = Some(err.to_string());
                    if op.attempts_exhausted() {
                        op.status = OperationStatus::Abandoned;
                        totals.abandoned += 1;
                        summary.abandoned += 1;
                        warn!(
                            operation_id = job.id,
                            label = %job.label,
                            attempts = op.attempts,
                            error = %err,
                            "Operation abandoned after exhausting attempts"
                        );
                    } else {
                        let delay = self.backoff.delay_seconds(op.attempts);
                        op.backoff_seconds = delay;
                        op.next_attempt_at = retry_at(now, delay);
                        op.status = OperationStatus::Pending;
                        summary.retrying += 1;
                        info!(
                            operation_id = job.id,
                            label = %job.label,
                            attempts = op.attempts,
                            max_attempts = op.max_attempts,
                            backoff_seconds = delay,
                            error = %err,
                            "Operation failed - retry scheduled"
                        );
                    }
                }
            }
        }

        let mut state = self.state.lock();
        let before = state.operations.len();
        state.operations.retain(|op| !op.status.is_terminal());
        let purged = before - state.operations.len();
        if summary.processed > 0 || purged > 0 {
            self.persist(&mut state);
        }
        summary.remaining = state.operations.len();
        drop(state);

        summary.duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        if summary.processed > 0 {
            info!(
                processed = summary.processed,
                succeeded = summary.succeeded,
                retrying = summary.retrying,
                abandoned = summary.abandoned,
                remaining = summary.remaining,
                duration_ms = summary.duration_ms,
                "Retry batch processed"
            );
        }
        summary
    }

    /// Phase 1: mark due operations running and copy out what phase 2 needs
    fn claim_due(&self) -> Vec<DueOperation> {
        let now = self.clock.now();
        let mut state = self.state.lock();

        let due: Vec<DueOperation> = state
            .operations
            .iter_mut()
            .filter(|op| op.is_due(now))
            .map(|op| {
                op.status = OperationStatus::Running;
                op.attempts += 1;
                DueOperation {
                    id: op.id,
                    label: op.operation.clone(),
                    callback: op.callback.clone(),
                    payload: op.payload.clone(),
                }
            })
            .collect();

        if !due.is_empty() {
            self.persist(&mut state);
        }
        due
    }

    /// Snapshot in list order, optionally filtered by status
    pub fn list(&self, status: Option<OperationStatus>, limit: Option<usize>) -> Vec<QueueOperation> {
        self.state
            .lock()
            .operations
            .iter()
            .filter(|op| status.map_or(true, |wanted| op.status == wanted))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    pub fn get(&self, id: u64) -> Option<QueueOperation> {
        self.state
            .lock()
            .operations
            .iter()
            .find(|op| op.id == id)
            .cloned()
    }

    /// Delete one operation. Returns `false` for an unknown id.
    pub fn remove(&self, id: u64) -> bool {
        let mut state = self.state.lock();
        let Some(position) = state.operations.iter().position(|op| op.id == id) else {
            return false;
        };
        let removed = state.operations.remove(position);
        self.persist(&mut state);
        drop(state);

        log_queue_operation("remove", Some(id), &removed.operation, removed.status.as_str());
        true
    }

    /// Delete every operation. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let cleared = state.operations.len();
        state.operations.clear();
        self.persist(&mut state);
        drop(state);

        log_queue_operation("clear", None, "*", &format!("{cleared} removed"));
        cleared
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.state.lock();
        let mut par_statut = BTreeMap::new();
        let mut par_operation = BTreeMap::new();
        for op in &state.operations {
            *par_statut.entry(op.status.as_str().to_string()).or_insert(0) += 1;
            *par_operation.entry(op.operation.clone()).or_insert(0) += 1;
        }

        QueueStats {
            total_ajoutees: state.totals.enqueued,
            total_reussies: state.totals.succeeded,
            total_echouees: state.totals.failed,
            total_abandonnees: state.totals.abandoned,
            total_evincees: state.totals.evicted,
            en_file: state.operations.len(),
            capacite: self.capacity,
            par_statut,
            par_operation,
        }
    }

    /// Earliest retry time among pending operations
    pub fn next_due_at(&self) -> Option<DateTime<Utc>> {
        self.state
            .lock()
            .operations
            .iter()
            .filter(|op| op.status == OperationStatus::Pending)
            .map(|op| op.next_attempt_at)
            .min()
    }

    pub fn len(&self) -> usize {
        self.state.lock().operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn callbacks(&self) -> &Arc<CallbackRegistry> {
        &self.callbacks
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    fn persist(&self, state: &mut QueueState) {
        match self.store.save(&state.operations) {
            Ok(()) => state.last_persist_error = None,
            Err(e) => {
                let message = e.to_string();
                log_error(
                    "retry_queue",
                    "persist",
                    &message,
                    Some(&self.store.describe()),
                );
                state.last_persist_error = Some(message);
            }
        }
    }
}

/// `now + delay`, saturating at the latest representable instant
fn retry_at(now: DateTime<Utc>, delay_seconds: u64) -> DateTime<Utc> {
    i64::try_from(delay_seconds)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|delay| now.checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl HealthCheck for RetryQueue {
    fn health_check(&self) -> ServiceHealth {
        let state = self.state.lock();
        if let Some(error) = &state.last_persist_error {
            return ServiceHealth::degraded(format!("last snapshot write failed: {error}"));
        }
        if state.operations.len() >= self.capacity {
            return ServiceHealth::degraded(format!(
                "retry queue is full ({} operations)",
                self.capacity
            ));
        }
        ServiceHealth::healthy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::HealthStatus;
    use crate::queue::clock::ManualClock;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Harness {
        queue: RetryQueue,
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        callbacks: Arc<CallbackRegistry>,
    }

    fn harness_with(config: RetryQueueConfig, store: MemoryStore) -> Harness {
        let store = Arc::new(store);
        let clock = Arc::new(ManualClock::default());
        let callbacks = Arc::new(CallbackRegistry::new());
        let queue = RetryQueue::with_parts(&config, store.clone(), callbacks.clone(), clock.clone());
        Harness {
            queue,
            store,
            clock,
            callbacks,
        }
    }

    fn harness() -> Harness {
        harness_with(RetryQueueConfig::default(), MemoryStore::new())
    }

    fn payload(value: serde_json::Value) -> Payload {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_enqueue_then_process_runs_callback_once() {
        let h = harness();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        h.callbacks.register("ok", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let id = h.queue.enqueue("recette.creer", payload(json!({"nom": "Tarte"})), "ok", None);
        assert_eq!(h.queue.get(id).unwrap().max_attempts, 5);

        let summary = h.queue.process_batch();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.remaining, 0);
        assert!(h.queue.list(None, None).is_empty());
        assert_eq!(h.queue.stats().total_reussies, 1);

        // nothing left to run
        assert_eq!(h.queue.process_batch().processed, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failure_schedules_backoff() {
        let h = harness();
        h.callbacks.register("fail", |_| Err("boom".into()));
        let id = h.queue.enqueue("op", Payload::new(), "fail", None);
        let start = h.clock.now();

        let summary = h.queue.process_batch();
        assert_eq!(summary.retrying, 1);

        let op = h.queue.get(id).unwrap();
        assert_eq!(op.status, OperationStatus::Pending);
        assert_eq!(op.attempts, 1);
        assert_eq!(op.backoff_seconds, 1);
        assert_eq!(op.last_error.as_deref(), Some("boom"));
        assert_eq!(op.next_attempt_at, start + Duration::seconds(1));

        // not due yet
        assert_eq!(h.queue.process_batch().processed, 0);
        h.clock.advance_secs(1);
        assert_eq!(h.queue.process_batch().processed, 1);
        assert_eq!(h.queue.get(id).unwrap().backoff_seconds, 2);
    }

    #[test]
    fn test_backoff_sequence_until_abandoned() {
        let h = harness();
        h.callbacks.register("fail", |_| Err("toujours".into()));
        let id = h.queue.enqueue("op", Payload::new(), "fail", Some(6));

        let mut observed = Vec::new();
        for _ in 0..5 {
            h.queue.process_batch();
            let op = h.queue.get(id).unwrap();
            observed.push(op.backoff_seconds);
            h.clock.advance_secs(op.backoff_seconds as i64);
        }
        assert_eq!(observed, vec![1, 2, 4, 8, 16]);

        let summary = h.queue.process_batch();
        assert_eq!(summary.abandoned, 1);
        assert!(h.queue.get(id).is_none());

        let stats = h.queue.stats();
        assert_eq!(stats.total_abandonnees, 1);
        assert_eq!(stats.total_echouees, 6);
    }

    #[test]
    fn test_unknown_callback_follows_retry_path() {
        let h = harness();
        let id = h.queue.enqueue("op", Payload::new(), "mod.func", Some(2));

        h.queue.process_batch();
        let op = h.queue.get(id).unwrap();
        assert_eq!(op.status, OperationStatus::Pending);
        assert_eq!(op.last_error.as_deref(), Some("Callback 'mod.func' is not registered"));

        // registering later lets the retry succeed
        h.callbacks.register("mod.func", |_| Ok(()));
        h.clock.advance_secs(1);
        assert_eq!(h.queue.process_batch().succeeded, 1);
        assert!(h.queue.is_empty());
    }

    #[test]
    fn test_panicking_callback_counts_as_failure() {
        let h = harness();
        h.callbacks.register("explose", |_| panic!("kaboom"));
        h.queue.enqueue("op", Payload::new(), "explose", Some(1));

        let summary = h.queue.process_batch();
        assert_eq!(summary.abandoned, 1);
        assert_eq!(h.queue.stats().total_abandonnees, 1);
    }

    #[test]
    fn test_callback_may_enqueue() {
        let h = harness();
        let queue = Arc::new(h.queue);
        let inner = Arc::downgrade(&queue);
        h.callbacks.register("chain", move |_| {
            if let Some(queue) = inner.upgrade() {
                queue.enqueue("suite", Payload::new(), "noop", None);
            }
            Ok(())
        });
        h.callbacks.register("noop", |_| Ok(()));

        queue.enqueue("op", Payload::new(), "chain", None);
        let summary = queue.process_batch();
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.remaining, 1);
        assert_eq!(queue.list(None, None)[0].operation, "suite");
    }

    #[test]
    fn test_oversized_backoff_saturates_instead_of_sticking() {
        let mut config = RetryQueueConfig::default();
        config.backoff.base_seconds = 10_000_000_000_000;
        config.backoff.max_seconds = 10_000_000_000_000;
        let h = harness_with(config, MemoryStore::new());
        h.callbacks.register("fail", |_| Err("indisponible".into()));
        let id = h.queue.enqueue("op", Payload::new(), "fail", Some(3));

        let summary = h.queue.process_batch();
        assert_eq!(summary.retrying, 1);

        let op = h.queue.get(id).unwrap();
        assert_eq!(op.status, OperationStatus::Pending);
        assert_eq!(op.next_attempt_at, DateTime::<Utc>::MAX_UTC);
        assert!(h.queue.list(Some(OperationStatus::Running), None).is_empty());
        assert_eq!(h.store.snapshot()[0].status, OperationStatus::Pending);
    }

    #[test]
    fn test_retry_at_saturates_on_overflow() {
        let now = Utc::now();
        assert_eq!(retry_at(now, 30), now + Duration::seconds(30));
        assert_eq!(retry_at(now, u64::MAX), DateTime::<Utc>::MAX_UTC);
        assert_eq!(retry_at(now, i64::MAX as u64), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_eviction_is_counted() {
        let config = RetryQueueConfig {
            capacity: 2,
            persist: false,
            ..RetryQueueConfig::default()
        };
        let h = harness_with(config, MemoryStore::new());
        let first = h.queue.enqueue("a", Payload::new(), "cb", None);
        h.queue.enqueue("b", Payload::new(), "cb", None);
        assert_eq!(h.queue.health_check().status, HealthStatus::Degraded);

        h.queue.enqueue("c", Payload::new(), "cb", None);

        assert!(h.queue.get(first).is_none());
        let stats = h.queue.stats();
        assert_eq!(stats.en_file, 2);
        assert_eq!(stats.total_evincees, 1);
        assert_eq!(stats.total_ajoutees, 3);
    }

    #[test]
    fn test_reload_reclassifies_running() {
        let now = Utc::now();
        let mut running = QueueOperation::new(41, "op", "cb", Payload::new(), 3, now);
        running.status = OperationStatus::Running;
        running.attempts = 1;
        let pending = QueueOperation::new(12, "op", "cb", Payload::new(), 3, now);

        let h = harness_with(
            RetryQueueConfig::default(),
            MemoryStore::with_operations(vec![running, pending]),
        );
        h.clock.set(now);

        let op = h.queue.get(41).unwrap();
        assert_eq!(op.status, OperationStatus::Pending);
        assert!(op.is_due(h.clock.now()));
        assert!(h.queue.list(Some(OperationStatus::Running), None).is_empty());

        // ids continue after the highest seen
        assert_eq!(h.queue.enqueue("op", Payload::new(), "cb", None), 42);
    }

    #[test]
    fn test_every_mutation_persists() {
        let h = harness();
        let id = h.queue.enqueue("op", Payload::new(), "cb", None);
        assert_eq!(h.store.save_count(), 1);
        assert_eq!(h.store.snapshot().len(), 1);

        assert!(h.queue.remove(id));
        assert!(!h.queue.remove(id));
        assert_eq!(h.store.save_count(), 2);
        assert!(h.store.snapshot().is_empty());

        h.queue.enqueue("op", Payload::new(), "cb", None);
        h.queue.enqueue("op", Payload::new(), "cb", None);
        assert_eq!(h.queue.clear(), 2);
        assert!(h.store.snapshot().is_empty());
    }

    #[test]
    fn test_list_filter_limit_and_stats_breakdown() {
        let h = harness();
        h.callbacks.register("fail", |_| Err("x".into()));
        h.queue.enqueue("recette.creer", Payload::new(), "fail", None);
        h.queue.enqueue("recette.creer", Payload::new(), "fail", None);
        h.queue.enqueue("stock.maj", Payload::new(), "fail", None);

        assert_eq!(h.queue.list(None, Some(2)).len(), 2);
        assert_eq!(h.queue.list(Some(OperationStatus::Pending), None).len(), 3);

        let stats = h.queue.stats();
        assert_eq!(stats.par_operation["recette.creer"], 2);
        assert_eq!(stats.par_operation["stock.maj"], 1);
        assert_eq!(stats.par_statut["en_attente"], 3);
        assert_eq!(h.queue.next_due_at(), Some(h.clock.now()));
    }
}
