//! # Queue Persistence
//!
//! The queue is persisted as one JSON array snapshot, rewritten in full on
//! every mutation and read once when the queue is opened.

use super::operation::QueueOperation;
use crate::error::QueueError;
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Snapshot storage for the retry queue
pub trait QueueStore: Send + Sync {
    /// Read the last snapshot. A store with nothing saved yet returns an empty list.
    fn load(&self) -> Result<Vec<QueueOperation>, QueueError>;

    /// Replace the snapshot with `operations`
    fn save(&self, operations: &[QueueOperation]) -> Result<(), QueueError>;

    /// Location shown in logs
    fn describe(&self) -> String;
}

/// JSON file store.
///
/// Writes go to a `.tmp` sibling that is then renamed over the target, so a
/// crash mid-write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, path: &Path, source: std::io::Error) -> QueueError {
        QueueError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

impl QueueStore for JsonFileStore {
    fn load(&self) -> Result<Vec<QueueOperation>, QueueError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path).map_err(|e| self.io_error(&self.path, e))?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    fn save(&self, operations: &[QueueOperation]) -> Result<(), QueueError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(parent, e))?;
        }

        let json = serde_json::to_vec_pretty(operations)?;
        let temp = self.temp_path();
        fs::write(&temp, json).map_err(|e| self.io_error(&temp, e))?;
        fs::rename(&temp, &self.path).map_err(|e| self.io_error(&self.path, e))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory store for tests and queues that should not touch the disk
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshot: Mutex<Vec<QueueOperation>>,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing snapshot, as if it had been read from disk
    pub fn with_operations(operations: Vec<QueueOperation>) -> Self {
        Self {
            snapshot: Mutex::new(operations),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn snapshot(&self) -> Vec<QueueOperation> {
        self.snapshot.lock().clone()
    }

    /// Number of `save` calls so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::Relaxed)
    }
}

impl QueueStore for MemoryStore {
    fn load(&self) -> Result<Vec<QueueOperation>, QueueError> {
        Ok(self.snapshot.lock().clone())
    }

    fn save(&self, operations: &[QueueOperation]) -> Result<(), QueueError> {
        *self.snapshot.lock() = operations.to_vec();
        self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
