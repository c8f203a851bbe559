//! External progress storage.
//!
//! The engine treats persistence as a key-value collaborator behind
//! [`ProgressStore`]. The default implementation keeps one JSON file per book
//! under a cache directory, named by a hash of the book id to avoid
//! filesystem issues. A shared in-memory store is provided for tests and
//! ephemeral sessions.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

/// The record the external collaborator reads and writes. Field names are
/// fixed wire format; do not rename.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedProgress {
    pub book_id: String,
    pub last_token_index: usize,
    /// Fractional position in [0, 1].
    pub bookmark_progress: f32,
    pub is_finished: bool,
    /// Unix seconds.
    pub last_opened_timestamp: u64,
}

pub trait ProgressStore {
    fn write(&mut self, record: &PersistedProgress) -> Result<()>;
    fn read(&self, book_id: &str) -> Result<Option<PersistedProgress>>;
}

pub(crate) fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// One JSON file per book under `root`, keyed by a hash of the book id.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn record_path(&self, book_id: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(book_id.as_bytes());
        let hash = format!("{:x}", hasher.finalize());
        self.root.join(hash).join("progress.json")
    }
}

impl ProgressStore for JsonFileStore {
    fn write(&mut self, record: &PersistedProgress) -> Result<()> {
        let path = self.record_path(&record.book_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let contents = serde_json::to_vec_pretty(record).context("Failed to encode progress")?;
        fs::write(&path, contents).with_context(|| format!("Failed to write {}", path.display()))
    }

    fn read(&self, book_id: &str) -> Result<Option<PersistedProgress>> {
        let path = self.record_path(book_id);
        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to read {}", path.display()));
            }
        };
        let record = serde_json::from_str(&data)
            .with_context(|| format!("Corrupt progress record at {}", path.display()))?;
        Ok(Some(record))
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    records: HashMap<String, PersistedProgress>,
    write_count: usize,
    fail_writes: usize,
}

/// Shared in-memory store. Clones share the same records, so a test can keep
/// one handle while the engine owns another. Not thread-safe by design; the
/// engine runs on a single event loop.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Rc<RefCell<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, book_id: &str) -> Option<PersistedProgress> {
        self.inner.borrow().records.get(book_id).cloned()
    }

    pub fn write_count(&self) -> usize {
        self.inner.borrow().write_count
    }

    /// Make the next `n` writes fail, for exercising retry paths.
    pub fn fail_next_writes(&self, n: usize) {
        self.inner.borrow_mut().fail_writes = n;
    }

    pub fn insert(&self, record: PersistedProgress) {
        let mut inner = self.inner.borrow_mut();
        inner.records.insert(record.book_id.clone(), record);
    }
}

impl ProgressStore for MemoryStore {
    fn write(&mut self, record: &PersistedProgress) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        if inner.fail_writes > 0 {
            inner.fail_writes -= 1;
            anyhow::bail!("simulated write failure");
        }
        inner.write_count += 1;
        inner
            .records
            .insert(record.book_id.clone(), record.clone());
        Ok(())
    }

    fn read(&self, book_id: &str) -> Result<Option<PersistedProgress>> {
        Ok(self.inner.borrow().records.get(book_id).cloned())
    }
}
