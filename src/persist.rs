//! Debounced, race-guarded progress persistence.
//!
//! The gate observes position changes and commits them to the external store
//! after a quiet period, so rapid seeks and autoplay advances coalesce into
//! one write. Persistence is best-effort: a failed write is logged and
//! retried on the next poll, and never blocks a position update.

use crate::config::EngineConfig;
use crate::store::{PersistedProgress, ProgressStore, unix_timestamp};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
pub enum FlushReason {
    Background,
    Shutdown,
    Stop,
}

#[derive(Debug, Clone, Copy)]
struct PendingWrite {
    index: usize,
    len: usize,
    due: Instant,
}

pub struct PersistenceGate {
    store: Box<dyn ProgressStore>,
    debounce: Duration,
    guard_min_index: usize,
    guard_window: Duration,
    finished_threshold: f32,
    book_id: String,
    session_started: Instant,
    last_known_index: Option<usize>,
    pending: Option<PendingWrite>,
}

impl PersistenceGate {
    pub fn new(store: Box<dyn ProgressStore>, config: &EngineConfig, now: Instant) -> Self {
        Self {
            store,
            debounce: config.persist_debounce(),
            guard_min_index: config.persist_guard_min_index,
            guard_window: config.persist_guard_window(),
            finished_threshold: config.finished_threshold,
            book_id: String::new(),
            session_started: now,
            last_known_index: None,
            pending: None,
        }
    }

    /// Begin a session for `book_id` and return any prior progress. When the
    /// caller already holds a record (handed over by an upstream sync layer)
    /// it is used as-is; otherwise the store is consulted. A restore at or
    /// past the finished threshold marks the book finished.
    pub fn open_book(
        &mut self,
        book_id: &str,
        prior: Option<PersistedProgress>,
        now: Instant,
    ) -> Option<PersistedProgress> {
        self.book_id = book_id.to_string();
        self.session_started = now;
        self.pending = None;

        let restored = match prior {
            Some(record) => Some(record),
            None => match self.store.read(book_id) {
                Ok(found) => found,
                Err(err) => {
                    warn!(book_id, "Failed to read persisted progress: {err:#}");
                    None
                }
            },
        };

        match restored {
            Some(mut record) => {
                self.last_known_index = Some(record.last_token_index);
                if record.bookmark_progress >= self.finished_threshold {
                    record.is_finished = true;
                }
                info!(
                    book_id,
                    index = record.last_token_index,
                    finished = record.is_finished,
                    "Restored reading progress"
                );
                Some(record)
            }
            None => {
                self.last_known_index = None;
                None
            }
        }
    }

    /// Observe a position change. Arms (or pushes out) the debounce deadline.
    pub fn note_position(&mut self, index: usize, len: usize, now: Instant) {
        if self.book_id.is_empty() {
            return;
        }
        self.pending = Some(PendingWrite {
            index,
            len,
            due: now + self.debounce,
        });
    }

    /// Fire the pending write if its quiet period has elapsed.
    pub fn poll(&mut self, now: Instant) {
        if self.pending.is_some_and(|p| p.due <= now) {
            if let Some(p) = self.pending.take() {
                self.commit(p.index, p.len, now);
            }
        }
    }

    /// Forced flush: background, teardown, explicit stop. Writes the current
    /// position immediately, discarding any pending debounce.
    pub fn flush(&mut self, index: usize, len: usize, now: Instant, reason: FlushReason) {
        if self.book_id.is_empty() {
            return;
        }
        debug!(?reason, index, "Forcing progress flush");
        self.pending = None;
        self.commit(index, len, now);
    }

    /// Earliest pending deadline, if any. Lets the host sleep precisely.
    pub fn next_due(&self) -> Option<Instant> {
        self.pending.map(|p| p.due)
    }

    fn commit(&mut self, index: usize, len: usize, now: Instant) {
        if self.regression_guard(index, now) {
            debug!(
                index,
                last_known = ?self.last_known_index,
                "Suppressed suspicious progress reset during book load"
            );
            return;
        }

        let progress = index as f32 / len.max(1) as f32;
        let record = PersistedProgress {
            book_id: self.book_id.clone(),
            last_token_index: index,
            bookmark_progress: progress,
            is_finished: progress >= self.finished_threshold,
            last_opened_timestamp: unix_timestamp(),
        };

        match self.store.write(&record) {
            Ok(()) => {
                self.last_known_index = Some(index);
                debug!(index, progress, "Persisted reading position");
            }
            Err(err) => {
                warn!(index, "Progress write failed; will retry: {err:#}");
                self.pending = Some(PendingWrite {
                    index,
                    len,
                    due: now + self.debounce,
                });
            }
        }
    }

    /// A write of index 0 while real progress exists and the session is still
    /// young is a load-time race, not a user action.
    fn regression_guard(&self, index: usize, now: Instant) -> bool {
        index == 0
            && self
                .last_known_index
                .is_some_and(|last| last > self.guard_min_index)
            && now.duration_since(self.session_started) < self.guard_window
    }
}
