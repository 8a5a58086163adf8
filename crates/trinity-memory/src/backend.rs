use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::entry::{MemoryEntry, PendingEntry};
use crate::error::MemoryStoreError;
use crate::retention::PruneBound;

/// Lazy scan over a backend, in write order.
pub type EntryIter<'a> = Box<dyn Iterator<Item = Result<MemoryEntry, MemoryStoreError>> + 'a>;

/// Persistence behind a `MemoryStore`.
///
/// Implementations must make each `append` atomic with respect to other
/// appends and never expose a partially written entry to `scan`.
pub trait MemoryBackend: Send + Sync {
    /// Persist `entry`, assigning the next sequence number.
    fn append(&self, entry: PendingEntry) -> Result<MemoryEntry, MemoryStoreError>;

    /// Start a fresh scan from the oldest surviving entry.
    fn scan(&self) -> Result<EntryIter<'_>, MemoryStoreError>;

    /// Evict entries beyond `bound`, returning how many were removed.
    fn prune(&self, bound: PruneBound, now: DateTime<Utc>) -> Result<usize, MemoryStoreError>;
}

#[derive(Debug, Default)]
struct InMemoryState {
    entries: Vec<MemoryEntry>,
    last_seq: u64,
}

/// Process-local backend for tests and ephemeral stores.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    state: Mutex<InMemoryState>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, InMemoryState> {
        // A panicking writer cannot leave a half-pushed entry behind.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MemoryBackend for InMemoryBackend {
    fn append(&self, entry: PendingEntry) -> Result<MemoryEntry, MemoryStoreError> {
        let mut state = self.lock();
        state.last_seq += 1;
        let stored = entry.into_entry(state.last_seq);
        state.entries.push(stored.clone());
        Ok(stored)
    }

    fn scan(&self) -> Result<EntryIter<'_>, MemoryStoreError> {
        let snapshot = self.lock().entries.clone();
        Ok(Box::new(snapshot.into_iter().map(Ok)))
    }

    fn prune(&self, bound: PruneBound, now: DateTime<Utc>) -> Result<usize, MemoryStoreError> {
        let mut state = self.lock();
        let entries = std::mem::take(&mut state.entries);
        let split = bound.split(entries, now);
        state.entries = split.kept;
        Ok(split.removed)
    }
}
