use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entry::MemoryEntry;

/// One pruning bound. Entries beyond it are evicted oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneBound {
    /// Keep at most this many of the most recent entries.
    MaxEntries(usize),
    /// Drop entries whose timestamp is older than `now - age`.
    MaxAge(Duration),
}

/// Result of applying a bound to a snapshot of the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneSplit {
    pub kept: Vec<MemoryEntry>,
    pub removed: usize,
    /// Highest sequence number among the removed entries.
    pub removed_max_seq: Option<u64>,
}

impl PruneBound {
    pub fn split(&self, entries: Vec<MemoryEntry>, now: DateTime<Utc>) -> PruneSplit {
        let mut split = PruneSplit::default();
        match *self {
            PruneBound::MaxEntries(max_entries) => {
                let excess = entries.len().saturating_sub(max_entries);
                for (index, entry) in entries.into_iter().enumerate() {
                    if index < excess {
                        split.record_removed(&entry);
                    } else {
                        split.kept.push(entry);
                    }
                }
            }
            PruneBound::MaxAge(age) => {
                // An age that does not fit a chrono delta cannot evict anything.
                let cutoff = chrono::Duration::from_std(age)
                    .ok()
                    .and_then(|age| now.checked_sub_signed(age));
                for entry in entries {
                    if cutoff.is_some_and(|cutoff| entry.timestamp < cutoff) {
                        split.record_removed(&entry);
                    } else {
                        split.kept.push(entry);
                    }
                }
            }
        }
        split
    }
}

impl PruneSplit {
    fn record_removed(&mut self, entry: &MemoryEntry) {
        self.removed += 1;
        self.removed_max_seq = Some(self.removed_max_seq.unwrap_or(0).max(entry.seq));
    }
}

/// Retention applied by `MemoryStore::apply_retention`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    #[serde(default)]
    pub max_entries: Option<usize>,
    #[serde(default)]
    pub max_age_secs: Option<u64>,
}

impl RetentionPolicy {
    pub fn is_unbounded(&self) -> bool {
        self.max_entries.is_none() && self.max_age_secs.is_none()
    }

    /// Bounds in the order they are applied: age first, then count.
    pub fn bounds(&self) -> Vec<PruneBound> {
        let mut bounds = Vec::new();
        if let Some(secs) = self.max_age_secs {
            bounds.push(PruneBound::MaxAge(Duration::from_secs(secs)));
        }
        if let Some(max_entries) = self.max_entries {
            bounds.push(PruneBound::MaxEntries(max_entries));
        }
        bounds
    }
}
