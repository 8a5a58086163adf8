use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::backend::{EntryIter, InMemoryBackend, MemoryBackend};
use crate::config::MemoryConfig;
use crate::entry::{EntryFilter, MemoryEntry, NewEntry, PendingEntry};
use crate::error::{MemoryStoreError, ValidationError};
use crate::jsonl::JsonlBackend;
use crate::retention::PruneBound;

/// Shared insight/lesson store.
///
/// One `MemoryStore` represents one writer. Timestamps it assigns never go
/// backwards, even if the wall clock does.
pub struct MemoryStore {
    config: MemoryConfig,
    backend: Arc<dyn MemoryBackend>,
    last_timestamp: Mutex<Option<DateTime<Utc>>>,
}

impl MemoryStore {
    /// Open the file-backed store described by `config`.
    pub fn open(config: MemoryConfig) -> Result<Self, MemoryStoreError> {
        config.validate().map_err(MemoryStoreError::Config)?;
        let backend = JsonlBackend::open(&config.path)?;
        Ok(Self::from_parts(config, Arc::new(backend)))
    }

    /// Store kept in process memory only. `config.path` is ignored.
    pub fn in_memory(config: MemoryConfig) -> Result<Self, MemoryStoreError> {
        Self::with_backend(config, Arc::new(InMemoryBackend::new()))
    }

    pub fn with_backend(
        config: MemoryConfig,
        backend: Arc<dyn MemoryBackend>,
    ) -> Result<Self, MemoryStoreError> {
        config.validate().map_err(MemoryStoreError::Config)?;
        Ok(Self::from_parts(config, backend))
    }

    fn from_parts(config: MemoryConfig, backend: Arc<dyn MemoryBackend>) -> Self {
        Self {
            config,
            backend,
            last_timestamp: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn max_text_chars(&self) -> usize {
        self.config.max_text_chars
    }

    /// Check `entry` against the configured limits without storing it.
    pub fn validate(&self, entry: &NewEntry) -> Result<(), ValidationError> {
        if entry.category.trim().is_empty() {
            return Err(ValidationError::EmptyCategory);
        }
        let category_len = entry.category.chars().count();
        if category_len > self.config.max_category_chars {
            return Err(ValidationError::CategoryTooLong {
                len: category_len,
                max: self.config.max_category_chars,
            });
        }
        if entry.text.trim().is_empty() {
            return Err(ValidationError::EmptyText);
        }
        let text_len = entry.text.chars().count();
        if text_len > self.config.max_text_chars {
            return Err(ValidationError::TextTooLong {
                len: text_len,
                max: self.config.max_text_chars,
            });
        }
        Ok(())
    }

    /// Validate and durably persist `entry`.
    ///
    /// Returns the stored entry, carrying its assigned sequence number.
    pub fn append(&self, entry: NewEntry) -> Result<MemoryEntry, MemoryStoreError> {
        self.validate(&entry)?;

        let stored = {
            let mut last_timestamp = self
                .last_timestamp
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let requested = entry.timestamp.unwrap_or_else(Utc::now);
            let timestamp = match *last_timestamp {
                Some(previous) if requested < previous => previous,
                _ => requested,
            };
            let stored = self.backend.append(PendingEntry {
                timestamp,
                source: entry.source,
                category: entry.category,
                text: entry.text,
            })?;
            *last_timestamp = Some(stored.timestamp);
            stored
        };
        tracing::debug!(
            seq = stored.seq,
            source = %stored.source,
            category = %stored.category,
            "appended memory entry"
        );

        if self.config.auto_prune && !self.config.retention.is_unbounded() {
            if let Err(error) = self.apply_retention() {
                tracing::warn!(%error, seq = stored.seq, "retention after append failed");
            }
        }
        Ok(stored)
    }

    /// Entries in write order that match `filter`.
    pub fn read_all(&self, filter: EntryFilter) -> ReadAll<'_> {
        ReadAll {
            backend: self.backend.as_ref(),
            filter,
        }
    }

    pub fn entries(&self, filter: EntryFilter) -> Result<Vec<MemoryEntry>, MemoryStoreError> {
        self.read_all(filter).to_vec()
    }

    /// The last `limit` matching entries, oldest first.
    pub fn recent(
        &self,
        filter: EntryFilter,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>, MemoryStoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut window = VecDeque::with_capacity(limit);
        for entry in self.read_all(filter).iter()? {
            if window.len() == limit {
                window.pop_front();
            }
            window.push_back(entry?);
        }
        Ok(window.into())
    }

    /// Evict the oldest entries beyond `bound`. Returns the number removed.
    pub fn prune(&self, bound: PruneBound) -> Result<usize, MemoryStoreError> {
        self.prune_at(bound, Utc::now())
    }

    pub fn prune_at(
        &self,
        bound: PruneBound,
        now: DateTime<Utc>,
    ) -> Result<usize, MemoryStoreError> {
        self.backend.prune(bound, now)
    }

    /// Apply every bound of the configured retention policy.
    pub fn apply_retention(&self) -> Result<usize, MemoryStoreError> {
        let now = Utc::now();
        let mut removed = 0;
        for bound in self.config.retention.bounds() {
            removed += self.prune_at(bound, now)?;
        }
        Ok(removed)
    }
}

/// Lazy, restartable view returned by [`MemoryStore::read_all`].
///
/// Every call to [`ReadAll::iter`] scans the backend again from the oldest
/// entry. A scan is finite: it ends at the last entry that was complete
/// when it was reached.
pub struct ReadAll<'a> {
    backend: &'a dyn MemoryBackend,
    filter: EntryFilter,
}

impl<'a> ReadAll<'a> {
    pub fn filter(&self) -> &EntryFilter {
        &self.filter
    }

    pub fn iter(&self) -> Result<EntryIter<'_>, MemoryStoreError> {
        let filter = &self.filter;
        let scan = self.backend.scan()?;
        Ok(Box::new(scan.filter(move |item| match item {
            Ok(entry) => filter.matches(entry),
            Err(_) => true,
        })))
    }

    pub fn to_vec(&self) -> Result<Vec<MemoryEntry>, MemoryStoreError> {
        self.iter()?.collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::entry::AgentSource;

    fn store() -> MemoryStore {
        let mut config = MemoryConfig::default();
        config.max_text_chars = 16;
        config.auto_prune = false;
        MemoryStore::in_memory(config).expect("in-memory store")
    }

    #[test]
    fn validate_rejects_blank_and_oversized_fields() {
        let store = store();
        assert_eq!(
            store.validate(&NewEntry::observer("  ", "cpu 92%")),
            Err(ValidationError::EmptyCategory)
        );
        assert_eq!(
            store.validate(&NewEntry::observer("load", " \n")),
            Err(ValidationError::EmptyText)
        );
        assert_eq!(
            store.validate(&NewEntry::observer("load", "é".repeat(17))),
            Err(ValidationError::TextTooLong { len: 17, max: 16 })
        );
        assert!(store
            .validate(&NewEntry::observer("load", "é".repeat(16)))
            .is_ok());
    }

    #[test]
    fn timestamps_never_go_backwards_for_one_writer() {
        let store = store();
        let later = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2026, 5, 1, 11, 0, 0).unwrap();

        let first = store
            .append(NewEntry::observer("load", "first").at(later))
            .expect("append first");
        let second = store
            .append(NewEntry::observer("load", "second").at(earlier))
            .expect("append second");

        assert_eq!(first.timestamp, later);
        assert_eq!(second.timestamp, later);
        assert!(second.seq > first.seq);
    }

    #[test]
    fn recent_returns_tail_oldest_first() {
        let store = store();
        for index in 0..5 {
            store
                .append(NewEntry::conversational("lesson", format!("lesson {index}")))
                .expect("append lesson");
        }
        store
            .append(NewEntry::observer("load", "cpu 50%"))
            .expect("append insight");

        let recent = store
            .recent(EntryFilter::all().source(AgentSource::Conversational), 2)
            .expect("recent lessons");
        let texts: Vec<&str> = recent.iter().map(|entry| entry.text.as_str()).collect();
        assert_eq!(texts, vec!["lesson 3", "lesson 4"]);
        assert!(store.recent(EntryFilter::all(), 0).expect("empty").is_empty());
    }

    #[test]
    fn read_all_is_restartable() {
        let store = store();
        store
            .append(NewEntry::observer("load", "cpu 92%"))
            .expect("append");
        let view = store.read_all(EntryFilter::all());

        assert_eq!(view.to_vec().expect("first pass").len(), 1);
        store
            .append(NewEntry::observer("disk", "disk 91%"))
            .expect("append");
        assert_eq!(view.to_vec().expect("second pass").len(), 2);
    }

    #[test]
    fn auto_prune_applies_retention_after_append() {
        let mut config = MemoryConfig::default();
        config.retention.max_entries = Some(3);
        config.auto_prune = true;
        let store = MemoryStore::in_memory(config).expect("store");

        for index in 0..5 {
            store
                .append(NewEntry::observer("load", format!("sample {index}")))
                .expect("append");
        }
        let seqs: Vec<u64> = store
            .entries(EntryFilter::all())
            .expect("entries")
            .iter()
            .map(|entry| entry.seq)
            .collect();
        assert_eq!(seqs, vec![3, 4, 5]);
    }
}
