use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Agent that produced an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentSource {
    Observer,
    Conversational,
}

impl AgentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentSource::Observer => "observer",
            AgentSource::Conversational => "conversational",
        }
    }
}

impl fmt::Display for AgentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentSource {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "observer" => Ok(AgentSource::Observer),
            "conversational" => Ok(AgentSource::Conversational),
            other => Err(format!(
                "unknown agent source '{other}' (expected observer or conversational)"
            )),
        }
    }
}

/// Draft of an entry before the store assigns its sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub source: AgentSource,
    pub category: String,
    pub text: String,
    /// Explicit creation time. The store uses the current time when absent.
    pub timestamp: Option<DateTime<Utc>>,
}

impl NewEntry {
    pub fn new(source: AgentSource, category: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source,
            category: category.into(),
            text: text.into(),
            timestamp: None,
        }
    }

    pub fn observer(category: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(AgentSource::Observer, category, text)
    }

    pub fn conversational(category: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(AgentSource::Conversational, category, text)
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// A validated entry whose timestamp has been resolved, ready for a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub timestamp: DateTime<Utc>,
    pub source: AgentSource,
    pub category: String,
    pub text: String,
}

impl PendingEntry {
    pub fn into_entry(self, seq: u64) -> MemoryEntry {
        MemoryEntry {
            seq,
            timestamp: self.timestamp,
            source: self.source,
            category: self.category,
            text: self.text,
        }
    }
}

/// One immutable note in the shared store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub source: AgentSource,
    pub category: String,
    pub text: String,
}

/// Selection applied by `read_all`. The default filter matches every entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryFilter {
    pub source: Option<AgentSource>,
    pub category: Option<String>,
    /// Inclusive lower bound.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub until: Option<DateTime<Utc>>,
}

impl EntryFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn source(mut self, source: AgentSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn matches(&self, entry: &MemoryEntry) -> bool {
        if self.source.is_some_and(|source| source != entry.source) {
            return false;
        }
        if let Some(category) = &self.category {
            if category != &entry.category {
                return false;
            }
        }
        if self.since.is_some_and(|since| entry.timestamp < since) {
            return false;
        }
        if self.until.is_some_and(|until| entry.timestamp >= until) {
            return false;
        }
        true
    }
}
