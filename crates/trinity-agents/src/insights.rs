//! Read side of the conversational agent: the latest observer insight and
//! recent lessons, condensed into a prompt section.

use std::fmt::Write as _;
use std::time::Duration;

use chrono::{DateTime, Utc};
use trinity_memory::{AgentSource, EntryFilter, MemoryEntry, MemoryStore, MemoryStoreError};

use crate::lesson::LESSON_CATEGORY;

pub const DEFAULT_INSIGHT_WINDOW: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_MAX_LESSONS: usize = 5;

/// How the conversational agent should pitch its replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToneHint {
    Normal,
    /// Host is busy: keep answers short.
    Brief,
    /// A model or service is slow or down: expect delays.
    Patient,
}

impl ToneHint {
    pub fn from_category(category: &str) -> Self {
        match category {
            "load" | "memory" => Self::Brief,
            "model" | "service" => Self::Patient,
            _ => Self::Normal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Brief => "brief",
            Self::Patient => "patient",
        }
    }

    pub fn guidance(&self) -> Option<&'static str> {
        match self {
            Self::Normal => None,
            Self::Brief => {
                Some("The host is under heavy load. Keep answers short and avoid long generations.")
            }
            Self::Patient => Some(
                "A model or service is slow or unavailable. Acknowledge delays and keep the user informed.",
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestOptions {
    /// Observer insights older than this are ignored.
    pub window: Duration,
    pub max_lessons: usize,
}

impl Default for DigestOptions {
    fn default() -> Self {
        Self {
            window: DEFAULT_INSIGHT_WINDOW,
            max_lessons: DEFAULT_MAX_LESSONS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsightDigest {
    pub latest_insight: Option<MemoryEntry>,
    /// Oldest first.
    pub lessons: Vec<MemoryEntry>,
    pub tone: ToneHint,
}

impl InsightDigest {
    pub fn gather(store: &MemoryStore, options: &DigestOptions) -> Result<Self, MemoryStoreError> {
        Self::gather_at(store, options, Utc::now())
    }

    pub fn gather_at(
        store: &MemoryStore,
        options: &DigestOptions,
        now: DateTime<Utc>,
    ) -> Result<Self, MemoryStoreError> {
        let mut insight_filter = EntryFilter::all().source(AgentSource::Observer);
        // A window too large to represent means no lower bound.
        if let Some(since) = chrono::Duration::from_std(options.window)
            .ok()
            .and_then(|window| now.checked_sub_signed(window))
        {
            insight_filter = insight_filter.since(since);
        }
        let latest_insight = store.recent(insight_filter, 1)?.pop();
        let lessons = store.recent(
            EntryFilter::all()
                .source(AgentSource::Conversational)
                .category(LESSON_CATEGORY),
            options.max_lessons,
        )?;
        let tone = latest_insight
            .as_ref()
            .map(|entry| ToneHint::from_category(&entry.category))
            .unwrap_or(ToneHint::Normal);

        Ok(Self {
            latest_insight,
            lessons,
            tone,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.latest_insight.is_none() && self.lessons.is_empty()
    }

    /// Block to append to the agent's system prompt. Empty when there is
    /// nothing to say.
    pub fn prompt_section(&self) -> String {
        if self.is_empty() {
            return String::new();
        }

        let mut section = String::from("<SHARED_MEMORY>\n");
        if let Some(insight) = &self.latest_insight {
            let _ = writeln!(
                section,
                "System status ({}): {}",
                insight.timestamp.format("%Y-%m-%d %H:%M UTC"),
                insight.text
            );
        }
        if let Some(guidance) = self.tone.guidance() {
            let _ = writeln!(section, "Tone: {guidance}");
        }
        if !self.lessons.is_empty() {
            section.push_str("Lessons from earlier conversations:\n");
            for lesson in &self.lessons {
                let _ = writeln!(section, "- {}", lesson.text);
            }
        }
        section.push_str("</SHARED_MEMORY>");
        section
    }
}
