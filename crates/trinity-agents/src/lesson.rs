//! Lesson recorder for the conversational agent.
//!
//! After each turn the recorder asks a [`LessonDetector`] whether the user
//! taught the agent something worth keeping, and stores it as a
//! `conversational`/`lesson` entry.

use std::sync::Arc;

use trinity_memory::{MemoryEntry, MemoryStore, NewEntry};

use crate::text::{normalize_whitespace, truncate_chars};

pub const LESSON_CATEGORY: &str = "lesson";

/// Phrases that signal a correction or a stated preference.
pub const DEFAULT_CORRECTION_CUES: &[&str] = &[
    "actually",
    "that's wrong",
    "that is wrong",
    "that's not right",
    "not what i asked",
    "i prefer",
    "i'd prefer",
    "i would prefer",
    "i'd rather",
    "please don't",
    "please do not",
    "don't ever",
    "never do that",
    "stop doing",
    "from now on",
    "next time",
    "remember that",
    "you should have",
];

/// Cues that only count at the start of the user's message.
const LEADING_CUES: &[&str] = &["no,", "no.", "wrong", "incorrect"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationTurn {
    pub user_text: String,
    pub assistant_text: Option<String>,
}

impl ConversationTurn {
    pub fn new(user_text: impl Into<String>) -> Self {
        Self {
            user_text: user_text.into(),
            assistant_text: None,
        }
    }

    pub fn with_assistant(mut self, assistant_text: impl Into<String>) -> Self {
        self.assistant_text = Some(assistant_text.into());
        self
    }
}

/// Decides whether a turn produced a reusable lesson.
pub trait LessonDetector: Send + Sync {
    /// The lesson text, or `None` when the turn taught nothing.
    fn detect(&self, turn: &ConversationTurn) -> Option<String>;
}

/// Keyword detector for corrections and preferences in the user's text.
#[derive(Debug, Clone)]
pub struct CorrectionDetector {
    cues: Vec<String>,
}

impl Default for CorrectionDetector {
    fn default() -> Self {
        Self::with_cues(DEFAULT_CORRECTION_CUES.iter().copied())
    }
}

impl CorrectionDetector {
    pub fn with_cues<I, S>(cues: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            cues: cues
                .into_iter()
                .map(|cue| normalize_whitespace(cue.as_ref()).to_lowercase())
                .filter(|cue| !cue.is_empty())
                .collect(),
        }
    }

    pub fn cues(&self) -> &[String] {
        &self.cues
    }
}

impl LessonDetector for CorrectionDetector {
    fn detect(&self, turn: &ConversationTurn) -> Option<String> {
        let statement = normalize_whitespace(&turn.user_text);
        if statement.is_empty() {
            return None;
        }
        let lowered = statement.to_lowercase().replace('’', "'");
        let leading = LEADING_CUES.iter().any(|cue| lowered.starts_with(cue));
        let cued = self.cues.iter().any(|cue| contains_phrase(&lowered, cue));
        (leading || cued).then_some(statement)
    }
}

/// True when `phrase` occurs in `haystack` starting at a word boundary.
fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    haystack.match_indices(phrase).any(|(index, _)| {
        let before = haystack[..index].chars().next_back();
        let after = haystack[index + phrase.len()..].chars().next();
        let boundary = |ch: Option<char>| ch.map_or(true, |ch| !ch.is_alphanumeric());
        boundary(before) && boundary(after)
    })
}

/// Stores lessons from conversational turns. Never fails the caller: store
/// errors are logged and the lesson is dropped.
pub struct LessonRecorder {
    store: Arc<MemoryStore>,
    detector: Box<dyn LessonDetector>,
}

impl LessonRecorder {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            detector: Box::new(CorrectionDetector::default()),
        }
    }

    pub fn with_detector(mut self, detector: impl LessonDetector + 'static) -> Self {
        self.detector = Box::new(detector);
        self
    }

    pub fn record_turn(&self, turn: &ConversationTurn) -> Option<MemoryEntry> {
        match self.detector.detect(turn) {
            Some(lesson) => self.record_lesson(&lesson),
            None => {
                tracing::trace!("turn carried no lesson");
                None
            }
        }
    }

    /// Store `text` as a lesson without running detection.
    pub fn record_lesson(&self, text: &str) -> Option<MemoryEntry> {
        let text = truncate_chars(&normalize_whitespace(text), self.store.max_text_chars());
        if text.is_empty() {
            tracing::debug!("ignoring empty lesson");
            return None;
        }
        match self
            .store
            .append(NewEntry::conversational(LESSON_CATEGORY, text))
        {
            Ok(stored) => {
                tracing::info!(seq = stored.seq, "recorded lesson");
                Some(stored)
            }
            Err(error) => {
                tracing::warn!(%error, "skipping lesson");
                None
            }
        }
    }
}
