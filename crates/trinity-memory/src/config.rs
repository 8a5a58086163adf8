use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::retention::RetentionPolicy;

pub const DEFAULT_MAX_TEXT_CHARS: usize = 2000;
pub const DEFAULT_MAX_CATEGORY_CHARS: usize = 64;
pub const DEFAULT_MAX_ENTRIES: usize = 500;

/// Configuration for the shared memory store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// JSONL file holding the store.
    pub path: PathBuf,

    /// Maximum length of an entry's text, in chars.
    pub max_text_chars: usize,

    /// Maximum length of an entry's category, in chars.
    pub max_category_chars: usize,

    /// Bounds used by `apply_retention`.
    pub retention: RetentionPolicy,

    /// Apply retention after every successful append.
    pub auto_prune: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./memory/shared_memory.jsonl"),
            max_text_chars: DEFAULT_MAX_TEXT_CHARS,
            max_category_chars: DEFAULT_MAX_CATEGORY_CHARS,
            retention: RetentionPolicy {
                max_entries: Some(DEFAULT_MAX_ENTRIES),
                max_age_secs: None,
            },
            auto_prune: true,
        }
    }
}

impl MemoryConfig {
    /// Create a config for the store at `path` with default limits.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.path.as_os_str().is_empty() {
            return Err("memory path cannot be empty".to_string());
        }
        if self.max_text_chars == 0 {
            return Err("max_text_chars must be greater than 0".to_string());
        }
        if self.max_category_chars == 0 {
            return Err("max_category_chars must be greater than 0".to_string());
        }
        if self.retention.max_age_secs == Some(0) {
            return Err("retention max_age_secs must be greater than 0".to_string());
        }
        Ok(())
    }
}
