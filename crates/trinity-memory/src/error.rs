use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// An entry rejected before it reached the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("category cannot be empty")]
    EmptyCategory,

    #[error("category is {len} chars, limit is {max}")]
    CategoryTooLong { len: usize, max: usize },

    #[error("text cannot be empty")]
    EmptyText,

    #[error("text is {len} chars, limit is {max}")]
    TextTooLong { len: usize, max: usize },
}

/// Errors returned by the memory store and its backends.
#[derive(Debug, Error)]
pub enum MemoryStoreError {
    #[error("invalid entry: {0}")]
    Validation(#[from] ValidationError),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt record in {path} at line {line}: {source}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported store format in {path}: {reason}")]
    Format { path: PathBuf, reason: String },

    #[error("serialize entry failed: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl MemoryStoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        MemoryStoreError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, MemoryStoreError::Validation(_))
    }

    pub fn is_io(&self) -> bool {
        matches!(self, MemoryStoreError::Io { .. })
    }
}
