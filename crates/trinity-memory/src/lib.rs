//! Shared insight/lesson memory for the trinity agents.
//!
//! The observer agent and the conversational agent run as separate processes
//! and exchange short notes through one append-only store. Each note is a
//! [`MemoryEntry`]. The store validates entries, assigns sequence numbers,
//! and prunes oldest-first. Persistence is injected via [`MemoryBackend`].

pub mod backend;
pub mod config;
pub mod entry;
pub mod error;
pub mod jsonl;
pub mod retention;
pub mod store;

pub use backend::{EntryIter, InMemoryBackend, MemoryBackend};
pub use config::MemoryConfig;
pub use entry::{AgentSource, EntryFilter, MemoryEntry, NewEntry, PendingEntry};
pub use error::{MemoryStoreError, ValidationError};
pub use jsonl::{CURRENT_STORE_VERSION, JsonlBackend, StoreHeader};
pub use retention::{PruneBound, RetentionPolicy};
pub use store::{MemoryStore, ReadAll};

/// Re-export common memory types.
pub mod prelude {
    pub use super::config::MemoryConfig;
    pub use super::entry::{AgentSource, EntryFilter, MemoryEntry, NewEntry};
    pub use super::error::{MemoryStoreError, ValidationError};
    pub use super::retention::{PruneBound, RetentionPolicy};
    pub use super::store::MemoryStore;
}
