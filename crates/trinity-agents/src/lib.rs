//! Agents that share the trinity memory store.
//!
//! - [`observer`]: samples host and service health, writes insights.
//! - [`lesson`]: turns user corrections into lessons.
//! - [`insights`]: reads both back for the conversational agent's prompt.

pub mod insights;
pub mod lesson;
pub mod observer;
mod text;

pub use insights::{DigestOptions, InsightDigest, ToneHint};
pub use lesson::{ConversationTurn, CorrectionDetector, LessonDetector, LessonRecorder};
pub use observer::{ObserverConfig, ObserverSampler, SysinfoProbe};
