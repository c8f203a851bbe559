//! Streaming reading position and timed playback engine for an ebook reader.
//!
//! The engine turns chapter text into an addressable word sequence, assigns
//! each word a display duration from reading speed and punctuation, and keeps
//! a single authoritative reading position consistent between a continuous
//! scroll view and a one-word-at-a-time rapid display, persisting that
//! position durably as it moves. Rendering, file-format decoding, and cloud
//! sync live upstream; this crate only consumes plain chapter text and an
//! external key-value progress store.

pub mod config;
pub mod engine;
pub mod normalizer;
pub mod orp;
pub mod pacing;
pub mod persist;
pub mod store;
pub mod tokenizer;

pub use config::EngineConfig;
pub use engine::{Engine, EngineEvent, PlaybackState, PositionCause, SubscriptionId};
pub use orp::{PivotCache, pivot_index};
pub use store::{JsonFileStore, MemoryStore, PersistedProgress, ProgressStore};
pub use tokenizer::{PauseClass, TokenSequence, WordUnit};
