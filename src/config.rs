//! Configuration for the playback engine.
//!
//! All user-tunable settings are centralized here and loaded from
//! `conf/config.toml` if present. Any missing or invalid entries fall back to
//! sensible defaults, and every field is clamped once at construction so the
//! rest of the engine never re-validates.

use crate::pacing;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const MIN_CHUNK_SIZE: usize = 1;
pub const MAX_CHUNK_SIZE: usize = 8;
pub const MIN_REWIND_INTERVAL_MS: u64 = 50;
pub const MAX_REWIND_INTERVAL_MS: u64 = 2000;
pub const MIN_PERSIST_DEBOUNCE_MS: u64 = 50;
pub const MAX_PERSIST_DEBOUNCE_MS: u64 = 5000;
pub const MAX_PROGRAMMATIC_WINDOW_MS: u64 = 1000;
pub const MAX_SCROLL_HYSTERESIS_WORDS: usize = 50;
pub const MAX_PERSIST_GUARD_WINDOW_SECS: u64 = 60;

/// Engine configuration; deserializable from TOML.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Base reading speed for the pacing model.
    #[serde(default = "default_words_per_minute")]
    pub words_per_minute: f32,
    /// Words shown at once in the rapid display mode.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Extend the display chunk by one word of context on either side.
    #[serde(default)]
    pub show_context_words: bool,
    /// Cadence of the held rewind gesture, one word per interval.
    #[serde(default = "default_rewind_interval_ms")]
    pub rewind_interval_ms: u64,
    /// Pointer drift past this cancels the rewind gesture.
    #[serde(default = "default_rewind_cancel_threshold_px")]
    pub rewind_cancel_threshold_px: f32,
    /// Scroll updates within this many words of the current position are
    /// ignored.
    #[serde(default = "default_scroll_hysteresis_words")]
    pub scroll_hysteresis_words: usize,
    /// How long scroll echoes are suppressed after a programmatic move.
    #[serde(default = "default_programmatic_window_ms")]
    pub programmatic_window_ms: u64,
    /// Quiet period before a position change is persisted.
    #[serde(default = "default_persist_debounce_ms")]
    pub persist_debounce_ms: u64,
    /// A write of index 0 is suppressed while the last known index exceeds
    /// this and the session is younger than the guard window.
    #[serde(default = "default_persist_guard_min_index")]
    pub persist_guard_min_index: usize,
    #[serde(default = "default_persist_guard_window_secs")]
    pub persist_guard_window_secs: u64,
    /// Fractional progress at which a book counts as finished.
    #[serde(default = "default_finished_threshold")]
    pub finished_threshold: f32,
    #[serde(default)]
    pub log_level: LogLevel,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            words_per_minute: default_words_per_minute(),
            chunk_size: default_chunk_size(),
            show_context_words: false,
            rewind_interval_ms: default_rewind_interval_ms(),
            rewind_cancel_threshold_px: default_rewind_cancel_threshold_px(),
            scroll_hysteresis_words: default_scroll_hysteresis_words(),
            programmatic_window_ms: default_programmatic_window_ms(),
            persist_debounce_ms: default_persist_debounce_ms(),
            persist_guard_min_index: default_persist_guard_min_index(),
            persist_guard_window_secs: default_persist_guard_window_secs(),
            finished_threshold: default_finished_threshold(),
            log_level: LogLevel::default(),
        }
    }
}

impl EngineConfig {
    /// Clamp every field into its supported band. Applied once when the
    /// engine is constructed.
    pub fn sanitize(mut self) -> Self {
        self.words_per_minute = pacing::sanitize_wpm(self.words_per_minute);
        self.chunk_size = self.chunk_size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE);
        self.rewind_interval_ms = self
            .rewind_interval_ms
            .clamp(MIN_REWIND_INTERVAL_MS, MAX_REWIND_INTERVAL_MS);
        if !self.rewind_cancel_threshold_px.is_finite() {
            self.rewind_cancel_threshold_px = default_rewind_cancel_threshold_px();
        }
        self.rewind_cancel_threshold_px = self.rewind_cancel_threshold_px.clamp(1.0, 200.0);
        self.scroll_hysteresis_words = self
            .scroll_hysteresis_words
            .min(MAX_SCROLL_HYSTERESIS_WORDS);
        self.programmatic_window_ms = self.programmatic_window_ms.min(MAX_PROGRAMMATIC_WINDOW_MS);
        self.persist_debounce_ms = self
            .persist_debounce_ms
            .clamp(MIN_PERSIST_DEBOUNCE_MS, MAX_PERSIST_DEBOUNCE_MS);
        self.persist_guard_window_secs = self
            .persist_guard_window_secs
            .min(MAX_PERSIST_GUARD_WINDOW_SECS);
        if !self.finished_threshold.is_finite() {
            self.finished_threshold = default_finished_threshold();
        }
        self.finished_threshold = self.finished_threshold.clamp(0.5, 1.0);
        self
    }

    pub fn rewind_interval(&self) -> Duration {
        Duration::from_millis(self.rewind_interval_ms)
    }

    pub fn programmatic_window(&self) -> Duration {
        Duration::from_millis(self.programmatic_window_ms)
    }

    pub fn persist_debounce(&self) -> Duration {
        Duration::from_millis(self.persist_debounce_ms)
    }

    pub fn persist_guard_window(&self) -> Duration {
        Duration::from_secs(self.persist_guard_window_secs)
    }
}

/// Load configuration from the given path, falling back to defaults on error.
/// The result is already sanitized.
pub fn load_config(path: &Path) -> EngineConfig {
    let contents = match fs::read_to_string(path) {
        Ok(data) => {
            info!(path = %path.display(), "Loaded engine config");
            data
        }
        Err(err) => {
            warn!(
                path = %path.display(),
                "Falling back to default config: {err}"
            );
            return EngineConfig::default();
        }
    };

    match toml::from_str::<EngineConfig>(&contents) {
        Ok(cfg) => {
            debug!("Parsed configuration from disk");
            cfg.sanitize()
        }
        Err(err) => {
            warn!(path = %path.display(), "Invalid config TOML: {err}");
            EngineConfig::default()
        }
    }
}

fn default_words_per_minute() -> f32 {
    pacing::DEFAULT_WPM
}

fn default_chunk_size() -> usize {
    1
}

fn default_rewind_interval_ms() -> u64 {
    300
}

fn default_rewind_cancel_threshold_px() -> f32 {
    24.0
}

fn default_scroll_hysteresis_words() -> usize {
    2
}

fn default_programmatic_window_ms() -> u64 {
    100
}

fn default_persist_debounce_ms() -> u64 {
    300
}

fn default_persist_guard_min_index() -> usize {
    50
}

fn default_persist_guard_window_secs() -> u64 {
    5
}

fn default_finished_threshold() -> f32 {
    0.99
}

/// Supported logging verbosity levels.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_filter_str())
    }
}

impl LogLevel {
    pub fn as_filter_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}
