//! Display-duration model for timed word playback.
//!
//! Pure functions only: the same `(wpm, word)` pair always yields the same
//! duration, so the scheduler can be tested deterministically.

use crate::tokenizer::{PauseClass, WordUnit};
use std::time::Duration;

pub const MIN_WPM: f32 = 50.0;
pub const MAX_WPM: f32 = 2000.0;
pub const DEFAULT_WPM: f32 = 300.0;

const SENTENCE_END_FACTOR: f32 = 2.0;
const COMMA_FACTOR: f32 = 1.4;
const PARAGRAPH_END_FACTOR: f32 = 2.1;

/// Words at or below this char count carry no length penalty.
const LENGTH_RAMP_START: usize = 6;
const LENGTH_FACTOR_PER_CHAR: f32 = 0.08;
const LENGTH_FACTOR_CAP: f32 = 1.6;

/// Clamp wpm into the supported band. NaN and infinities map to the default
/// rather than leaking into a scheduled duration.
pub fn sanitize_wpm(wpm: f32) -> f32 {
    if !wpm.is_finite() {
        return DEFAULT_WPM;
    }
    wpm.clamp(MIN_WPM, MAX_WPM)
}

/// Display duration for one word at the given reading speed.
pub fn word_duration(wpm: f32, word: &WordUnit) -> Duration {
    let base_ms = 60_000.0 / sanitize_wpm(wpm);
    let ms = base_ms * pause_factor(word.trailing_pause) * length_factor(word.char_len());
    Duration::from_millis(ms.round() as u64)
}

fn pause_factor(class: PauseClass) -> f32 {
    match class {
        PauseClass::None => 1.0,
        PauseClass::Comma => COMMA_FACTOR,
        PauseClass::SentenceEnd => SENTENCE_END_FACTOR,
        PauseClass::ParagraphEnd => PARAGRAPH_END_FACTOR,
    }
}

/// Mild penalty for long words. 1.0 up to the ramp start, then a smooth
/// per-char increase capped well below the punctuation factors.
fn length_factor(char_len: usize) -> f32 {
    if char_len <= LENGTH_RAMP_START {
        return 1.0;
    }
    (1.0 + (char_len - LENGTH_RAMP_START) as f32 * LENGTH_FACTOR_PER_CHAR).min(LENGTH_FACTOR_CAP)
}
