//! The per-session playback engine.
//!
//! One [`Engine`] is constructed per book session and owns everything the
//! reader's position depends on: the token sequence, the playback state
//! machine, the position synchronizer, and the persistence gate. Hosts drive
//! it with commands plus a periodic [`Engine::tick`]; there is no global
//! state and no internal thread.

mod playback;
mod sync;

pub use playback::PlaybackState;
pub use sync::{EngineEvent, PositionCause, SubscriptionId};

use crate::config::EngineConfig;
use crate::normalizer;
use crate::pacing;
use crate::persist::{FlushReason, PersistenceGate};
use crate::store::{PersistedProgress, ProgressStore};
use crate::tokenizer::{TokenSequence, WordUnit};
use playback::{PendingAdvance, RewindGesture};
use std::ops::Range;
use std::time::Instant;
use tracing::{debug, info};

pub struct Engine {
    config: EngineConfig,
    tokens: TokenSequence,
    book_id: String,
    state: PlaybackState,
    finished: bool,
    pending: Option<PendingAdvance>,
    rewind: Option<RewindGesture>,
    sync: sync::PositionSync,
    gate: PersistenceGate,
}

impl Engine {
    pub fn new(config: EngineConfig, store: Box<dyn ProgressStore>, now: Instant) -> Self {
        let config = config.sanitize();
        Engine {
            sync: sync::PositionSync::new(
                config.programmatic_window(),
                config.scroll_hysteresis_words,
            ),
            gate: PersistenceGate::new(store, &config, now),
            config,
            tokens: TokenSequence::default(),
            book_id: String::new(),
            state: PlaybackState::Stopped,
            finished: false,
            pending: None,
            rewind: None,
        }
    }

    /// Open a book: normalize and tokenize the chapter text, then seed the
    /// position from prior progress (the provided record, or whatever the
    /// store has). An empty book is a valid terminal state, not an error.
    pub fn load(
        &mut self,
        book_id: &str,
        chapters: &[String],
        prior: Option<PersistedProgress>,
        now: Instant,
    ) {
        let text = normalizer::normalize_chapters(chapters);
        self.tokens = TokenSequence::tokenize(text);
        self.book_id = book_id.to_string();
        self.pending = None;
        self.rewind = None;
        self.finished = false;
        self.set_state(PlaybackState::Stopped);
        self.sync.reset(self.tokens.len());

        let restored = self.gate.open_book(book_id, prior, now);
        info!(book_id, words = self.tokens.len(), "Loaded book");
        if self.tokens.is_empty() {
            return;
        }

        let mut seed = 0;
        if let Some(record) = restored {
            seed = record.last_token_index.min(self.tokens.len() - 1);
            self.finished = record.is_finished;
        }
        // Restore always notifies, so subscribers pick up the seeded
        // position even when it is 0.
        self.sync.set_position(seed, PositionCause::Restore, now);
    }

    /// Update the base reading speed. While playing, the pending deadline is
    /// replaced immediately so the new pace applies to the current word.
    pub fn set_words_per_minute(&mut self, wpm: f32, now: Instant) {
        self.config.words_per_minute = pacing::sanitize_wpm(wpm);
        info!(wpm = self.config.words_per_minute, "Adjusted reading speed");
        if self.state == PlaybackState::Playing {
            self.arm_advance(now);
        }
    }

    /// Host visibility went to background: progress must hit storage now.
    pub fn on_background(&mut self, now: Instant) {
        self.gate.flush(
            self.sync.position(),
            self.tokens.len(),
            now,
            FlushReason::Background,
        );
    }

    /// Session teardown: cancel scheduling and flush progress.
    pub fn shutdown(&mut self, now: Instant) {
        debug!("Engine shutting down");
        self.pending = None;
        self.rewind = None;
        self.gate.flush(
            self.sync.position(),
            self.tokens.len(),
            now,
            FlushReason::Shutdown,
        );
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn position(&self) -> usize {
        self.sync.position()
    }

    /// Fractional progress in [0, 1].
    pub fn progress(&self) -> f32 {
        self.sync.progress()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn words_per_minute(&self) -> f32 {
        self.config.words_per_minute
    }

    pub fn word(&self, index: usize) -> Option<&WordUnit> {
        self.tokens.get(index)
    }

    pub fn word_text(&self, index: usize) -> Option<&str> {
        self.tokens.text(index)
    }

    /// Word-index window the rapid display should render around `index`,
    /// honoring `chunk_size` and `show_context_words`.
    pub fn display_chunk(&self, index: usize) -> Range<usize> {
        if self.tokens.is_empty() {
            return 0..0;
        }
        let start = index.min(self.tokens.len() - 1);
        let end = (start + self.config.chunk_size).min(self.tokens.len());
        if self.config.show_context_words {
            start.saturating_sub(1)..(end + 1).min(self.tokens.len())
        } else {
            start..end
        }
    }

    /// Replace the state and notify subscribers, once per actual change.
    pub(crate) fn set_state(&mut self, next: PlaybackState) {
        if next == self.state {
            return;
        }
        debug!(state = ?next, "Playback state changed");
        self.state = next;
        self.sync.notify_state(next);
    }

    /// Arm (or replace) the advance deadline from the current word's pacing.
    pub(crate) fn arm_advance(&mut self, now: Instant) {
        match self.tokens.get(self.sync.position()) {
            Some(word) => {
                let duration = pacing::word_duration(self.config.words_per_minute, word);
                self.pending = Some(PendingAdvance {
                    due: now + duration,
                });
            }
            None => self.pending = None,
        }
    }

    /// The single mutation path shared by every command: update the
    /// synchronizer, then let the persistence gate observe the change.
    pub(crate) fn move_position(&mut self, index: usize, cause: PositionCause, now: Instant) {
        if self.sync.set_position(index, cause, now) {
            self.gate
                .note_position(self.sync.position(), self.tokens.len(), now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    /// 100 plain five-letter words: 200ms each at the default 300 wpm.
    fn hundred_words() -> Vec<String> {
        vec![
            (0..100)
                .map(|i| format!("wrd{:02}", i))
                .collect::<Vec<_>>()
                .join(" "),
        ]
    }

    fn engine_at(t0: Instant) -> (Engine, MemoryStore) {
        let store = MemoryStore::new();
        let engine = Engine::new(EngineConfig::default(), Box::new(store.clone()), t0);
        (engine, store)
    }

    fn loaded_engine(t0: Instant) -> (Engine, MemoryStore) {
        let (mut engine, store) = engine_at(t0);
        engine.load("book", &hundred_words(), None, t0);
        (engine, store)
    }

    #[test]
    fn empty_book_is_a_safe_terminal_state() {
        let t0 = Instant::now();
        let (mut engine, _store) = engine_at(t0);
        engine.load("empty", &[String::new()], None, t0);

        assert_eq!(engine.len(), 0);
        assert_eq!(engine.state(), PlaybackState::Stopped);
        engine.play(t0);
        engine.seek(25, t0);
        engine.begin_rewind(t0);
        engine.tick(t0 + ms(1000));
        assert_eq!(engine.position(), 0);
        assert_eq!(engine.state(), PlaybackState::Stopped);
        assert_eq!(engine.progress(), 0.0);
        assert_eq!(engine.display_chunk(3), 0..0);
    }

    #[test]
    fn autoplay_advances_by_exactly_one_word_per_deadline() {
        let t0 = Instant::now();
        let (mut engine, _store) = loaded_engine(t0);
        engine.play(t0);
        assert_eq!(engine.state(), PlaybackState::Playing);

        engine.tick(t0 + ms(199));
        assert_eq!(engine.position(), 0);
        engine.tick(t0 + ms(200));
        assert_eq!(engine.position(), 1);
        engine.tick(t0 + ms(400));
        assert_eq!(engine.position(), 2);
        // A coarse tick catches up without skipping the chain.
        engine.tick(t0 + ms(1000));
        assert_eq!(engine.position(), 5);
    }

    #[test]
    fn autoplay_stops_at_the_final_word() {
        let t0 = Instant::now();
        let (mut engine, store) = loaded_engine(t0);
        engine.seek(99, t0);
        engine.play(t0);
        engine.tick(t0 + ms(201));
        assert_eq!(engine.state(), PlaybackState::Stopped);
        assert_eq!(engine.position(), 99);
        assert!(engine.is_finished());
        // End-of-book forces a flush.
        assert_eq!(store.record("book").unwrap().last_token_index, 99);
        assert!(store.record("book").unwrap().is_finished);
    }

    #[test]
    fn seek_mid_playback_replaces_the_pending_advance() {
        let t0 = Instant::now();
        let (mut engine, _store) = loaded_engine(t0);
        engine.play(t0);
        engine.tick(t0 + ms(200));
        assert_eq!(engine.position(), 1);

        // Seek at +250ms; the old deadline (due +400ms) must not fire.
        engine.seek(57, t0 + ms(250));
        assert_eq!(engine.position(), 57);
        engine.tick(t0 + ms(420));
        assert_eq!(engine.position(), 57, "stale deadline double-advanced");
        engine.tick(t0 + ms(450));
        assert_eq!(engine.position(), 58);
    }

    #[test]
    fn pause_cancels_and_play_resumes_from_the_held_position() {
        let t0 = Instant::now();
        let (mut engine, _store) = loaded_engine(t0);
        engine.play(t0);
        engine.tick(t0 + ms(200));
        engine.pause();
        assert_eq!(engine.state(), PlaybackState::Paused);

        engine.tick(t0 + ms(2000));
        assert_eq!(engine.position(), 1, "paused engine must not advance");

        engine.play(t0 + ms(2000));
        engine.tick(t0 + ms(2200));
        assert_eq!(engine.position(), 2);
    }

    #[test]
    fn toggle_flips_between_playing_and_paused() {
        let t0 = Instant::now();
        let (mut engine, _store) = loaded_engine(t0);
        engine.toggle(t0);
        assert_eq!(engine.state(), PlaybackState::Playing);
        engine.toggle(t0 + ms(10));
        assert_eq!(engine.state(), PlaybackState::Paused);
    }

    #[test]
    fn seek_clamps_out_of_range_indices() {
        let t0 = Instant::now();
        let (mut engine, _store) = loaded_engine(t0);
        engine.seek(10_000, t0);
        assert_eq!(engine.position(), 99);
    }

    #[test]
    fn changing_wpm_rearms_the_current_word() {
        let t0 = Instant::now();
        let (mut engine, _store) = loaded_engine(t0);
        engine.play(t0);
        engine.set_words_per_minute(600.0, t0 + ms(50));
        // 600 wpm -> 100ms words, measured from the speed change.
        engine.tick(t0 + ms(149));
        assert_eq!(engine.position(), 0);
        engine.tick(t0 + ms(150));
        assert_eq!(engine.position(), 1);
    }

    #[test]
    fn invalid_wpm_is_clamped_not_propagated() {
        let t0 = Instant::now();
        let (mut engine, _store) = loaded_engine(t0);
        engine.set_words_per_minute(f32::NAN, t0);
        assert_eq!(engine.words_per_minute(), pacing::DEFAULT_WPM);
        engine.set_words_per_minute(-5.0, t0);
        assert_eq!(engine.words_per_minute(), pacing::MIN_WPM);
    }

    #[test]
    fn rewind_steps_back_on_cadence_and_resumes_playing_on_release() {
        let t0 = Instant::now();
        let (mut engine, _store) = loaded_engine(t0);
        engine.seek(10, t0);
        engine.play(t0);
        engine.pause();

        engine.begin_rewind(t0);
        assert_eq!(engine.state(), PlaybackState::Rewinding);
        engine.update_rewind(2.0, t0 + ms(100));
        engine.tick(t0 + ms(650));
        assert_eq!(engine.position(), 8); // steps at +300ms and +600ms
        engine.update_rewind(-3.0, t0 + ms(700));
        engine.end_rewind(t0 + ms(700));

        assert_eq!(engine.state(), PlaybackState::Playing);
        assert_eq!(engine.position(), 8);
        engine.tick(t0 + ms(900));
        assert_eq!(engine.position(), 9);
    }

    #[test]
    fn rewind_cancels_on_pointer_drift_and_restores_origin() {
        let t0 = Instant::now();
        let (mut engine, _store) = loaded_engine(t0);
        engine.seek(20, t0);
        engine.play(t0);
        engine.pause();

        engine.begin_rewind(t0);
        engine.tick(t0 + ms(950));
        assert_eq!(engine.position(), 17);
        engine.update_rewind(30.0, t0 + ms(960)); // past the 24px threshold
        assert_eq!(engine.state(), PlaybackState::Paused);
        assert_eq!(engine.position(), 20);

        // A cancelled gesture no longer steps.
        engine.tick(t0 + ms(2000));
        assert_eq!(engine.position(), 20);
    }

    #[test]
    fn rewind_holds_at_the_first_word() {
        let t0 = Instant::now();
        let (mut engine, _store) = loaded_engine(t0);
        engine.seek(1, t0);
        engine.play(t0);
        engine.pause();
        engine.begin_rewind(t0);
        engine.tick(t0 + ms(5000));
        assert_eq!(engine.position(), 0);
        assert_eq!(engine.state(), PlaybackState::Rewinding);
    }

    #[test]
    fn rewind_only_starts_from_paused() {
        let t0 = Instant::now();
        let (mut engine, _store) = loaded_engine(t0);
        engine.begin_rewind(t0);
        assert_eq!(engine.state(), PlaybackState::Stopped);
        engine.play(t0);
        engine.begin_rewind(t0);
        assert_eq!(engine.state(), PlaybackState::Playing);
    }

    #[test]
    fn restore_seeds_position_and_progress() {
        let t0 = Instant::now();
        let store = MemoryStore::new();
        store.insert(PersistedProgress {
            book_id: "book".to_string(),
            last_token_index: 57,
            bookmark_progress: 0.57,
            is_finished: false,
            last_opened_timestamp: 1_700_000_000,
        });
        let mut engine = Engine::new(EngineConfig::default(), Box::new(store.clone()), t0);
        engine.load("book", &hundred_words(), None, t0);

        assert_eq!(engine.position(), 57);
        assert!((engine.progress() - 0.57).abs() < 1e-6);
        assert!(!engine.is_finished());
    }

    #[test]
    fn explicit_prior_record_round_trips() {
        let t0 = Instant::now();
        let (mut engine, _store) = engine_at(t0);
        let prior = PersistedProgress {
            book_id: "book".to_string(),
            last_token_index: 42,
            bookmark_progress: 0.42,
            is_finished: false,
            last_opened_timestamp: 1_700_000_000,
        };
        engine.load("book", &hundred_words(), Some(prior), t0);
        assert_eq!(engine.position(), 42);
    }

    #[test]
    fn restore_past_threshold_marks_finished() {
        let t0 = Instant::now();
        let store = MemoryStore::new();
        store.insert(PersistedProgress {
            book_id: "book".to_string(),
            last_token_index: 99,
            bookmark_progress: 0.995,
            is_finished: false,
            last_opened_timestamp: 1_700_000_000,
        });
        let mut engine = Engine::new(EngineConfig::default(), Box::new(store.clone()), t0);
        engine.load("book", &hundred_words(), None, t0);
        assert!(engine.is_finished());
    }

    #[test]
    fn position_changes_are_debounced_into_storage() {
        let t0 = Instant::now();
        let (mut engine, store) = loaded_engine(t0);
        engine.seek(5, t0);
        engine.seek(6, t0 + ms(50));
        engine.seek(7, t0 + ms(100));
        engine.tick(t0 + ms(200));
        assert_eq!(store.write_count(), 0);
        engine.tick(t0 + ms(401));
        assert_eq!(store.write_count(), 1);
        assert_eq!(store.record("book").unwrap().last_token_index, 7);
    }

    #[test]
    fn background_and_shutdown_flush_immediately() {
        let t0 = Instant::now();
        let (mut engine, store) = loaded_engine(t0);
        engine.seek(30, t0);
        engine.on_background(t0 + ms(10));
        assert_eq!(store.record("book").unwrap().last_token_index, 30);

        engine.seek(31, t0 + ms(20));
        engine.shutdown(t0 + ms(30));
        assert_eq!(store.record("book").unwrap().last_token_index, 31);
    }

    #[test]
    fn subscribers_see_autoplay_and_state_events() {
        let t0 = Instant::now();
        let (mut engine, _store) = loaded_engine(t0);
        let seen: Rc<RefCell<Vec<EngineEvent>>> = Rc::default();
        let sink = Rc::clone(&seen);
        let id = engine.subscribe(move |event| sink.borrow_mut().push(*event));

        engine.play(t0);
        engine.tick(t0 + ms(200));
        let events = seen.borrow().clone();
        assert!(events.contains(&EngineEvent::PlayStateChanged(PlaybackState::Playing)));
        assert!(events.iter().any(|e| matches!(
            e,
            EngineEvent::PositionChanged {
                index: 1,
                cause: PositionCause::Autoplay,
                ..
            }
        )));

        assert!(engine.unsubscribe(id));
        let before = seen.borrow().len();
        engine.tick(t0 + ms(400));
        assert_eq!(seen.borrow().len(), before);
    }

    #[test]
    fn scroll_updates_respect_hysteresis_and_programmatic_window() {
        let t0 = Instant::now();
        let (mut engine, _store) = loaded_engine(t0);
        engine.seek(40, t0);

        // Inside the 100ms programmatic window: an echo, dropped.
        engine.note_scroll_position(48, t0 + ms(50));
        assert_eq!(engine.position(), 40);

        // Outside the window but within hysteresis: dropped.
        engine.note_scroll_position(41, t0 + ms(200));
        assert_eq!(engine.position(), 40);

        engine.note_scroll_position(48, t0 + ms(200));
        assert_eq!(engine.position(), 48);
    }

    #[test]
    fn scroll_while_playing_rearms_pacing_from_the_new_word() {
        let t0 = Instant::now();
        let (mut engine, _store) = loaded_engine(t0);
        engine.play(t0);
        engine.note_scroll_position(60, t0 + ms(150));
        assert_eq!(engine.position(), 60);
        engine.tick(t0 + ms(340));
        assert_eq!(engine.position(), 60);
        engine.tick(t0 + ms(350));
        assert_eq!(engine.position(), 61);
    }

    #[test]
    fn display_chunk_honors_chunk_size_and_context() {
        let t0 = Instant::now();
        let store = MemoryStore::new();
        let config = EngineConfig {
            chunk_size: 2,
            show_context_words: true,
            ..EngineConfig::default()
        };
        let mut engine = Engine::new(config, Box::new(store), t0);
        engine.load("book", &hundred_words(), None, t0);

        assert_eq!(engine.display_chunk(10), 9..13);
        assert_eq!(engine.display_chunk(0), 0..3);
        assert_eq!(engine.display_chunk(99), 98..100);
    }

    #[test]
    fn next_deadline_reports_the_earliest_pending_work() {
        let t0 = Instant::now();
        let (mut engine, _store) = loaded_engine(t0);
        assert!(engine.next_deadline().is_none());
        engine.play(t0);
        assert_eq!(engine.next_deadline(), Some(t0 + ms(200)));
        engine.pause();
        // Pause cleared the only armed deadline; the position never moved,
        // so no persistence debounce is pending either.
        engine.tick(t0 + ms(5000));
        assert!(engine.next_deadline().is_none());
    }
}
