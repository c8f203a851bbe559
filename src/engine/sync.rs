//! Single-writer reading position shared by the scroll view and the playback
//! machine.
//!
//! Every position mutation funnels through [`PositionSync`]; neither consumer
//! keeps its own notion of "current word". Subscribers get pushed
//! [`EngineEvent`]s and hold a [`SubscriptionId`] for explicit unsubscribe.
//! A short-lived programmatic window after each engine-driven move breaks the
//! scroll feedback loop: scroll callbacks landing inside it are echoes of our
//! own adjustment and are dropped.

use super::{Engine, PlaybackState};
use std::time::{Duration, Instant};
use tracing::debug;

/// What moved the reading position. Lets the scroll view choose smooth versus
/// instant scrolling and skip updates it originated itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionCause {
    Autoplay,
    Seek,
    Scroll,
    Rewind,
    Restore,
}

/// Pushed to subscribers on every reader-visible change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineEvent {
    PositionChanged {
        index: usize,
        progress: f32,
        cause: PositionCause,
    },
    PlayStateChanged(PlaybackState),
}

/// Opaque handle returned by `subscribe`; pass back to `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Box<dyn FnMut(&EngineEvent)>;

pub(crate) struct PositionSync {
    position: usize,
    len: usize,
    subscribers: Vec<(SubscriptionId, Callback)>,
    next_subscription: u64,
    programmatic_window: Duration,
    programmatic_until: Option<Instant>,
    hysteresis: usize,
}

impl PositionSync {
    pub(crate) fn new(programmatic_window: Duration, hysteresis: usize) -> Self {
        Self {
            position: 0,
            len: 0,
            subscribers: Vec::new(),
            next_subscription: 0,
            programmatic_window,
            programmatic_until: None,
            hysteresis,
        }
    }

    /// New book: position back to 0, suppression window cleared. Subscribers
    /// survive a book switch.
    pub(crate) fn reset(&mut self, len: usize) {
        self.position = 0;
        self.len = len;
        self.programmatic_until = None;
    }

    pub(crate) fn position(&self) -> usize {
        self.position
    }

    pub(crate) fn progress(&self) -> f32 {
        self.position as f32 / self.len.max(1) as f32
    }

    pub(crate) fn subscribe(&mut self, callback: Callback) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, callback));
        id
    }

    pub(crate) fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    /// The single position update path. Clamps, arms the programmatic window
    /// for engine-driven causes, and notifies subscribers on change (Restore
    /// always notifies so late subscribers see the seeded position).
    /// Returns whether the position actually moved.
    pub(crate) fn set_position(
        &mut self,
        index: usize,
        cause: PositionCause,
        now: Instant,
    ) -> bool {
        if self.len == 0 {
            return false;
        }
        let clamped = index.min(self.len - 1);
        let changed = clamped != self.position;
        self.position = clamped;

        if cause != PositionCause::Scroll {
            self.programmatic_until = Some(now + self.programmatic_window);
        }
        if changed || cause == PositionCause::Restore {
            let event = EngineEvent::PositionChanged {
                index: self.position,
                progress: self.progress(),
                cause,
            };
            self.emit(&event);
        }
        changed
    }

    /// Whether a scroll-driven update should be applied at all: dropped while
    /// inside the programmatic window, and below the hysteresis distance.
    pub(crate) fn accepts_scroll(&self, index: usize, now: Instant) -> bool {
        if self.len == 0 {
            return false;
        }
        if self.programmatic_until.is_some_and(|until| now < until) {
            return false;
        }
        let clamped = index.min(self.len - 1);
        clamped.abs_diff(self.position) > self.hysteresis
    }

    pub(crate) fn notify_state(&mut self, state: PlaybackState) {
        let event = EngineEvent::PlayStateChanged(state);
        self.emit(&event);
    }

    fn emit(&mut self, event: &EngineEvent) {
        for (_, callback) in &mut self.subscribers {
            callback(event);
        }
    }
}

impl Engine {
    /// Register for position and play-state events. The returned id must be
    /// passed to [`Engine::unsubscribe`] when the consumer goes away.
    pub fn subscribe(&mut self, callback: impl FnMut(&EngineEvent) + 'static) -> SubscriptionId {
        self.sync.subscribe(Box::new(callback))
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.sync.unsubscribe(id)
    }

    /// Scroll view reports the word index its viewport crossed onto. Ignored
    /// within the hysteresis band and during the programmatic window, so the
    /// engine's own auto-scroll never loops back into a position change.
    pub fn note_scroll_position(&mut self, index: usize, now: Instant) {
        if !self.sync.accepts_scroll(index, now) {
            debug!(index, "Ignored scroll update (hysteresis or programmatic window)");
            return;
        }
        debug!(index, "Scroll moved reading position");
        self.move_position(index, PositionCause::Scroll, now);
        if self.state == PlaybackState::Playing {
            // Pacing follows the word under the new position.
            self.arm_advance(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sync_with(window_ms: u64, hysteresis: usize, len: usize) -> PositionSync {
        let mut sync = PositionSync::new(Duration::from_millis(window_ms), hysteresis);
        sync.reset(len);
        sync
    }

    #[test]
    fn progress_is_position_over_len() {
        let t0 = Instant::now();
        let mut sync = sync_with(100, 2, 200);
        sync.set_position(50, PositionCause::Seek, t0);
        assert_eq!(sync.progress(), 0.25);
    }

    #[test]
    fn empty_sequence_progress_is_zero_and_updates_are_noops() {
        let t0 = Instant::now();
        let mut sync = sync_with(100, 2, 0);
        assert_eq!(sync.progress(), 0.0);
        assert!(!sync.set_position(10, PositionCause::Seek, t0));
        assert!(!sync.accepts_scroll(3, t0));
    }

    #[test]
    fn set_position_clamps_to_the_sequence() {
        let t0 = Instant::now();
        let mut sync = sync_with(100, 2, 10);
        sync.set_position(500, PositionCause::Seek, t0);
        assert_eq!(sync.position(), 9);
    }

    #[test]
    fn scroll_inside_hysteresis_band_is_rejected() {
        let t0 = Instant::now();
        let mut sync = sync_with(0, 2, 100);
        sync.set_position(10, PositionCause::Scroll, t0);
        assert!(!sync.accepts_scroll(11, t0));
        assert!(!sync.accepts_scroll(12, t0));
        assert!(sync.accepts_scroll(13, t0));
    }

    #[test]
    fn programmatic_window_suppresses_scroll_echoes() {
        let t0 = Instant::now();
        let mut sync = sync_with(100, 0, 100);
        sync.set_position(40, PositionCause::Seek, t0);
        assert!(!sync.accepts_scroll(45, t0 + Duration::from_millis(50)));
        assert!(sync.accepts_scroll(45, t0 + Duration::from_millis(150)));
    }

    #[test]
    fn scroll_cause_does_not_arm_the_window() {
        let t0 = Instant::now();
        let mut sync = sync_with(100, 0, 100);
        sync.set_position(40, PositionCause::Scroll, t0);
        assert!(sync.accepts_scroll(45, t0 + Duration::from_millis(1)));
    }

    #[test]
    fn subscribers_receive_changes_until_unsubscribed() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let t0 = Instant::now();
        let mut sync = sync_with(100, 0, 100);
        let seen: Rc<RefCell<Vec<EngineEvent>>> = Rc::default();
        let sink = Rc::clone(&seen);
        let id = sync.subscribe(Box::new(move |event| sink.borrow_mut().push(*event)));

        sync.set_position(3, PositionCause::Autoplay, t0);
        sync.notify_state(PlaybackState::Playing);
        assert_eq!(seen.borrow().len(), 2);

        assert!(sync.unsubscribe(id));
        assert!(!sync.unsubscribe(id));
        sync.set_position(4, PositionCause::Autoplay, t0);
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn unchanged_position_emits_nothing_except_restore() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let t0 = Instant::now();
        let mut sync = sync_with(100, 0, 100);
        let seen: Rc<RefCell<Vec<EngineEvent>>> = Rc::default();
        let sink = Rc::clone(&seen);
        sync.subscribe(Box::new(move |event| sink.borrow_mut().push(*event)));

        sync.set_position(0, PositionCause::Seek, t0);
        assert!(seen.borrow().is_empty());
        sync.set_position(0, PositionCause::Restore, t0);
        assert_eq!(seen.borrow().len(), 1);
    }
}
