//! Playback state machine: play/pause/seek transitions, the timer-driven
//! advance loop, and the held rewind gesture.
//!
//! Scheduling is cooperative: the host calls [`Engine::tick`] with the
//! current instant and the engine fires whatever deadlines have elapsed.
//! There is exactly one advance slot; every transition that changes pacing or
//! position replaces it, so a stale deadline can never double-advance.

use super::sync::PositionCause;
use super::Engine;
use crate::pacing;
use crate::persist::FlushReason;
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
    Rewinding,
}

/// The one armed auto-advance. Replacing or clearing the slot is the
/// cancellation path; there is no timer handle to leak.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PendingAdvance {
    pub(crate) due: Instant,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct RewindGesture {
    /// Position when the gesture started; restored if the gesture cancels.
    pub(crate) origin_index: usize,
    pub(crate) next_step: Instant,
    /// Accumulated pointer drift from the initiating touch point.
    pub(crate) drift: f32,
}

impl Engine {
    /// Start (or resume) timed playback from the current position. No-op on
    /// an empty sequence, while already playing, and during a rewind gesture
    /// (the gesture owns the transition until released).
    pub fn play(&mut self, now: Instant) {
        if self.tokens.is_empty() {
            debug!("Play ignored; no words loaded");
            return;
        }
        match self.state {
            PlaybackState::Playing | PlaybackState::Rewinding => {}
            PlaybackState::Stopped | PlaybackState::Paused => {
                info!(position = self.sync.position(), "Starting playback");
                self.set_state(PlaybackState::Playing);
                self.arm_advance(now);
            }
        }
    }

    /// Cancel the pending advance and hold the current position.
    pub fn pause(&mut self) {
        if self.state != PlaybackState::Playing {
            return;
        }
        info!(position = self.sync.position(), "Pausing playback");
        self.pending = None;
        self.set_state(PlaybackState::Paused);
    }

    pub fn toggle(&mut self, now: Instant) {
        if self.state == PlaybackState::Playing {
            self.pause();
        } else {
            self.play(now);
        }
    }

    /// Jump to a word. Clamped, state unchanged; while playing the pending
    /// deadline is replaced so the next advance paces off the new word.
    pub fn seek(&mut self, index: usize, now: Instant) {
        if self.tokens.is_empty() {
            return;
        }
        let clamped = index.min(self.tokens.len() - 1);
        debug!(from = self.sync.position(), to = clamped, "Seeking");
        self.move_position(clamped, PositionCause::Seek, now);
        if self.state == PlaybackState::Playing {
            self.arm_advance(now);
        }
    }

    /// Sustained-press rewind, only from Paused. Position steps backward one
    /// word per cadence interval until release or cancel.
    pub fn begin_rewind(&mut self, now: Instant) {
        if self.state != PlaybackState::Paused || self.tokens.is_empty() {
            return;
        }
        info!(position = self.sync.position(), "Rewind gesture started");
        self.rewind = Some(RewindGesture {
            origin_index: self.sync.position(),
            next_step: now + self.config.rewind_interval(),
            drift: 0.0,
        });
        self.set_state(PlaybackState::Rewinding);
    }

    /// Accumulate pointer drift for the held gesture. Drift past the
    /// threshold means the press turned into a drag: the gesture cancels and
    /// the position reverts to where the gesture began.
    pub fn update_rewind(&mut self, drift_px: f32, now: Instant) {
        if self.state != PlaybackState::Rewinding {
            return;
        }
        let drift = {
            let Some(gesture) = self.rewind.as_mut() else {
                return;
            };
            if drift_px.is_finite() {
                gesture.drift += drift_px;
            }
            gesture.drift
        };
        if drift.abs() > self.config.rewind_cancel_threshold_px {
            let origin = self
                .rewind
                .take()
                .map(|g| g.origin_index)
                .unwrap_or_else(|| self.sync.position());
            info!(origin, "Rewind cancelled by pointer drift");
            self.move_position(origin, PositionCause::Rewind, now);
            self.set_state(PlaybackState::Paused);
        }
    }

    /// Release the gesture: commit the position reached and resume forward
    /// playback. Auto-resuming (rather than staying paused) is deliberate
    /// product behavior.
    pub fn end_rewind(&mut self, now: Instant) {
        if self.state != PlaybackState::Rewinding {
            return;
        }
        self.rewind = None;
        info!(
            position = self.sync.position(),
            "Rewind released; resuming playback"
        );
        self.set_state(PlaybackState::Playing);
        self.arm_advance(now);
    }

    /// Fire every deadline that has elapsed: autoplay advances, rewind steps,
    /// and the persistence debounce.
    pub fn tick(&mut self, now: Instant) {
        self.advance_due(now);
        self.rewind_due(now);
        self.gate.poll(now);
    }

    /// Earliest instant at which `tick` has work to do, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        let candidates = [
            self.pending.map(|p| p.due),
            self.rewind.map(|g| g.next_step),
            self.gate.next_due(),
        ];
        candidates.into_iter().flatten().min()
    }

    fn advance_due(&mut self, now: Instant) {
        while self.state == PlaybackState::Playing {
            let Some(pending) = self.pending else { break };
            if pending.due > now {
                break;
            }
            let position = self.sync.position();
            if position + 1 >= self.tokens.len() {
                info!(position, "Reached end of book");
                self.pending = None;
                self.finished = true;
                self.set_state(PlaybackState::Stopped);
                self.gate
                    .flush(position, self.tokens.len(), now, FlushReason::Stop);
                break;
            }
            self.move_position(position + 1, PositionCause::Autoplay, now);
            // Chain the next deadline off the previous one so a coarse host
            // tick cannot stretch the pacing.
            if let Some(word) = self.tokens.get(position + 1) {
                let duration = pacing::word_duration(self.config.words_per_minute, word);
                self.pending = Some(PendingAdvance {
                    due: pending.due + duration,
                });
            } else {
                self.pending = None;
            }
        }
    }

    fn rewind_due(&mut self, now: Instant) {
        while self.state == PlaybackState::Rewinding {
            let Some(gesture) = self.rewind else { break };
            if gesture.next_step > now {
                break;
            }
            if let Some(g) = self.rewind.as_mut() {
                g.next_step = gesture.next_step + self.config.rewind_interval();
            }
            let position = self.sync.position();
            if position > 0 {
                self.move_position(position - 1, PositionCause::Rewind, now);
            }
            // At position 0 the gesture idles; cadence stays armed until
            // release.
        }
    }
}
