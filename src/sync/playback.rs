//! Playback state machine over a `WatchSession` record.

use chrono::{DateTime, Utc};

use crate::models::{PlaybackState, WatchSession};
use crate::sync::reconciler::session_position;

/// A playback change the resolver has accepted
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    Play,
    Pause,
    Seek(f64),
}

impl WatchSession {
    pub fn effective_position(&self, now: DateTime<Utc>) -> f64 {
        session_position(self, now)
    }

    /// Apply an accepted transition at server time `now`.
    ///
    /// Returns false when the record did not change (closed session, play
    /// while playing, pause while paused).
    pub fn apply(&mut self, transition: Transition, now: DateTime<Utc>) -> bool {
        if self.is_closed() {
            return false;
        }

        match (transition, self.playback_state) {
            (Transition::Play, PlaybackState::Paused) => {
                self.playback_state = PlaybackState::Playing;
                self.position_updated_at = now;
                true
            }
            (Transition::Pause, PlaybackState::Playing) => {
                self.position_seconds = self.effective_position(now);
                self.position_updated_at = now;
                self.playback_state = PlaybackState::Paused;
                true
            }
            (Transition::Play, PlaybackState::Playing)
            | (Transition::Pause, PlaybackState::Paused) => false,
            (Transition::Seek(target), _) => {
                self.position_seconds = target;
                self.position_updated_at = now;
                true
            }
        }
    }
}
