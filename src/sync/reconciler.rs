//! Clock reconciliation: latency smoothing and effective playback position.
//!
//! Everything here is a pure function of its inputs.

use chrono::{DateTime, Utc};

use crate::models::{PlaybackState, WatchSession};

/// Weight kept from the previous estimate on each new sample.
pub const LATENCY_SMOOTHING: f64 = 0.8;

/// Fold a round-trip sample into the smoothed estimate.
///
/// The first sample seeds the estimate. Samples that are negative or not
/// finite are ignored.
pub fn smooth_latency(previous: Option<f64>, sample_ms: f64) -> Option<f64> {
    if !sample_ms.is_finite() || sample_ms < 0.0 {
        return previous;
    }

    Some(match previous {
        Some(old) => LATENCY_SMOOTHING * old + (1.0 - LATENCY_SMOOTHING) * sample_ms,
        None => sample_ms,
    })
}

/// Seconds from `from` to `to`, never negative.
pub fn elapsed_seconds(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let millis = (to - from).num_milliseconds().max(0);
    millis as f64 / 1000.0
}

/// Playback offset at server time `now`.
///
/// Paused sessions report exactly the stored position. Playing sessions add
/// the time elapsed since the position was last set. The result is clamped to
/// the media duration when the catalog knows it.
pub fn effective_position(
    playback_state: PlaybackState,
    position_seconds: f64,
    position_updated_at: DateTime<Utc>,
    duration_seconds: Option<f64>,
    now: DateTime<Utc>,
) -> f64 {
    let position = match playback_state {
        PlaybackState::Paused => position_seconds,
        PlaybackState::Playing => position_seconds + elapsed_seconds(position_updated_at, now),
    };

    match duration_seconds {
        Some(duration) => position.clamp(0.0, duration.max(0.0)),
        None => position.max(0.0),
    }
}

/// Effective position of a session record at `now`.
pub fn session_position(session: &WatchSession, now: DateTime<Utc>) -> f64 {
    effective_position(
        session.playback_state,
        session.position_seconds,
        session.position_updated_at,
        session.media_duration_seconds,
        now,
    )
}
