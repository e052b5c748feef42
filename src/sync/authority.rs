//! Authority & conflict resolution.
//!
//! Concurrent events are never reconciled here: the session actor hands them
//! over one at a time in server arrival order, so whichever arrives first is
//! applied first and the later one wins.

use crate::error::SyncError;
use crate::models::{AuthorityMode, ControlEvent, ControlKind, WatchSession};
use crate::sync::membership::Membership;
use crate::sync::playback::Transition;

/// Outcome of a successful resolution
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Admit,
    Depart,
    Playback(Transition),
}

/// Decide whether `event` is accepted against the current session state.
pub fn resolve(
    session: &WatchSession,
    members: &Membership,
    event: &ControlEvent,
) -> Result<Decision, SyncError> {
    if session.is_closed() || event.session_id != session.id {
        return Err(SyncError::SessionNotFound);
    }

    let joined = members
        .get(&event.participant_id)
        .is_some_and(|p| p.is_joined());

    let transition = match event.kind {
        ControlKind::Join if joined => return Err(SyncError::AlreadyJoined),
        ControlKind::Join => return Ok(Decision::Admit),
        _ if !joined => return Err(SyncError::StaleParticipant),
        ControlKind::Leave => return Ok(Decision::Depart),
        ControlKind::Play => Transition::Play,
        ControlKind::Pause => Transition::Pause,
        ControlKind::Seek { target_seconds } => Transition::Seek(target_seconds),
    };

    check_authority(session, &event.participant_id)?;

    if let Transition::Seek(target) = transition {
        validate_seek_target(target, session.media_duration_seconds)?;
    }

    Ok(Decision::Playback(transition))
}

fn check_authority(session: &WatchSession, participant_id: &str) -> Result<(), SyncError> {
    match session.authority_mode {
        AuthorityMode::Collaborative => Ok(()),
        AuthorityMode::HostControlled => {
            if session.host_id.as_deref() == Some(participant_id) {
                Ok(())
            } else {
                Err(SyncError::NotAuthorized)
            }
        }
    }
}

fn validate_seek_target(target: f64, duration: Option<f64>) -> Result<(), SyncError> {
    let within_media = duration.map_or(true, |d| target <= d);
    if target.is_finite() && target >= 0.0 && within_media {
        Ok(())
    } else {
        Err(SyncError::InvalidSeekTarget(target))
    }
}
