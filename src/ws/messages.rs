use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, SyncError};
use crate::models::{AuthorityMode, ControlKind, ParticipantInfo, PlaybackState};

// ==================== Client -> Server Messages ====================

/// Inbound frame from a participant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seek_target: Option<f64>,
    /// Milliseconds since the Unix epoch, by the client's clock
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_sent_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Round-trip time measured by the client, only on `ping`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtt_ms: Option<f64>,
}

impl ClientMessage {
    /// Map a control frame onto its event kind; `Ok(None)` for non-control frames.
    pub fn control_kind(&self) -> Result<Option<ControlKind>, AppError> {
        let kind = match self.msg_type.as_str() {
            msg_types::JOIN => ControlKind::Join,
            msg_types::LEAVE => ControlKind::Leave,
            msg_types::PLAY => ControlKind::Play,
            msg_types::PAUSE => ControlKind::Pause,
            msg_types::SEEK => {
                let target_seconds = self.seek_target.ok_or_else(|| {
                    AppError::BadRequest("seek requires seek_target".to_string())
                })?;
                ControlKind::Seek { target_seconds }
            }
            _ => return Ok(None),
        };
        Ok(Some(kind))
    }

    pub fn client_sent_at(&self) -> Option<DateTime<Utc>> {
        self.client_sent_at
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }
}

// ==================== Server -> Client Messages ====================

/// Canonical playback state as of `server_time`
#[derive(Debug, Clone, PartialEq)]
pub struct StateFrame {
    pub playback_state: PlaybackState,
    pub position_seconds: f64,
    pub server_time: i64,
    pub authority_mode: AuthorityMode,
    pub host_id: Option<String>,
}

/// Outbound frame to a participant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playback_state: Option<PlaybackState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_seconds: Option<f64>,
    pub server_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority_mode: Option<AuthorityMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participants: Option<Vec<ParticipantInfo>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ServerMessage {
    pub fn new(msg_type: &str, server_time: i64) -> Self {
        Self {
            msg_type: msg_type.to_string(),
            request_id: None,
            playback_state: None,
            position_seconds: None,
            server_time,
            authority_mode: None,
            host_id: None,
            participants: None,
            reason: None,
            message: None,
        }
    }

    pub fn with_state(msg_type: &str, frame: &StateFrame) -> Self {
        Self {
            playback_state: Some(frame.playback_state),
            position_seconds: Some(frame.position_seconds),
            authority_mode: Some(frame.authority_mode),
            host_id: frame.host_id.clone(),
            ..Self::new(msg_type, frame.server_time)
        }
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn with_participants(mut self, participants: Vec<ParticipantInfo>) -> Self {
        self.participants = Some(participants);
        self
    }

    pub fn state_sync(frame: &StateFrame) -> Self {
        Self::with_state(msg_types::STATE_SYNC, frame)
    }

    /// Correction sent only to the originator of a refused event
    pub fn rejected(frame: &StateFrame, err: &SyncError) -> Self {
        let mut msg = Self::with_state(msg_types::REJECTED, frame);
        msg.reason = Some(err.code().to_string());
        msg.message = Some(err.to_string());
        msg
    }

    pub fn session_closed(server_time: i64) -> Self {
        Self::new(msg_types::SESSION_CLOSED, server_time)
    }

    pub fn pong(server_time: i64, request_id: Option<String>) -> Self {
        Self::new(msg_types::PONG, server_time).with_request_id(request_id)
    }

    pub fn error(code: u16, message: &str, server_time: i64, request_id: Option<String>) -> Self {
        let mut msg = Self::new(msg_types::ERROR, server_time).with_request_id(request_id);
        msg.reason = Some(code.to_string());
        msg.message = Some(message.to_string());
        msg
    }
}

/// Message types enum for matching
pub mod msg_types {
    pub const JOIN: &str = "join";
    pub const LEAVE: &str = "leave";
    pub const PLAY: &str = "play";
    pub const PAUSE: &str = "pause";
    pub const SEEK: &str = "seek";
    pub const PING: &str = "ping";

    // Server -> Client
    pub const STATE_SYNC: &str = "state_sync";
    pub const REJECTED: &str = "rejected";
    pub const JOINED: &str = "joined";
    pub const PARTICIPANT_UPDATE: &str = "participant_update";
    pub const LEFT: &str = "left";
    pub const SESSION_CLOSED: &str = "session_closed";
    pub const PONG: &str = "pong";
    pub const ERROR: &str = "error";
}
