use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{MediaInfo, ParticipantInfo};

/// Lifecycle status of a watch session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Idle,
    Closed,
}

/// Authoritative playback state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Paused,
}

/// Who may issue play/pause/seek
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityMode {
    #[default]
    HostControlled,
    Collaborative,
}

/// One shared viewing instance. Owned by its session actor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchSession {
    pub id: String,
    pub media_id: String,
    pub join_token: String,
    pub host_id: Option<String>,
    pub status: SessionStatus,
    pub playback_state: PlaybackState,
    /// Playback offset that was true at `position_updated_at`.
    pub position_seconds: f64,
    pub position_updated_at: DateTime<Utc>,
    pub authority_mode: AuthorityMode,
    pub media_duration_seconds: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl WatchSession {
    pub fn new(
        media: &MediaInfo,
        host_id: String,
        authority_mode: AuthorityMode,
        join_token: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            media_id: media.media_id.clone(),
            join_token,
            host_id: Some(host_id),
            status: SessionStatus::Active,
            playback_state: PlaybackState::Paused,
            position_seconds: 0.0,
            position_updated_at: now,
            authority_mode,
            media_duration_seconds: media.duration_seconds,
            created_at: now,
            closed_at: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.status == SessionStatus::Closed
    }
}

/// Canonical session snapshot returned to HTTP callers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionInfo {
    pub session_id: String,
    pub media_id: String,
    pub host_id: Option<String>,
    pub status: SessionStatus,
    pub playback_state: PlaybackState,
    /// Effective position at `server_time`
    pub position_seconds: f64,
    pub server_time: i64,
    pub authority_mode: AuthorityMode,
    pub created_at: DateTime<Utc>,
    pub participants: Vec<ParticipantInfo>,
}

/// Public view of a join link, used for join-page rendering
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JoinTokenInfo {
    pub session_id: String,
    pub media_id: String,
    pub status: SessionStatus,
    pub authority_mode: AuthorityMode,
    pub participant_count: usize,
}

/// Request to create a session
#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub media_id: String,
    pub display: String,
    #[serde(default)]
    pub authority_mode: AuthorityMode,
}

/// Response after creating a session. The ticket belongs to the host.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub media_id: String,
    pub join_token: String,
    pub join_path: String,
    pub participant_id: String,
    pub ticket: String,
    pub ws_path: String,
    pub authority_mode: AuthorityMode,
    pub created_at: DateTime<Utc>,
    pub expires_in: u64,
}

/// Path a front-end renders into a shareable join link
pub fn join_path(join_token: &str) -> String {
    format!("/join/{}", join_token)
}
