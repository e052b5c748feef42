pub mod event;
pub mod participant;
pub mod session;

use serde::{Deserialize, Serialize};

// -----------------------------
// Session module re-exports
// -----------------------------
pub use session::{
    join_path,
    AuthorityMode,
    CreateSessionRequest,
    CreateSessionResponse,
    JoinTokenInfo,
    PlaybackState,
    SessionInfo,
    SessionStatus,
    WatchSession,
};

// -----------------------------
// Participant module re-exports
// -----------------------------
pub use participant::{
    Claims,
    ConnectionState,
    JoinSessionRequest,
    JoinSessionResponse,
    Participant,
    ParticipantInfo,
    Role,
};

pub use event::{ControlEvent, ControlKind};

/// Catalog entry as returned by the catalog collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaInfo {
    #[serde(alias = "id")]
    pub media_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, alias = "duration")]
    pub duration_seconds: Option<f64>,
}

impl MediaInfo {
    pub fn new(media_id: impl Into<String>) -> Self {
        Self {
            media_id: media_id.into(),
            title: None,
            duration_seconds: None,
        }
    }

    pub fn with_duration(mut self, duration_seconds: f64) -> Self {
        self.duration_seconds = Some(duration_seconds);
        self
    }
}
