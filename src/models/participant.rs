use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Member,
}

/// Connection state of a participant.
///
/// `Disconnected` carries the instant the connection dropped so the grace
/// window can be evaluated without a separate flag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ConnectionState {
    Joining,
    Joined,
    Disconnected { since: DateTime<Utc> },
}

/// One client bound to one session
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub participant_id: String,
    pub session_id: String,
    pub display_name: String,
    pub role: Role,
    pub connection_state: ConnectionState,
    /// First time this participant reached `Joined`
    pub joined_at: Option<DateTime<Utc>>,
    /// Ordering key for host promotion, lower is longer-tenured
    pub tenure: Option<u64>,
    pub last_seen_at: DateTime<Utc>,
    pub estimated_latency_ms: Option<f64>,
}

impl Participant {
    pub fn new(
        participant_id: String,
        session_id: String,
        display_name: String,
        role: Role,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            participant_id,
            session_id,
            display_name,
            role,
            connection_state: ConnectionState::Joining,
            joined_at: None,
            tenure: None,
            last_seen_at: now,
            estimated_latency_ms: None,
        }
    }

    pub fn is_joined(&self) -> bool {
        self.connection_state == ConnectionState::Joined
    }

    pub fn is_host(&self) -> bool {
        self.role == Role::Host
    }

    pub fn info(&self) -> ParticipantInfo {
        ParticipantInfo {
            participant_id: self.participant_id.clone(),
            display_name: self.display_name.clone(),
            role: self.role,
            connection_state: self.connection_state,
            joined_at: self.joined_at,
            estimated_latency_ms: self.estimated_latency_ms,
        }
    }
}

/// Participant entry sent to clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParticipantInfo {
    pub participant_id: String,
    pub display_name: String,
    pub role: Role,
    pub connection_state: ConnectionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_latency_ms: Option<f64>,
}

/// Request to join through a join link
#[derive(Debug, Deserialize)]
pub struct JoinSessionRequest {
    pub display: String,
}

/// Response after joining through a join link
#[derive(Debug, Serialize, Deserialize)]
pub struct JoinSessionResponse {
    pub session_id: String,
    pub participant_id: String,
    pub ticket: String,
    pub ws_path: String,
    pub expires_in: u64,
}

/// Participant ticket claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // participant_id
    pub session_id: String,
    pub display: String,
    pub iat: i64,
    pub exp: i64,
}
