use chrono::{DateTime, Utc};

/// Requested change to a session
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlKind {
    Join,
    Leave,
    Play,
    Pause,
    Seek { target_seconds: f64 },
}

impl ControlKind {
    pub fn name(&self) -> &'static str {
        match self {
            ControlKind::Join => "join",
            ControlKind::Leave => "leave",
            ControlKind::Play => "play",
            ControlKind::Pause => "pause",
            ControlKind::Seek { .. } => "seek",
        }
    }
}

/// Inbound control event, consumed immediately by the session actor
#[derive(Debug, Clone, PartialEq)]
pub struct ControlEvent {
    pub kind: ControlKind,
    pub session_id: String,
    pub participant_id: String,
    /// Client-reported, untrusted. Never used for ordering.
    pub client_sent_at: Option<DateTime<Utc>>,
    pub server_received_at: DateTime<Utc>,
    pub request_id: Option<String>,
}

impl ControlEvent {
    pub fn new(
        kind: ControlKind,
        session_id: impl Into<String>,
        participant_id: impl Into<String>,
        server_received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            session_id: session_id.into(),
            participant_id: participant_id.into(),
            client_sent_at: None,
            server_received_at,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn with_client_sent_at(mut self, client_sent_at: Option<DateTime<Utc>>) -> Self {
        self.client_sent_at = client_sent_at;
        self
    }
}
