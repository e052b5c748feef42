use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::models::Claims;
use crate::ws::ServerMessage;

/// WebSocket connection state
#[derive(Debug)]
pub struct WsSessionState {
    pub conn_id: String,
    pub participant_id: String,
    pub session_id: String,
    pub join_token: String,
    pub display: String,
}

impl WsSessionState {
    pub fn new(conn_id: String, join_token: String, claims: Claims) -> Self {
        Self {
            conn_id,
            participant_id: claims.sub,
            session_id: claims.session_id,
            join_token,
            display: claims.display,
        }
    }
}

/// Result of a non-blocking send to one participant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    /// Outbound queue full; the message was dropped
    Dropped,
    Closed,
}

/// Outbound half of a participant's connection, held by its session actor
#[derive(Debug, Clone)]
pub struct ParticipantConnection {
    pub conn_id: String,
    pub participant_id: String,
    /// Display name from the participant's ticket
    pub display: String,
    sender: mpsc::Sender<ServerMessage>,
}

impl ParticipantConnection {
    pub fn new(
        conn_id: String,
        participant_id: String,
        display: String,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Self {
        Self {
            conn_id,
            participant_id,
            display,
            sender,
        }
    }

    /// Never waits on a slow client.
    pub fn send(&self, msg: ServerMessage) -> SendOutcome {
        match self.sender.try_send(msg) {
            Ok(()) => SendOutcome::Delivered,
            Err(TrySendError::Full(msg)) => {
                tracing::warn!(
                    conn_id = %self.conn_id,
                    participant_id = %self.participant_id,
                    msg_type = %msg.msg_type,
                    "Outbound queue full, dropping message"
                );
                SendOutcome::Dropped
            }
            Err(TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }
}

/// Live connections of one session, keyed by participant id
#[derive(Debug, Default)]
pub struct ConnectionSet {
    connections: HashMap<String, ParticipantConnection>,
}

impl ConnectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the connection this one replaced, if any.
    pub fn insert(&mut self, connection: ParticipantConnection) -> Option<ParticipantConnection> {
        self.connections
            .insert(connection.participant_id.clone(), connection)
    }

    /// Remove only if `conn_id` is still the participant's current connection.
    pub fn remove_if_current(
        &mut self,
        participant_id: &str,
        conn_id: &str,
    ) -> Option<ParticipantConnection> {
        match self.connections.get(participant_id) {
            Some(c) if c.conn_id == conn_id => self.connections.remove(participant_id),
            _ => None,
        }
    }

    pub fn get(&self, participant_id: &str) -> Option<&ParticipantConnection> {
        self.connections.get(participant_id)
    }

    pub fn send_to(&self, participant_id: &str, msg: ServerMessage) -> Option<SendOutcome> {
        self.connections.get(participant_id).map(|c| c.send(msg))
    }

    pub fn participant_ids(&self) -> Vec<String> {
        self.connections.keys().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.connections.clear();
    }
}
