use chrono::{DateTime, Duration, Utc};

use crate::models::{ConnectionState, Participant, ParticipantInfo, Role};
use crate::sync::reconciler::smooth_latency;

/// Participants of one session, in insertion order.
///
/// Tenure is assigned the first time a participant reaches `Joined` and
/// survives reconnects, so host promotion favours whoever has been watching
/// longest.
#[derive(Debug, Default, Clone)]
pub struct Membership {
    participants: Vec<Participant>,
    next_tenure: u64,
}

impl Membership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, participant_id: &str) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|p| p.participant_id == participant_id)
    }

    fn get_mut(&mut self, participant_id: &str) -> Option<&mut Participant> {
        self.participants
            .iter_mut()
            .find(|p| p.participant_id == participant_id)
    }

    pub fn contains(&self, participant_id: &str) -> bool {
        self.get(participant_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn joined_count(&self) -> usize {
        self.participants.iter().filter(|p| p.is_joined()).count()
    }

    pub fn joined_ids(&self) -> Vec<String> {
        self.participants
            .iter()
            .filter(|p| p.is_joined())
            .map(|p| p.participant_id.clone())
            .collect()
    }

    /// Participant holding the Host role, connected or reserved.
    pub fn host(&self) -> Option<&Participant> {
        self.participants.iter().find(|p| p.is_host())
    }

    pub fn insert(&mut self, participant: Participant) {
        debug_assert!(!self.contains(&participant.participant_id));
        self.participants.push(participant);
    }

    pub fn remove(&mut self, participant_id: &str) -> Option<Participant> {
        let idx = self
            .participants
            .iter()
            .position(|p| p.participant_id == participant_id)?;
        Some(self.participants.remove(idx))
    }

    pub fn clear(&mut self) -> Vec<Participant> {
        std::mem::take(&mut self.participants)
    }

    /// Move a participant to `Joined`. Returns the previous state.
    pub fn mark_joined(
        &mut self,
        participant_id: &str,
        now: DateTime<Utc>,
    ) -> Option<ConnectionState> {
        let tenure = self.next_tenure;
        let participant = self.get_mut(participant_id)?;
        let previous = participant.connection_state;

        participant.connection_state = ConnectionState::Joined;
        participant.last_seen_at = now;
        let assigned = participant.tenure.is_none();
        if assigned {
            participant.tenure = Some(tenure);
            participant.joined_at = Some(now);
        }

        if assigned {
            self.next_tenure += 1;
        }
        Some(previous)
    }

    /// Returns false when the participant was already disconnected or unknown.
    pub fn mark_disconnected(&mut self, participant_id: &str, now: DateTime<Utc>) -> bool {
        match self.get_mut(participant_id) {
            Some(p) if !matches!(p.connection_state, ConnectionState::Disconnected { .. }) => {
                p.connection_state = ConnectionState::Disconnected { since: now };
                true
            }
            _ => false,
        }
    }

    pub fn touch(&mut self, participant_id: &str, now: DateTime<Utc>) {
        if let Some(p) = self.get_mut(participant_id) {
            p.last_seen_at = now;
        }
    }

    pub fn rename(&mut self, participant_id: &str, display_name: &str) {
        if let Some(p) = self.get_mut(participant_id) {
            p.display_name = display_name.to_string();
        }
    }

    pub fn record_latency(&mut self, participant_id: &str, sample_ms: f64, now: DateTime<Utc>) {
        if let Some(p) = self.get_mut(participant_id) {
            p.estimated_latency_ms = smooth_latency(p.estimated_latency_ms, sample_ms);
            p.last_seen_at = now;
        }
    }

    /// Hand the Host role to the longest-tenured `Joined` member.
    pub fn promote_longest_tenured(&mut self) -> Option<String> {
        let candidate = self
            .participants
            .iter_mut()
            .filter(|p| p.is_joined() && p.role == Role::Member)
            .min_by_key(|p| p.tenure.unwrap_or(u64::MAX))?;

        candidate.role = Role::Host;
        Some(candidate.participant_id.clone())
    }

    pub fn set_role(&mut self, participant_id: &str, role: Role) {
        if let Some(p) = self.get_mut(participant_id) {
            p.role = role;
        }
    }

    /// Ids of participants whose grace window has elapsed at `now`.
    ///
    /// A host that never completed its first join is held to the same window,
    /// counted from when it was last seen.
    pub fn expired_disconnects(&self, now: DateTime<Utc>, grace: Duration) -> Vec<String> {
        self.participants
            .iter()
            .filter(|p| match p.connection_state {
                ConnectionState::Disconnected { since } => now - since >= grace,
                ConnectionState::Joining => p.is_host() && now - p.last_seen_at >= grace,
                ConnectionState::Joined => false,
            })
            .map(|p| p.participant_id.clone())
            .collect()
    }

    pub fn infos(&self) -> Vec<ParticipantInfo> {
        self.participants.iter().map(Participant::info).collect()
    }
}
