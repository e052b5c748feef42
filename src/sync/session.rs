//! Per-session state: the playback record plus its membership set.
//!
//! `SessionCore` is synchronous and owned by exactly one session actor. Every
//! mutation returns the messages it produced; the actor decides how to deliver
//! them.

use chrono::{DateTime, Duration, Utc};

use crate::error::SyncError;
use crate::models::{
    ConnectionState, ControlEvent, Participant, Role, SessionInfo, SessionStatus, WatchSession,
};
use crate::sync::authority::{resolve, Decision};
use crate::sync::membership::Membership;
use crate::ws::{msg_types, ServerMessage, StateFrame};

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub host_grace: Duration,
    pub max_participants: usize,
}

/// Recipients of an outgoing message
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// Every participant currently `Joined`
    Joined,
    JoinedExcept(String),
    /// One participant, whatever its membership state
    Participant(String),
    /// Every attached connection
    Connected,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub target: Target,
    pub message: ServerMessage,
}

impl Outgoing {
    fn new(target: Target, message: ServerMessage) -> Self {
        Self { target, message }
    }
}

/// Caller of `CloseSession`
#[derive(Debug, Clone, PartialEq)]
pub enum Requester {
    Participant(String),
    Admin,
}

pub struct SessionCore {
    session: WatchSession,
    members: Membership,
    settings: SessionSettings,
    /// Since when nobody has been `Joined`
    unattended_since: Option<DateTime<Utc>>,
}

impl SessionCore {
    pub fn new(
        session: WatchSession,
        host: Participant,
        settings: SessionSettings,
        now: DateTime<Utc>,
    ) -> Self {
        let mut members = Membership::new();
        members.insert(host);

        Self {
            session,
            members,
            settings,
            unattended_since: Some(now),
        }
    }

    pub fn session(&self) -> &WatchSession {
        &self.session
    }

    pub fn members(&self) -> &Membership {
        &self.members
    }

    pub fn frame(&self, now: DateTime<Utc>) -> StateFrame {
        StateFrame {
            playback_state: self.session.playback_state,
            position_seconds: self.session.effective_position(now),
            server_time: now.timestamp_millis(),
            authority_mode: self.session.authority_mode,
            host_id: self.session.host_id.clone(),
        }
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> SessionInfo {
        let frame = self.frame(now);
        SessionInfo {
            session_id: self.session.id.clone(),
            media_id: self.session.media_id.clone(),
            host_id: frame.host_id,
            status: self.session.status,
            playback_state: frame.playback_state,
            position_seconds: frame.position_seconds,
            server_time: frame.server_time,
            authority_mode: frame.authority_mode,
            created_at: self.session.created_at,
            participants: self.members.infos(),
        }
    }

    /// A connection for `participant_id` has opened.
    ///
    /// Unknown participants are admitted as `Joining` members. A participant
    /// that is still `Joined` on another connection is treated as
    /// disconnected so its following `Join` restores it.
    pub fn attach(
        &mut self,
        participant_id: &str,
        display: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Outgoing>, SyncError> {
        if self.session.is_closed() {
            return Err(SyncError::SessionNotFound);
        }

        match self.members.get(participant_id).map(|p| p.connection_state) {
            Some(ConnectionState::Joined) => {
                tracing::debug!(
                    session_id = %self.session.id,
                    participant_id = %participant_id,
                    "Connection replaced"
                );
                Ok(self.detach(participant_id, now))
            }
            Some(_) => {
                self.members.rename(participant_id, display);
                self.members.touch(participant_id, now);
                Ok(Vec::new())
            }
            None => {
                self.admit_new(participant_id, display, now)?;
                Ok(Vec::new())
            }
        }
    }

    fn admit_new(
        &mut self,
        participant_id: &str,
        display: &str,
        now: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        if self.members.len() >= self.settings.max_participants {
            return Err(SyncError::SessionFull(self.settings.max_participants));
        }

        self.members.insert(Participant::new(
            participant_id.to_string(),
            self.session.id.clone(),
            display.to_string(),
            Role::Member,
            now,
        ));
        Ok(())
    }

    /// The connection for `participant_id` dropped.
    pub fn detach(&mut self, participant_id: &str, now: DateTime<Utc>) -> Vec<Outgoing> {
        let Some(participant) = self.members.get(participant_id) else {
            return Vec::new();
        };
        let state = participant.connection_state;
        let is_host = participant.is_host();

        match state {
            ConnectionState::Disconnected { .. } => Vec::new(),
            ConnectionState::Joining if !is_host => {
                self.members.remove(participant_id);
                Vec::new()
            }
            _ => {
                self.members.mark_disconnected(participant_id, now);
                if self.session.host_id.as_deref() == Some(participant_id) {
                    self.session.host_id = None;
                    tracing::info!(
                        session_id = %self.session.id,
                        participant_id = %participant_id,
                        "Host disconnected, holding role for grace window"
                    );
                }
                self.refresh_attendance(now);

                if state == ConnectionState::Joined {
                    vec![self.participant_update(now)]
                } else {
                    Vec::new()
                }
            }
        }
    }

    /// Process one control event. Rejections become a correction for the
    /// originating participant only.
    pub fn handle_event(&mut self, event: &ControlEvent, now: DateTime<Utc>) -> Vec<Outgoing> {
        match self.apply_event(event, now) {
            Ok(out) => out,
            Err(err) => {
                tracing::warn!(
                    session_id = %self.session.id,
                    participant_id = %event.participant_id,
                    kind = event.kind.name(),
                    reason = err.code(),
                    "Control event rejected"
                );
                let correction = ServerMessage::rejected(&self.frame(now), &err)
                    .with_request_id(event.request_id.clone());
                vec![Outgoing::new(
                    Target::Participant(event.participant_id.clone()),
                    correction,
                )]
            }
        }
    }

    pub fn apply_event(
        &mut self,
        event: &ControlEvent,
        now: DateTime<Utc>,
    ) -> Result<Vec<Outgoing>, SyncError> {
        let decision = resolve(&self.session, &self.members, event)?;
        self.members.touch(&event.participant_id, now);

        match decision {
            Decision::Admit => self.admit(event, now),
            Decision::Depart => Ok(self.depart(event, now)),
            Decision::Playback(transition) => {
                let changed = self.session.apply(transition, now);
                tracing::debug!(
                    session_id = %self.session.id,
                    participant_id = %event.participant_id,
                    kind = event.kind.name(),
                    changed,
                    "Control event applied"
                );
                let sync = ServerMessage::state_sync(&self.frame(now))
                    .with_request_id(event.request_id.clone());
                Ok(vec![Outgoing::new(Target::Joined, sync)])
            }
        }
    }

    fn admit(&mut self, event: &ControlEvent, now: DateTime<Utc>) -> Result<Vec<Outgoing>, SyncError> {
        let participant_id = event.participant_id.as_str();
        if !self.members.contains(participant_id) {
            self.admit_new(participant_id, participant_id, now)?;
        }

        let previous = self.members.mark_joined(participant_id, now);
        let rejoined = matches!(previous, Some(ConnectionState::Disconnected { .. }));

        let holds_host_role = self
            .members
            .get(participant_id)
            .is_some_and(|p| p.is_host());
        if holds_host_role {
            self.session.host_id = Some(participant_id.to_string());
        } else if self.session.host_id.is_none() && self.members.host().is_none() {
            self.members.set_role(participant_id, Role::Host);
            self.session.host_id = Some(participant_id.to_string());
            tracing::info!(
                session_id = %self.session.id,
                participant_id = %participant_id,
                "Participant took over vacant host role"
            );
        }

        if self.session.status == SessionStatus::Idle {
            self.session.status = SessionStatus::Active;
        }
        self.refresh_attendance(now);

        tracing::info!(
            session_id = %self.session.id,
            participant_id = %participant_id,
            rejoined,
            "Participant joined"
        );

        let frame = self.frame(now);
        let participants = self.members.infos();
        let kind = if rejoined {
            msg_types::STATE_SYNC
        } else {
            msg_types::JOINED
        };
        let to_joiner = ServerMessage::with_state(kind, &frame)
            .with_participants(participants.clone())
            .with_request_id(event.request_id.clone());
        let to_others = ServerMessage::with_state(msg_types::PARTICIPANT_UPDATE, &frame)
            .with_participants(participants);

        Ok(vec![
            Outgoing::new(Target::Participant(participant_id.to_string()), to_joiner),
            Outgoing::new(Target::JoinedExcept(participant_id.to_string()), to_others),
        ])
    }

    fn depart(&mut self, event: &ControlEvent, now: DateTime<Utc>) -> Vec<Outgoing> {
        let participant_id = event.participant_id.as_str();
        let removed = self.members.remove(participant_id);

        if removed.is_some_and(|p| p.is_host()) {
            self.session.host_id = None;
            self.fill_host_vacancy();
        }
        self.refresh_attendance(now);

        tracing::info!(
            session_id = %self.session.id,
            participant_id = %participant_id,
            "Participant left"
        );

        let left = ServerMessage::with_state(msg_types::LEFT, &self.frame(now))
            .with_request_id(event.request_id.clone());
        vec![
            Outgoing::new(Target::Participant(participant_id.to_string()), left),
            self.participant_update(now),
        ]
    }

    /// Promote a new host if nobody holds or reserves the role.
    fn fill_host_vacancy(&mut self) {
        if self.session.host_id.is_some() || self.members.host().is_some() {
            return;
        }

        match self.members.promote_longest_tenured() {
            Some(new_host) => {
                tracing::info!(
                    session_id = %self.session.id,
                    participant_id = %new_host,
                    "Promoted new host"
                );
                self.session.host_id = Some(new_host);
                if self.session.status == SessionStatus::Idle {
                    self.session.status = SessionStatus::Active;
                }
            }
            None => {
                if !self.session.is_closed() {
                    tracing::info!(session_id = %self.session.id, "No member to promote, session idle");
                    self.session.status = SessionStatus::Idle;
                }
            }
        }
    }

    /// Drop participants whose grace window elapsed, promoting a host if the
    /// departed one held the role.
    pub fn expire_grace(&mut self, now: DateTime<Utc>) -> Vec<Outgoing> {
        if self.session.is_closed() {
            return Vec::new();
        }

        let expired = self
            .members
            .expired_disconnects(now, self.settings.host_grace);
        if expired.is_empty() {
            return Vec::new();
        }

        let mut host_departed = false;
        for participant_id in &expired {
            if let Some(p) = self.members.remove(participant_id) {
                host_departed |= p.is_host();
                if self.session.host_id.as_deref() == Some(participant_id.as_str()) {
                    self.session.host_id = None;
                }
                tracing::info!(
                    session_id = %self.session.id,
                    participant_id = %participant_id,
                    was_host = p.is_host(),
                    "Grace window elapsed, participant removed"
                );
            }
        }

        if host_departed {
            self.fill_host_vacancy();
        }
        self.refresh_attendance(now);

        vec![self.participant_update(now)]
    }

    pub fn record_latency(&mut self, participant_id: &str, sample_ms: f64, now: DateTime<Utc>) {
        self.members.record_latency(participant_id, sample_ms, now);
    }

    /// Periodic drift correction for an active, attended session.
    pub fn drift_sync(&self, now: DateTime<Utc>) -> Option<Outgoing> {
        if self.session.status != SessionStatus::Active || self.members.joined_count() == 0 {
            return None;
        }
        Some(Outgoing::new(
            Target::Joined,
            ServerMessage::state_sync(&self.frame(now)),
        ))
    }

    /// Close on behalf of `requester`. Closing a closed session is a no-op.
    pub fn close(
        &mut self,
        requester: &Requester,
        now: DateTime<Utc>,
    ) -> Result<Vec<Outgoing>, SyncError> {
        if self.session.is_closed() {
            return Ok(Vec::new());
        }

        if let Requester::Participant(participant_id) = requester {
            if self.session.host_id.as_deref() != Some(participant_id.as_str()) {
                return Err(SyncError::NotAuthorized);
            }
        }

        Ok(self.force_close(now))
    }

    /// Transition to `Closed` and evict everyone.
    pub fn force_close(&mut self, now: DateTime<Utc>) -> Vec<Outgoing> {
        if self.session.is_closed() {
            return Vec::new();
        }

        self.session.status = SessionStatus::Closed;
        self.session.closed_at = Some(now);
        self.session.host_id = None;
        let evicted = self.members.clear();
        self.unattended_since = None;

        tracing::info!(
            session_id = %self.session.id,
            evicted = evicted.len(),
            "Session closed"
        );

        vec![Outgoing::new(
            Target::Connected,
            ServerMessage::session_closed(now.timestamp_millis()),
        )]
    }

    pub fn is_idle_expired(&self, now: DateTime<Utc>, idle_timeout: Duration) -> bool {
        !self.session.is_closed()
            && self.members.joined_count() == 0
            && self
                .unattended_since
                .is_some_and(|since| now - since >= idle_timeout)
    }

    fn refresh_attendance(&mut self, now: DateTime<Utc>) {
        if self.members.joined_count() == 0 {
            self.unattended_since.get_or_insert(now);
        } else {
            self.unattended_since = None;
        }
    }

    fn participant_update(&self, now: DateTime<Utc>) -> Outgoing {
        let message = ServerMessage::with_state(msg_types::PARTICIPANT_UPDATE, &self.frame(now))
            .with_participants(self.members.infos());
        Outgoing::new(Target::Joined, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuthorityMode, ControlKind, MediaInfo, PlaybackState};
    use pretty_assertions::assert_eq;

    const HOST: &str = "host";

    fn settings() -> SessionSettings {
        SessionSettings {
            host_grace: Duration::seconds(30),
            max_participants: 4,
        }
    }

    fn new_core(mode: AuthorityMode, t0: DateTime<Utc>) -> SessionCore {
        let session = WatchSession::new(
            &MediaInfo::new("X"),
            HOST.to_string(),
            mode,
            "token".to_string(),
            t0,
        );
        let host = Participant::new(
            HOST.to_string(),
            session.id.clone(),
            "Host".to_string(),
            Role::Host,
            t0,
        );
        let mut core = SessionCore::new(session, host, settings(), t0);
        join(&mut core, HOST, t0);
        core
    }

    fn event(core: &SessionCore, participant: &str, kind: ControlKind, at: DateTime<Utc>) -> ControlEvent {
        ControlEvent::new(kind, core.session().id.clone(), participant, at)
    }

    fn join(core: &mut SessionCore, participant: &str, at: DateTime<Utc>) -> Vec<Outgoing> {
        core.attach(participant, participant, at).unwrap();
        let ev = event(core, participant, ControlKind::Join, at);
        core.apply_event(&ev, at).unwrap()
    }

    fn seek(target_seconds: f64) -> ControlKind {
        ControlKind::Seek { target_seconds }
    }

    #[test]
    fn test_scenario_a_play_advances_position() {
        let t0 = Utc::now();
        let mut core = new_core(AuthorityMode::HostControlled, t0);

        let ev = event(&core, HOST, ControlKind::Play, t0);
        core.apply_event(&ev, t0).unwrap();

        let later = t0 + Duration::seconds(5);
        assert!((core.frame(later).position_seconds - 5.0).abs() < 1e-6);
        assert_eq!(core.session().playback_state, PlaybackState::Playing);
    }

    #[test]
    fn test_scenario_b_member_seek_is_not_authorized() {
        let t0 = Utc::now();
        let mut core = new_core(AuthorityMode::HostControlled, t0);
        join(&mut core, "member", t0);

        let before = core.session().clone();
        let ev = event(&core, "member", seek(120.0), t0).with_request_id(Some("r1".to_string()));
        let out = core.handle_event(&ev, t0);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].target, Target::Participant("member".to_string()));
        assert_eq!(out[0].message.msg_type, msg_types::REJECTED);
        assert_eq!(out[0].message.reason.as_deref(), Some("not_authorized"));
        assert_eq!(out[0].message.request_id.as_deref(), Some("r1"));
        assert_eq!(out[0].message.position_seconds, Some(0.0));
        assert_eq!(core.session(), &before);
    }

    #[test]
    fn test_scenario_c_host_departure_promotes_longest_tenured() {
        let t0 = Utc::now();
        let mut core = new_core(AuthorityMode::HostControlled, t0);
        join(&mut core, "first", t0 + Duration::seconds(1));
        join(&mut core, "second", t0 + Duration::seconds(2));

        let t1 = t0 + Duration::seconds(10);
        let ev = event(&core, HOST, seek(300.0), t1);
        core.apply_event(&ev, t1).unwrap();
        core.detach(HOST, t1);
        assert_eq!(core.session().host_id, None);

        assert!(core.expire_grace(t1 + Duration::seconds(29)).is_empty());
        assert_eq!(core.session().host_id, None);

        let out = core.expire_grace(t1 + Duration::seconds(30));
        assert_eq!(out.len(), 1);
        assert_eq!(core.session().host_id.as_deref(), Some("first"));
        assert!(core.members().get(HOST).is_none());
        assert_eq!(
            core.members().host().map(|p| p.participant_id.as_str()),
            Some("first")
        );

        let t2 = t1 + Duration::seconds(31);
        let ev = event(&core, "first", ControlKind::Pause, t2);
        assert!(core.apply_event(&ev, t2).is_ok());
        assert_eq!(core.session().playback_state, PlaybackState::Paused);
        assert_eq!(core.frame(t2).position_seconds, 300.0);

        let ev = event(&core, "second", ControlKind::Play, t2);
        assert_eq!(core.apply_event(&ev, t2), Err(SyncError::NotAuthorized));
    }

    #[test]
    fn test_scenario_d_drift_sync_targets_all_joined() {
        let t0 = Utc::now();
        let mut core = new_core(AuthorityMode::HostControlled, t0);
        join(&mut core, "member", t0);

        let tick = t0 + Duration::milliseconds(2500);
        let out = core.drift_sync(tick).unwrap();
        assert_eq!(out.target, Target::Joined);
        assert_eq!(out.message.msg_type, msg_types::STATE_SYNC);
        assert_eq!(out.message.server_time, tick.timestamp_millis());
        assert_eq!(
            core.members().joined_ids(),
            vec![HOST.to_string(), "member".to_string()]
        );
    }

    #[test]
    fn test_drift_sync_skips_unattended_sessions() {
        let t0 = Utc::now();
        let mut core = new_core(AuthorityMode::HostControlled, t0);
        core.detach(HOST, t0);
        assert!(core.drift_sync(t0).is_none());
    }

    #[test]
    fn test_host_controlled_member_events_never_change_state() {
        let t0 = Utc::now();
        let mut core = new_core(AuthorityMode::HostControlled, t0);
        join(&mut core, "member", t0);
        let ev = event(&core, HOST, ControlKind::Play, t0);
        core.apply_event(&ev, t0).unwrap();

        let before = core.session().clone();
        for (i, kind) in [ControlKind::Pause, seek(10.0), ControlKind::Play, seek(0.0)]
            .into_iter()
            .enumerate()
        {
            let at = t0 + Duration::seconds(i as i64 + 1);
            let ev = event(&core, "member", kind, at);
            core.handle_event(&ev, at);
            assert_eq!(core.session().playback_state, before.playback_state);
            assert_eq!(core.session().position_seconds, before.position_seconds);
            assert_eq!(core.session().position_updated_at, before.position_updated_at);
        }
    }

    #[test]
    fn test_collaborative_last_arrival_wins() {
        let t0 = Utc::now();
        let mut core = new_core(AuthorityMode::Collaborative, t0);
        join(&mut core, "member", t0);

        // member's client clock claims it sent first; arrival order still decides
        let host_seek = event(&core, HOST, seek(50.0), t0)
            .with_client_sent_at(Some(t0 + Duration::seconds(1)));
        let member_seek = event(&core, "member", seek(80.0), t0)
            .with_client_sent_at(Some(t0 - Duration::seconds(1)));
        core.apply_event(&host_seek, t0).unwrap();
        core.apply_event(&member_seek, t0).unwrap();

        assert_eq!(core.frame(t0).position_seconds, 80.0);
    }

    #[test]
    fn test_accepted_event_broadcasts_to_joined() {
        let t0 = Utc::now();
        let mut core = new_core(AuthorityMode::HostControlled, t0);
        let ev = event(&core, HOST, seek(42.0), t0);
        let out = core.apply_event(&ev, t0).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].target, Target::Joined);
        assert_eq!(out[0].message.position_seconds, Some(42.0));
    }

    #[test]
    fn test_stale_participant_is_rejected() {
        let t0 = Utc::now();
        let mut core = new_core(AuthorityMode::Collaborative, t0);
        core.attach("lurker", "Lurker", t0).unwrap();

        let ev = event(&core, "lurker", ControlKind::Play, t0);
        assert_eq!(core.apply_event(&ev, t0), Err(SyncError::StaleParticipant));
    }

    #[test]
    fn test_join_sends_joined_and_participant_update() {
        let t0 = Utc::now();
        let mut core = new_core(AuthorityMode::HostControlled, t0);
        let out = join(&mut core, "member", t0);

        assert_eq!(out[0].target, Target::Participant("member".to_string()));
        assert_eq!(out[0].message.msg_type, msg_types::JOINED);
        assert_eq!(out[0].message.participants.as_ref().map(Vec::len), Some(2));
        assert_eq!(out[1].target, Target::JoinedExcept("member".to_string()));
        assert_eq!(out[1].message.msg_type, msg_types::PARTICIPANT_UPDATE);
    }

    #[test]
    fn test_reconnect_within_grace_restores_host() {
        let t0 = Utc::now();
        let mut core = new_core(AuthorityMode::HostControlled, t0);
        join(&mut core, "member", t0);
        core.detach(HOST, t0);

        let t1 = t0 + Duration::seconds(10);
        let out = join(&mut core, HOST, t1);
        assert_eq!(out[0].message.msg_type, msg_types::STATE_SYNC);
        assert_eq!(core.session().host_id.as_deref(), Some(HOST));

        assert!(core.expire_grace(t1 + Duration::seconds(60)).is_empty());
        assert_eq!(core.session().host_id.as_deref(), Some(HOST));
    }

    #[test]
    fn test_attach_while_joined_replaces_connection() {
        let t0 = Utc::now();
        let mut core = new_core(AuthorityMode::HostControlled, t0);
        join(&mut core, "member", t0);

        core.attach("member", "member", t0).unwrap();
        assert!(matches!(
            core.members().get("member").unwrap().connection_state,
            ConnectionState::Disconnected { .. }
        ));
        let ev = event(&core, "member", ControlKind::Join, t0);
        assert!(core.apply_event(&ev, t0).is_ok());
    }

    #[test]
    fn test_host_leave_promotes_immediately() {
        let t0 = Utc::now();
        let mut core = new_core(AuthorityMode::HostControlled, t0);
        join(&mut core, "member", t0);

        let ev = event(&core, HOST, ControlKind::Leave, t0);
        let out = core.apply_event(&ev, t0).unwrap();
        assert_eq!(out[0].message.msg_type, msg_types::LEFT);
        assert_eq!(core.session().host_id.as_deref(), Some("member"));
    }

    #[test]
    fn test_last_host_leaving_marks_idle_and_newcomer_takes_over() {
        let t0 = Utc::now();
        let mut core = new_core(AuthorityMode::HostControlled, t0);

        let ev = event(&core, HOST, ControlKind::Leave, t0);
        core.apply_event(&ev, t0).unwrap();
        assert_eq!(core.session().status, SessionStatus::Idle);
        assert_eq!(core.session().host_id, None);

        join(&mut core, "newcomer", t0 + Duration::seconds(5));
        assert_eq!(core.session().status, SessionStatus::Active);
        assert_eq!(core.session().host_id.as_deref(), Some("newcomer"));
    }

    #[test]
    fn test_close_requires_host_or_admin() {
        let t0 = Utc::now();
        let mut core = new_core(AuthorityMode::HostControlled, t0);
        join(&mut core, "member", t0);

        assert_eq!(
            core.close(&Requester::Participant("member".to_string()), t0),
            Err(SyncError::NotAuthorized)
        );

        let out = core
            .close(&Requester::Participant(HOST.to_string()), t0)
            .unwrap();
        assert_eq!(out[0].target, Target::Connected);
        assert_eq!(out[0].message.msg_type, msg_types::SESSION_CLOSED);
        assert_eq!(core.session().status, SessionStatus::Closed);
        assert_eq!(core.session().closed_at, Some(t0));
        assert!(core.members().is_empty());

        // idempotent, and terminal
        assert_eq!(core.close(&Requester::Admin, t0), Ok(Vec::new()));
        let ev = event(&core, HOST, ControlKind::Play, t0);
        assert_eq!(core.apply_event(&ev, t0), Err(SyncError::SessionNotFound));
        assert_eq!(core.attach("x", "x", t0), Err(SyncError::SessionNotFound));
    }

    #[test]
    fn test_idle_expiry_requires_zero_joined_for_timeout() {
        let t0 = Utc::now();
        let mut core = new_core(AuthorityMode::HostControlled, t0);
        let timeout = Duration::seconds(600);

        assert!(!core.is_idle_expired(t0 + Duration::seconds(10_000), timeout));

        core.detach(HOST, t0);
        assert!(!core.is_idle_expired(t0 + Duration::seconds(599), timeout));
        assert!(core.is_idle_expired(t0 + Duration::seconds(600), timeout));
    }

    #[test]
    fn test_capacity_is_enforced() {
        let t0 = Utc::now();
        let mut core = new_core(AuthorityMode::HostControlled, t0);
        for id in ["a", "b", "c"] {
            core.attach(id, id, t0).unwrap();
        }
        assert_eq!(core.attach("d", "d", t0), Err(SyncError::SessionFull(4)));
    }

    #[test]
    fn test_latency_samples_feed_participant_info() {
        let t0 = Utc::now();
        let mut core = new_core(AuthorityMode::HostControlled, t0);
        core.record_latency(HOST, 80.0, t0);
        let info = core.snapshot(t0);
        assert_eq!(info.participants[0].estimated_latency_ms, Some(80.0));
    }

    #[test]
    fn test_late_joiner_receives_uncompensated_effective_position() {
        let t0 = Utc::now();
        let mut core = new_core(AuthorityMode::HostControlled, t0);
        let ev = event(&core, HOST, ControlKind::Play, t0);
        core.apply_event(&ev, t0).unwrap();

        let out = join(&mut core, "late", t0 + Duration::seconds(7));
        let joined = &out[0];
        assert_eq!(joined.target, Target::Participant("late".to_string()));
        assert_eq!(joined.message.msg_type, msg_types::JOINED);
        assert_eq!(joined.message.playback_state, Some(PlaybackState::Playing));
        assert_eq!(joined.message.position_seconds, Some(7.0));
    }

    #[test]
    fn test_pause_while_paused_is_accepted_without_change() {
        let t0 = Utc::now();
        let mut core = new_core(AuthorityMode::HostControlled, t0);
        let ev = event(&core, HOST, seek(42.0), t0);
        core.apply_event(&ev, t0).unwrap();
        let before = core.session().clone();

        let t1 = t0 + Duration::seconds(5);
        for _ in 0..2 {
            let ev = event(&core, HOST, ControlKind::Pause, t1);
            let out = core.handle_event(&ev, t1);
            assert_eq!(out.len(), 1);
            assert_eq!(out[0].target, Target::Joined);
            assert_eq!(out[0].message.msg_type, msg_types::STATE_SYNC);
            assert_eq!(out[0].message.position_seconds, Some(42.0));
        }
        assert_eq!(core.session(), &before);
    }

    #[test]
    fn test_creator_who_never_connects_is_replaced_after_grace() {
        let t0 = Utc::now();
        let session = WatchSession::new(
            &MediaInfo::new("X"),
            HOST.to_string(),
            AuthorityMode::HostControlled,
            "token".to_string(),
            t0,
        );
        let host = Participant::new(
            HOST.to_string(),
            session.id.clone(),
            "Host".to_string(),
            Role::Host,
            t0,
        );
        let mut core = SessionCore::new(session, host, settings(), t0);
        join(&mut core, "m", t0);

        let ev = event(&core, "m", ControlKind::Play, t0);
        assert_eq!(core.apply_event(&ev, t0), Err(SyncError::NotAuthorized));

        assert!(core.expire_grace(t0 + Duration::seconds(29)).is_empty());
        core.expire_grace(t0 + Duration::seconds(30));
        assert_eq!(core.session().host_id.as_deref(), Some("m"));
        assert!(core.members().get(HOST).is_none());

        let t1 = t0 + Duration::seconds(31);
        let ev = event(&core, "m", ControlKind::Play, t1);
        assert!(core.apply_event(&ev, t1).is_ok());
    }

    #[test]
    fn test_absent_creator_without_members_goes_idle() {
        let t0 = Utc::now();
        let session = WatchSession::new(
            &MediaInfo::new("X"),
            HOST.to_string(),
            AuthorityMode::HostControlled,
            "token".to_string(),
            t0,
        );
        let host = Participant::new(
            HOST.to_string(),
            session.id.clone(),
            "Host".to_string(),
            Role::Host,
            t0,
        );
        let mut core = SessionCore::new(session, host, settings(), t0);

        core.expire_grace(t0 + Duration::seconds(30));
        assert_eq!(core.session().host_id, None);
        assert_eq!(core.session().status, SessionStatus::Idle);
        assert!(core.is_idle_expired(t0 + Duration::seconds(600), Duration::seconds(600)));
    }
}
