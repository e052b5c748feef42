//! One task per watch session.
//!
//! The actor's command queue is the session's single serialization point:
//! control events, drift ticks, grace expiry, snapshots and closure are all
//! handled one at a time in arrival order, so `SessionCore` needs no lock.

use std::ops::ControlFlow;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::error::SyncError;
use crate::models::{ControlEvent, ControlKind, SessionInfo};
use crate::sync::clock::Clock;
use crate::sync::session::{Outgoing, Requester, SessionCore, Target};
use crate::sync::EngineSettings;
use crate::ws::{ConnectionSet, ParticipantConnection, SendOutcome};

pub enum Command {
    Attach {
        connection: ParticipantConnection,
        reply: oneshot::Sender<Result<(), SyncError>>,
    },
    Detach {
        participant_id: String,
        conn_id: String,
    },
    Control(ControlEvent),
    Latency {
        participant_id: String,
        sample_ms: f64,
    },
    Snapshot {
        reply: oneshot::Sender<SessionInfo>,
    },
    Close {
        requester: Requester,
        reply: oneshot::Sender<Result<(), SyncError>>,
    },
    ExpireIfIdle {
        idle_timeout: ChronoDuration,
        reply: oneshot::Sender<bool>,
    },
}

/// Cloneable address of a running session actor
#[derive(Clone)]
pub struct SessionHandle {
    session_id: String,
    join_token: String,
    tx: mpsc::Sender<Command>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn join_token(&self) -> &str {
        &self.join_token
    }

    /// True once the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn send(&self, cmd: Command) -> Result<(), SyncError> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| SyncError::SessionNotFound)
    }

    pub async fn attach(&self, connection: ParticipantConnection) -> Result<(), SyncError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Attach { connection, reply }).await?;
        rx.await.map_err(|_| SyncError::SessionNotFound)?
    }

    pub async fn detach(&self, participant_id: &str, conn_id: &str) {
        let _ = self
            .send(Command::Detach {
                participant_id: participant_id.to_string(),
                conn_id: conn_id.to_string(),
            })
            .await;
    }

    /// Enqueue a control event. Its outcome is pushed over the connection.
    pub async fn submit(&self, event: ControlEvent) -> Result<(), SyncError> {
        self.send(Command::Control(event)).await
    }

    pub async fn record_latency(&self, participant_id: &str, sample_ms: f64) -> Result<(), SyncError> {
        self.send(Command::Latency {
            participant_id: participant_id.to_string(),
            sample_ms,
        })
        .await
    }

    pub async fn snapshot(&self) -> Result<SessionInfo, SyncError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply }).await?;
        rx.await.map_err(|_| SyncError::SessionNotFound)
    }

    pub async fn close(&self, requester: Requester) -> Result<(), SyncError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Close { requester, reply }).await?;
        rx.await.map_err(|_| SyncError::SessionNotFound)?
    }

    /// Close the session if it has been unattended for `idle_timeout`.
    pub async fn expire_if_idle(&self, idle_timeout: ChronoDuration) -> Result<bool, SyncError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ExpireIfIdle { idle_timeout, reply }).await?;
        rx.await.map_err(|_| SyncError::SessionNotFound)
    }
}

pub struct SessionActor {
    core: SessionCore,
    connections: ConnectionSet,
    clock: Arc<dyn Clock>,
    rx: mpsc::Receiver<Command>,
    drift_interval: std::time::Duration,
    housekeeping_interval: std::time::Duration,
}

impl SessionActor {
    /// Start the actor on the current runtime.
    pub fn spawn(core: SessionCore, clock: Arc<dyn Clock>, settings: &EngineSettings) -> SessionHandle {
        let (tx, rx) = mpsc::channel(settings.command_queue_capacity);
        let session = core.session();
        let handle = SessionHandle {
            session_id: session.id.clone(),
            join_token: session.join_token.clone(),
            tx,
        };

        let actor = SessionActor {
            core,
            connections: ConnectionSet::new(),
            clock,
            rx,
            drift_interval: settings.drift_interval,
            housekeeping_interval: settings.housekeeping_interval,
        };
        tokio::spawn(actor.run());

        handle
    }

    async fn run(mut self) {
        let session_id = self.core.session().id.clone();
        tracing::info!(session_id = %session_id, "Session actor started");

        let mut drift = interval_at(Instant::now() + self.drift_interval, self.drift_interval);
        drift.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut housekeeping = interval_at(
            Instant::now() + self.housekeeping_interval,
            self.housekeeping_interval,
        );
        housekeeping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => {
                        if self.handle_command(cmd).is_break() {
                            break;
                        }
                    }
                    None => {
                        // every handle dropped
                        let now = self.clock.now();
                        let out = self.core.force_close(now);
                        self.deliver(out, now);
                        break;
                    }
                },
                _ = drift.tick() => {
                    let now = self.clock.now();
                    if let Some(out) = self.core.drift_sync(now) {
                        self.deliver(vec![out], now);
                    }
                }
                _ = housekeeping.tick() => {
                    let now = self.clock.now();
                    let out = self.core.expire_grace(now);
                    self.deliver(out, now);
                }
            }
        }

        self.connections.clear();
        tracing::info!(session_id = %session_id, "Session actor stopped");
    }

    fn handle_command(&mut self, cmd: Command) -> ControlFlow<()> {
        let now = self.clock.now();

        match cmd {
            Command::Attach { connection, reply } => {
                let participant_id = connection.participant_id.clone();
                let result = self.core.attach(&participant_id, &connection.display, now);
                match result {
                    Ok(out) => {
                        self.deliver(out, now);
                        self.connections.insert(connection);
                        let _ = reply.send(Ok(()));
                    }
                    Err(err) => {
                        let _ = reply.send(Err(err));
                    }
                }
            }
            Command::Detach {
                participant_id,
                conn_id,
            } => {
                if self
                    .connections
                    .remove_if_current(&participant_id, &conn_id)
                    .is_some()
                {
                    let out = self.core.detach(&participant_id, now);
                    self.deliver(out, now);
                }
            }
            Command::Control(event) => {
                tracing::debug!(
                    session_id = %event.session_id,
                    participant_id = %event.participant_id,
                    kind = event.kind.name(),
                    queued_ms = (now - event.server_received_at).num_milliseconds(),
                    "Processing control event"
                );
                self.readmit(&event, now);
                let out = self.core.handle_event(&event, now);
                self.deliver(out, now);
            }
            Command::Latency {
                participant_id,
                sample_ms,
            } => {
                self.core.record_latency(&participant_id, sample_ms, now);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.core.snapshot(now));
            }
            Command::Close { requester, reply } => match self.core.close(&requester, now) {
                Ok(out) => {
                    self.deliver(out, now);
                    let _ = reply.send(Ok(()));
                    return ControlFlow::Break(());
                }
                Err(err) => {
                    let _ = reply.send(Err(err));
                }
            },
            Command::ExpireIfIdle {
                idle_timeout,
                reply,
            } => {
                if self.core.is_idle_expired(now, idle_timeout) {
                    tracing::info!(session_id = %self.core.session().id, "Idle timeout reached");
                    let out = self.core.force_close(now);
                    self.deliver(out, now);
                    let _ = reply.send(true);
                    return ControlFlow::Break(());
                }
                let _ = reply.send(false);
            }
        }

        ControlFlow::Continue(())
    }

    /// A participant that left re-joins over its still-open connection
    /// under the display name from its ticket.
    fn readmit(&mut self, event: &ControlEvent, now: DateTime<Utc>) {
        if !matches!(event.kind, ControlKind::Join)
            || self.core.members().contains(&event.participant_id)
        {
            return;
        }
        let Some(connection) = self.connections.get(&event.participant_id) else {
            return;
        };
        let display = connection.display.clone();
        // a refusal resurfaces as the Join's own rejection
        if let Ok(out) = self.core.attach(&event.participant_id, &display, now) {
            self.deliver(out, now);
        }
    }

    /// Fan messages out without waiting on any connection. A participant
    /// whose receiver is gone is detached as if its socket had closed.
    fn deliver(&mut self, out: Vec<Outgoing>, now: DateTime<Utc>) {
        let mut pending = out;
        while !pending.is_empty() {
            let mut closed = Vec::new();
            for Outgoing { target, message } in pending.drain(..) {
                let recipients = match target {
                    Target::Joined => self.core.members().joined_ids(),
                    Target::JoinedExcept(excluded) => self
                        .core
                        .members()
                        .joined_ids()
                        .into_iter()
                        .filter(|id| *id != excluded)
                        .collect(),
                    Target::Participant(id) => vec![id],
                    Target::Connected => self.connections.participant_ids(),
                };

                for participant_id in recipients {
                    if let Some(SendOutcome::Closed) =
                        self.connections.send_to(&participant_id, message.clone())
                    {
                        if !closed.contains(&participant_id) {
                            closed.push(participant_id);
                        }
                    }
                }
            }

            for participant_id in closed {
                let Some(conn_id) = self
                    .connections
                    .get(&participant_id)
                    .map(|c| c.conn_id.clone())
                else {
                    continue;
                };
                self.connections.remove_if_current(&participant_id, &conn_id);
                tracing::debug!(
                    session_id = %self.core.session().id,
                    participant_id = %participant_id,
                    "Outbound queue closed, detaching"
                );
                pending.extend(self.core.detach(&participant_id, now));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuthorityMode, MediaInfo, Participant, Role, WatchSession};
    use crate::sync::clock::ManualClock;
    use crate::ws::{msg_types, ServerMessage};
    use std::time::Duration;

    struct Harness {
        handle: SessionHandle,
        clock: Arc<ManualClock>,
    }

    fn settings() -> EngineSettings {
        EngineSettings {
            drift_interval: Duration::from_millis(2500),
            housekeeping_interval: Duration::from_secs(1),
            host_grace: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            max_participants: 10,
            outbound_queue_capacity: 32,
            command_queue_capacity: 32,
        }
    }

    fn start(mode: AuthorityMode) -> Harness {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let now = clock.now();
        let session = WatchSession::new(
            &MediaInfo::new("X"),
            "host".to_string(),
            mode,
            "token".to_string(),
            now,
        );
        let host = Participant::new(
            "host".to_string(),
            session.id.clone(),
            "Host".to_string(),
            Role::Host,
            now,
        );
        let settings = settings();
        let core = SessionCore::new(session, host, settings.session_settings(), now);
        let handle = SessionActor::spawn(core, clock.clone(), &settings);
        Harness { handle, clock }
    }

    async fn connect(h: &Harness, participant: &str) -> mpsc::Receiver<ServerMessage> {
        connect_as(h, participant, participant).await
    }

    async fn connect_as(h: &Harness, participant: &str, display: &str) -> mpsc::Receiver<ServerMessage> {
        let (tx, mut rx) = mpsc::channel(32);
        let conn = ParticipantConnection::new(
            format!("conn-{}", participant),
            participant.to_string(),
            display.to_string(),
            tx,
        );
        h.handle.attach(conn).await.unwrap();
        h.handle
            .submit(event(h, participant, ControlKind::Join))
            .await
            .unwrap();
        let joined = rx.recv().await.unwrap();
        assert_eq!(joined.msg_type, msg_types::JOINED);
        rx
    }

    fn event(h: &Harness, participant: &str, kind: ControlKind) -> ControlEvent {
        ControlEvent::new(kind, h.handle.session_id(), participant, h.clock.now())
    }

    fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_apply_in_arrival_order() {
        let h = start(AuthorityMode::HostControlled);
        let mut host_rx = connect(&h, "host").await;

        h.handle
            .submit(event(&h, "host", ControlKind::Seek { target_seconds: 10.0 }))
            .await
            .unwrap();
        h.handle
            .submit(event(&h, "host", ControlKind::Seek { target_seconds: 20.0 }))
            .await
            .unwrap();

        let first = host_rx.recv().await.unwrap();
        let second = host_rx.recv().await.unwrap();
        assert_eq!(first.position_seconds, Some(10.0));
        assert_eq!(second.position_seconds, Some(20.0));
        assert_eq!(h.handle.snapshot().await.unwrap().position_seconds, 20.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drift_tick_reaches_every_joined_participant_identically() {
        let h = start(AuthorityMode::HostControlled);
        let mut host_rx = connect(&h, "host").await;
        let mut member_rx = connect(&h, "member").await;
        drain(&mut host_rx);

        h.handle
            .submit(event(&h, "host", ControlKind::Play))
            .await
            .unwrap();
        let _ = host_rx.recv().await.unwrap();
        let _ = member_rx.recv().await.unwrap();

        h.clock.advance(ChronoDuration::seconds(2));
        tokio::time::sleep(Duration::from_millis(2600)).await;

        let host_sync = host_rx.recv().await.unwrap();
        let member_sync = member_rx.recv().await.unwrap();
        assert_eq!(host_sync.msg_type, msg_types::STATE_SYNC);
        assert_eq!(host_sync, member_sync);
        assert_eq!(host_sync.position_seconds, Some(2.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_only_reaches_originator() {
        let h = start(AuthorityMode::HostControlled);
        let mut host_rx = connect(&h, "host").await;
        let mut member_rx = connect(&h, "member").await;
        drain(&mut host_rx);

        h.handle
            .submit(event(&h, "member", ControlKind::Seek { target_seconds: 120.0 }))
            .await
            .unwrap();
        let rejected = member_rx.recv().await.unwrap();
        assert_eq!(rejected.msg_type, msg_types::REJECTED);
        assert_eq!(rejected.reason.as_deref(), Some("not_authorized"));

        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.position_seconds, 0.0);
        assert!(drain(&mut host_rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_host_grace_expiry_promotes_member() {
        let h = start(AuthorityMode::HostControlled);
        let _host_rx = connect(&h, "host").await;
        let mut member_rx = connect(&h, "member").await;

        h.handle
            .submit(event(&h, "host", ControlKind::Seek { target_seconds: 300.0 }))
            .await
            .unwrap();
        h.handle.detach("host", "conn-host").await;
        // the detach must be processed before time moves
        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.host_id, None);

        h.clock.advance(ChronoDuration::seconds(31));
        tokio::time::sleep(Duration::from_millis(1100)).await;

        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.host_id.as_deref(), Some("member"));
        drain(&mut member_rx);

        h.handle
            .submit(event(&h, "member", ControlKind::Pause))
            .await
            .unwrap();
        let sync = member_rx.recv().await.unwrap();
        assert_eq!(sync.msg_type, msg_types::STATE_SYNC);
        assert_eq!(sync.position_seconds, Some(300.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_detach_is_ignored() {
        let h = start(AuthorityMode::HostControlled);
        let _host_rx = connect(&h, "host").await;

        h.handle.detach("host", "some-old-conn").await;
        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.host_id.as_deref(), Some("host"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_notifies_and_stops_actor() {
        let h = start(AuthorityMode::HostControlled);
        let mut host_rx = connect(&h, "host").await;

        h.handle
            .close(Requester::Participant("host".to_string()))
            .await
            .unwrap();
        let closed = host_rx.recv().await.unwrap();
        assert_eq!(closed.msg_type, msg_types::SESSION_CLOSED);

        assert_eq!(h.handle.snapshot().await, Err(SyncError::SessionNotFound));
        assert!(h.handle.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_expiry_closes_unattended_session() {
        let h = start(AuthorityMode::HostControlled);
        let timeout = ChronoDuration::seconds(600);

        assert!(!h.handle.expire_if_idle(timeout).await.unwrap());
        h.clock.advance(ChronoDuration::seconds(601));
        assert!(h.handle.expire_if_idle(timeout).await.unwrap());
        assert_eq!(
            h.handle.expire_if_idle(timeout).await,
            Err(SyncError::SessionNotFound)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejoin_after_leave_keeps_ticket_display_name() {
        let h = start(AuthorityMode::HostControlled);
        let _host_rx = connect(&h, "host").await;
        let mut member_rx = connect_as(&h, "member-7", "Bob").await;

        h.handle
            .submit(event(&h, "member-7", ControlKind::Leave))
            .await
            .unwrap();
        let snapshot = h.handle.snapshot().await.unwrap();
        assert!(snapshot.participants.iter().all(|p| p.participant_id != "member-7"));
        drain(&mut member_rx);

        h.handle
            .submit(event(&h, "member-7", ControlKind::Join))
            .await
            .unwrap();
        let joined = member_rx.recv().await.unwrap();
        assert_eq!(joined.msg_type, msg_types::JOINED);

        let snapshot = h.handle.snapshot().await.unwrap();
        let member = snapshot
            .participants
            .iter()
            .find(|p| p.participant_id == "member-7")
            .unwrap();
        assert_eq!(member.display_name, "Bob");
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_receiver_detaches_participant() {
        let h = start(AuthorityMode::HostControlled);
        let mut host_rx = connect(&h, "host").await;
        let member_rx = connect(&h, "member").await;
        drain(&mut host_rx);
        drop(member_rx);

        h.handle
            .submit(event(&h, "host", ControlKind::Play))
            .await
            .unwrap();
        let sync = host_rx.recv().await.unwrap();
        assert_eq!(sync.msg_type, msg_types::STATE_SYNC);
        let update = host_rx.recv().await.unwrap();
        assert_eq!(update.msg_type, msg_types::PARTICIPANT_UPDATE);

        let snapshot = h.handle.snapshot().await.unwrap();
        let member = snapshot
            .participants
            .iter()
            .find(|p| p.participant_id == "member")
            .unwrap();
        assert!(matches!(
            member.connection_state,
            crate::models::ConnectionState::Disconnected { .. }
        ));
    }
}
