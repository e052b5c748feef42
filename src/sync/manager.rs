//! Session lifecycle: creation, join-token resolution, closure and idle expiry.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::catalog::MediaCatalog;
use crate::error::SyncError;
use crate::models::{AuthorityMode, Participant, Role, WatchSession};
use crate::security::generate_join_token;
use crate::sync::actor::{SessionActor, SessionHandle};
use crate::sync::clock::Clock;
use crate::sync::session::{Requester, SessionCore};
use crate::sync::EngineSettings;

/// Parameters for `SessionManager::create_session`
#[derive(Debug, Clone)]
pub struct NewSession {
    pub media_id: String,
    pub host_display: String,
    pub authority_mode: AuthorityMode,
}

#[derive(Debug, Clone)]
pub struct CreatedSession {
    pub session: WatchSession,
    pub host_participant_id: String,
}

/// Registry of running session actors.
///
/// Both maps are sharded; no registry guard is held across an await, so a
/// slow session never blocks lookups for another.
pub struct SessionManager {
    settings: EngineSettings,
    catalog: Arc<dyn MediaCatalog>,
    clock: Arc<dyn Clock>,
    sessions: DashMap<String, SessionHandle>,
    join_tokens: DashMap<String, String>,
}

impl SessionManager {
    pub fn new(
        settings: EngineSettings,
        catalog: Arc<dyn MediaCatalog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings,
            catalog,
            clock,
            sessions: DashMap::new(),
            join_tokens: DashMap::new(),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Create a session for a catalog item with `creator` as host.
    pub async fn create_session(&self, request: NewSession) -> Result<CreatedSession, SyncError> {
        let media = self
            .catalog
            .get_media_by_id(&request.media_id)
            .await?
            .filter(|media| media.media_id == request.media_id)
            .ok_or_else(|| SyncError::InvalidMedia(request.media_id.clone()))?;

        let now = self.clock.now();
        let host_participant_id = Uuid::new_v4().to_string();
        let join_token = generate_join_token();

        let session = WatchSession::new(
            &media,
            host_participant_id.clone(),
            request.authority_mode,
            join_token.clone(),
            now,
        );
        let host = Participant::new(
            host_participant_id.clone(),
            session.id.clone(),
            request.host_display,
            Role::Host,
            now,
        );

        let core = SessionCore::new(session.clone(), host, self.settings.session_settings(), now);
        let handle = SessionActor::spawn(core, self.clock.clone(), &self.settings);

        self.join_tokens.insert(join_token, session.id.clone());
        self.sessions.insert(session.id.clone(), handle);

        tracing::info!(
            session_id = %session.id,
            media_id = %session.media_id,
            host_id = %host_participant_id,
            authority_mode = ?session.authority_mode,
            "Watch session created"
        );

        Ok(CreatedSession {
            session,
            host_participant_id,
        })
    }

    /// Map a join token to its session id.
    pub fn resolve_join_token(&self, token: &str) -> Result<String, SyncError> {
        let session_id = self
            .join_tokens
            .get(token)
            .map(|r| r.value().clone())
            .ok_or(SyncError::SessionNotFound)?;

        self.get(&session_id)?;
        Ok(session_id)
    }

    pub fn get(&self, session_id: &str) -> Result<SessionHandle, SyncError> {
        let handle = self
            .sessions
            .get(session_id)
            .map(|r| r.value().clone())
            .ok_or(SyncError::SessionNotFound)?;

        if handle.is_closed() {
            self.forget(&handle);
            return Err(SyncError::SessionNotFound);
        }
        Ok(handle)
    }

    /// Close a session. Closing an unknown or already-closed session succeeds.
    pub async fn close_session(
        &self,
        session_id: &str,
        requester: Requester,
    ) -> Result<(), SyncError> {
        let Some(handle) = self.sessions.get(session_id).map(|r| r.value().clone()) else {
            return Ok(());
        };

        match handle.close(requester).await {
            Ok(()) | Err(SyncError::SessionNotFound) => {
                self.forget(&handle);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Close every session that has had no `Joined` participant for the idle
    /// timeout. Returns the ids that were closed.
    pub async fn expire_idle_sessions(&self) -> Vec<String> {
        let handles: Vec<SessionHandle> = self.sessions.iter().map(|r| r.value().clone()).collect();
        let idle_timeout = self.settings.idle_timeout_chrono();
        let mut expired = Vec::new();

        for handle in handles {
            match handle.expire_if_idle(idle_timeout).await {
                Ok(false) => {}
                Ok(true) | Err(_) => {
                    self.forget(&handle);
                    expired.push(handle.session_id().to_string());
                }
            }
        }

        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "Expired idle sessions");
        }
        expired
    }

    /// Run `expire_idle_sessions` every `every`.
    pub fn spawn_idle_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                manager.expire_idle_sessions().await;
            }
        })
    }

    /// Close everything, used on shutdown.
    pub async fn close_all(&self) {
        let handles: Vec<SessionHandle> = self.sessions.iter().map(|r| r.value().clone()).collect();
        for handle in handles {
            let _ = handle.close(Requester::Admin).await;
            self.forget(&handle);
        }
    }

    fn forget(&self, handle: &SessionHandle) {
        self.sessions.remove(handle.session_id());
        self.join_tokens.remove(handle.join_token());
    }
}
