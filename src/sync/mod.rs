//! Synchronized watch session engine.

pub mod actor;
pub mod authority;
pub mod clock;
pub mod manager;
pub mod membership;
pub mod playback;
pub mod reconciler;
pub mod session;

use std::time::Duration;

use crate::config::Config;

pub use actor::{SessionActor, SessionHandle};
pub use clock::{Clock, SystemClock};
#[cfg(test)]
pub use clock::ManualClock;
pub use manager::{CreatedSession, NewSession, SessionManager};
pub use membership::Membership;
pub use playback::Transition;
pub use session::{Outgoing, Requester, SessionCore, SessionSettings, Target};

/// Timing and sizing knobs shared by every session actor
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub drift_interval: Duration,
    pub housekeeping_interval: Duration,
    pub host_grace: Duration,
    pub idle_timeout: Duration,
    pub max_participants: usize,
    pub outbound_queue_capacity: usize,
    pub command_queue_capacity: usize,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            drift_interval: config.drift_sync_interval(),
            housekeeping_interval: config.housekeeping_interval(),
            host_grace: config.host_grace(),
            idle_timeout: config.idle_timeout(),
            max_participants: config.max_participants_per_session,
            outbound_queue_capacity: config.outbound_queue_capacity,
            command_queue_capacity: config.session_queue_capacity,
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            host_grace: to_chrono(self.host_grace),
            max_participants: self.max_participants,
        }
    }

    pub fn idle_timeout_chrono(&self) -> chrono::Duration {
        to_chrono(self.idle_timeout)
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}
