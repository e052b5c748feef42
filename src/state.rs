use std::sync::Arc;

use crate::auth::TicketService;
use crate::config::Config;
use crate::sync::SessionManager;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub tickets: Arc<TicketService>,
    pub sessions: Arc<SessionManager>,
}

impl AppState {
    pub fn new(config: Config, tickets: TicketService, sessions: Arc<SessionManager>) -> Self {
        Self {
            config: Arc::new(config),
            tickets: Arc::new(tickets),
            sessions,
        }
    }
}
