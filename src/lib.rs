pub mod api;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod error;
pub mod models;
pub mod security;
pub mod state;
pub mod sync;
pub mod ws;

pub use config::Config;
pub use error::{AppError, Result, SyncError};
pub use state::AppState;
