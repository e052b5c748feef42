use std::env;
use std::time::Duration;

use crate::security::{generate_salt_hex, hash_secret_sha256_hex};

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub ticket_secret: String,
    pub ticket_expiry_seconds: u64,
    /// Salted SHA-256 of `ADMIN_KEY`; the plain key is never kept.
    pub admin_key_hash: Option<AdminKeyHash>,
    pub catalog_url: Option<String>,
    pub catalog_media_ids: Vec<String>,
    pub drift_sync_interval_ms: u64,
    pub host_grace_seconds: u64,
    pub idle_timeout_seconds: u64,
    pub idle_sweep_interval_seconds: u64,
    pub housekeeping_interval_ms: u64,
    pub max_participants_per_session: usize,
    pub outbound_queue_capacity: usize,
    pub session_queue_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct AdminKeyHash {
    pub salt_hex: String,
    pub hash_hex: String,
}

impl AdminKeyHash {
    pub fn new(key: &str) -> Self {
        let salt_hex = generate_salt_hex();
        let hash_hex = hash_secret_sha256_hex(key, &salt_hex);
        Self { salt_hex, hash_hex }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidPort)?,
            ticket_secret: env::var("TICKET_SECRET").map_err(|_| ConfigError::MissingTicketSecret)?,
            ticket_expiry_seconds: parse_or("TICKET_EXPIRY_SECONDS", 14400),
            admin_key_hash: env::var("ADMIN_KEY")
                .ok()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .map(|k| AdminKeyHash::new(&k)),
            catalog_url: env::var("CATALOG_URL")
                .ok()
                .map(|u| u.trim().trim_end_matches('/').to_string())
                .filter(|u| !u.is_empty()),
            catalog_media_ids: env::var("CATALOG_MEDIA_IDS")
                .map(|ids| parse_id_list(&ids))
                .unwrap_or_default(),
            drift_sync_interval_ms: at_most(
                "DRIFT_SYNC_INTERVAL_MS",
                non_zero("DRIFT_SYNC_INTERVAL_MS", parse_or("DRIFT_SYNC_INTERVAL_MS", 2500))?,
                MAX_INTERVAL_MS,
            )?,
            host_grace_seconds: parse_or("HOST_GRACE_SECONDS", 30),
            idle_timeout_seconds: parse_or("IDLE_TIMEOUT_SECONDS", 600),
            idle_sweep_interval_seconds: at_most(
                "IDLE_SWEEP_INTERVAL_SECONDS",
                non_zero(
                    "IDLE_SWEEP_INTERVAL_SECONDS",
                    parse_or("IDLE_SWEEP_INTERVAL_SECONDS", 60),
                )?,
                MAX_INTERVAL_MS / 1000,
            )?,
            housekeeping_interval_ms: at_most(
                "HOUSEKEEPING_INTERVAL_MS",
                non_zero("HOUSEKEEPING_INTERVAL_MS", parse_or("HOUSEKEEPING_INTERVAL_MS", 1000))?,
                MAX_INTERVAL_MS,
            )?,
            max_participants_per_session: parse_or("MAX_PARTICIPANTS_PER_SESSION", 50),
            outbound_queue_capacity: non_zero(
                "OUTBOUND_QUEUE_CAPACITY",
                parse_or("OUTBOUND_QUEUE_CAPACITY", 64),
            )?,
            session_queue_capacity: non_zero(
                "SESSION_QUEUE_CAPACITY",
                parse_or("SESSION_QUEUE_CAPACITY", 256),
            )?,
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn drift_sync_interval(&self) -> Duration {
        Duration::from_millis(self.drift_sync_interval_ms)
    }

    pub fn host_grace(&self) -> Duration {
        Duration::from_secs(self.host_grace_seconds)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds)
    }

    pub fn idle_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.idle_sweep_interval_seconds)
    }

    pub fn housekeeping_interval(&self) -> Duration {
        Duration::from_millis(self.housekeeping_interval_ms)
    }
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn non_zero<T: PartialEq + Default>(name: &'static str, value: T) -> Result<T, ConfigError> {
    if value == T::default() {
        return Err(ConfigError::ZeroValue(name));
    }
    Ok(value)
}

/// Upper bound for timer periods; larger values overflow `Instant` arithmetic.
const MAX_INTERVAL_MS: u64 = 24 * 60 * 60 * 1000;

fn at_most(name: &'static str, value: u64, max: u64) -> Result<u64, ConfigError> {
    if value > max {
        return Err(ConfigError::TooLarge(name, max));
    }
    Ok(value)
}

/// Split a comma-separated id list, dropping blanks.
pub fn parse_id_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server port")]
    InvalidPort,
    #[error("TICKET_SECRET environment variable is required")]
    MissingTicketSecret,
    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),
    #[error("{0} must be at most {1}")]
    TooLarge(&'static str, u64),
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        server_host: "localhost".to_string(),
        server_port: 8080,
        ticket_secret: "test-secret-key".to_string(),
        ticket_expiry_seconds: 900,
        admin_key_hash: Some(AdminKeyHash::new("admin-secret")),
        catalog_url: None,
        catalog_media_ids: vec!["movie-1".to_string(), "movie-2".to_string()],
        drift_sync_interval_ms: 2500,
        host_grace_seconds: 30,
        idle_timeout_seconds: 600,
        idle_sweep_interval_seconds: 60,
        housekeeping_interval_ms: 1000,
        max_participants_per_session: 50,
        outbound_queue_capacity: 64,
        session_queue_capacity: 256,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id_list() {
        assert_eq!(
            parse_id_list(" movie-1, ,movie-2 ,"),
            vec!["movie-1".to_string(), "movie-2".to_string()]
        );
        assert!(parse_id_list("").is_empty());
    }

    #[test]
    fn test_non_zero_rejects_default() {
        assert!(matches!(
            non_zero("OUTBOUND_QUEUE_CAPACITY", 0usize),
            Err(ConfigError::ZeroValue("OUTBOUND_QUEUE_CAPACITY"))
        ));
        assert_eq!(non_zero("X", 5u64).unwrap(), 5);
    }

    #[test]
    fn test_at_most_rejects_oversized_interval() {
        assert!(matches!(
            at_most("DRIFT_SYNC_INTERVAL_MS", u64::MAX, MAX_INTERVAL_MS),
            Err(ConfigError::TooLarge("DRIFT_SYNC_INTERVAL_MS", MAX_INTERVAL_MS))
        ));
        assert_eq!(
            at_most("DRIFT_SYNC_INTERVAL_MS", MAX_INTERVAL_MS, MAX_INTERVAL_MS).unwrap(),
            MAX_INTERVAL_MS
        );
    }

    #[test]
    fn test_durations() {
        let config = test_config();
        assert_eq!(config.drift_sync_interval(), Duration::from_millis(2500));
        assert_eq!(config.host_grace(), Duration::from_secs(30));
        assert_eq!(config.server_addr(), "localhost:8080");
    }
}
