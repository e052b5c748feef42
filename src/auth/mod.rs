use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::Claims;

/// Issues and validates participant tickets.
///
/// A ticket binds one participant id to one session; it is what the
/// WebSocket upgrade trusts for `participant_id`.
#[derive(Clone)]
pub struct TicketService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry_seconds: u64,
}

impl TicketService {
    pub fn new(config: &Config) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.ticket_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.ticket_secret.as_bytes()),
            expiry_seconds: config.ticket_expiry_seconds,
        }
    }

    pub fn expiry_seconds(&self) -> u64 {
        self.expiry_seconds
    }

    /// Generate a ticket for a participant of a session
    pub fn generate_ticket(
        &self,
        participant_id: &str,
        session_id: &str,
        display: &str,
    ) -> Result<String> {
        let now = Utc::now().timestamp();
        let exp = now + self.expiry_seconds as i64;

        let claims = Claims {
            sub: participant_id.to_string(),
            session_id: session_id.to_string(),
            display: display.to_string(),
            iat: now,
            exp,
        };

        let ticket = encode(&Header::default(), &claims, &self.encoding_key)?;
        Ok(ticket)
    }

    /// Validate a ticket and return the claims
    pub fn validate_ticket(&self, ticket: &str) -> Result<Claims> {
        let validation = Validation::default();
        let token_data = decode::<Claims>(ticket, &self.decoding_key, &validation)
            .map_err(|e| AppError::Unauthorized(format!("Invalid ticket: {}", e)))?;

        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;

    #[test]
    fn test_generate_and_validate_ticket() {
        let tickets = TicketService::new(&test_config());

        let ticket = tickets
            .generate_ticket("participant-123", "session-456", "Alice")
            .expect("Should generate ticket");

        let claims = tickets
            .validate_ticket(&ticket)
            .expect("Should validate ticket");

        assert_eq!(claims.sub, "participant-123");
        assert_eq!(claims.session_id, "session-456");
        assert_eq!(claims.display, "Alice");
        assert_eq!(claims.exp - claims.iat, 900);
    }

    #[test]
    fn test_ticket_from_other_secret_is_rejected() {
        let tickets = TicketService::new(&test_config());
        let mut other_config = test_config();
        other_config.ticket_secret = "another-secret".to_string();
        let other = TicketService::new(&other_config);

        let ticket = other
            .generate_ticket("participant-123", "session-456", "Alice")
            .expect("Should generate ticket");

        assert!(matches!(
            tickets.validate_ticket(&ticket),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_invalid_ticket() {
        let tickets = TicketService::new(&test_config());
        assert!(tickets.validate_ticket("invalid-ticket").is_err());
    }
}
