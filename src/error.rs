use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Errors raised by the watch session engine.
///
/// Every variant is scoped to a single session or participant; none of them
/// is fatal to the process.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncError {
    #[error("Session not found")]
    SessionNotFound,

    #[error("Media {0} does not exist in the catalog")]
    InvalidMedia(String),

    #[error("Only the host may control playback in this session")]
    NotAuthorized,

    #[error("Participant is not joined to this session")]
    StaleParticipant,

    #[error("Participant is already joined")]
    AlreadyJoined,

    #[error("Invalid seek target: {0}")]
    InvalidSeekTarget(f64),

    #[error("Session is full (max {0} participants)")]
    SessionFull(usize),

    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),
}

impl SyncError {
    /// Stable code carried as `reason` in `rejected` messages.
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::SessionNotFound => "session_not_found",
            SyncError::InvalidMedia(_) => "invalid_media",
            SyncError::NotAuthorized => "not_authorized",
            SyncError::StaleParticipant => "stale_participant",
            SyncError::AlreadyJoined => "already_joined",
            SyncError::InvalidSeekTarget(_) => "invalid_seek_target",
            SyncError::SessionFull(_) => "session_full",
            SyncError::CatalogUnavailable(_) => "catalog_unavailable",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("JWT error: {0}")]
    JwtError(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::JwtError(_) => StatusCode::UNAUTHORIZED,
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::NotFound(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::BadRequest(msg)
            | AppError::Conflict(msg)
            | AppError::Unprocessable(msg)
            | AppError::Unavailable(msg)
            | AppError::JwtError(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = Json(json!({
            "error": self.message(),
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        let msg = err.to_string();
        match err {
            SyncError::SessionNotFound => AppError::NotFound(msg),
            SyncError::InvalidMedia(_) => AppError::Unprocessable(msg),
            SyncError::NotAuthorized => AppError::Forbidden(msg),
            SyncError::StaleParticipant | SyncError::AlreadyJoined | SyncError::SessionFull(_) => {
                AppError::Conflict(msg)
            }
            SyncError::InvalidSeekTarget(_) => AppError::BadRequest(msg),
            SyncError::CatalogUnavailable(_) => AppError::Unavailable(msg),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        AppError::JwtError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_error_status_mapping() {
        let cases = [
            (SyncError::SessionNotFound, StatusCode::NOT_FOUND),
            (
                SyncError::InvalidMedia("x".to_string()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (SyncError::NotAuthorized, StatusCode::FORBIDDEN),
            (SyncError::StaleParticipant, StatusCode::CONFLICT),
            (SyncError::SessionFull(2), StatusCode::CONFLICT),
            (SyncError::InvalidSeekTarget(-1.0), StatusCode::BAD_REQUEST),
            (
                SyncError::CatalogUnavailable("down".to_string()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).status(), status);
        }
    }

    #[test]
    fn test_codes_are_snake_case() {
        assert_eq!(SyncError::NotAuthorized.code(), "not_authorized");
        assert_eq!(SyncError::StaleParticipant.code(), "stale_participant");
        assert_eq!(SyncError::SessionNotFound.code(), "session_not_found");
    }
}
