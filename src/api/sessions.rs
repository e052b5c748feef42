use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{
    join_path, CreateSessionRequest, CreateSessionResponse, JoinSessionRequest,
    JoinSessionResponse, JoinTokenInfo, SessionInfo,
};
use crate::security::{is_well_formed_join_token, verify_admin_key};
use crate::state::AppState;
use crate::sync::{NewSession, Requester};

pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

const MAX_DISPLAY_LEN: usize = 100;

/// Session routes
pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_session))
        .route("/join/{token}", get(get_join_info).post(join_session))
        .route("/{session_id}", get(get_session))
        .route("/{session_id}/close", post(close_session))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CloseSessionResponse {
    pub session_id: String,
    pub closed: bool,
}

fn validate_display(display: &str) -> Result<String> {
    let display = display.trim();
    if display.is_empty() {
        return Err(AppError::BadRequest("Display name is required".to_string()));
    }
    if display.chars().count() > MAX_DISPLAY_LEN {
        return Err(AppError::BadRequest(
            "Display name must be at most 100 characters".to_string(),
        ));
    }
    Ok(display.to_string())
}

fn ws_path(ticket: &str) -> String {
    format!("/ws?ticket={}", ticket)
}

fn resolve_token(state: &AppState, token: &str) -> Result<String> {
    if !is_well_formed_join_token(token) {
        return Err(AppError::NotFound("Join link not found".to_string()));
    }
    Ok(state.sessions.resolve_join_token(token)?)
}

/// POST /api/v1/sessions - Create a watch session for a catalog item
async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<CreateSessionResponse>> {
    let display = validate_display(&request.display)?;
    let media_id = request.media_id.trim();
    if media_id.is_empty() {
        return Err(AppError::BadRequest("media_id is required".to_string()));
    }

    let created = state
        .sessions
        .create_session(NewSession {
            media_id: media_id.to_string(),
            host_display: display.clone(),
            authority_mode: request.authority_mode,
        })
        .await?;
    let session = created.session;

    let ticket = state.tickets.generate_ticket(
        &created.host_participant_id,
        &session.id,
        &display,
    )?;

    Ok(Json(CreateSessionResponse {
        join_path: join_path(&session.join_token),
        ws_path: ws_path(&ticket),
        session_id: session.id,
        media_id: session.media_id,
        join_token: session.join_token,
        participant_id: created.host_participant_id,
        ticket,
        authority_mode: session.authority_mode,
        created_at: session.created_at,
        expires_in: state.tickets.expiry_seconds(),
    }))
}

/// GET /api/v1/sessions/join/:token - Public summary behind a join link
async fn get_join_info(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<JoinTokenInfo>> {
    let session_id = resolve_token(&state, &token)?;
    let info = state.sessions.get(&session_id)?.snapshot().await?;

    Ok(Json(JoinTokenInfo {
        session_id: info.session_id,
        media_id: info.media_id,
        status: info.status,
        authority_mode: info.authority_mode,
        participant_count: info.participants.len(),
    }))
}

/// POST /api/v1/sessions/join/:token - Issue a participant ticket
async fn join_session(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(request): Json<JoinSessionRequest>,
) -> Result<Json<JoinSessionResponse>> {
    let display_name = validate_display(&request.display)?;
    let session_id = resolve_token(&state, &token)?;

    let participant_id = Uuid::new_v4().to_string();
    let ticket = state
        .tickets
        .generate_ticket(&participant_id, &session_id, &display_name)?;

    tracing::info!(
        session_id = %session_id,
        participant_id = %participant_id,
        display = %display_name,
        "Participant ticket issued"
    );

    Ok(Json(JoinSessionResponse {
        session_id,
        participant_id,
        ws_path: ws_path(&ticket),
        ticket,
        expires_in: state.tickets.expiry_seconds(),
    }))
}

/// GET /api/v1/sessions/:session_id - Canonical snapshot as of now
async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionInfo>> {
    let info = state.sessions.get(&session_id)?.snapshot().await?;
    Ok(Json(info))
}

/// POST /api/v1/sessions/:session_id/close - Host ticket or admin key
async fn close_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<CloseSessionResponse>> {
    let requester = requester_from_headers(&state, &session_id, &headers)?;
    state.sessions.close_session(&session_id, requester).await?;

    Ok(Json(CloseSessionResponse {
        session_id,
        closed: true,
    }))
}

fn requester_from_headers(
    state: &AppState,
    session_id: &str,
    headers: &HeaderMap,
) -> Result<Requester> {
    if let Some(presented) = headers.get(ADMIN_KEY_HEADER) {
        let presented = presented
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid admin key".to_string()))?;
        let valid = state
            .config
            .admin_key_hash
            .as_ref()
            .is_some_and(|expected| verify_admin_key(presented.trim(), expected));
        if !valid {
            return Err(AppError::Unauthorized("Invalid admin key".to_string()));
        }
        return Ok(Requester::Admin);
    }

    let Some(Authorization(bearer)) = headers.typed_get::<Authorization<Bearer>>() else {
        return Err(AppError::Unauthorized(
            "Bearer ticket or admin key required".to_string(),
        ));
    };
    let claims = state.tickets.validate_ticket(bearer.token())?;
    if claims.session_id != session_id {
        return Err(AppError::Forbidden(
            "Ticket belongs to another session".to_string(),
        ));
    }
    Ok(Requester::Participant(claims.sub))
}
