use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Claims, ControlEvent};
use crate::security::ct_eq;
use crate::state::AppState;
use crate::sync::SessionHandle;
use crate::ws::{msg_types, ClientMessage, ParticipantConnection, ServerMessage, WsSessionState};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQueryParams {
    pub ticket: String,
}

/// WebSocket routes
pub fn ws_routes() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

/// WebSocket upgrade handler
async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WsQueryParams>,
) -> Result<Response, AppError> {
    let claims = state.tickets.validate_ticket(&params.ticket)?;
    let handle = state.sessions.get(&claims.session_id)?;

    tracing::info!(
        session_id = %claims.session_id,
        participant_id = %claims.sub,
        display = %claims.display,
        "WebSocket upgrade request"
    );

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, handle, claims)))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState, handle: SessionHandle, claims: Claims) {
    let conn_id = Uuid::new_v4().to_string();
    let session = WsSessionState::new(conn_id.clone(), handle.join_token().to_string(), claims);

    tracing::info!(
        conn_id = %conn_id,
        session_id = %session.session_id,
        participant_id = %session.participant_id,
        "WebSocket connected"
    );

    let (tx, mut rx) = mpsc::channel::<ServerMessage>(state.config.outbound_queue_capacity);
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let connection = ParticipantConnection::new(
        conn_id.clone(),
        session.participant_id.clone(),
        session.display.clone(),
        tx.clone(),
    );
    if let Err(e) = handle.attach(connection).await {
        tracing::warn!(
            conn_id = %conn_id,
            participant_id = %session.participant_id,
            error = %e,
            "Attach refused"
        );
        let app_err = AppError::from(e);
        let msg = ServerMessage::error(
            app_err.status().as_u16(),
            &app_err.to_string(),
            state.sessions.now().timestamp_millis(),
            None,
        );
        if let Ok(json) = serde_json::to_string(&msg) {
            let _ = ws_sender.send(Message::Text(json.into())).await;
        }
        let _ = ws_sender.close().await;
        return;
    }

    // Task for sending messages to client
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = msg.msg_type == msg_types::SESSION_CLOSED;
            if let Ok(json) = serde_json::to_string(&msg) {
                if ws_sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            if closing {
                let _ = ws_sender.close().await;
                break;
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if let Err(e) = handle_message(&text, &session, &handle, &state, &tx).await {
                    tracing::debug!(conn_id = %conn_id, error = %e, "Error handling message");
                    let msg = ServerMessage::error(
                        e.status().as_u16(),
                        &e.to_string(),
                        state.sessions.now().timestamp_millis(),
                        None,
                    );
                    let _ = tx.try_send(msg);
                }
            }
            Ok(Message::Close(_)) => {
                tracing::info!(conn_id = %conn_id, "WebSocket close received");
                break;
            }
            Err(e) => {
                tracing::warn!(conn_id = %conn_id, error = %e, "WebSocket error");
                break;
            }
            _ => {}
        }

        if send_task.is_finished() {
            break;
        }
    }

    tracing::info!(
        conn_id = %conn_id,
        session_id = %session.session_id,
        participant_id = %session.participant_id,
        "WebSocket disconnected, cleaning up"
    );

    handle.detach(&session.participant_id, &conn_id).await;
    send_task.abort();
}

/// Handle one inbound frame
async fn handle_message(
    text: &str,
    session: &WsSessionState,
    handle: &SessionHandle,
    state: &AppState,
    tx: &mpsc::Sender<ServerMessage>,
) -> Result<(), AppError> {
    let msg: ClientMessage = serde_json::from_str(text)?;
    let server_received_at = state.sessions.now();

    tracing::debug!(
        msg_type = %msg.msg_type,
        conn_id = %session.conn_id,
        "Received message"
    );

    if msg.msg_type == msg_types::PING {
        if let Some(rtt_ms) = msg.rtt_ms.filter(|v| v.is_finite() && *v >= 0.0) {
            handle
                .record_latency(&session.participant_id, rtt_ms)
                .await?;
        }
        let _ = tx.try_send(ServerMessage::pong(
            server_received_at.timestamp_millis(),
            msg.request_id,
        ));
        return Ok(());
    }

    let Some(kind) = msg.control_kind()? else {
        tracing::warn!(msg_type = %msg.msg_type, "Unknown message type");
        return Err(AppError::BadRequest(format!(
            "Unknown message type: {}",
            msg.msg_type
        )));
    };

    authenticate(&msg, session)?;

    let event = ControlEvent::new(
        kind,
        session.session_id.clone(),
        session.participant_id.clone(),
        server_received_at,
    )
    .with_request_id(msg.request_id.clone())
    .with_client_sent_at(msg.client_sent_at());

    handle.submit(event).await?;
    Ok(())
}

/// A control frame must name this connection's session and participant.
fn authenticate(msg: &ClientMessage, session: &WsSessionState) -> Result<(), AppError> {
    let token = msg
        .session_token
        .as_deref()
        .ok_or_else(|| AppError::Unauthorized("session_token is required".to_string()))?;
    if !ct_eq(token, &session.join_token) {
        return Err(AppError::Unauthorized(
            "session_token does not match".to_string(),
        ));
    }

    if let Some(participant_id) = msg.participant_id.as_deref() {
        if participant_id != session.participant_id {
            return Err(AppError::Unauthorized(
                "participant_id does not match ticket".to_string(),
            ));
        }
    }
    Ok(())
}
