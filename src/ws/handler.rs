//! Axum WebSocket upgrade handler.

use std::sync::Arc;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, header};
use axum::response::Response;
use axum::routing::get;
use serde::Deserialize;

use super::connection::run_connection;
use crate::app_state::AppState;
use crate::auth::authenticate;
use crate::domain::RoomId;
use crate::error::AppError;

/// Query string of the upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    /// Firebase ID token.
    #[serde(default)]
    pub token: Option<String>,
}

/// `GET /ws/chat/{room_id}/?token=`: Upgrade HTTP connection to WebSocket.
///
/// The origin, room id and token are checked before the upgrade so a
/// rejected client gets a plain HTTP error.
///
/// # Errors
///
/// Returns [`AppError::OriginNotAllowed`] for a foreign `Origin`,
/// [`AppError::InvalidRequest`] for a malformed room id and an auth error
/// when the token is missing or rejected.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    if let Some(origin) = headers.get(header::ORIGIN) {
        let origin = origin.to_str().unwrap_or_default();
        if !state.allowed_origins.allows(origin) {
            tracing::warn!(origin, "ws upgrade from disallowed origin");
            return Err(AppError::OriginNotAllowed(origin.to_string()));
        }
    }

    let room_id: RoomId = room_id
        .parse()
        .map_err(|_| AppError::InvalidRequest(format!("invalid room id: {room_id}")))?;
    let token = params
        .token
        .filter(|t| !t.is_empty())
        .ok_or(AppError::NoAuthToken)?;

    let user = authenticate(state.verifier.as_ref(), state.store.as_ref(), &token).await?;
    let session = state.service.open_session(&user, room_id).await?;
    tracing::info!(room = %room_id, user_id = %user.id, "ws connection accepted");

    let service = Arc::clone(&state.service);
    Ok(ws.on_upgrade(move |socket| run_connection(socket, service, session)))
}

/// Routes for the room socket, with and without a trailing slash.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/ws/chat/{room_id}", get(ws_handler))
        .route("/ws/chat/{room_id}/", get(ws_handler))
}
