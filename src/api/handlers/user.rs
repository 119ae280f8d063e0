//! Display-name handlers for the authenticated user.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{DisplayNameRequest, DisplayNameResponse};
use crate::app_state::AppState;
use crate::auth::AuthenticatedUser;
use crate::domain::user::validate_display_name;
use crate::error::{AppError, ErrorResponse};

/// `GET /api/display_name`: The caller's effective display name.
///
/// # Errors
///
/// Returns an auth error when the `Authorization` header is missing or
/// rejected.
#[utoipa::path(
    get,
    path = "/api/display_name",
    tag = "Users",
    summary = "Get display name",
    description = "Returns the display name shown to other room members, falling back to full name, email, phone number and finally the Firebase uid.",
    security(("firebase" = [])),
    responses(
        (status = 200, description = "Effective display name", body = DisplayNameResponse),
        (status = 401, description = "Missing or invalid ID token", body = ErrorResponse),
    )
)]
pub async fn get_display_name(
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<DisplayNameResponse>, AppError> {
    Ok(Json(DisplayNameResponse {
        display_name: user.effective_display_name(),
    }))
}

/// `POST /api/display_name`: Change the caller's display name.
///
/// # Errors
///
/// Returns [`AppError::InvalidRequest`] for a name over 150 characters and
/// an auth error when the `Authorization` header is missing or rejected.
#[utoipa::path(
    post,
    path = "/api/display_name",
    tag = "Users",
    summary = "Set display name",
    description = "Stores a new display name and returns the resulting effective display name. An empty name restores the fallback.",
    security(("firebase" = [])),
    request_body = DisplayNameRequest,
    responses(
        (status = 200, description = "Updated effective display name", body = DisplayNameResponse),
        (status = 400, description = "Display name too long", body = ErrorResponse),
        (status = 401, description = "Missing or invalid ID token", body = ErrorResponse),
    )
)]
pub async fn update_display_name(
    State(state): State<AppState>,
    AuthenticatedUser(mut user): AuthenticatedUser,
    Json(req): Json<DisplayNameRequest>,
) -> Result<Json<DisplayNameResponse>, AppError> {
    let name = req.display_name.trim();
    validate_display_name(name)?;
    state.store.set_display_name(user.id, name).await?;
    tracing::info!(user_id = %user.id, "display name updated");

    user.display_name = name.to_string();
    Ok(Json(DisplayNameResponse {
        display_name: user.effective_display_name(),
    }))
}

/// Routes for the authenticated user's profile.
pub fn routes() -> Router<AppState> {
    Router::new().route(
        "/api/display_name",
        get(get_display_name).post(update_display_name),
    )
}
