//! REST API layer: route handlers, DTOs, and router composition.
//!
//! The REST surface is small: a health check and the caller's display
//! name. Everything room-related runs over the WebSocket.

pub mod dto;
pub mod handlers;
pub mod openapi;

use axum::Router;

use crate::app_state::AppState;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .merge(handlers::system::routes())
        .merge(handlers::user::routes())
        .merge(openapi::router())
}
