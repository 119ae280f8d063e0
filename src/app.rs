//! Router assembly shared by the binary and the integration tests.

use std::time::Duration;

use axum::Router;
use axum::http::{HeaderValue, StatusCode};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::app_state::AppState;
use crate::config::AllowedOrigins;
use crate::ws;

/// Upper bound on plain HTTP request handling. Upgraded sockets are not
/// affected once the `101` response has been sent.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds the full application: REST API, documentation and room sockets.
pub fn build_app(state: AppState) -> Router {
    let cors = cors_layer(&state.allowed_origins);
    Router::new()
        .merge(api::build_router())
        .merge(ws::handler::routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(timeout_layer(REQUEST_TIMEOUT)),
        )
        .with_state(state)
}

/// Answers requests that outlive `timeout` with `408 Request Timeout`.
#[must_use]
pub fn timeout_layer(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout)
}

/// Builds the CORS layer for the configured allow-list.
///
/// Entries that are not valid header values are skipped with a warning.
pub fn cors_layer(origins: &AllowedOrigins) -> CorsLayer {
    let allow_origin = match origins {
        AllowedOrigins::Any => AllowOrigin::any(),
        AllowedOrigins::List(list) => AllowOrigin::list(list.iter().filter_map(|origin| {
            HeaderValue::from_str(origin)
                .inspect_err(|_| tracing::warn!(origin, "skipping invalid CORS origin"))
                .ok()
        })),
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}
