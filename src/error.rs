//! Server error types with HTTP status code mapping.
//!
//! [`AppError`] is the central error type. Each variant maps to a specific
//! HTTP status code and structured JSON error response. WebSocket command
//! failures reuse the same type and are reported to the issuing socket.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 4002,
///     "message": "invalid auth token",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see code ranges on [`AppError`]).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category         | HTTP Status                  |
/// |-----------|------------------|------------------------------|
/// | 1000–1999 | Validation       | 400 Bad Request              |
/// | 2000–2999 | Not Found        | 404 Not Found                |
/// | 3000–3999 | Server/Upstream  | 500 / 502                    |
/// | 4000–4999 | Auth/Permission  | 401 Unauthorized / 403       |
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Room with the given ID was not found.
    #[error("room not found: {0}")]
    RoomNotFound(uuid::Uuid),

    /// User with the given uid was not found.
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// Place with the given Google place id is not saved in the room.
    #[error("place not found: {0}")]
    PlaceNotFound(String),

    /// The request carried no credentials.
    #[error("No auth token provided")]
    NoAuthToken,

    /// The credentials could not be verified.
    #[error("Invalid auth token")]
    InvalidAuthToken,

    /// The identity provider could not be reached or answered unexpectedly.
    #[error("identity provider error: {0}")]
    IdentityProvider(String),

    /// The request's `Origin` is not in the allow-list.
    #[error("origin not allowed: {0}")]
    OriginNotAllowed(String),

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// A geo provider (Targomo, Google Maps) failed.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::RoomNotFound(_) => 2001,
            Self::UserNotFound(_) => 2002,
            Self::PlaceNotFound(_) => 2003,
            Self::Internal(_) => 3000,
            Self::Persistence(_) => 3001,
            Self::Upstream(_) => 3002,
            Self::IdentityProvider(_) => 3003,
            Self::NoAuthToken => 4001,
            Self::InvalidAuthToken => 4002,
            Self::OriginNotAllowed(_) => 4003,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::RoomNotFound(_) | Self::UserNotFound(_) | Self::PlaceNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::NoAuthToken | Self::InvalidAuthToken => StatusCode::UNAUTHORIZED,
            Self::OriginNotAllowed(_) => StatusCode::FORBIDDEN,
            Self::Upstream(_) | Self::IdentityProvider(_) => StatusCode::BAD_GATEWAY,
            Self::Persistence(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
