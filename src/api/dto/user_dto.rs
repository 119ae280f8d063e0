//! DTOs for the display-name endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body of `POST /api/display_name`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct DisplayNameRequest {
    /// New display name, at most 150 characters. Empty clears it.
    pub display_name: String,
}

/// The caller's effective display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DisplayNameResponse {
    /// Display name, falling back to full name, email, phone or uid.
    pub display_name: String,
}
