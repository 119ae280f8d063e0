//! OpenAPI document for the REST surface.
//!
//! The JSON document is served at `/api-docs/openapi.json`; with the
//! `swagger-ui` feature the same document backs Swagger UI at
//! `/swagger-ui`.

use axum::Router;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::app_state::AppState;

/// Path of the generated OpenAPI JSON document.
pub const OPENAPI_JSON_PATH: &str = "/api-docs/openapi.json";

/// Assembled OpenAPI spec for the REST API.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "rendezvous-server",
        description = "REST endpoints of the rendezvous server. Room traffic runs over the WebSocket at `/ws/chat/{room_id}/?token=`."
    ),
    paths(
        crate::api::handlers::system::health_handler,
        crate::api::handlers::user::get_display_name,
        crate::api::handlers::user::update_display_name,
    ),
    components(schemas(
        crate::api::handlers::system::HealthResponse,
        crate::api::dto::DisplayNameRequest,
        crate::api::dto::DisplayNameResponse,
        crate::error::ErrorResponse,
        crate::error::ErrorBody,
    )),
    modifiers(&FirebaseAuth),
    tags(
        (name = "System", description = "Service status"),
        (name = "Users", description = "Profile of the authenticated user"),
    )
)]
pub struct ApiDoc;

/// Registers the Firebase ID token bearer scheme.
#[derive(Debug)]
struct FirebaseAuth;

impl Modify for FirebaseAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "firebase",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .description(Some("Firebase ID token"))
                    .build(),
            ),
        );
    }
}

/// Builds the documentation router.
#[cfg(feature = "swagger-ui")]
pub fn router() -> Router<AppState> {
    use utoipa_swagger_ui::SwaggerUi;

    Router::new().merge(SwaggerUi::new("/swagger-ui").url(OPENAPI_JSON_PATH, ApiDoc::openapi()))
}

/// Builds the documentation router.
#[cfg(not(feature = "swagger-ui"))]
pub fn router() -> Router<AppState> {
    use axum::Json;
    use axum::routing::get;

    Router::new().route(
        OPENAPI_JSON_PATH,
        get(|| async { Json(ApiDoc::openapi()) }),
    )
}
