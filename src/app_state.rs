//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::auth::TokenVerifier;
use crate::config::AllowedOrigins;
use crate::persistence::Store;
use crate::service::RoomService;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Room service for all business logic.
    pub service: Arc<RoomService>,
    /// ID token verifier.
    pub verifier: Arc<dyn TokenVerifier>,
    /// Persistence backend, shared with the service.
    pub store: Arc<dyn Store>,
    /// Origins allowed for CORS and WebSocket upgrades.
    pub allowed_origins: AllowedOrigins,
}

impl AppState {
    /// Assembles the state around a room service, reusing its store.
    #[must_use]
    pub fn new(
        service: RoomService,
        verifier: Arc<dyn TokenVerifier>,
        allowed_origins: AllowedOrigins,
    ) -> Self {
        let store = Arc::clone(service.store());
        Self {
            service: Arc::new(service),
            verifier,
            store,
            allowed_origins,
        }
    }
}
