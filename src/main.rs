//! rendezvous-server entry point.
//!
//! Starts the Axum HTTP server with REST and WebSocket endpoints.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use rendezvous_server::app::build_app;
use rendezvous_server::app_state::AppState;
use rendezvous_server::auth::{FirebaseVerifier, InsecureVerifier, TokenVerifier};
use rendezvous_server::config::{AuthMode, ServerConfig};
use rendezvous_server::domain::ChannelLayer;
use rendezvous_server::geo::{GoogleMapsClient, TargomoClient};
use rendezvous_server::persistence::{self, MemoryStore, PostgresStore, Store};
use rendezvous_server::service::{PagingPolicy, RoomService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config =
        ServerConfig::from_env().map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    tracing::info!(addr = %config.listen_addr, "starting rendezvous-server");

    // Persistence
    let store: Arc<dyn Store> = match persistence::init_pool(&config)
        .await
        .context("failed to initialise PostgreSQL")?
    {
        Some(pool) => Arc::new(PostgresStore::new(pool)),
        None => Arc::new(MemoryStore::new()),
    };

    // Outbound clients
    let http = reqwest::Client::builder()
        .timeout(config.http_client_timeout())
        .build()
        .context("failed to build HTTP client")?;
    let verifier: Arc<dyn TokenVerifier> = match config.auth_mode {
        AuthMode::Firebase => Arc::new(FirebaseVerifier::new(
            http.clone(),
            config.firebase_jwks_url.clone(),
            config.firebase_project_id.clone(),
        )),
        AuthMode::Insecure => {
            tracing::warn!("AUTH_MODE=insecure: ID tokens are not verified");
            Arc::new(InsecureVerifier)
        }
    };
    let isochrones = Arc::new(TargomoClient::new(
        http.clone(),
        &config.targomo_base_url,
        config.targomo_api_key.clone(),
    ));
    let places = Arc::new(GoogleMapsClient::new(
        http,
        &config.maps_base_url,
        config.maps_api_key.clone(),
    ));

    // Build service layer
    let service = RoomService::new(
        store,
        ChannelLayer::new(config.event_bus_capacity),
        isochrones,
        places,
        PagingPolicy {
            max_attempts: config.next_page_max_attempts.max(1),
            retry_delay: Duration::from_millis(config.next_page_retry_delay_ms),
        },
    );
    let app = build_app(AppState::new(
        service,
        verifier,
        config.cors_allowed_origins.clone(),
    ));

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
