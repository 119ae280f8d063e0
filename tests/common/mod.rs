//! Shared helpers to spawn the server on an ephemeral port.

#![allow(dead_code, clippy::expect_used, clippy::panic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rendezvous_server::app::build_app;
use rendezvous_server::app_state::AppState;
use rendezvous_server::auth::InsecureVerifier;
use rendezvous_server::config::AllowedOrigins;
use rendezvous_server::domain::ChannelLayer;
use rendezvous_server::error::AppError;
use rendezvous_server::geo::{IsochroneProvider, PlacesProvider, PolygonRequest, SearchPage};
use rendezvous_server::persistence::{MemoryStore, Store};
use rendezvous_server::service::{PagingPolicy, RoomService};
use serde_json::{Value, json};
use tokio::net::TcpListener;

/// Origin accepted by the spawned server.
pub const ALLOWED_ORIGIN: &str = "http://localhost:3000";

/// Isochrones are a small square around the source in every region.
#[derive(Debug)]
struct SquareIsochrones;

#[async_trait]
impl IsochroneProvider for SquareIsochrones {
    async fn polygon(&self, _region: &str, request: &PolygonRequest) -> Result<Value, AppError> {
        let (lng, lat, d) = (request.lng, request.lat, 0.01);
        Ok(json!({
            "type": "Feature",
            "properties": { "id": request.id, "time": request.seconds },
            "geometry": {
                "type": "MultiPolygon",
                "coordinates": [[[
                    [lng - d, lat - d], [lng + d, lat - d], [lng + d, lat + d],
                    [lng - d, lat + d], [lng - d, lat - d],
                ]]],
            },
        }))
    }
}

/// Places that echo their inputs.
#[derive(Debug)]
struct EchoPlaces;

#[async_trait]
impl PlacesProvider for EchoPlaces {
    async fn place_details(&self, place_id: &str, _fields: &[&str]) -> Result<Value, AppError> {
        Ok(json!({ "place_id": place_id, "name": format!("Place {place_id}") }))
    }

    async fn text_search(&self, query: &str, _lat: f64, _lng: f64) -> Result<SearchPage, AppError> {
        Ok(SearchPage {
            status: "OK".to_string(),
            results: vec![json!({ "name": query })],
            next_page_token: String::new(),
        })
    }

    async fn next_page(&self, _token: &str) -> Result<SearchPage, AppError> {
        Ok(SearchPage {
            status: "OK".to_string(),
            ..SearchPage::default()
        })
    }

    async fn distance_matrix(
        &self,
        _origin_place_id: &str,
        destination_place_ids: &[String],
        _mode: &str,
    ) -> Result<Vec<Value>, AppError> {
        Ok(destination_place_ids
            .iter()
            .map(|_| json!({ "duration": { "text": "5 mins" }, "distance": { "text": "1 km" } }))
            .collect())
    }
}

/// A running server.
pub struct TestApp {
    /// Bound address.
    pub addr: SocketAddr,
    /// Backing store, for assertions.
    pub store: Arc<MemoryStore>,
}

impl TestApp {
    /// Absolute HTTP URL for `path`.
    pub fn http(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Room socket URL authenticated with an insecure `token`.
    pub fn ws(&self, room: &str, token: &str) -> String {
        format!("ws://{}/ws/chat/{room}/?token={token}", self.addr)
    }
}

/// Spawns the app with the in-memory store, the insecure verifier and
/// fake geo providers.
pub async fn spawn_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let service = RoomService::new(
        Arc::clone(&store) as Arc<dyn Store>,
        ChannelLayer::new(1024),
        Arc::new(SquareIsochrones),
        Arc::new(EchoPlaces),
        PagingPolicy {
            max_attempts: 2,
            retry_delay: Duration::ZERO,
        },
    );
    let state = AppState::new(
        service,
        Arc::new(InsecureVerifier),
        AllowedOrigins::parse(ALLOWED_ORIGIN),
    );
    let app = build_app(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind random port");
    let addr = listener.local_addr().expect("listener has no address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server failed");
    });

    TestApp { addr, store }
}
