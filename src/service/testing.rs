//! In-process fakes for exercising [`RoomService`] without network access.

#![allow(clippy::panic)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::{Mutex, broadcast};

use super::{PagingPolicy, RoomService, Session};
use crate::domain::{ChannelLayer, ClientEvent, GroupEvent, RoomId, User, UserProfile};
use crate::error::AppError;
use crate::geo::{IsochroneProvider, PlacesProvider, PolygonRequest, SearchPage};
use crate::persistence::{MemoryStore, Store};

pub(crate) fn square(lng: f64, lat: f64, half: f64) -> Value {
    json!({
        "type": "MultiPolygon",
        "coordinates": [[[
            [lng - half, lat - half],
            [lng + half, lat - half],
            [lng + half, lat + half],
            [lng - half, lat + half],
            [lng - half, lat - half],
        ]]],
    })
}

/// Answers only for one service region with a small square around the
/// source; every other region fails.
#[derive(Debug)]
pub(crate) struct FakeIsochrones {
    pub region: &'static str,
}

#[async_trait]
impl IsochroneProvider for FakeIsochrones {
    async fn polygon(&self, region: &str, request: &PolygonRequest) -> Result<Value, AppError> {
        if region != self.region {
            return Err(AppError::Upstream(format!("no coverage in {region}")));
        }
        Ok(json!({
            "type": "Feature",
            "properties": { "id": request.id, "time": request.seconds },
            "geometry": square(request.lng, request.lat, 0.01),
        }))
    }
}

/// Canned Google Maps answers.
#[derive(Debug, Default)]
pub(crate) struct FakePlaces {
    /// Details results by requested place id.
    pub details: Mutex<HashMap<String, Value>>,
    /// Number of `INVALID_REQUEST` answers before a next page succeeds.
    pub invalid_pages: AtomicU32,
    /// Number of distance-matrix calls made.
    pub matrix_calls: AtomicU32,
}

impl FakePlaces {
    pub(crate) async fn add_details(&self, place_id: &str, result: Value) {
        self.details.lock().await.insert(place_id.to_string(), result);
    }
}

#[async_trait]
impl PlacesProvider for FakePlaces {
    async fn place_details(&self, place_id: &str, _fields: &[&str]) -> Result<Value, AppError> {
        self.details
            .lock()
            .await
            .get(place_id)
            .cloned()
            .ok_or_else(|| AppError::Upstream(format!("no details for {place_id}")))
    }

    async fn text_search(&self, query: &str, lat: f64, lng: f64) -> Result<SearchPage, AppError> {
        Ok(SearchPage {
            status: "OK".to_string(),
            results: vec![json!({ "name": query, "lat": lat, "lng": lng })],
            next_page_token: "page-2".to_string(),
        })
    }

    async fn next_page(&self, token: &str) -> Result<SearchPage, AppError> {
        let pending = self.invalid_pages.load(Ordering::SeqCst);
        if pending > 0 {
            self.invalid_pages.store(pending - 1, Ordering::SeqCst);
            return Ok(SearchPage {
                status: "INVALID_REQUEST".to_string(),
                ..SearchPage::default()
            });
        }
        Ok(SearchPage {
            status: "OK".to_string(),
            results: vec![json!({ "name": format!("after {token}") })],
            next_page_token: String::new(),
        })
    }

    async fn distance_matrix(
        &self,
        _origin_place_id: &str,
        destination_place_ids: &[String],
        _mode: &str,
    ) -> Result<Vec<Value>, AppError> {
        self.matrix_calls.fetch_add(1, Ordering::SeqCst);
        Ok(destination_place_ids
            .iter()
            .map(|id| {
                json!({
                    "duration": { "text": format!("5 mins to {id}") },
                    "distance": { "text": "1 km" },
                })
            })
            .collect())
    }
}

#[derive(Debug)]
pub(crate) struct Harness {
    pub service: RoomService,
    pub store: Arc<MemoryStore>,
    pub places: Arc<FakePlaces>,
    pub events: broadcast::Receiver<GroupEvent>,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Self::with_region("westcentraleurope")
    }

    /// Builds a harness whose isochrone fake only covers `region`.
    pub(crate) fn with_region(region: &'static str) -> Self {
        let store = Arc::new(MemoryStore::new());
        let places = Arc::new(FakePlaces::default());
        let channel_layer = ChannelLayer::new(1024);
        let events = channel_layer.subscribe();
        let service = RoomService::new(
            Arc::clone(&store) as Arc<dyn Store>,
            channel_layer,
            Arc::new(FakeIsochrones { region }),
            Arc::clone(&places) as Arc<dyn PlacesProvider>,
            PagingPolicy {
                max_attempts: 3,
                retry_delay: Duration::ZERO,
            },
        );
        Self {
            service,
            store,
            places,
            events,
        }
    }

    /// Creates the user `uid` and connects them to `room`.
    pub(crate) async fn connect(&self, uid: &str, room: RoomId) -> (User, Session) {
        let profile = UserProfile {
            username: uid.to_string(),
            ..UserProfile::default()
        };
        let Ok(user) = self.store.upsert_user(&profile).await else {
            panic!("upsert_user failed");
        };
        let Ok(session) = self.service.open_session(&user, room).await else {
            panic!("open_session failed");
        };
        (user, session)
    }

    /// Connects `uid` to `room` and makes them a member.
    pub(crate) async fn member(&self, uid: &str, room: RoomId) -> (User, Session) {
        let (user, session) = self.connect(uid, room).await;
        if self.service.join_room(&session).await.is_err() {
            panic!("join_room failed");
        }
        (user, session)
    }

    /// Takes every group event published so far.
    pub(crate) fn drain(&mut self) -> Vec<GroupEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    /// Takes the events published so far to one group.
    pub(crate) fn drain_group(&mut self, group: RoomId) -> Vec<ClientEvent> {
        self.drain()
            .into_iter()
            .filter(|e| e.group == group)
            .map(|e| e.event)
            .collect()
    }
}
