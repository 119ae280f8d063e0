//! Geo providers: Targomo isochrones and Google Maps places.
//!
//! Both providers sit behind traits so the room service can be exercised
//! with in-process fakes. [`region`] samples Targomo's service regions to
//! find the one that covers a starting point.

pub mod maps;
pub mod region;
pub mod targomo;

use std::fmt;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::domain::Transportation;
use crate::error::AppError;

pub use maps::GoogleMapsClient;
pub use targomo::TargomoClient;

/// A single-source isochrone request.
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonRequest {
    /// Source latitude.
    pub lat: f64,
    /// Source longitude.
    pub lng: f64,
    /// Source identifier echoed back by Targomo.
    pub id: String,
    /// Travel mode.
    pub mode: Transportation,
    /// Travel budget in seconds.
    pub seconds: u32,
}

impl PolygonRequest {
    /// Renders the Targomo polygon request body (GeoJSON, WGS 84).
    #[must_use]
    pub fn to_payload(&self) -> Value {
        let mut tm = serde_json::Map::new();
        tm.insert(self.mode.as_str().to_string(), json!({}));
        json!({
            "sources": [{
                "lat": self.lat,
                "lng": self.lng,
                "id": self.id,
                "tm": tm,
            }],
            "polygon": {
                "serializer": "geojson",
                "srid": 4326,
                "values": [self.seconds],
            },
        })
    }
}

/// Computes isochrones.
#[async_trait]
pub trait IsochroneProvider: Send + Sync + fmt::Debug {
    /// Returns the first GeoJSON feature of the isochrone for `request`
    /// computed in service `region`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Upstream`] if the call fails or the response has
    /// no feature.
    async fn polygon(&self, region: &str, request: &PolygonRequest) -> Result<Value, AppError>;
}

/// One page of a Places text search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    /// Google status string (`OK`, `ZERO_RESULTS`, `INVALID_REQUEST`, ...).
    pub status: String,
    /// Place results, passed through verbatim.
    pub results: Vec<Value>,
    /// Token for the following page, empty when none.
    pub next_page_token: String,
}

impl SearchPage {
    /// Returns `true` when Google rejected the request, which for a
    /// next-page call means the token is not valid yet.
    #[must_use]
    pub fn is_invalid_request(&self) -> bool {
        self.status == "INVALID_REQUEST"
    }
}

/// Google Maps Platform web services.
#[async_trait]
pub trait PlacesProvider: Send + Sync + fmt::Debug {
    /// Fetches the `result` object of a place details call restricted to
    /// `fields`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Upstream`] if the call fails or has no result.
    async fn place_details(&self, place_id: &str, fields: &[&str]) -> Result<Value, AppError>;

    /// Runs a text search biased towards `(lat, lng)`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Upstream`] if the call fails.
    async fn text_search(&self, query: &str, lat: f64, lng: f64)
    -> Result<SearchPage, AppError>;

    /// Fetches the page behind a next-page token.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Upstream`] if the call fails.
    async fn next_page(&self, token: &str) -> Result<SearchPage, AppError>;

    /// Returns one distance-matrix element per destination for a single
    /// origin. Places are addressed by Google place id.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Upstream`] if the call fails.
    async fn distance_matrix(
        &self,
        origin_place_id: &str,
        destination_place_ids: &[String],
        mode: &str,
    ) -> Result<Vec<Value>, AppError>;
}

pub(crate) fn upstream(service: &str) -> impl Fn(reqwest::Error) -> AppError + '_ {
    move |e| AppError::Upstream(format!("{service}: {e}"))
}
