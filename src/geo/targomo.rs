//! Targomo polygon service client.

use async_trait::async_trait;
use serde_json::Value;

use super::{IsochroneProvider, PolygonRequest, upstream};
use crate::error::AppError;

/// HTTP client for `POST {base}/{region}/v1/polygon`.
#[derive(Debug, Clone)]
pub struct TargomoClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl TargomoClient {
    /// Creates a client against `base_url` (e.g. `https://service.targomo.com`).
    #[must_use]
    pub fn new(http: reqwest::Client, base_url: &str, api_key: String) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl IsochroneProvider for TargomoClient {
    async fn polygon(&self, region: &str, request: &PolygonRequest) -> Result<Value, AppError> {
        let url = format!("{}/{region}/v1/polygon", self.base_url);
        let body: Value = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request.to_payload())
            .send()
            .await
            .map_err(upstream("targomo"))?
            .json()
            .await
            .map_err(upstream("targomo"))?;

        body.pointer("/data/features/0").cloned().ok_or_else(|| {
            tracing::error!(region, source_id = %request.id, "targomo returned no isochrone");
            AppError::Upstream(format!("targomo: no isochrone for {}", request.id))
        })
    }
}
