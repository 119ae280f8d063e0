//! Google Maps Platform client: place details, text search and distance matrix.

use async_trait::async_trait;
use serde_json::Value;

use super::{PlacesProvider, SearchPage, upstream};
use crate::error::AppError;

/// HTTP client for the Google Maps JSON web services.
#[derive(Debug, Clone)]
pub struct GoogleMapsClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GoogleMapsClient {
    /// Creates a client against `base_url` (e.g. `https://maps.googleapis.com/maps/api`).
    #[must_use]
    pub fn new(http: reqwest::Client, base_url: &str, api_key: String) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, AppError> {
        self.http
            .get(format!("{}/{path}", self.base_url))
            .query(query)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(upstream("google maps"))?
            .json()
            .await
            .map_err(upstream("google maps"))
    }
}

fn search_page(body: &Value) -> SearchPage {
    SearchPage {
        status: body
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        results: body
            .get("results")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        next_page_token: body
            .get("next_page_token")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    }
}

#[async_trait]
impl PlacesProvider for GoogleMapsClient {
    async fn place_details(&self, place_id: &str, fields: &[&str]) -> Result<Value, AppError> {
        let fields = fields.join(",");
        let body = self
            .get(
                "place/details/json",
                &[("place_id", place_id), ("fields", fields.as_str())],
            )
            .await?;
        body.get("result").cloned().ok_or_else(|| {
            AppError::Upstream(format!(
                "google maps: no details for {place_id} ({})",
                body.get("status").and_then(Value::as_str).unwrap_or("no status")
            ))
        })
    }

    async fn text_search(
        &self,
        query: &str,
        lat: f64,
        lng: f64,
    ) -> Result<SearchPage, AppError> {
        let location = format!("{lat},{lng}");
        let body = self
            .get(
                "place/textsearch/json",
                &[("query", query), ("location", location.as_str())],
            )
            .await?;
        Ok(search_page(&body))
    }

    async fn next_page(&self, token: &str) -> Result<SearchPage, AppError> {
        let body = self
            .get("place/textsearch/json", &[("pagetoken", token)])
            .await?;
        Ok(search_page(&body))
    }

    async fn distance_matrix(
        &self,
        origin_place_id: &str,
        destination_place_ids: &[String],
        mode: &str,
    ) -> Result<Vec<Value>, AppError> {
        let origins = format!("place_id:{origin_place_id}");
        let destinations = destination_place_ids
            .iter()
            .map(|id| format!("place_id:{id}"))
            .collect::<Vec<_>>()
            .join("|");
        let body = self
            .get(
                "distancematrix/json",
                &[
                    ("origins", origins.as_str()),
                    ("destinations", destinations.as_str()),
                    ("mode", mode),
                ],
            )
            .await?;
        body.pointer("/rows/0/elements")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| AppError::Upstream("google maps: empty distance matrix".to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> GoogleMapsClient {
        GoogleMapsClient::new(
            reqwest::Client::new(),
            &format!("{}/maps/api/", server.uri()),
            "secret".to_string(),
        )
    }

    #[test]
    fn search_page_tolerates_missing_fields() {
        let page = search_page(&json!({ "status": "INVALID_REQUEST" }));
        assert!(page.is_invalid_request());
        assert!(page.results.is_empty());
        assert_eq!(page.next_page_token, "");

        let page = search_page(&json!({
            "status": "OK",
            "results": [{ "name": "Cafe" }],
            "next_page_token": "next",
        }));
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.next_page_token, "next");
    }

    #[tokio::test]
    async fn place_details_sends_fields_and_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/maps/api/place/details/json"))
            .and(query_param("place_id", "abc"))
            .and(query_param("fields", "name,rating"))
            .and(query_param("key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "OK",
                "result": { "name": "Cafe", "rating": 4.5 },
            })))
            .expect(1)
            .mount(&server)
            .await;

        let details = client_for(&server)
            .place_details("abc", &["name", "rating"])
            .await
            .expect("details returned");
        assert_eq!(details, json!({ "name": "Cafe", "rating": 4.5 }));
    }

    #[tokio::test]
    async fn missing_details_report_the_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "NOT_FOUND" })))
            .mount(&server)
            .await;

        let Err(AppError::Upstream(message)) =
            client_for(&server).place_details("gone", &["name"]).await
        else {
            panic!("expected an upstream error");
        };
        assert!(message.contains("NOT_FOUND"));
    }

    #[tokio::test]
    async fn text_search_and_next_page_share_the_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/maps/api/place/textsearch/json"))
            .and(query_param("query", "coffee"))
            .and(query_param("location", "52.5,13.4"))
            .and(query_param("key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "OK",
                "results": [{ "name": "Cafe" }],
                "next_page_token": "page-2",
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/maps/api/place/textsearch/json"))
            .and(query_param("pagetoken", "page-2"))
            .and(query_param("key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "OK",
                "results": [{ "name": "Bakery" }, { "name": "Bar" }],
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let first = client.text_search("coffee", 52.5, 13.4).await.expect("first page");
        assert_eq!(first.next_page_token, "page-2");
        let second = client.next_page(&first.next_page_token).await.expect("second page");
        assert_eq!(second.results.len(), 2);
        assert_eq!(second.next_page_token, "");
    }

    #[tokio::test]
    async fn distance_matrix_addresses_places_by_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/maps/api/distancematrix/json"))
            .and(query_param("origins", "place_id:home"))
            .and(query_param("destinations", "place_id:a|place_id:b"))
            .and(query_param("mode", "walking"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "OK",
                "rows": [{ "elements": [
                    { "status": "OK", "duration": { "value": 60 } },
                    { "status": "ZERO_RESULTS" },
                ] }],
            })))
            .expect(1)
            .mount(&server)
            .await;

        let elements = client_for(&server)
            .distance_matrix("home", &["a".to_string(), "b".to_string()], "walking")
            .await
            .expect("matrix returned");
        assert_eq!(elements.len(), 2);
        assert_eq!(elements.first().map(|e| &e["duration"]["value"]), Some(&json!(60)));
    }

    #[tokio::test]
    async fn empty_matrix_is_an_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "INVALID_REQUEST", "rows": [] })))
            .mount(&server)
            .await;

        let result = client_for(&server)
            .distance_matrix("home", &["a".to_string()], "driving")
            .await;
        assert!(matches!(result, Err(AppError::Upstream(_))));
    }
}
