//! Firebase ID token verification.
//!
//! Tokens are RS256 JWTs signed by one of Google's rotating `securetoken`
//! keys. The key set is fetched from the configured JWKS URL and cached
//! for the `max-age` the endpoint advertises. An unknown `kid` forces a
//! refresh so rotated keys are picked up, but at most once per
//! [`MIN_REFRESH_INTERVAL`]; tokens with made-up key ids cannot drive
//! traffic to the key endpoint.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use reqwest::header::CACHE_CONTROL;
use serde::Deserialize;
use tokio::sync::RwLock;

use super::{TokenVerifier, VerifiedClaims};
use crate::error::AppError;

const DEFAULT_KEY_TTL: Duration = Duration::from_secs(3600);

/// Minimum time between two fetches of the signing keys.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Deserialize)]
struct FirebaseClaims {
    sub: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone_number: Option<String>,
}

#[derive(Debug)]
struct CachedKeys {
    keys: JwkSet,
    fetched_at: Instant,
    expires_at: Instant,
}

impl CachedKeys {
    /// Resolves `kid` from the cache, or `None` when a refetch is due.
    ///
    /// Within [`MIN_REFRESH_INTERVAL`] of the last fetch the cache is
    /// authoritative, even if expired.
    fn lookup(&self, kid: &str) -> Option<Result<DecodingKey, AppError>> {
        let now = Instant::now();
        let settled = now.duration_since(self.fetched_at) < MIN_REFRESH_INTERVAL;
        match self.keys.find(kid) {
            Some(jwk) if settled || self.expires_at > now => {
                Some(DecodingKey::from_jwk(jwk).map_err(|_| AppError::InvalidAuthToken))
            }
            None if settled => Some(Err(AppError::InvalidAuthToken)),
            _ => None,
        }
    }
}

/// Verifies Firebase ID tokens against Google's published signing keys.
#[derive(Debug)]
pub struct FirebaseVerifier {
    http: reqwest::Client,
    jwks_url: String,
    project_id: String,
    cache: RwLock<Option<CachedKeys>>,
}

impl FirebaseVerifier {
    /// Creates a verifier for tokens issued to `project_id`.
    #[must_use]
    pub fn new(http: reqwest::Client, jwks_url: String, project_id: String) -> Self {
        Self {
            http,
            jwks_url,
            project_id,
            cache: RwLock::new(None),
        }
    }

    fn issuer(&self) -> String {
        format!("https://securetoken.google.com/{}", self.project_id)
    }

    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, AppError> {
        if let Some(found) = self.cache.read().await.as_ref().and_then(|c| c.lookup(kid)) {
            return found;
        }

        let mut cache = self.cache.write().await;
        // Another request may have refreshed while we waited for the lock.
        if let Some(found) = cache.as_ref().and_then(|c| c.lookup(kid)) {
            return found;
        }
        let fresh = self.fetch_keys().await?;
        let key = fresh
            .keys
            .find(kid)
            .map(DecodingKey::from_jwk)
            .transpose()
            .map_err(|_| AppError::InvalidAuthToken);
        *cache = Some(fresh);
        key?.ok_or(AppError::InvalidAuthToken)
    }

    async fn fetch_keys(&self) -> Result<CachedKeys, AppError> {
        let response = self
            .http
            .get(&self.jwks_url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| AppError::IdentityProvider(e.to_string()))?;
        let ttl = response
            .headers()
            .get(CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .and_then(max_age)
            .unwrap_or(DEFAULT_KEY_TTL);
        let keys: JwkSet = response
            .json()
            .await
            .map_err(|e| AppError::IdentityProvider(e.to_string()))?;
        tracing::debug!(keys = keys.keys.len(), ttl_secs = ttl.as_secs(), "refreshed firebase signing keys");
        let fetched_at = Instant::now();
        Ok(CachedKeys {
            keys,
            fetched_at,
            expires_at: fetched_at + ttl,
        })
    }
}

#[async_trait]
impl TokenVerifier for FirebaseVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedClaims, AppError> {
        let header = decode_header(token).map_err(|_| AppError::InvalidAuthToken)?;
        if header.alg != Algorithm::RS256 {
            return Err(AppError::InvalidAuthToken);
        }
        let kid = header.kid.ok_or(AppError::InvalidAuthToken)?;
        let key = self.decoding_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.project_id]);
        validation.set_issuer(&[self.issuer()]);
        validation.set_required_spec_claims(&["exp", "iat", "aud", "iss", "sub"]);

        let data = decode::<FirebaseClaims>(token, &key, &validation).map_err(|e| {
            tracing::debug!(error = %e, "rejected firebase token");
            AppError::InvalidAuthToken
        })?;
        let claims = data.claims;
        if claims.sub.is_empty() {
            return Err(AppError::InvalidAuthToken);
        }
        Ok(VerifiedClaims {
            uid: claims.sub,
            name: claims.name,
            email: claims.email,
            phone_number: claims.phone_number,
        })
    }
}

/// Reads `max-age` from a `Cache-Control` header value.
fn max_age(cache_control: &str) -> Option<Duration> {
    cache_control
        .split(',')
        .filter_map(|d| d.trim().strip_prefix("max-age="))
        .find_map(|secs| secs.trim().parse().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// An RS256 token header naming the key id `bogus`, with dummy claims
    /// and signature.
    const UNKNOWN_KID_TOKEN: &str = "eyJhbGciOiJSUzI1NiIsImtpZCI6ImJvZ3VzIn0.e30.c2ln";

    fn verifier_for(server: &MockServer) -> FirebaseVerifier {
        FirebaseVerifier::new(
            reqwest::Client::new(),
            format!("{}/jwks", server.uri()),
            "demo-project".to_string(),
        )
    }

    #[test]
    fn parses_max_age_directive() {
        assert_eq!(
            max_age("public, max-age=19845, must-revalidate, no-transform"),
            Some(Duration::from_secs(19845))
        );
        assert_eq!(max_age("no-cache"), None);
    }

    #[tokio::test]
    async fn garbage_token_is_rejected_before_key_lookup() {
        let verifier = FirebaseVerifier::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9/unreachable".to_string(),
            "demo-project".to_string(),
        );
        assert!(matches!(
            verifier.verify("not-a-jwt").await,
            Err(AppError::InvalidAuthToken)
        ));
    }

    #[test]
    fn issuer_is_project_scoped() {
        let verifier = FirebaseVerifier::new(
            reqwest::Client::new(),
            String::new(),
            "demo-project".to_string(),
        );
        assert_eq!(verifier.issuer(), "https://securetoken.google.com/demo-project");
    }

    #[tokio::test]
    async fn unknown_kids_refetch_keys_once_per_interval() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"keys": []})))
            .expect(1)
            .mount(&server)
            .await;
        let verifier = verifier_for(&server);

        for _ in 0..5 {
            assert!(matches!(
                verifier.verify(UNKNOWN_KID_TOKEN).await,
                Err(AppError::InvalidAuthToken)
            ));
        }
        // `expect(1)` is checked when the server drops.
    }

    #[tokio::test]
    async fn key_ttl_follows_cache_control() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Cache-Control", "public, max-age=120, must-revalidate")
                    .set_body_json(json!({"keys": []})),
            )
            .mount(&server)
            .await;

        let cached = verifier_for(&server).fetch_keys().await.expect("keys fetched");
        let ttl = cached.expires_at.duration_since(cached.fetched_at);
        assert_eq!(ttl, Duration::from_secs(120));
        assert!(cached.keys.keys.is_empty());
    }

    #[tokio::test]
    async fn key_endpoint_failure_is_a_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        assert!(matches!(
            verifier_for(&server).verify(UNKNOWN_KID_TOKEN).await,
            Err(AppError::IdentityProvider(_))
        ));
    }
}
