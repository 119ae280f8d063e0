//! Authentication: Firebase ID token verification and user resolution.
//!
//! A [`TokenVerifier`] turns a raw ID token into [`VerifiedClaims`];
//! [`authenticate`] maps those claims onto a [`UserProfile`] and upserts
//! the user keyed by Firebase uid. REST handlers take an
//! [`AuthenticatedUser`] extractor reading the `Authorization` header,
//! WebSocket upgrades pass the `token` query parameter instead.

pub mod firebase;
pub mod insecure;

use std::fmt;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;

use crate::app_state::AppState;
use crate::domain::user::is_valid_phone_number;
use crate::domain::{User, UserProfile};
use crate::error::AppError;
use crate::persistence::Store;

pub use firebase::FirebaseVerifier;
pub use insecure::InsecureVerifier;

/// Identity claims taken from a verified ID token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifiedClaims {
    /// Firebase uid.
    pub uid: String,
    /// Full name, when the provider supplies one.
    pub name: Option<String>,
    /// Email address.
    pub email: Option<String>,
    /// Phone number in E.164 form.
    pub phone_number: Option<String>,
}

impl VerifiedClaims {
    /// Maps the claims onto a user profile.
    ///
    /// A phone number that does not match the accepted format is dropped.
    #[must_use]
    pub fn to_profile(&self) -> UserProfile {
        let phone = self.phone_number.as_deref().filter(|p| {
            let valid = is_valid_phone_number(p);
            if !valid {
                tracing::warn!(uid = %self.uid, "ignoring malformed phone number claim");
            }
            valid
        });
        UserProfile::from_claims(
            &self.uid,
            self.name.as_deref(),
            self.email.as_deref(),
            phone,
        )
    }
}

/// Verifies raw ID tokens.
#[async_trait]
pub trait TokenVerifier: Send + Sync + fmt::Debug {
    /// Verifies `token` and returns its identity claims.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::InvalidAuthToken`] when the token is rejected,
    /// or [`AppError::IdentityProvider`] when the signing keys cannot be
    /// fetched.
    async fn verify(&self, token: &str) -> Result<VerifiedClaims, AppError>;
}

/// Verifies `token` and creates or refreshes the matching user.
///
/// # Errors
///
/// Propagates verification and persistence failures.
pub async fn authenticate(
    verifier: &dyn TokenVerifier,
    store: &dyn Store,
    token: &str,
) -> Result<User, AppError> {
    let claims = verifier.verify(token).await?;
    let user = store.upsert_user(&claims.to_profile()).await?;
    tracing::debug!(user_id = %user.id, uid = %user.username, "authenticated");
    Ok(user)
}

/// Extracts the ID token from an `Authorization` header value.
///
/// The token is the last space-separated segment, so both `Bearer <token>`
/// and a bare token are accepted. A lone scheme word carries no token;
/// proxies and clients commonly trim `Bearer ` down to `Bearer`.
///
/// # Errors
///
/// Returns [`AppError::NoAuthToken`] when the header is missing and
/// [`AppError::InvalidAuthToken`] when it carries no token.
pub fn token_from_header(value: Option<&str>) -> Result<&str, AppError> {
    let value = value.ok_or(AppError::NoAuthToken)?;
    value
        .split(' ')
        .next_back()
        .filter(|t| !t.is_empty() && !t.eq_ignore_ascii_case("bearer"))
        .ok_or(AppError::InvalidAuthToken)
}

/// The user behind a request's `Authorization` header.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .map(|v| v.to_str().map_err(|_| AppError::InvalidAuthToken))
            .transpose()?;
        let token = token_from_header(header)?;
        let user = authenticate(state.verifier.as_ref(), state.store.as_ref(), token).await?;
        Ok(Self(user))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use tokio_test::assert_ok;

    #[test]
    fn header_token_is_last_segment() {
        assert_eq!(token_from_header(Some("Bearer abc")).ok(), Some("abc"));
        assert_eq!(token_from_header(Some("abc")).ok(), Some("abc"));
        assert!(matches!(token_from_header(None), Err(AppError::NoAuthToken)));
        assert!(matches!(
            token_from_header(Some("Bearer ")),
            Err(AppError::InvalidAuthToken)
        ));
        assert!(matches!(
            token_from_header(Some("Bearer")),
            Err(AppError::InvalidAuthToken)
        ));
        assert!(matches!(
            token_from_header(Some("bearer")),
            Err(AppError::InvalidAuthToken)
        ));
    }

    #[test]
    fn malformed_phone_is_dropped() {
        let claims = VerifiedClaims {
            uid: "uid".to_string(),
            name: Some("Ada Lovelace".to_string()),
            email: None,
            phone_number: Some("555-0100".to_string()),
        };
        let profile = claims.to_profile();
        assert_eq!(profile.phone_number, "");
        assert_eq!(profile.last_name, "Lovelace");
    }

    #[tokio::test]
    async fn authenticate_upserts_by_uid() {
        let store = MemoryStore::new();
        let verifier = InsecureVerifier;
        let first = assert_ok!(authenticate(&verifier, &store, "uid-7:Ada Lovelace").await);
        let second = assert_ok!(authenticate(&verifier, &store, "uid-7:Ada King").await);
        assert_eq!(first.id, second.id);
        assert_eq!(second.last_name, "King");
        assert!(matches!(
            authenticate(&verifier, &store, "").await,
            Err(AppError::InvalidAuthToken)
        ));
    }
}
