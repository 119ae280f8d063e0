//! Development verifier that trusts the token text.

use async_trait::async_trait;

use super::{TokenVerifier, VerifiedClaims};
use crate::error::AppError;

/// Accepts tokens of the form `uid` or `uid:Full Name` without any
/// signature check. Selected with `AUTH_MODE=insecure`; never use it in
/// production.
#[derive(Debug, Clone, Copy, Default)]
pub struct InsecureVerifier;

#[async_trait]
impl TokenVerifier for InsecureVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedClaims, AppError> {
        let (uid, name) = match token.split_once(':') {
            Some((uid, name)) => (uid.trim(), Some(name.trim()).filter(|n| !n.is_empty())),
            None => (token.trim(), None),
        };
        if uid.is_empty() {
            return Err(AppError::InvalidAuthToken);
        }
        Ok(VerifiedClaims {
            uid: uid.to_string(),
            name: name.map(str::to_string),
            email: None,
            phone_number: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn splits_uid_and_name() {
        let claims = InsecureVerifier.verify("abc:Grace Hopper").await.ok();
        assert_eq!(claims.as_ref().map(|c| c.uid.as_str()), Some("abc"));
        assert_eq!(
            claims.and_then(|c| c.name),
            Some("Grace Hopper".to_string())
        );
        let bare = InsecureVerifier.verify("xyz").await.ok();
        assert_eq!(bare.and_then(|c| c.name), None);
    }
}
