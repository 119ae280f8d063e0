//! Users authenticated through Firebase.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;

use super::UserId;
use crate::error::AppError;

/// Maximum length of a user or room display name.
pub const MAX_DISPLAY_NAME_LEN: usize = 150;

/// A stored user.
///
/// `username` holds the Firebase uid and is the natural key used to upsert
/// users on every authenticated request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    /// Database id.
    pub id: UserId,
    /// Firebase uid.
    pub username: String,
    /// Given name taken from the token's `name` claim.
    pub first_name: String,
    /// Family name taken from the token's `name` claim.
    pub last_name: String,
    /// Email from the token, empty when absent.
    pub email: String,
    /// Phone number from the token, empty when absent.
    pub phone_number: String,
    /// Name chosen by the user, empty until set.
    pub display_name: String,
    /// Start of the user's most recent WebSocket session.
    pub last_logged_in: Option<DateTime<Utc>>,
}

impl User {
    /// Returns `"first last"` with surrounding whitespace trimmed.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Returns the name shown to other users.
    ///
    /// Falls back from the chosen display name to the full name, email,
    /// phone number and finally the uid.
    #[must_use]
    pub fn effective_display_name(&self) -> String {
        if !self.display_name.is_empty() {
            return self.display_name.clone();
        }
        let full_name = self.full_name();
        if !full_name.is_empty() {
            return full_name;
        }
        [&self.email, &self.phone_number, &self.username]
            .into_iter()
            .find(|s| !s.is_empty())
            .cloned()
            .unwrap_or_default()
    }
}

/// Identity attributes extracted from a verified token, used to create or
/// refresh a [`User`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserProfile {
    /// Firebase uid.
    pub username: String,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Email, empty when absent.
    pub email: String,
    /// Phone number, empty when absent.
    pub phone_number: String,
}

impl UserProfile {
    /// Builds a profile from token claims.
    ///
    /// The `name` claim is split on spaces: the first word becomes the first
    /// name and the second word, when present, the last name.
    #[must_use]
    pub fn from_claims(
        uid: &str,
        name: Option<&str>,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> Self {
        let mut words = name.unwrap_or_default().split(' ');
        let first_name = words.next().unwrap_or_default().to_string();
        let last_name = words.next().unwrap_or_default().to_string();
        Self {
            username: uid.to_string(),
            first_name,
            last_name,
            email: email.unwrap_or_default().to_string(),
            phone_number: phone_number.unwrap_or_default().to_string(),
        }
    }
}

/// Accepted phone number format.
pub const PHONE_PATTERN: &str = r"^\+?1?\d{9,15}$";

static PHONE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(PHONE_PATTERN).ok());

/// Validates a phone number against [`PHONE_PATTERN`]. Empty is allowed.
#[must_use]
pub fn is_valid_phone_number(phone: &str) -> bool {
    phone.is_empty() || PHONE.as_ref().is_some_and(|re| re.is_match(phone))
}

/// Validates a display name chosen by a user or given to a room.
///
/// # Errors
///
/// Returns [`AppError::InvalidRequest`] if the name exceeds
/// [`MAX_DISPLAY_NAME_LEN`] characters.
pub fn validate_display_name(name: &str) -> Result<(), AppError> {
    if name.chars().count() > MAX_DISPLAY_NAME_LEN {
        return Err(AppError::InvalidRequest(format!(
            "display name longer than {MAX_DISPLAY_NAME_LEN} characters"
        )));
    }
    Ok(())
}
