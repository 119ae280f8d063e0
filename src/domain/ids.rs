//! Type-safe identifiers.
//!
//! [`RoomId`] wraps a [`uuid::Uuid`] because room ids travel in WebSocket
//! URLs and double as channel-group names. The remaining ids are database
//! serials wrapped in newtypes so that a user id can never be passed where
//! a message id is expected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Unique identifier for a room.
///
/// Rooms are created lazily the first time a client connects to an unknown
/// id, so the id is chosen by the client and parsed from the URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(uuid::Uuid);

impl RoomId {
    /// Creates a new random `RoomId` (UUID v4).
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Creates a `RoomId` from an existing [`uuid::Uuid`].
    #[must_use]
    pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner [`uuid::Uuid`].
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for RoomId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RoomId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

impl From<uuid::Uuid> for RoomId {
    fn from(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }
}

impl From<RoomId> for uuid::Uuid {
    fn from(id: RoomId) -> Self {
        id.0
    }
}

macro_rules! serial_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw database serial.
            #[must_use]
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// Returns the raw database serial.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

serial_id!(
    /// Identifier of a user row.
    UserId
);
serial_id!(
    /// Identifier of a chat message.
    MessageId
);
serial_id!(
    /// Identifier of a pending join request.
    JoinRequestId
);
serial_id!(
    /// Identifier of a saved place (not the Google place id).
    PlaceKey
);
serial_id!(
    /// Identifier of a notification.
    NotificationId
);

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn new_generates_unique_room_ids() {
        assert_ne!(RoomId::new(), RoomId::new());
    }

    #[test]
    fn room_id_parses_from_url_segment() {
        let uuid = uuid::Uuid::new_v4();
        let Ok(parsed) = uuid.to_string().parse::<RoomId>() else {
            panic!("valid uuid must parse");
        };
        assert_eq!(*parsed.as_uuid(), uuid);
        assert!("not-a-room".parse::<RoomId>().is_err());
    }

    #[test]
    fn room_id_display_is_group_name() {
        let id = RoomId::new();
        assert_eq!(id.to_string(), id.as_uuid().to_string());
    }

    #[test]
    fn serial_ids_serialize_transparently() {
        let id = UserId::new(42);
        assert_eq!(serde_json::to_string(&id).ok().as_deref(), Some("42"));
        assert_eq!(id.get(), 42);
    }
}
