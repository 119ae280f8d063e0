//! WebSocket message types: inbound commands and outbound frames.
//!
//! Inbound frames are JSON objects discriminated by a `command` field. A
//! frame without a known `command` is a chat message `{message, user}`.
//! Outbound frames are the single-key objects rendered by
//! [`ClientEvent::to_json`].

use serde::Deserialize;
use serde_json::Value;

use crate::domain::{ClientEvent, Intersection, RoomId};
use crate::error::AppError;
use crate::service::BubbleUpdate;

/// Commands that a client can send over WebSocket.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Replay recent chat history.
    FetchMessages,
    /// Ask whether the caller may take part.
    FetchAllowedStatus,
    /// Become a member, or request to.
    JoinRoom,
    /// Get the caller's display name.
    FetchDisplayName,
    /// Change the caller's display name.
    UpdateDisplayName {
        /// New display name.
        name: String,
    },
    /// Sample isochrone service regions around a point.
    GetIsochroneServiceRegion {
        /// Latitude in degrees.
        latitude: f64,
        /// Longitude in degrees.
        longitude: f64,
    },
    /// Store the client-computed intersection.
    UpdateIntersection(Intersection),
    /// Drop the stored intersection.
    DeleteIntersection,
    /// Get the stored intersection.
    FetchIntersection,
    /// List members without a location bubble.
    FetchUsersMissingLocations,
    /// Get the caller's location bubble.
    FetchLocationBubble,
    /// Set the caller's location bubble.
    UpdateLocationBubble(BubbleUpdate),
    /// Fetch one isochrone per location bubble.
    CalculateIntersection,
    /// Get the caller's area query.
    FetchAreaQuery,
    /// Set the caller's area query and search it.
    UpdateAreaQuery {
        /// Free-text search.
        query: String,
        /// Search bias latitude.
        lat: f64,
        /// Search bias longitude.
        lng: f64,
    },
    /// Fetch the next page of an area query search.
    GetNextPagePlaces {
        /// Next-page token from the previous page.
        token: String,
    },
    /// Save a place to the room.
    SavePlace {
        /// Google place id.
        id: String,
        /// Latitude in degrees.
        lat: f64,
        /// Longitude in degrees.
        lng: f64,
    },
    /// List the room's top places.
    FetchPlaces,
    /// Vote for a saved place.
    VotePlace {
        /// Google place id.
        place_id: String,
    },
    /// Get the room name.
    FetchRoomName,
    /// Rename the room.
    UpdateRoomName {
        /// New room name.
        name: String,
    },
    /// List room members.
    FetchMembers,
    /// Get the room privacy flag.
    FetchPrivacy,
    /// Change the room privacy flag.
    UpdatePrivacy {
        /// `true` to make the room private.
        privacy: bool,
    },
    /// Leave a room.
    ExitRoom {
        /// Room to leave.
        room_id: RoomId,
    },
    /// Admit one user with a pending join request.
    ApproveUser {
        /// Firebase uid of the user.
        username: String,
    },
    /// Admit every user with a pending join request.
    ApproveAllUsers,
    /// Drop a user's join request.
    RejectUser {
        /// Firebase uid of the user.
        username: String,
    },
    /// List pending join requests.
    FetchJoinRequests,
    /// Get tab highlights and the notification list.
    FetchUserNotifications,
    /// Any command name this server does not know.
    #[serde(other)]
    Unknown,
}

/// A chat message posted to the room.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatPayload {
    /// Message body.
    pub message: String,
    /// Sender name shown to the room, defaults to the caller's display name.
    #[serde(default)]
    pub user: Option<String>,
}

/// A parsed inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A known command.
    Command(ClientCommand),
    /// A chat message.
    Chat(ChatPayload),
}

/// Parses one inbound text frame.
///
/// # Errors
///
/// Returns [`AppError::InvalidRequest`] for malformed JSON, a known command
/// with missing or mistyped fields, or a chat frame without `message`.
pub fn parse_inbound(text: &str) -> Result<Inbound, AppError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| AppError::InvalidRequest(format!("malformed JSON: {e}")))?;

    if value.get("command").is_some_and(Value::is_string) {
        let command: ClientCommand = serde_json::from_value(value.clone())
            .map_err(|e| AppError::InvalidRequest(format!("invalid command: {e}")))?;
        if command != ClientCommand::Unknown {
            return Ok(Inbound::Command(command));
        }
    }

    serde_json::from_value(value)
        .map(Inbound::Chat)
        .map_err(|e| AppError::InvalidRequest(format!("invalid chat message: {e}")))
}

/// Renders an outbound event as a text frame.
#[must_use]
pub fn encode(event: &ClientEvent) -> String {
    event.to_json().to_string()
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::Transportation;

    #[test]
    fn unit_command() {
        let parsed = parse_inbound(r#"{"command": "fetch_members"}"#);
        assert!(matches!(parsed, Ok(Inbound::Command(ClientCommand::FetchMembers))));
    }

    #[test]
    fn command_with_fields() {
        let parsed = parse_inbound(r#"{"command": "save_place", "id": "abc", "lat": 1.5, "lng": -2}"#);
        let Ok(Inbound::Command(ClientCommand::SavePlace { id, lat, lng })) = parsed else {
            panic!("expected save_place, got {parsed:?}");
        };
        assert_eq!(id, "abc");
        assert!((lat - 1.5).abs() < f64::EPSILON);
        assert!((lng + 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn flattened_struct_commands() {
        let parsed = parse_inbound(
            r#"{"command": "update_location_bubble", "address": "x", "latitude": 1, "longitude": 2,
                "transportation": "car", "hours": 0, "minutes": 45, "place_id": "p"}"#,
        );
        let Ok(Inbound::Command(ClientCommand::UpdateLocationBubble(update))) = parsed else {
            panic!("expected bubble update, got {parsed:?}");
        };
        assert_eq!(update.transportation, Transportation::Car);
        assert_eq!(update.minutes, 45);

        let parsed = parse_inbound(
            r#"{"command": "update_intersection", "type": "Polygon", "coordinates": [],
                "centroid_lng": 1, "centroid_lat": 2}"#,
        );
        let Ok(Inbound::Command(ClientCommand::UpdateIntersection(area))) = parsed else {
            panic!("expected intersection, got {parsed:?}");
        };
        assert_eq!(area.geometry_type, "Polygon");
    }

    #[test]
    fn frames_without_known_command_are_chat() {
        let parsed = parse_inbound(r#"{"message": "hi", "user": "Ada"}"#);
        assert_eq!(
            parsed.ok(),
            Some(Inbound::Chat(ChatPayload {
                message: "hi".to_string(),
                user: Some("Ada".to_string()),
            }))
        );
        let parsed = parse_inbound(r#"{"command": "dance", "message": "hi"}"#);
        assert!(matches!(parsed, Ok(Inbound::Chat(ChatPayload { user: None, .. }))));
    }

    #[test]
    fn invalid_frames_are_rejected() {
        assert!(parse_inbound("not json").is_err());
        assert!(parse_inbound(r#"{"command": "vote_place"}"#).is_err());
        assert!(parse_inbound(r#"{"user": "Ada"}"#).is_err());
    }

    #[test]
    fn encode_renders_single_key_object() {
        assert_eq!(encode(&ClientEvent::Allowed), r#"{"allowed":true}"#);
    }
}
