//! Database row types and their conversion into domain types.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    ChatMessage, Intersection, JoinRequest, JoinRequestId, LocationBubble, MessageId,
    Notification, NotificationId, NotificationKind, Place, PlaceKey, PlaceTally, Room, RoomId,
    User, UserId,
};
use crate::error::AppError;

/// A row of the `users` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    /// Serial id.
    pub id: i64,
    /// Firebase uid.
    pub username: String,
    /// First word of the name claim.
    pub first_name: String,
    /// Second word of the name claim.
    pub last_name: String,
    /// Email claim.
    pub email: String,
    /// Phone number claim.
    pub phone_number: String,
    /// Chosen display name.
    pub display_name: String,
    /// Start of the latest session.
    pub last_logged_in: Option<DateTime<Utc>>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: UserId::new(row.id),
            username: row.username,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            phone_number: row.phone_number,
            display_name: row.display_name,
            last_logged_in: row.last_logged_in,
        }
    }
}

/// A row of the `rooms` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RoomRow {
    /// Room uuid.
    pub id: Uuid,
    /// Room name.
    pub display_name: String,
    /// Privacy flag.
    pub private: bool,
}

impl From<RoomRow> for Room {
    fn from(row: RoomRow) -> Self {
        Self {
            id: RoomId::from_uuid(row.id),
            display_name: row.display_name,
            private: row.private,
        }
    }
}

/// A row of the `messages` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageRow {
    /// Serial id.
    pub id: i64,
    /// Author.
    pub user_id: i64,
    /// Room.
    pub room_id: Uuid,
    /// Message body.
    pub content: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

impl From<MessageRow> for ChatMessage {
    fn from(row: MessageRow) -> Self {
        Self {
            id: MessageId::new(row.id),
            user_id: UserId::new(row.user_id),
            room_id: RoomId::from_uuid(row.room_id),
            content: row.content,
            timestamp: row.timestamp,
        }
    }
}

/// A row of the `join_requests` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JoinRequestRow {
    /// Serial id.
    pub id: i64,
    /// Requesting user.
    pub user_id: i64,
    /// Requested room.
    pub room_id: Uuid,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

impl From<JoinRequestRow> for JoinRequest {
    fn from(row: JoinRequestRow) -> Self {
        Self {
            id: JoinRequestId::new(row.id),
            user_id: UserId::new(row.user_id),
            room_id: RoomId::from_uuid(row.room_id),
            timestamp: row.timestamp,
        }
    }
}

/// A row of the `notifications` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NotificationRow {
    /// Serial id.
    pub id: i64,
    /// Recipient.
    pub user_id: i64,
    /// Room.
    pub room_id: Uuid,
    /// Kind discriminator.
    pub kind: String,
    /// User the notification is about, for user-related kinds.
    pub subject_user_id: Option<i64>,
    /// Referenced message, for `message`.
    pub message_id: Option<i64>,
    /// Referenced join request, for `join_request`.
    pub join_request_id: Option<i64>,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Seen flag.
    pub read: bool,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = AppError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let kind = NotificationKind::from_parts(
            &row.kind,
            row.subject_user_id.map(UserId::new),
            row.message_id.map(MessageId::new),
            row.join_request_id.map(JoinRequestId::new),
        )
        .ok_or_else(|| {
            AppError::Persistence(format!(
                "notification {} has inconsistent kind {}",
                row.id, row.kind
            ))
        })?;
        Ok(Self {
            id: NotificationId::new(row.id),
            user_id: UserId::new(row.user_id),
            room_id: RoomId::from_uuid(row.room_id),
            kind,
            timestamp: row.timestamp,
            read: row.read,
        })
    }
}

/// A row of the `location_bubbles` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LocationBubbleRow {
    /// Owner.
    pub user_id: i64,
    /// Room.
    pub room_id: Uuid,
    /// Address as entered.
    pub address: String,
    /// Latitude.
    pub latitude: f64,
    /// Longitude.
    pub longitude: f64,
    /// Travel mode key.
    pub transportation: String,
    /// Hours of the travel budget.
    pub hours: i32,
    /// Minutes of the travel budget.
    pub minutes: i32,
    /// Targomo service region.
    pub region: String,
    /// Google place id.
    pub place_id: String,
}

impl TryFrom<LocationBubbleRow> for LocationBubble {
    type Error = AppError;

    fn try_from(row: LocationBubbleRow) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: UserId::new(row.user_id),
            room_id: RoomId::from_uuid(row.room_id),
            address: row.address,
            latitude: row.latitude,
            longitude: row.longitude,
            transportation: row.transportation.parse()?,
            hours: u32::try_from(row.hours).unwrap_or_default(),
            minutes: u32::try_from(row.minutes).unwrap_or_default(),
            region: row.region,
            place_id: row.place_id,
        })
    }
}

/// A row of the `intersections` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IntersectionRow {
    /// Room.
    pub room_id: Uuid,
    /// GeoJSON geometry type.
    #[sqlx(rename = "type")]
    pub geometry_type: String,
    /// GeoJSON coordinates.
    pub coordinates: serde_json::Value,
    /// Centroid latitude.
    pub centroid_lat: f64,
    /// Centroid longitude.
    pub centroid_lng: f64,
}

impl From<IntersectionRow> for Intersection {
    fn from(row: IntersectionRow) -> Self {
        Self {
            room_id: RoomId::from_uuid(row.room_id),
            geometry_type: row.geometry_type,
            coordinates: row.coordinates,
            centroid_lat: row.centroid_lat,
            centroid_lng: row.centroid_lng,
        }
    }
}

/// A row of the `places` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PlaceRow {
    /// Serial id.
    pub id: i64,
    /// Room.
    pub room_id: Uuid,
    /// Google place id.
    pub place_id: String,
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lng: f64,
    /// Last time a member saved the place.
    pub last_saved: DateTime<Utc>,
}

impl From<PlaceRow> for Place {
    fn from(row: PlaceRow) -> Self {
        Self {
            key: PlaceKey::new(row.id),
            room_id: RoomId::from_uuid(row.room_id),
            place_id: row.place_id,
            lat: row.lat,
            lng: row.lng,
            last_saved: row.last_saved,
        }
    }
}

/// A place row joined with its vote count for one viewer.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PlaceTallyRow {
    /// Place columns.
    #[sqlx(flatten)]
    pub place: PlaceRow,
    /// Number of votes.
    pub total_votes: i64,
    /// Whether the viewer voted for the place.
    pub user_voted_for: bool,
}

impl From<PlaceTallyRow> for PlaceTally {
    fn from(row: PlaceTallyRow) -> Self {
        Self {
            place: row.place.into(),
            total_votes: u32::try_from(row.total_votes).unwrap_or(u32::MAX),
            user_voted_for: row.user_voted_for,
        }
    }
}
