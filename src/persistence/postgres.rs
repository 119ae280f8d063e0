//! PostgreSQL implementation of the [`Store`] contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::Store;
use super::models::{
    IntersectionRow, JoinRequestRow, LocationBubbleRow, MessageRow, NotificationRow, PlaceRow,
    PlaceTallyRow, RoomRow, UserRow,
};
use crate::domain::{
    ChatMessage, Intersection, JoinRequest, JoinRequestId, LocationBubble, MessageId,
    Notification, NotificationKind, Place, PlaceKey, PlaceTally, Room, RoomId, User, UserId,
    UserProfile,
};
use crate::error::AppError;

const USER_COLUMNS: &str =
    "id, username, first_name, last_name, email, phone_number, display_name, last_logged_in";
const NOTIFICATION_COLUMNS: &str =
    "id, user_id, room_id, kind, subject_user_id, message_id, join_request_id, timestamp, read";
const BUBBLE_COLUMNS: &str = "user_id, room_id, address, latitude, longitude, transportation, \
                              hours, minutes, region, place_id";

/// PostgreSQL-backed store using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store over the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn uuid(room: RoomId) -> Uuid {
    room.into()
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

#[async_trait]
impl Store for PostgresStore {
    async fn upsert_user(&self, profile: &UserProfile) -> Result<User, AppError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (username, first_name, last_name, email, phone_number) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (username) DO UPDATE SET first_name = EXCLUDED.first_name, \
             last_name = EXCLUDED.last_name, email = EXCLUDED.email, \
             phone_number = EXCLUDED.phone_number \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&profile.username)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(&profile.email)
        .bind(&profile.phone_number)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn user(&self, id: UserId) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn set_display_name(&self, id: UserId, name: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET display_name = $2 WHERE id = $1")
            .bind(id.get())
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn touch_last_logged_in(&self, id: UserId, at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET last_logged_in = $2 WHERE id = $1")
            .bind(id.get())
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_or_create_room(&self, id: RoomId) -> Result<Room, AppError> {
        sqlx::query("INSERT INTO rooms (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
            .bind(uuid(id))
            .execute(&self.pool)
            .await?;
        self.room(id).await?.ok_or(AppError::RoomNotFound(uuid(id)))
    }

    async fn room(&self, id: RoomId) -> Result<Option<Room>, AppError> {
        let row = sqlx::query_as::<_, RoomRow>(
            "SELECT id, display_name, private FROM rooms WHERE id = $1",
        )
        .bind(uuid(id))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn set_room_name(&self, id: RoomId, name: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE rooms SET display_name = $2 WHERE id = $1")
            .bind(uuid(id))
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_room_privacy(&self, id: RoomId, private: bool) -> Result<(), AppError> {
        sqlx::query("UPDATE rooms SET private = $2 WHERE id = $1")
            .bind(uuid(id))
            .bind(private)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn members(&self, room: RoomId) -> Result<Vec<User>, AppError> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT u.id, u.username, u.first_name, u.last_name, u.email, u.phone_number, \
             u.display_name, u.last_logged_in \
             FROM users u JOIN room_members m ON m.user_id = u.id \
             WHERE m.room_id = $1 ORDER BY u.id",
        )
        .bind(uuid(room))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn is_member(&self, room: RoomId, user: UserId) -> Result<bool, AppError> {
        let found = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM room_members WHERE room_id = $1 AND user_id = $2)",
        )
        .bind(uuid(room))
        .bind(user.get())
        .fetch_one(&self.pool)
        .await?;
        Ok(found)
    }

    async fn add_member(&self, room: RoomId, user: UserId) -> Result<bool, AppError> {
        let result = sqlx::query(
            "INSERT INTO room_members (room_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(uuid(room))
        .bind(user.get())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_member(&self, room: RoomId, user: UserId) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM room_members WHERE room_id = $1 AND user_id = $2")
            .bind(uuid(room))
            .bind(user.get())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn rooms_of(&self, user: UserId) -> Result<Vec<RoomId>, AppError> {
        let rows = sqlx::query_scalar::<_, Uuid>(
            "SELECT room_id FROM room_members WHERE user_id = $1 ORDER BY room_id",
        )
        .bind(user.get())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(RoomId::from_uuid).collect())
    }

    async fn create_message(
        &self,
        room: RoomId,
        user: UserId,
        content: &str,
    ) -> Result<ChatMessage, AppError> {
        let row = sqlx::query_as::<_, MessageRow>(
            "INSERT INTO messages (user_id, room_id, content) VALUES ($1, $2, $3) \
             RETURNING id, user_id, room_id, content, timestamp",
        )
        .bind(user.get())
        .bind(uuid(room))
        .bind(content)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn message(&self, id: MessageId) -> Result<Option<ChatMessage>, AppError> {
        let row = sqlx::query_as::<_, MessageRow>(
            "SELECT id, user_id, room_id, content, timestamp FROM messages WHERE id = $1",
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn recent_messages(
        &self,
        room: RoomId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, AppError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT id, user_id, room_id, content, timestamp FROM messages \
             WHERE room_id = $1 ORDER BY timestamp DESC, id DESC LIMIT $2",
        )
        .bind(uuid(room))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_or_create_join_request(
        &self,
        room: RoomId,
        user: UserId,
    ) -> Result<(JoinRequest, bool), AppError> {
        let created = sqlx::query_as::<_, JoinRequestRow>(
            "INSERT INTO join_requests (user_id, room_id) VALUES ($1, $2) \
             ON CONFLICT (room_id, user_id) DO NOTHING \
             RETURNING id, user_id, room_id, timestamp",
        )
        .bind(user.get())
        .bind(uuid(room))
        .fetch_optional(&self.pool)
        .await?;
        if let Some(row) = created {
            return Ok((row.into(), true));
        }

        let row = sqlx::query_as::<_, JoinRequestRow>(
            "SELECT id, user_id, room_id, timestamp FROM join_requests \
             WHERE room_id = $1 AND user_id = $2",
        )
        .bind(uuid(room))
        .bind(user.get())
        .fetch_one(&self.pool)
        .await?;
        Ok((row.into(), false))
    }

    async fn join_request(&self, id: JoinRequestId) -> Result<Option<JoinRequest>, AppError> {
        let row = sqlx::query_as::<_, JoinRequestRow>(
            "SELECT id, user_id, room_id, timestamp FROM join_requests WHERE id = $1",
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn join_requests(&self, room: RoomId) -> Result<Vec<JoinRequest>, AppError> {
        let rows = sqlx::query_as::<_, JoinRequestRow>(
            "SELECT id, user_id, room_id, timestamp FROM join_requests \
             WHERE room_id = $1 ORDER BY timestamp DESC, id DESC",
        )
        .bind(uuid(room))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn delete_join_request(&self, room: RoomId, user: UserId) -> Result<(), AppError> {
        // Referencing notifications go with it via ON DELETE CASCADE.
        sqlx::query("DELETE FROM join_requests WHERE room_id = $1 AND user_id = $2")
            .bind(uuid(room))
            .bind(user.get())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_notification(
        &self,
        user: UserId,
        room: RoomId,
        kind: NotificationKind,
    ) -> Result<Notification, AppError> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            "INSERT INTO notifications \
             (user_id, room_id, kind, subject_user_id, message_id, join_request_id) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {NOTIFICATION_COLUMNS}"
        ))
        .bind(user.get())
        .bind(uuid(room))
        .bind(kind.as_str())
        .bind(kind.subject_user().map(UserId::get))
        .bind(kind.message().map(MessageId::get))
        .bind(kind.join_request().map(JoinRequestId::get))
        .fetch_one(&self.pool)
        .await?;
        Notification::try_from(row)
    }

    async fn unread_notifications(
        &self,
        user: UserId,
        room: RoomId,
        before: DateTime<Utc>,
    ) -> Result<Vec<Notification>, AppError> {
        let rows = sqlx::query_as::<_, NotificationRow>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications \
             WHERE user_id = $1 AND room_id = $2 AND NOT read AND timestamp <= $3 \
             ORDER BY timestamp, id"
        ))
        .bind(user.get())
        .bind(uuid(room))
        .bind(before)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Notification::try_from).collect()
    }

    async fn mark_notifications_read(&self, user: UserId, room: RoomId) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE notifications SET read = TRUE WHERE user_id = $1 AND room_id = $2 AND NOT read",
        )
        .bind(user.get())
        .bind(uuid(room))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_notification_per_room(
        &self,
        user: UserId,
    ) -> Result<Vec<Notification>, AppError> {
        let rows = sqlx::query_as::<_, NotificationRow>(&format!(
            "SELECT DISTINCT ON (room_id) {NOTIFICATION_COLUMNS} FROM notifications \
             WHERE user_id = $1 ORDER BY room_id, timestamp DESC, id DESC"
        ))
        .bind(user.get())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Notification::try_from).collect()
    }

    async fn delete_notifications(&self, user: UserId, room: RoomId) -> Result<(), AppError> {
        sqlx::query("DELETE FROM notifications WHERE user_id = $1 AND room_id = $2")
            .bind(user.get())
            .bind(uuid(room))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_location_bubble(&self, bubble: &LocationBubble) -> Result<bool, AppError> {
        // `xmax = 0` holds only for freshly inserted tuples.
        let created = sqlx::query_scalar::<_, bool>(
            "INSERT INTO location_bubbles \
             (user_id, room_id, address, latitude, longitude, transportation, hours, minutes, \
              region, place_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (room_id, user_id) DO UPDATE SET address = EXCLUDED.address, \
             latitude = EXCLUDED.latitude, longitude = EXCLUDED.longitude, \
             transportation = EXCLUDED.transportation, hours = EXCLUDED.hours, \
             minutes = EXCLUDED.minutes, region = EXCLUDED.region, place_id = EXCLUDED.place_id \
             RETURNING (xmax = 0)",
        )
        .bind(bubble.user_id.get())
        .bind(uuid(bubble.room_id))
        .bind(&bubble.address)
        .bind(bubble.latitude)
        .bind(bubble.longitude)
        .bind(bubble.transportation.as_str())
        .bind(to_i32(bubble.hours))
        .bind(to_i32(bubble.minutes))
        .bind(&bubble.region)
        .bind(&bubble.place_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn location_bubble(
        &self,
        room: RoomId,
        user: UserId,
    ) -> Result<Option<LocationBubble>, AppError> {
        let row = sqlx::query_as::<_, LocationBubbleRow>(&format!(
            "SELECT {BUBBLE_COLUMNS} FROM location_bubbles WHERE room_id = $1 AND user_id = $2"
        ))
        .bind(uuid(room))
        .bind(user.get())
        .fetch_optional(&self.pool)
        .await?;
        row.map(LocationBubble::try_from).transpose()
    }

    async fn location_bubbles(&self, room: RoomId) -> Result<Vec<LocationBubble>, AppError> {
        let rows = sqlx::query_as::<_, LocationBubbleRow>(&format!(
            "SELECT {BUBBLE_COLUMNS} FROM location_bubbles WHERE room_id = $1 ORDER BY user_id"
        ))
        .bind(uuid(room))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(LocationBubble::try_from).collect()
    }

    async fn delete_location_bubble(&self, room: RoomId, user: UserId) -> Result<(), AppError> {
        sqlx::query("DELETE FROM location_bubbles WHERE room_id = $1 AND user_id = $2")
            .bind(uuid(room))
            .bind(user.get())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_area_query(
        &self,
        room: RoomId,
        user: UserId,
        query: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO area_queries (user_id, room_id, query) VALUES ($1, $2, $3) \
             ON CONFLICT (room_id, user_id) DO UPDATE SET query = EXCLUDED.query",
        )
        .bind(user.get())
        .bind(uuid(room))
        .bind(query)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn area_query(&self, room: RoomId, user: UserId) -> Result<Option<String>, AppError> {
        let query = sqlx::query_scalar::<_, String>(
            "SELECT query FROM area_queries WHERE room_id = $1 AND user_id = $2",
        )
        .bind(uuid(room))
        .bind(user.get())
        .fetch_optional(&self.pool)
        .await?;
        Ok(query)
    }

    async fn upsert_intersection(&self, intersection: &Intersection) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO intersections (room_id, type, coordinates, centroid_lat, centroid_lng) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (room_id) DO UPDATE SET type = EXCLUDED.type, \
             coordinates = EXCLUDED.coordinates, centroid_lat = EXCLUDED.centroid_lat, \
             centroid_lng = EXCLUDED.centroid_lng",
        )
        .bind(uuid(intersection.room_id))
        .bind(&intersection.geometry_type)
        .bind(&intersection.coordinates)
        .bind(intersection.centroid_lat)
        .bind(intersection.centroid_lng)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn intersection(&self, room: RoomId) -> Result<Option<Intersection>, AppError> {
        let row = sqlx::query_as::<_, IntersectionRow>(
            "SELECT room_id, type, coordinates, centroid_lat, centroid_lng \
             FROM intersections WHERE room_id = $1",
        )
        .bind(uuid(room))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn delete_intersection(&self, room: RoomId) -> Result<(), AppError> {
        sqlx::query("DELETE FROM intersections WHERE room_id = $1")
            .bind(uuid(room))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_place(
        &self,
        room: RoomId,
        place_id: &str,
        lat: f64,
        lng: f64,
        touch: bool,
    ) -> Result<Place, AppError> {
        let row = sqlx::query_as::<_, PlaceRow>(
            "INSERT INTO places (room_id, place_id, lat, lng) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (room_id, lat, lng) DO UPDATE SET place_id = EXCLUDED.place_id, \
             last_saved = CASE WHEN $5 THEN NOW() ELSE places.last_saved END \
             RETURNING id, room_id, place_id, lat, lng, last_saved",
        )
        .bind(uuid(room))
        .bind(place_id)
        .bind(lat)
        .bind(lng)
        .bind(touch)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn place_by_place_id(
        &self,
        room: RoomId,
        place_id: &str,
    ) -> Result<Option<Place>, AppError> {
        let row = sqlx::query_as::<_, PlaceRow>(
            "SELECT id, room_id, place_id, lat, lng, last_saved FROM places \
             WHERE room_id = $1 AND place_id = $2 ORDER BY last_saved DESC, id DESC LIMIT 1",
        )
        .bind(uuid(room))
        .bind(place_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn place_tallies(
        &self,
        room: RoomId,
        viewer: UserId,
    ) -> Result<Vec<PlaceTally>, AppError> {
        let rows = sqlx::query_as::<_, PlaceTallyRow>(
            "SELECT p.id, p.room_id, p.place_id, p.lat, p.lng, p.last_saved, \
             COUNT(v.user_id) AS total_votes, \
             COALESCE(BOOL_OR(v.user_id = $2), FALSE) AS user_voted_for \
             FROM places p LEFT JOIN votes v ON v.place_id = p.id \
             WHERE p.room_id = $1 GROUP BY p.id ORDER BY p.id",
        )
        .bind(uuid(room))
        .bind(viewer.get())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn upsert_vote(
        &self,
        room: RoomId,
        user: UserId,
        place: PlaceKey,
    ) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO votes (room_id, user_id, place_id) VALUES ($1, $2, $3) \
             ON CONFLICT (room_id, user_id) DO UPDATE SET place_id = EXCLUDED.place_id",
        )
        .bind(uuid(room))
        .bind(user.get())
        .bind(place.get())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
