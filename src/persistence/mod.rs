//! Persistence layer: the [`Store`] contract and its implementations.
//!
//! [`PostgresStore`] keeps state in PostgreSQL via `sqlx::PgPool` with
//! embedded migrations. [`MemoryStore`] keeps everything in process and is
//! used when persistence is disabled or no `DATABASE_URL` is configured.

pub mod memory;
pub mod models;
pub mod postgres;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::ServerConfig;
use crate::domain::{
    ChatMessage, Intersection, JoinRequest, JoinRequestId, LocationBubble, MessageId,
    Notification, NotificationKind, Place, PlaceKey, PlaceTally, Room, RoomId, User, UserId,
    UserProfile,
};
use crate::error::AppError;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Storage contract for all room state.
///
/// Every method is a single logical operation; "upsert" methods create or
/// update by the natural key named in their docs.
#[async_trait]
pub trait Store: Send + Sync + fmt::Debug {
    /// Creates or refreshes a user keyed by `profile.username`.
    ///
    /// The chosen display name and last-login time of an existing user are
    /// kept.
    async fn upsert_user(&self, profile: &UserProfile) -> Result<User, AppError>;

    /// Looks up a user by id.
    async fn user(&self, id: UserId) -> Result<Option<User>, AppError>;

    /// Looks up a user by Firebase uid.
    async fn user_by_username(&self, username: &str) -> Result<Option<User>, AppError>;

    /// Sets a user's chosen display name.
    async fn set_display_name(&self, id: UserId, name: &str) -> Result<(), AppError>;

    /// Records the start of a user's session.
    async fn touch_last_logged_in(&self, id: UserId, at: DateTime<Utc>) -> Result<(), AppError>;

    /// Returns the room, creating an unnamed public room if it is unknown.
    async fn get_or_create_room(&self, id: RoomId) -> Result<Room, AppError>;

    /// Looks up a room.
    async fn room(&self, id: RoomId) -> Result<Option<Room>, AppError>;

    /// Sets a room's display name.
    async fn set_room_name(&self, id: RoomId, name: &str) -> Result<(), AppError>;

    /// Sets a room's privacy flag.
    async fn set_room_privacy(&self, id: RoomId, private: bool) -> Result<(), AppError>;

    /// Returns the members of a room ordered by user id.
    async fn members(&self, room: RoomId) -> Result<Vec<User>, AppError>;

    /// Returns `true` if the user is a member of the room.
    async fn is_member(&self, room: RoomId, user: UserId) -> Result<bool, AppError>;

    /// Adds a member. Returns `false` if the user already was one.
    async fn add_member(&self, room: RoomId, user: UserId) -> Result<bool, AppError>;

    /// Removes a member. Returns `false` if the user was not one.
    async fn remove_member(&self, room: RoomId, user: UserId) -> Result<bool, AppError>;

    /// Returns every room the user is a member of.
    async fn rooms_of(&self, user: UserId) -> Result<Vec<RoomId>, AppError>;

    /// Stores a chat message.
    async fn create_message(
        &self,
        room: RoomId,
        user: UserId,
        content: &str,
    ) -> Result<ChatMessage, AppError>;

    /// Looks up a chat message.
    async fn message(&self, id: MessageId) -> Result<Option<ChatMessage>, AppError>;

    /// Returns up to `limit` messages of a room, newest first.
    async fn recent_messages(
        &self,
        room: RoomId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, AppError>;

    /// Returns the user's join request for the room, creating it if absent.
    /// The flag is `true` when the request was created.
    async fn get_or_create_join_request(
        &self,
        room: RoomId,
        user: UserId,
    ) -> Result<(JoinRequest, bool), AppError>;

    /// Looks up a join request.
    async fn join_request(&self, id: JoinRequestId) -> Result<Option<JoinRequest>, AppError>;

    /// Returns a room's join requests, newest first.
    async fn join_requests(&self, room: RoomId) -> Result<Vec<JoinRequest>, AppError>;

    /// Deletes the user's join request for the room together with the
    /// notifications that reference it.
    async fn delete_join_request(&self, room: RoomId, user: UserId) -> Result<(), AppError>;

    /// Stores an unread notification.
    async fn create_notification(
        &self,
        user: UserId,
        room: RoomId,
        kind: NotificationKind,
    ) -> Result<Notification, AppError>;

    /// Returns the user's unread notifications for a room created at or
    /// before `before`.
    async fn unread_notifications(
        &self,
        user: UserId,
        room: RoomId,
        before: DateTime<Utc>,
    ) -> Result<Vec<Notification>, AppError>;

    /// Marks all of the user's notifications for a room as read.
    async fn mark_notifications_read(&self, user: UserId, room: RoomId) -> Result<(), AppError>;

    /// Returns the user's most recent notification in each room.
    async fn latest_notification_per_room(
        &self,
        user: UserId,
    ) -> Result<Vec<Notification>, AppError>;

    /// Deletes all of the user's notifications for a room.
    async fn delete_notifications(&self, user: UserId, room: RoomId) -> Result<(), AppError>;

    /// Creates or replaces the bubble keyed by `(room, user)`. Returns
    /// `true` when it was created.
    async fn upsert_location_bubble(&self, bubble: &LocationBubble) -> Result<bool, AppError>;

    /// Looks up the user's bubble in a room.
    async fn location_bubble(
        &self,
        room: RoomId,
        user: UserId,
    ) -> Result<Option<LocationBubble>, AppError>;

    /// Returns every bubble in a room ordered by owner id.
    async fn location_bubbles(&self, room: RoomId) -> Result<Vec<LocationBubble>, AppError>;

    /// Deletes the user's bubble in a room.
    async fn delete_location_bubble(&self, room: RoomId, user: UserId) -> Result<(), AppError>;

    /// Creates or replaces the area query keyed by `(room, user)`.
    async fn upsert_area_query(
        &self,
        room: RoomId,
        user: UserId,
        query: &str,
    ) -> Result<(), AppError>;

    /// Looks up the user's area query in a room.
    async fn area_query(&self, room: RoomId, user: UserId) -> Result<Option<String>, AppError>;

    /// Creates or replaces the room's intersection.
    async fn upsert_intersection(&self, intersection: &Intersection) -> Result<(), AppError>;

    /// Looks up the room's intersection.
    async fn intersection(&self, room: RoomId) -> Result<Option<Intersection>, AppError>;

    /// Deletes the room's intersection.
    async fn delete_intersection(&self, room: RoomId) -> Result<(), AppError>;

    /// Creates or updates the place keyed by `(room, lat, lng)`, setting its
    /// Google place id. `touch` refreshes the last-saved time of an
    /// existing place.
    async fn upsert_place(
        &self,
        room: RoomId,
        place_id: &str,
        lat: f64,
        lng: f64,
        touch: bool,
    ) -> Result<Place, AppError>;

    /// Looks up the most recently saved place in a room with the given
    /// Google place id.
    async fn place_by_place_id(
        &self,
        room: RoomId,
        place_id: &str,
    ) -> Result<Option<Place>, AppError>;

    /// Returns every place in a room with its vote count and whether
    /// `viewer` voted for it.
    async fn place_tallies(
        &self,
        room: RoomId,
        viewer: UserId,
    ) -> Result<Vec<PlaceTally>, AppError>;

    /// Sets the user's single vote in a room.
    async fn upsert_vote(&self, room: RoomId, user: UserId, place: PlaceKey)
    -> Result<(), AppError>;
}

/// Connects to PostgreSQL and applies embedded migrations.
///
/// Returns `None` when persistence is disabled or no `DATABASE_URL` is
/// configured.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the URL is set but the connection fails, or
/// a migration error converted into [`sqlx::Error`].
pub async fn init_pool(config: &ServerConfig) -> Result<Option<PgPool>, sqlx::Error> {
    let Some(url) = config.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set, running with the in-memory store");
        return Ok(None);
    };
    if !config.persistence_enabled {
        tracing::warn!("persistence disabled, running with the in-memory store");
        return Ok(None);
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .min_connections(config.database_min_connections)
        .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
        .connect(url)
        .await?;
    tracing::info!("connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("database migrations applied");

    Ok(Some(pool))
}
