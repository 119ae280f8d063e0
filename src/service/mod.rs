//! Service layer: room operations behind the WebSocket commands.
//!
//! [`RoomService`] is a stateless coordinator. It owns the [`Store`] for
//! state, the [`ChannelLayer`] for group events and the geo providers.
//! Every operation runs against a [`Session`], returns the events meant
//! for the calling socket only, and publishes the events meant for whole
//! room groups.
//!
//! Most operations are *gated*: when the caller is not a member of a
//! private room they silently do nothing.

mod chat;
mod location;
mod membership;
mod places;

#[cfg(test)]
pub(crate) mod testing;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::domain::{
    ChannelLayer, ClientEvent, MemberView, NotificationKind, RefreshTarget, Room, RoomId, User,
    UserId,
};
use crate::error::AppError;
use crate::geo::{IsochroneProvider, PlacesProvider};
use crate::persistence::Store;

pub use location::BubbleUpdate;

/// One authenticated WebSocket connection to a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    /// Connected user.
    pub user_id: UserId,
    /// Room the connection belongs to, also its channel group.
    pub room_id: RoomId,
    /// When the connection was opened.
    pub connected_at: DateTime<Utc>,
}

/// Retry policy for Places next-page tokens, which Google only accepts a
/// short while after issuing them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingPolicy {
    /// Maximum number of next-page calls per command.
    pub max_attempts: u32,
    /// Delay between attempts.
    pub retry_delay: Duration,
}

impl Default for PagingPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_delay: Duration::from_millis(1500),
        }
    }
}

/// Replies for the calling socket.
pub type Replies = Vec<ClientEvent>;

/// Orchestration layer for all room operations.
#[derive(Debug, Clone)]
pub struct RoomService {
    store: Arc<dyn Store>,
    channel_layer: ChannelLayer,
    isochrones: Arc<dyn IsochroneProvider>,
    places: Arc<dyn PlacesProvider>,
    paging: PagingPolicy,
}

impl RoomService {
    /// Creates a new `RoomService`.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        channel_layer: ChannelLayer,
        isochrones: Arc<dyn IsochroneProvider>,
        places: Arc<dyn PlacesProvider>,
        paging: PagingPolicy,
    ) -> Self {
        Self {
            store,
            channel_layer,
            isochrones,
            places,
            paging,
        }
    }

    /// Returns a reference to the inner [`ChannelLayer`].
    #[must_use]
    pub fn channel_layer(&self) -> &ChannelLayer {
        &self.channel_layer
    }

    /// Returns a reference to the inner [`Store`].
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Opens a session for `user` in `room_id`, creating the room if it is
    /// unknown and recording the login time.
    ///
    /// # Errors
    ///
    /// Propagates persistence failures.
    pub async fn open_session(&self, user: &User, room_id: RoomId) -> Result<Session, AppError> {
        self.store.get_or_create_room(room_id).await?;
        let connected_at = Utc::now();
        self.store
            .touch_last_logged_in(user.id, connected_at)
            .await?;
        tracing::info!(%room_id, user_id = %user.id, "session opened");
        Ok(Session {
            user_id: user.id,
            room_id,
            connected_at,
        })
    }

    async fn user(&self, id: UserId) -> Result<User, AppError> {
        self.store
            .user(id)
            .await?
            .ok_or_else(|| AppError::UserNotFound(id.to_string()))
    }

    async fn room(&self, id: RoomId) -> Result<Room, AppError> {
        self.store
            .room(id)
            .await?
            .ok_or(AppError::RoomNotFound(id.into()))
    }

    /// Returns `true` unless the user is an outsider of a private room.
    async fn allowed(&self, session: &Session) -> Result<bool, AppError> {
        let room = self.room(session.room_id).await?;
        if !room.private {
            return Ok(true);
        }
        self.store.is_member(room.id, session.user_id).await
    }

    /// Every room that any member of `room` belongs to.
    async fn member_rooms(&self, room: RoomId) -> Result<BTreeSet<RoomId>, AppError> {
        let mut rooms = BTreeSet::new();
        for member in self.store.members(room).await? {
            rooms.extend(self.store.rooms_of(member.id).await?);
        }
        Ok(rooms)
    }

    /// Asks every room that shares a member with `room` to reload
    /// notifications.
    async fn notify_member_rooms(&self, room: RoomId) -> Result<(), AppError> {
        let rooms = self.member_rooms(room).await?;
        self.channel_layer
            .group_send_all(&rooms, &ClientEvent::Refresh(RefreshTarget::Notifications));
        Ok(())
    }

    /// Stores one notification of `kind` for every member of `room`.
    async fn notify_members(&self, room: RoomId, kind: NotificationKind) -> Result<(), AppError> {
        for member in self.store.members(room).await? {
            self.store.create_notification(member.id, room, kind).await?;
        }
        Ok(())
    }

    fn refresh(&self, room: RoomId, targets: &[RefreshTarget]) {
        for target in targets {
            let _ = self
                .channel_layer
                .group_send(room, ClientEvent::Refresh(*target));
        }
    }

    async fn member_views(&self, room: RoomId) -> Result<Vec<MemberView>, AppError> {
        Ok(self
            .store
            .members(room)
            .await?
            .iter()
            .map(member_view)
            .collect())
    }
}

fn member_view(user: &User) -> MemberView {
    MemberView {
        username: user.username.clone(),
        display_name: user.effective_display_name(),
    }
}
