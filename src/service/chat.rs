//! Chat messages and the notification feed.

use std::collections::HashMap;

use super::{Replies, RoomService, Session};
use crate::domain::{
    ChatLine, ClientEvent, HighlightTarget, Highlights, Notification, NotificationKind,
    NotificationView, User, UserId,
};
use crate::error::AppError;

/// Number of messages replayed by `fetch_messages`.
pub const HISTORY_LIMIT: usize = 10;

impl RoomService {
    /// Replays the latest messages of the room, oldest first.
    ///
    /// # Errors
    ///
    /// Propagates persistence failures.
    pub async fn fetch_messages(&self, session: &Session) -> Result<Replies, AppError> {
        if !self.allowed(session).await? {
            return Ok(Vec::new());
        }
        let messages = self
            .store
            .recent_messages(session.room_id, HISTORY_LIMIT)
            .await?;

        let mut authors: HashMap<UserId, User> = HashMap::new();
        let mut replies = Vec::with_capacity(messages.len());
        for message in messages.into_iter().rev() {
            let author = match authors.get(&message.user_id) {
                Some(author) => author.clone(),
                None => {
                    let author = self.user(message.user_id).await?;
                    authors.insert(author.id, author.clone());
                    author
                }
            };
            replies.push(ClientEvent::FetchedMessage(
                ChatLine { message, author }.render(),
            ));
        }
        Ok(replies)
    }

    /// Posts a chat message and broadcasts it to the room.
    ///
    /// The broadcast line is prefixed with `sender` when given, otherwise
    /// with the caller's effective display name.
    ///
    /// # Errors
    ///
    /// Propagates persistence failures.
    pub async fn post_message(
        &self,
        session: &Session,
        content: &str,
        sender: Option<&str>,
    ) -> Result<Replies, AppError> {
        if !self.allowed(session).await? {
            return Ok(Vec::new());
        }
        let room = session.room_id;
        let message = self
            .store
            .create_message(room, session.user_id, content)
            .await?;
        self.notify_members(room, NotificationKind::Message(message.id))
            .await?;
        self.notify_member_rooms(room).await?;

        let sender = match sender {
            Some(name) => name.to_string(),
            None => self.user(session.user_id).await?.effective_display_name(),
        };
        tracing::debug!(%room, message_id = %message.id, "chat message posted");
        let _ = self
            .channel_layer
            .group_send(room, ClientEvent::Message(format!("{sender}: {content}")));
        Ok(Vec::new())
    }

    /// Highlights tabs with activity the caller missed before connecting,
    /// marks this room's notifications read and lists the latest
    /// notification of every room.
    ///
    /// The list puts unread entries first, each group newest first.
    ///
    /// # Errors
    ///
    /// Propagates persistence failures.
    pub async fn fetch_user_notifications(&self, session: &Session) -> Result<Replies, AppError> {
        let user = session.user_id;
        let room = session.room_id;

        let unseen = self
            .store
            .unread_notifications(user, room, session.connected_at)
            .await?;
        let highlights = Highlights::from_kinds(unseen.iter().map(|n| &n.kind));
        let mut replies = Vec::new();
        if highlights.chat {
            replies.push(ClientEvent::Highlight(HighlightTarget::Chat));
        }
        if highlights.vote {
            replies.push(ClientEvent::Highlight(HighlightTarget::Vote));
        }
        if highlights.area {
            replies.push(ClientEvent::Highlight(HighlightTarget::Area));
        }

        self.store.mark_notifications_read(user, room).await?;
        let mut views = Vec::new();
        for notification in self.store.latest_notification_per_room(user).await? {
            views.push(self.notification_view(&notification, session).await?);
        }
        views.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        views.sort_by_key(|v| v.read);
        replies.push(ClientEvent::Notifications(views));
        Ok(replies)
    }

    async fn display_name_of(&self, id: UserId) -> Result<Option<String>, AppError> {
        Ok(self
            .store
            .user(id)
            .await?
            .map(|u| u.effective_display_name()))
    }

    async fn notification_view(
        &self,
        notification: &Notification,
        session: &Session,
    ) -> Result<NotificationView, AppError> {
        let room_display_name = self
            .store
            .room(notification.room_id)
            .await?
            .map(|r| r.display_name)
            .unwrap_or_default();
        let mut view = NotificationView {
            room: notification.room_id,
            room_display_name,
            timestamp: notification.timestamp,
            read: notification.read,
            current_room: notification.room_id == session.room_id,
            message_content: None,
            message_user_display_name: None,
            user_joined_display_name: None,
            user_left_display_name: None,
            user_location_display_name: None,
            join_request_user_display_name: None,
            now_public: None,
            now_private: None,
            added_place_display_name: None,
            voted_place_display_name: None,
        };
        match notification.kind {
            NotificationKind::Message(id) => {
                if let Some(message) = self.store.message(id).await? {
                    view.message_user_display_name = self.display_name_of(message.user_id).await?;
                    view.message_content = Some(message.content);
                }
            }
            NotificationKind::UserJoined(id) => {
                view.user_joined_display_name = self.display_name_of(id).await?;
            }
            NotificationKind::UserLeft(id) => {
                view.user_left_display_name = self.display_name_of(id).await?;
            }
            NotificationKind::UserLocation(id) => {
                view.user_location_display_name = self.display_name_of(id).await?;
            }
            NotificationKind::JoinRequest(id) => {
                if let Some(request) = self.store.join_request(id).await? {
                    view.join_request_user_display_name =
                        self.display_name_of(request.user_id).await?;
                }
            }
            NotificationKind::NowPublic => view.now_public = Some(true),
            NotificationKind::NowPrivate => view.now_private = Some(true),
            NotificationKind::AddedPlace(id) => {
                view.added_place_display_name = self.display_name_of(id).await?;
            }
            NotificationKind::VotedPlace(id) => {
                view.voted_place_display_name = self.display_name_of(id).await?;
            }
        }
        Ok(view)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::indexing_slicing)]
mod tests {
    use tokio_test::assert_ok;

    use super::*;
    use crate::domain::{RefreshTarget, RoomId};
    use crate::service::testing::Harness;

    #[tokio::test]
    async fn message_is_stored_broadcast_and_replayed() {
        let mut h = Harness::new();
        let room = RoomId::new();
        h.member("ada", room).await;
        let (_, session) = h.member("grace", room).await;
        h.drain();

        assert_ok!(h.service.post_message(&session, "hello", Some("Grace H")).await);
        let events = h.drain_group(room);
        assert_eq!(
            events,
            vec![
                ClientEvent::Refresh(RefreshTarget::Notifications),
                ClientEvent::Message("Grace H: hello".to_string()),
            ]
        );

        assert_ok!(h.service.post_message(&session, "again", None).await);
        let replies = assert_ok!(h.service.fetch_messages(&session).await);
        assert_eq!(
            replies,
            vec![
                ClientEvent::FetchedMessage("grace: hello".to_string()),
                ClientEvent::FetchedMessage("grace: again".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn history_is_limited_to_latest_messages() {
        let h = Harness::new();
        let room = RoomId::new();
        let (_, session) = h.member("ada", room).await;
        for i in 0..12 {
            assert_ok!(h.service.post_message(&session, &format!("m{i}"), None).await);
        }
        let replies = assert_ok!(h.service.fetch_messages(&session).await);
        assert_eq!(replies.len(), HISTORY_LIMIT);
        assert_eq!(replies[0], ClientEvent::FetchedMessage("ada: m2".to_string()));
        assert_eq!(replies[9], ClientEvent::FetchedMessage("ada: m11".to_string()));
    }

    #[tokio::test]
    async fn missed_activity_is_highlighted_once() {
        let h = Harness::new();
        let room = RoomId::new();
        let (_, ada) = h.member("ada", room).await;
        let (grace, _) = h.member("grace", room).await;
        assert_ok!(h.service.post_message(&ada, "while you were away", None).await);
        assert_ok!(h.service.save_place(&ada, "cafe", 1.0, 2.0).await);

        let (_, grace_back) = h.connect("grace", room).await;
        assert_eq!(grace_back.user_id, grace.id);
        let replies = assert_ok!(h.service.fetch_user_notifications(&grace_back).await);
        assert_eq!(replies[0], ClientEvent::Highlight(HighlightTarget::Chat));
        assert_eq!(replies[1], ClientEvent::Highlight(HighlightTarget::Vote));
        let Some(ClientEvent::Notifications(views)) = replies.last() else {
            panic!("expected notification list, got {replies:?}");
        };
        assert_eq!(views.len(), 1);
        assert!(views[0].read);
        assert!(views[0].current_room);
        assert_eq!(views[0].added_place_display_name.as_deref(), Some("ada"));

        let replies = assert_ok!(h.service.fetch_user_notifications(&grace_back).await);
        assert_eq!(replies.len(), 1);
    }

    #[tokio::test]
    async fn unread_rooms_are_listed_first() {
        let h = Harness::new();
        let here = RoomId::new();
        let elsewhere = RoomId::new();
        let (_, ada_here) = h.member("ada", here).await;
        let (_, ada_elsewhere) = h.member("ada", elsewhere).await;
        h.member("grace", here).await;
        let (_, grace_elsewhere) = h.member("grace", elsewhere).await;

        assert_ok!(h.service.post_message(&ada_elsewhere, "over here", None).await);
        assert_ok!(h.service.update_privacy(&ada_here, false).await);

        let (_, grace_here) = h.connect("grace", here).await;
        let replies = assert_ok!(h.service.fetch_user_notifications(&grace_here).await);
        let Some(ClientEvent::Notifications(views)) = replies.last() else {
            panic!("expected notification list, got {replies:?}");
        };
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].room, elsewhere);
        assert!(!views[0].read);
        assert!(!views[0].current_room);
        assert_eq!(views[0].message_content.as_deref(), Some("over here"));
        assert_eq!(views[0].message_user_display_name.as_deref(), Some("ada"));
        assert_eq!(views[1].room, here);
        assert_eq!(views[1].now_public, Some(true));
        assert_eq!(grace_elsewhere.room_id, elsewhere);
    }
}
