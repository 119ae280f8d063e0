//! Room membership, join requests, names and privacy.

use super::{Replies, RoomService, Session};
use crate::domain::user::validate_display_name;
use crate::domain::{
    ClientEvent, JoinRequestView, NotificationKind, RefreshTarget, RoomId, User,
};
use crate::error::AppError;

/// Group signals sent after join requests were approved.
const AFTER_APPROVAL: [RefreshTarget; 7] = [
    RefreshTarget::JoinRequests,
    RefreshTarget::Members,
    RefreshTarget::AllowedStatus,
    RefreshTarget::Chat,
    RefreshTarget::RoomName,
    RefreshTarget::Privacy,
    RefreshTarget::UsersMissingLocations,
];

impl RoomService {
    /// Tells the caller whether they may take part, filing a join request
    /// when they may not.
    ///
    /// # Errors
    ///
    /// Propagates persistence failures.
    pub async fn fetch_allowed_status(&self, session: &Session) -> Result<Replies, AppError> {
        if self.allowed(session).await? {
            Ok(vec![ClientEvent::Allowed])
        } else {
            self.request_to_join(session).await
        }
    }

    /// Makes the caller a member of the room when they are allowed to take
    /// part, otherwise files a join request.
    ///
    /// A member joining a room that had exactly one member before
    /// invalidates the stored intersection.
    ///
    /// # Errors
    ///
    /// Propagates persistence failures.
    pub async fn join_room(&self, session: &Session) -> Result<Replies, AppError> {
        if !self.allowed(session).await? {
            return self.request_to_join(session).await;
        }
        let room = session.room_id;
        let user = self.user(session.user_id).await?;

        let previous_members = self.store.members(room).await?.len();
        let added = self.store.add_member(room, user.id).await?;
        if added {
            if user.display_name.is_empty() {
                self.store
                    .set_display_name(user.id, &user.effective_display_name())
                    .await?;
            }
            self.notify_members(room, NotificationKind::UserJoined(user.id))
                .await?;
            tracing::info!(%room, user_id = %user.id, "member joined");
        }
        if added && previous_members == 1 {
            self.store.delete_intersection(room).await?;
            self.refresh(room, &[RefreshTarget::Area]);
        }
        self.notify_member_rooms(room).await?;
        self.refresh(
            room,
            &[RefreshTarget::Members, RefreshTarget::UsersMissingLocations],
        );
        Ok(vec![ClientEvent::Allowed])
    }

    async fn request_to_join(&self, session: &Session) -> Result<Replies, AppError> {
        let room = session.room_id;
        let (request, created) = self
            .store
            .get_or_create_join_request(room, session.user_id)
            .await?;
        if created {
            self.notify_members(room, NotificationKind::JoinRequest(request.id))
                .await?;
            self.notify_member_rooms(room).await?;
            tracing::info!(%room, user_id = %session.user_id, "join request filed");
        }
        self.refresh(room, &[RefreshTarget::JoinRequests]);
        Ok(vec![ClientEvent::NotAllowed])
    }

    /// Lists pending join requests, newest first.
    ///
    /// # Errors
    ///
    /// Propagates persistence failures.
    pub async fn fetch_join_requests(&self, session: &Session) -> Result<Replies, AppError> {
        if !self.allowed(session).await? {
            return Ok(Vec::new());
        }
        let mut views = Vec::new();
        for request in self.store.join_requests(session.room_id).await? {
            let user = self.user(request.user_id).await?;
            views.push(JoinRequestView {
                user_id: user.id,
                username: user.username.clone(),
                display_name: user.effective_display_name(),
            });
        }
        Ok(vec![ClientEvent::JoinRequests(views)])
    }

    /// Admits the user with Firebase uid `username`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::UserNotFound`] for an unknown uid.
    pub async fn approve_user(&self, session: &Session, username: &str) -> Result<Replies, AppError> {
        if !self.allowed(session).await? {
            return Ok(Vec::new());
        }
        let user = self.user_by_username(username).await?;
        self.admit(session.room_id, &user).await?;
        self.after_approval(session.room_id).await?;
        Ok(Vec::new())
    }

    /// Admits every user with a pending join request.
    ///
    /// # Errors
    ///
    /// Propagates persistence failures.
    pub async fn approve_all_users(&self, session: &Session) -> Result<Replies, AppError> {
        if !self.allowed(session).await? {
            return Ok(Vec::new());
        }
        let room = session.room_id;
        for request in self.store.join_requests(room).await? {
            let user = self.user(request.user_id).await?;
            self.admit(room, &user).await?;
        }
        self.after_approval(room).await?;
        Ok(Vec::new())
    }

    /// Drops the join request of the user with Firebase uid `username`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::UserNotFound`] for an unknown uid.
    pub async fn reject_user(&self, session: &Session, username: &str) -> Result<Replies, AppError> {
        if !self.allowed(session).await? {
            return Ok(Vec::new());
        }
        let user = self.user_by_username(username).await?;
        self.store
            .delete_join_request(session.room_id, user.id)
            .await?;
        tracing::info!(room = %session.room_id, user_id = %user.id, "join request rejected");
        self.refresh(session.room_id, &[RefreshTarget::JoinRequests]);
        Ok(Vec::new())
    }

    async fn user_by_username(&self, username: &str) -> Result<User, AppError> {
        self.store
            .user_by_username(username)
            .await?
            .ok_or_else(|| AppError::UserNotFound(username.to_string()))
    }

    async fn admit(&self, room: RoomId, user: &User) -> Result<(), AppError> {
        self.store.add_member(room, user.id).await?;
        self.store.delete_join_request(room, user.id).await?;
        self.notify_members(room, NotificationKind::UserJoined(user.id))
            .await?;
        tracing::info!(%room, user_id = %user.id, "join request approved");
        Ok(())
    }

    async fn after_approval(&self, room: RoomId) -> Result<(), AppError> {
        self.notify_member_rooms(room).await?;
        self.refresh(room, &AFTER_APPROVAL);
        Ok(())
    }

    /// Removes the caller from `room_id`.
    ///
    /// The caller's bubble and notifications for that room are deleted and
    /// the remaining members are told who left.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::RoomNotFound`] for an unknown room.
    pub async fn exit_room(&self, session: &Session, room_id: RoomId) -> Result<Replies, AppError> {
        if !self.allowed(session).await? {
            return Ok(Vec::new());
        }
        let rooms_to_notify = self.member_rooms(session.room_id).await?;
        let room = self.room(room_id).await?;
        let user = session.user_id;

        self.store.remove_member(room.id, user).await?;
        self.store.delete_location_bubble(room.id, user).await?;
        self.notify_members(room.id, NotificationKind::UserLeft(user))
            .await?;
        self.store.delete_notifications(user, room.id).await?;
        tracing::info!(room = %room.id, user_id = %user, "member left");

        self.channel_layer.group_send_all(
            &rooms_to_notify,
            &ClientEvent::Refresh(RefreshTarget::Notifications),
        );
        self.refresh(
            room.id,
            &[RefreshTarget::Members, RefreshTarget::UsersMissingLocations],
        );
        let _ = self
            .channel_layer
            .group_send(room.id, ClientEvent::RecalculateIntersection);
        self.refresh(room.id, &[RefreshTarget::AllowedStatus]);
        Ok(Vec::new())
    }

    /// Lists the room's members.
    ///
    /// # Errors
    ///
    /// Propagates persistence failures.
    pub async fn fetch_members(&self, session: &Session) -> Result<Replies, AppError> {
        if !self.allowed(session).await? {
            return Ok(Vec::new());
        }
        Ok(vec![ClientEvent::Members(
            self.member_views(session.room_id).await?,
        )])
    }

    /// Replies with the caller's effective display name.
    ///
    /// # Errors
    ///
    /// Propagates persistence failures.
    pub async fn fetch_display_name(&self, session: &Session) -> Result<Replies, AppError> {
        let user = self.user(session.user_id).await?;
        Ok(vec![ClientEvent::DisplayName(user.effective_display_name())])
    }

    /// Sets the caller's display name and asks every room sharing a member
    /// with this one to reload everything that shows names.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::InvalidRequest`] for an overlong name.
    pub async fn update_display_name(&self, session: &Session, name: &str) -> Result<Replies, AppError> {
        validate_display_name(name)?;
        self.store.set_display_name(session.user_id, name).await?;
        for room in self.member_rooms(session.room_id).await? {
            self.refresh(
                room,
                &[
                    RefreshTarget::Notifications,
                    RefreshTarget::Members,
                    RefreshTarget::Chat,
                    RefreshTarget::UsersMissingLocations,
                ],
            );
        }
        Ok(Vec::new())
    }

    /// Replies with the room name, naming an unnamed room after its id.
    ///
    /// # Errors
    ///
    /// Propagates persistence failures.
    pub async fn fetch_room_name(&self, session: &Session) -> Result<Replies, AppError> {
        if !self.allowed(session).await? {
            return Ok(Vec::new());
        }
        let mut room = self.room(session.room_id).await?;
        if room.display_name.is_empty() {
            room.display_name = room.id.to_string();
            self.store.set_room_name(room.id, &room.display_name).await?;
        }
        Ok(vec![ClientEvent::RoomName(room.display_name)])
    }

    /// Renames the room.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::InvalidRequest`] for an overlong name.
    pub async fn update_room_name(&self, session: &Session, name: &str) -> Result<Replies, AppError> {
        if !self.allowed(session).await? {
            return Ok(Vec::new());
        }
        validate_display_name(name)?;
        self.store.set_room_name(session.room_id, name).await?;
        self.notify_member_rooms(session.room_id).await?;
        self.refresh(session.room_id, &[RefreshTarget::RoomName]);
        Ok(Vec::new())
    }

    /// Replies with the room's privacy flag.
    ///
    /// # Errors
    ///
    /// Propagates persistence failures.
    pub async fn fetch_privacy(&self, session: &Session) -> Result<Replies, AppError> {
        if !self.allowed(session).await? {
            return Ok(Vec::new());
        }
        let room = self.room(session.room_id).await?;
        Ok(vec![ClientEvent::Privacy(room.private)])
    }

    /// Makes the room private or public and notifies its members.
    ///
    /// # Errors
    ///
    /// Propagates persistence failures.
    pub async fn update_privacy(&self, session: &Session, private: bool) -> Result<Replies, AppError> {
        if !self.allowed(session).await? {
            return Ok(Vec::new());
        }
        let room = session.room_id;
        self.store.set_room_privacy(room, private).await?;
        let kind = if private {
            NotificationKind::NowPrivate
        } else {
            NotificationKind::NowPublic
        };
        self.notify_members(room, kind).await?;
        tracing::info!(%room, private, "room privacy changed");
        self.refresh(room, &[RefreshTarget::Privacy]);
        self.notify_member_rooms(room).await?;
        Ok(Vec::new())
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::indexing_slicing)]
mod tests {
    use tokio_test::assert_ok;

    use super::*;
    use crate::persistence::Store;
    use crate::service::testing::Harness;

    #[tokio::test]
    async fn first_member_joins_public_room() {
        let mut h = Harness::new();
        let room = RoomId::new();
        let (user, session) = h.connect("ada", room).await;

        let replies = assert_ok!(h.service.join_room(&session).await);
        assert_eq!(replies, vec![ClientEvent::Allowed]);
        assert!(assert_ok!(h.store.is_member(room, user.id).await));

        let stored = assert_ok!(h.store.user(user.id).await);
        assert_eq!(stored.map(|u| u.display_name).as_deref(), Some("ada"));

        let events = h.drain_group(room);
        assert_eq!(
            events,
            vec![
                ClientEvent::Refresh(RefreshTarget::Notifications),
                ClientEvent::Refresh(RefreshTarget::Members),
                ClientEvent::Refresh(RefreshTarget::UsersMissingLocations),
            ]
        );
    }

    #[tokio::test]
    async fn second_member_invalidates_intersection() {
        let mut h = Harness::new();
        let room = RoomId::new();
        h.member("ada", room).await;
        h.drain();
        let (_, session) = h.connect("grace", room).await;

        assert_ok!(h.service.join_room(&session).await);
        let events = h.drain_group(room);
        assert_eq!(events.first(), Some(&ClientEvent::Refresh(RefreshTarget::Area)));

        h.member("linus", room).await;
        let events = h.drain_group(room);
        assert!(!events.contains(&ClientEvent::Refresh(RefreshTarget::Area)));
    }

    #[tokio::test]
    async fn outsider_of_private_room_files_one_request() {
        let mut h = Harness::new();
        let room = RoomId::new();
        let (owner, owner_session) = h.member("ada", room).await;
        assert_ok!(h.service.update_privacy(&owner_session, true).await);
        h.drain();

        let (guest, session) = h.connect("eve", room).await;
        let replies = assert_ok!(h.service.join_room(&session).await);
        assert_eq!(replies, vec![ClientEvent::NotAllowed]);
        assert!(!assert_ok!(h.store.is_member(room, guest.id).await));

        let replies = assert_ok!(h.service.fetch_allowed_status(&session).await);
        assert_eq!(replies, vec![ClientEvent::NotAllowed]);
        assert_eq!(assert_ok!(h.store.join_requests(room).await).len(), 1);

        let notes = assert_ok!(
            h.store
                .unread_notifications(owner.id, room, chrono::Utc::now())
                .await
        );
        let join_notes = notes
            .iter()
            .filter(|n| matches!(n.kind, NotificationKind::JoinRequest(_)))
            .count();
        assert_eq!(join_notes, 1);

        let events = h.drain_group(room);
        assert_eq!(
            events,
            vec![
                ClientEvent::Refresh(RefreshTarget::Notifications),
                ClientEvent::Refresh(RefreshTarget::JoinRequests),
                ClientEvent::Refresh(RefreshTarget::JoinRequests),
            ]
        );
    }

    #[tokio::test]
    async fn gated_operations_do_nothing_for_outsiders() {
        let h = Harness::new();
        let room = RoomId::new();
        let (_, owner_session) = h.member("ada", room).await;
        assert_ok!(h.service.update_privacy(&owner_session, true).await);

        let (_, session) = h.connect("eve", room).await;
        assert!(assert_ok!(h.service.fetch_members(&session).await).is_empty());
        assert!(assert_ok!(h.service.update_room_name(&session, "mine").await).is_empty());
        let name = assert_ok!(h.service.fetch_room_name(&owner_session).await);
        assert_eq!(name, vec![ClientEvent::RoomName(room.to_string())]);
    }

    #[tokio::test]
    async fn approving_admits_and_clears_request() {
        let mut h = Harness::new();
        let room = RoomId::new();
        let (_, owner_session) = h.member("ada", room).await;
        assert_ok!(h.service.update_privacy(&owner_session, true).await);
        let (guest, guest_session) = h.connect("eve", room).await;
        assert_ok!(h.service.join_room(&guest_session).await);
        h.drain();

        let requests = assert_ok!(h.service.fetch_join_requests(&owner_session).await);
        let ClientEvent::JoinRequests(views) = &requests[0] else {
            panic!("expected join requests, got {requests:?}");
        };
        assert_eq!(views[0].username, "eve");

        assert_ok!(h.service.approve_user(&owner_session, "eve").await);
        assert!(assert_ok!(h.store.is_member(room, guest.id).await));
        assert!(assert_ok!(h.store.join_requests(room).await).is_empty());

        let events = h.drain_group(room);
        let expected: Vec<ClientEvent> = std::iter::once(RefreshTarget::Notifications)
            .chain(AFTER_APPROVAL)
            .map(ClientEvent::Refresh)
            .collect();
        assert_eq!(events, expected);

        let replies = assert_ok!(h.service.fetch_allowed_status(&guest_session).await);
        assert_eq!(replies, vec![ClientEvent::Allowed]);
    }

    #[tokio::test]
    async fn approve_all_and_reject() {
        let h = Harness::new();
        let room = RoomId::new();
        let (_, owner_session) = h.member("ada", room).await;
        assert_ok!(h.service.update_privacy(&owner_session, true).await);
        for uid in ["eve", "mallory"] {
            let (_, s) = h.connect(uid, room).await;
            assert_ok!(h.service.join_room(&s).await);
        }

        assert_ok!(h.service.reject_user(&owner_session, "mallory").await);
        assert_eq!(assert_ok!(h.store.join_requests(room).await).len(), 1);

        assert_ok!(h.service.approve_all_users(&owner_session).await);
        assert!(assert_ok!(h.store.join_requests(room).await).is_empty());
        assert_eq!(assert_ok!(h.store.members(room).await).len(), 2);

        assert!(matches!(
            h.service.approve_user(&owner_session, "nobody").await,
            Err(AppError::UserNotFound(_))
        ));
    }

    #[tokio::test]
    async fn exit_room_cleans_up_and_notifies_remaining_members() {
        let mut h = Harness::new();
        let room = RoomId::new();
        let (ada, _) = h.member("ada", room).await;
        let (grace, grace_session) = h.member("grace", room).await;
        h.drain();

        assert_ok!(h.service.exit_room(&grace_session, room).await);
        assert!(!assert_ok!(h.store.is_member(room, grace.id).await));
        let own = assert_ok!(
            h.store
                .unread_notifications(grace.id, room, chrono::Utc::now())
                .await
        );
        assert!(own.is_empty());
        let theirs = assert_ok!(
            h.store
                .unread_notifications(ada.id, room, chrono::Utc::now())
                .await
        );
        assert!(
            theirs
                .iter()
                .any(|n| n.kind == NotificationKind::UserLeft(grace.id))
        );

        let events = h.drain_group(room);
        assert_eq!(
            events,
            vec![
                ClientEvent::Refresh(RefreshTarget::Notifications),
                ClientEvent::Refresh(RefreshTarget::Members),
                ClientEvent::Refresh(RefreshTarget::UsersMissingLocations),
                ClientEvent::RecalculateIntersection,
                ClientEvent::Refresh(RefreshTarget::AllowedStatus),
            ]
        );
    }

    #[tokio::test]
    async fn display_name_change_reaches_every_member_room() {
        let mut h = Harness::new();
        let room = RoomId::new();
        let other = RoomId::new();
        h.member("ada", room).await;
        let (_, grace_here) = h.member("grace", room).await;
        h.member("grace", other).await;
        h.drain();

        assert_ok!(h.service.update_display_name(&grace_here, "Amazing Grace").await);
        let groups: std::collections::BTreeSet<RoomId> =
            h.drain().into_iter().map(|e| e.group).collect();
        assert!(groups.contains(&room));
        assert!(groups.contains(&other));

        let replies = assert_ok!(h.service.fetch_display_name(&grace_here).await);
        assert_eq!(replies, vec![ClientEvent::DisplayName("Amazing Grace".to_string())]);

        assert!(
            h.service
                .update_display_name(&grace_here, &"x".repeat(151))
                .await
                .is_err()
        );
    }
}
