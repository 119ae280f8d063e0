//! In-process implementation of the [`Store`] contract.
//!
//! All state lives behind one `tokio::sync::RwLock`. Serial ids come from a
//! single counter so that ordering by id matches creation order across
//! tables.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::Store;
use crate::domain::{
    ChatMessage, Intersection, JoinRequest, JoinRequestId, LocationBubble, MessageId,
    Notification, NotificationId, NotificationKind, Place, PlaceKey, PlaceTally, Room, RoomId,
    User, UserId, UserProfile,
};
use crate::error::AppError;

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    users: BTreeMap<UserId, User>,
    rooms: HashMap<RoomId, Room>,
    members: BTreeSet<(RoomId, UserId)>,
    messages: Vec<ChatMessage>,
    join_requests: Vec<JoinRequest>,
    notifications: Vec<Notification>,
    bubbles: BTreeMap<(RoomId, UserId), LocationBubble>,
    area_queries: HashMap<(RoomId, UserId), String>,
    intersections: HashMap<RoomId, Intersection>,
    places: Vec<Place>,
    votes: HashMap<(RoomId, UserId), PlaceKey>,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Store that keeps all state in memory. State is lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_user(&self, profile: &UserProfile) -> Result<User, AppError> {
        let mut state = self.state.write().await;
        if let Some(user) = state
            .users
            .values_mut()
            .find(|u| u.username == profile.username)
        {
            user.first_name.clone_from(&profile.first_name);
            user.last_name.clone_from(&profile.last_name);
            user.email.clone_from(&profile.email);
            user.phone_number.clone_from(&profile.phone_number);
            return Ok(user.clone());
        }
        let id = UserId::new(state.next_id());
        let user = User {
            id,
            username: profile.username.clone(),
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
            email: profile.email.clone(),
            phone_number: profile.phone_number.clone(),
            display_name: String::new(),
            last_logged_in: None,
        };
        state.users.insert(id, user.clone());
        Ok(user)
    }

    async fn user(&self, id: UserId) -> Result<Option<User>, AppError> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn set_display_name(&self, id: UserId, name: &str) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        if let Some(user) = state.users.get_mut(&id) {
            user.display_name = name.to_string();
        }
        Ok(())
    }

    async fn touch_last_logged_in(&self, id: UserId, at: DateTime<Utc>) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        if let Some(user) = state.users.get_mut(&id) {
            user.last_logged_in = Some(at);
        }
        Ok(())
    }

    async fn get_or_create_room(&self, id: RoomId) -> Result<Room, AppError> {
        let mut state = self.state.write().await;
        Ok(state
            .rooms
            .entry(id)
            .or_insert_with(|| Room::new(id))
            .clone())
    }

    async fn room(&self, id: RoomId) -> Result<Option<Room>, AppError> {
        Ok(self.state.read().await.rooms.get(&id).cloned())
    }

    async fn set_room_name(&self, id: RoomId, name: &str) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        if let Some(room) = state.rooms.get_mut(&id) {
            room.display_name = name.to_string();
        }
        Ok(())
    }

    async fn set_room_privacy(&self, id: RoomId, private: bool) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        if let Some(room) = state.rooms.get_mut(&id) {
            room.private = private;
        }
        Ok(())
    }

    async fn members(&self, room: RoomId) -> Result<Vec<User>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .members
            .iter()
            .filter(|(r, _)| *r == room)
            .filter_map(|(_, u)| state.users.get(u).cloned())
            .collect())
    }

    async fn is_member(&self, room: RoomId, user: UserId) -> Result<bool, AppError> {
        Ok(self.state.read().await.members.contains(&(room, user)))
    }

    async fn add_member(&self, room: RoomId, user: UserId) -> Result<bool, AppError> {
        Ok(self.state.write().await.members.insert((room, user)))
    }

    async fn remove_member(&self, room: RoomId, user: UserId) -> Result<bool, AppError> {
        Ok(self.state.write().await.members.remove(&(room, user)))
    }

    async fn rooms_of(&self, user: UserId) -> Result<Vec<RoomId>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .members
            .iter()
            .filter(|(_, u)| *u == user)
            .map(|(r, _)| *r)
            .collect())
    }

    async fn create_message(
        &self,
        room: RoomId,
        user: UserId,
        content: &str,
    ) -> Result<ChatMessage, AppError> {
        let mut state = self.state.write().await;
        let message = ChatMessage {
            id: MessageId::new(state.next_id()),
            user_id: user,
            room_id: room,
            content: content.to_string(),
            timestamp: Utc::now(),
        };
        state.messages.push(message.clone());
        Ok(message)
    }

    async fn message(&self, id: MessageId) -> Result<Option<ChatMessage>, AppError> {
        let state = self.state.read().await;
        Ok(state.messages.iter().find(|m| m.id == id).cloned())
    }

    async fn recent_messages(
        &self,
        room: RoomId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .messages
            .iter()
            .rev()
            .filter(|m| m.room_id == room)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_or_create_join_request(
        &self,
        room: RoomId,
        user: UserId,
    ) -> Result<(JoinRequest, bool), AppError> {
        let mut state = self.state.write().await;
        if let Some(existing) = state
            .join_requests
            .iter()
            .find(|j| j.room_id == room && j.user_id == user)
        {
            return Ok((existing.clone(), false));
        }
        let request = JoinRequest {
            id: JoinRequestId::new(state.next_id()),
            user_id: user,
            room_id: room,
            timestamp: Utc::now(),
        };
        state.join_requests.push(request.clone());
        Ok((request, true))
    }

    async fn join_request(&self, id: JoinRequestId) -> Result<Option<JoinRequest>, AppError> {
        let state = self.state.read().await;
        Ok(state.join_requests.iter().find(|j| j.id == id).cloned())
    }

    async fn join_requests(&self, room: RoomId) -> Result<Vec<JoinRequest>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .join_requests
            .iter()
            .rev()
            .filter(|j| j.room_id == room)
            .cloned()
            .collect())
    }

    async fn delete_join_request(&self, room: RoomId, user: UserId) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        let removed: Vec<JoinRequestId> = state
            .join_requests
            .iter()
            .filter(|j| j.room_id == room && j.user_id == user)
            .map(|j| j.id)
            .collect();
        state
            .join_requests
            .retain(|j| !(j.room_id == room && j.user_id == user));
        state.notifications.retain(|n| {
            n.kind
                .join_request()
                .is_none_or(|id| !removed.contains(&id))
        });
        Ok(())
    }

    async fn create_notification(
        &self,
        user: UserId,
        room: RoomId,
        kind: NotificationKind,
    ) -> Result<Notification, AppError> {
        let mut state = self.state.write().await;
        let notification = Notification {
            id: NotificationId::new(state.next_id()),
            user_id: user,
            room_id: room,
            kind,
            timestamp: Utc::now(),
            read: false,
        };
        state.notifications.push(notification.clone());
        Ok(notification)
    }

    async fn unread_notifications(
        &self,
        user: UserId,
        room: RoomId,
        before: DateTime<Utc>,
    ) -> Result<Vec<Notification>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .notifications
            .iter()
            .filter(|n| n.user_id == user && n.room_id == room && !n.read && n.timestamp <= before)
            .cloned()
            .collect())
    }

    async fn mark_notifications_read(&self, user: UserId, room: RoomId) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        state
            .notifications
            .iter_mut()
            .filter(|n| n.user_id == user && n.room_id == room)
            .for_each(|n| n.read = true);
        Ok(())
    }

    async fn latest_notification_per_room(
        &self,
        user: UserId,
    ) -> Result<Vec<Notification>, AppError> {
        let state = self.state.read().await;
        let mut latest: HashMap<RoomId, &Notification> = HashMap::new();
        for n in state.notifications.iter().filter(|n| n.user_id == user) {
            latest
                .entry(n.room_id)
                .and_modify(|current| {
                    if (n.timestamp, n.id) > (current.timestamp, current.id) {
                        *current = n;
                    }
                })
                .or_insert(n);
        }
        let mut out: Vec<Notification> = latest.into_values().cloned().collect();
        out.sort_by_key(|n| n.room_id);
        Ok(out)
    }

    async fn delete_notifications(&self, user: UserId, room: RoomId) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        state
            .notifications
            .retain(|n| !(n.user_id == user && n.room_id == room));
        Ok(())
    }

    async fn upsert_location_bubble(&self, bubble: &LocationBubble) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        let previous = state
            .bubbles
            .insert((bubble.room_id, bubble.user_id), bubble.clone());
        Ok(previous.is_none())
    }

    async fn location_bubble(
        &self,
        room: RoomId,
        user: UserId,
    ) -> Result<Option<LocationBubble>, AppError> {
        Ok(self.state.read().await.bubbles.get(&(room, user)).cloned())
    }

    async fn location_bubbles(&self, room: RoomId) -> Result<Vec<LocationBubble>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .bubbles
            .iter()
            .filter(|((r, _), _)| *r == room)
            .map(|(_, b)| b.clone())
            .collect())
    }

    async fn delete_location_bubble(&self, room: RoomId, user: UserId) -> Result<(), AppError> {
        self.state.write().await.bubbles.remove(&(room, user));
        Ok(())
    }

    async fn upsert_area_query(
        &self,
        room: RoomId,
        user: UserId,
        query: &str,
    ) -> Result<(), AppError> {
        self.state
            .write()
            .await
            .area_queries
            .insert((room, user), query.to_string());
        Ok(())
    }

    async fn area_query(&self, room: RoomId, user: UserId) -> Result<Option<String>, AppError> {
        Ok(self
            .state
            .read()
            .await
            .area_queries
            .get(&(room, user))
            .cloned())
    }

    async fn upsert_intersection(&self, intersection: &Intersection) -> Result<(), AppError> {
        self.state
            .write()
            .await
            .intersections
            .insert(intersection.room_id, intersection.clone());
        Ok(())
    }

    async fn intersection(&self, room: RoomId) -> Result<Option<Intersection>, AppError> {
        Ok(self.state.read().await.intersections.get(&room).cloned())
    }

    async fn delete_intersection(&self, room: RoomId) -> Result<(), AppError> {
        self.state.write().await.intersections.remove(&room);
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
        let mut state = self.state.write().await;
        if let Some(place) = state
            .places
            .iter_mut()
            .find(|p| p.room_id == room && p.lat.to_bits() == lat.to_bits() && p.lng.to_bits() == lng.to_bits())
        {
            place.place_id = place_id.to_string();
            if touch {
                place.last_saved = Utc::now();
            }
            return Ok(place.clone());
        }
        let place = Place {
            key: PlaceKey::new(state.next_id()),
            room_id: room,
            place_id: place_id.to_string(),
            lat,
            lng,
            last_saved: Utc::now(),
        };
        state.places.push(place.clone());
        Ok(place)
    }

    async fn place_by_place_id(
        &self,
        room: RoomId,
        place_id: &str,
    ) -> Result<Option<Place>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .places
            .iter()
            .filter(|p| p.room_id == room && p.place_id == place_id)
            .max_by_key(|p| (p.last_saved, p.key))
            .cloned())
    }

    async fn place_tallies(
        &self,
        room: RoomId,
        viewer: UserId,
    ) -> Result<Vec<PlaceTally>, AppError> {
        let state = self.state.read().await;
        let viewer_vote = state.votes.get(&(room, viewer)).copied();
        Ok(state
            .places
            .iter()
            .filter(|p| p.room_id == room)
            .map(|p| {
                let total = state.votes.values().filter(|k| **k == p.key).count();
                PlaceTally {
                    place: p.clone(),
                    total_votes: u32::try_from(total).unwrap_or(u32::MAX),
                    user_voted_for: viewer_vote == Some(p.key),
                }
            })
            .collect())
    }

    async fn upsert_vote(
        &self,
        room: RoomId,
        user: UserId,
        place: PlaceKey,
    ) -> Result<(), AppError> {
        self.state.write().await.votes.insert((room, user), place);
        Ok(())
    }
}
