//! Rooms, chat messages and join requests.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{JoinRequestId, MessageId, RoomId, User, UserId};

/// A collaborative room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Room {
    /// Room id, also the channel-group name.
    pub id: RoomId,
    /// Human-readable name, empty until set.
    pub display_name: String,
    /// Private rooms require approval before non-members may take part.
    pub private: bool,
}

impl Room {
    /// Creates an unnamed public room.
    #[must_use]
    pub fn new(id: RoomId) -> Self {
        Self {
            id,
            display_name: String::new(),
            private: false,
        }
    }
}

/// A chat message posted to a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    /// Database id.
    pub id: MessageId,
    /// Author.
    pub user_id: UserId,
    /// Room the message was posted to.
    pub room_id: RoomId,
    /// Message body.
    pub content: String,
    /// Server-side creation time.
    pub timestamp: DateTime<Utc>,
}

/// A chat message together with its author, as replayed to clients.
#[derive(Debug, Clone)]
pub struct ChatLine {
    /// The message.
    pub message: ChatMessage,
    /// The author at read time.
    pub author: User,
}

impl ChatLine {
    /// Formats the line as `"<author>: <content>"`.
    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "{}: {}",
            self.author.effective_display_name(),
            self.message.content
        )
    }
}

/// A request by a non-member to join a private room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinRequest {
    /// Database id.
    pub id: JoinRequestId,
    /// Requesting user.
    pub user_id: UserId,
    /// Target room.
    pub room_id: RoomId,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}
