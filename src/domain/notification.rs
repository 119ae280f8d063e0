//! Per-user notifications about activity in rooms.
//!
//! Each notification has exactly one [`NotificationKind`]. The stored form
//! flattens the kind into a discriminator plus the optional references it
//! needs (see [`NotificationKind::as_str`] and [`NotificationKind::from_parts`]).

use chrono::{DateTime, Utc};

use super::{JoinRequestId, MessageId, NotificationId, RoomId, UserId};

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// A new chat message was posted.
    Message(MessageId),
    /// A user became a member.
    UserJoined(UserId),
    /// A user left the room.
    UserLeft(UserId),
    /// A user set or changed their location bubble.
    UserLocation(UserId),
    /// A user asked to join the private room.
    JoinRequest(JoinRequestId),
    /// The room was made public.
    NowPublic,
    /// The room was made private.
    NowPrivate,
    /// A user saved a place.
    AddedPlace(UserId),
    /// A user voted for a place.
    VotedPlace(UserId),
}

impl NotificationKind {
    /// Returns the stored discriminator.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::UserJoined(_) => "user_joined",
            Self::UserLeft(_) => "user_left",
            Self::UserLocation(_) => "user_location",
            Self::JoinRequest(_) => "join_request",
            Self::NowPublic => "now_public",
            Self::NowPrivate => "now_private",
            Self::AddedPlace(_) => "added_place",
            Self::VotedPlace(_) => "voted_place",
        }
    }

    /// Returns the user this notification refers to, if any.
    #[must_use]
    pub const fn subject_user(&self) -> Option<UserId> {
        match self {
            Self::UserJoined(u)
            | Self::UserLeft(u)
            | Self::UserLocation(u)
            | Self::AddedPlace(u)
            | Self::VotedPlace(u) => Some(*u),
            _ => None,
        }
    }

    /// Returns the referenced message, if any.
    #[must_use]
    pub const fn message(&self) -> Option<MessageId> {
        match self {
            Self::Message(m) => Some(*m),
            _ => None,
        }
    }

    /// Returns the referenced join request, if any.
    #[must_use]
    pub const fn join_request(&self) -> Option<JoinRequestId> {
        match self {
            Self::JoinRequest(j) => Some(*j),
            _ => None,
        }
    }

    /// Rebuilds a kind from its stored parts.
    ///
    /// Returns `None` when the discriminator is unknown or the reference it
    /// requires is missing.
    #[must_use]
    pub fn from_parts(
        kind: &str,
        subject_user: Option<UserId>,
        message: Option<MessageId>,
        join_request: Option<JoinRequestId>,
    ) -> Option<Self> {
        match kind {
            "message" => message.map(Self::Message),
            "user_joined" => subject_user.map(Self::UserJoined),
            "user_left" => subject_user.map(Self::UserLeft),
            "user_location" => subject_user.map(Self::UserLocation),
            "join_request" => join_request.map(Self::JoinRequest),
            "now_public" => Some(Self::NowPublic),
            "now_private" => Some(Self::NowPrivate),
            "added_place" => subject_user.map(Self::AddedPlace),
            "voted_place" => subject_user.map(Self::VotedPlace),
            _ => None,
        }
    }

    /// Returns `true` if unseen notifications of this kind highlight the
    /// chat tab.
    #[must_use]
    pub const fn highlights_chat(&self) -> bool {
        matches!(self, Self::Message(_))
    }

    /// Returns `true` if unseen notifications of this kind highlight the
    /// area tab.
    #[must_use]
    pub const fn highlights_area(&self) -> bool {
        matches!(self, Self::UserLocation(_))
    }

    /// Returns `true` if unseen notifications of this kind highlight the
    /// vote tab.
    #[must_use]
    pub const fn highlights_vote(&self) -> bool {
        matches!(self, Self::AddedPlace(_) | Self::VotedPlace(_))
    }
}

/// A stored notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Database id.
    pub id: NotificationId,
    /// Recipient.
    pub user_id: UserId,
    /// Room the activity happened in.
    pub room_id: RoomId,
    /// What happened.
    pub kind: NotificationKind,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Whether the recipient has seen it.
    pub read: bool,
}

/// Tabs that light up for unseen activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Highlights {
    /// Unseen chat messages.
    pub chat: bool,
    /// Unseen location updates.
    pub area: bool,
    /// Unseen place additions or votes.
    pub vote: bool,
}

impl Highlights {
    /// Folds a set of unseen notification kinds into tab highlights.
    #[must_use]
    pub fn from_kinds<'a>(kinds: impl IntoIterator<Item = &'a NotificationKind>) -> Self {
        kinds.into_iter().fold(Self::default(), |acc, kind| Self {
            chat: acc.chat || kind.highlights_chat(),
            area: acc.area || kind.highlights_area(),
            vote: acc.vote || kind.highlights_vote(),
        })
    }
}
