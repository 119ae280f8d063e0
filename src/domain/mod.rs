//! Domain layer: core types, geometry and the channel layer.
//!
//! This module contains the server-side domain model: typed identifiers,
//! users and rooms, notifications, location bubbles, places and their
//! ranking, the GeoJSON geometry used for service-region detection, the
//! events delivered to clients and the broadcast bus that carries them.

pub mod channel_layer;
pub mod client_event;
pub mod geometry;
pub mod ids;
pub mod location;
pub mod notification;
pub mod place;
pub mod room;
pub mod user;

pub use channel_layer::{ChannelLayer, GroupEvent};
pub use client_event::{
    ClientEvent, HighlightTarget, JoinRequestView, MemberView, NotificationView, RefreshTarget,
    RegionIsochrone,
};
pub use ids::{JoinRequestId, MessageId, NotificationId, PlaceKey, RoomId, UserId};
pub use location::{Intersection, LocationBubble, Transportation};
pub use notification::{Highlights, Notification, NotificationKind};
pub use place::{Place, PlaceTally, rank_places};
pub use room::{ChatLine, ChatMessage, JoinRequest, Room};
pub use user::{User, UserProfile};
