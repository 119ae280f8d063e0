//! WebSocket layer: upgrade handling, connection loop, message routing.
//!
//! Every room has its own socket at `/ws/chat/{room_id}/`. A connection
//! belongs to the group of its room and only that group's events reach
//! it; commands run against the
//! [`RoomService`](crate::service::RoomService) and group events fan out
//! through the [`ChannelLayer`](crate::domain::ChannelLayer).

pub mod connection;
pub mod handler;
pub mod messages;
