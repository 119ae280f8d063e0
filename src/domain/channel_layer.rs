//! Broadcast channel for room-group events.
//!
//! [`ChannelLayer`] wraps a [`tokio::sync::broadcast`] channel. Services
//! publish a [`GroupEvent`] addressed to a room group, every WebSocket
//! connection receives it and forwards it only when it belongs to that
//! group.

use tokio::sync::broadcast;

use super::{ClientEvent, RoomId};

/// An event addressed to every connection in a room group.
#[derive(Debug, Clone)]
pub struct GroupEvent {
    /// Target group.
    pub group: RoomId,
    /// Payload delivered to each member connection.
    pub event: ClientEvent,
}

/// Broadcast bus for [`GroupEvent`]s.
///
/// Backed by a `tokio::broadcast` channel with a configurable capacity
/// (default 10 000). When the ring buffer is full, the oldest events are
/// dropped for lagging receivers.
#[derive(Debug, Clone)]
pub struct ChannelLayer {
    sender: broadcast::Sender<GroupEvent>,
}

impl ChannelLayer {
    /// Creates a new `ChannelLayer` with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to a room group.
    ///
    /// Returns the number of connections that received the event. If no
    /// connection is open, the event is silently dropped.
    pub fn group_send(&self, group: RoomId, event: ClientEvent) -> usize {
        self.sender
            .send(GroupEvent { group, event })
            .unwrap_or(0)
    }

    /// Publishes one event to each of several room groups.
    pub fn group_send_all<'a>(
        &self,
        groups: impl IntoIterator<Item = &'a RoomId>,
        event: &ClientEvent,
    ) {
        for group in groups {
            let _ = self.group_send(*group, event.clone());
        }
    }

    /// Creates a new receiver that will receive all future events.
    ///
    /// Each WebSocket connection should call this once on connect.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GroupEvent> {
        self.sender.subscribe()
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::RefreshTarget;

    #[test]
    fn publish_without_receivers_returns_zero() {
        let layer = ChannelLayer::new(16);
        assert_eq!(layer.group_send(RoomId::new(), ClientEvent::Allowed), 0);
    }

    #[tokio::test]
    async fn subscriber_receives_addressed_event() {
        let layer = ChannelLayer::new(16);
        let mut rx = layer.subscribe();
        let room = RoomId::new();
        layer.group_send(room, ClientEvent::Refresh(RefreshTarget::Members));

        let Ok(event) = rx.recv().await else {
            panic!("expected to receive event");
        };
        assert_eq!(event.group, room);
        assert_eq!(event.event, ClientEvent::Refresh(RefreshTarget::Members));
    }

    #[tokio::test]
    async fn group_send_all_fans_out_per_group() {
        let layer = ChannelLayer::new(16);
        let mut rx = layer.subscribe();
        let rooms = [RoomId::new(), RoomId::new()];
        layer.group_send_all(&rooms, &ClientEvent::Refresh(RefreshTarget::Notifications));

        for expected in rooms {
            let Ok(event) = rx.recv().await else {
                panic!("expected event for {expected}");
            };
            assert_eq!(event.group, expected);
        }
    }

    #[test]
    fn receiver_count_tracks_subscribers() {
        let layer = ChannelLayer::new(16);
        assert_eq!(layer.receiver_count(), 0);
        let rx1 = layer.subscribe();
        let _rx2 = layer.subscribe();
        assert_eq!(layer.receiver_count(), 2);
        drop(rx1);
        assert_eq!(layer.receiver_count(), 1);
    }
}
