//! WebSocket connection state machine.
//!
//! Handles the read/write loop for a single WebSocket connection. Each
//! inbound frame runs as its own task so a slow provider call never blocks
//! the socket; replies come back through an outbox and are interleaved
//! with the connection's group events.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;

use super::messages::{ClientCommand, Inbound, encode, parse_inbound};
use crate::domain::{ClientEvent, GroupEvent};
use crate::error::AppError;
use crate::service::{Replies, RoomService, Session};

/// Runs the read/write loop for a single WebSocket connection.
///
/// - Reads frames from the client and dispatches them to the service.
/// - Forwards replies and the events of the session's room group.
pub async fn run_connection(socket: WebSocket, service: Arc<RoomService>, session: Session) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut events = service.channel_layer().subscribe();
    let (outbox_tx, mut outbox_rx) = mpsc::unbounded_channel::<ClientEvent>();
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            // Incoming frame from client
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let service = Arc::clone(&service);
                        let outbox = outbox_tx.clone();
                        tasks.spawn(async move {
                            handle_text(&service, &session, text.as_str(), &outbox).await;
                        });
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "ws read failed");
                        break;
                    }
                    _ => {}
                }
            }
            // Reply to one of this connection's commands
            Some(event) = outbox_rx.recv() => {
                if send(&mut ws_tx, &event).await.is_err() {
                    break;
                }
            }
            // Event from the channel layer
            event = events.recv() => {
                match event {
                    Ok(GroupEvent { group, event }) => {
                        if group == session.room_id && send(&mut ws_tx, &event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(lagged = n, "ws client lagged behind channel layer");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            Some(done) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = done {
                    tracing::error!(error = %e, "ws command task failed");
                }
            }
        }
    }

    tasks.abort_all();
    tracing::debug!(room = %session.room_id, user_id = %session.user_id, "ws connection closed");
}

async fn send(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    event: &ClientEvent,
) -> Result<(), axum::Error> {
    ws_tx.send(Message::text(encode(event))).await
}

async fn handle_text(
    service: &RoomService,
    session: &Session,
    text: &str,
    outbox: &mpsc::UnboundedSender<ClientEvent>,
) {
    let replies = match parse_inbound(text) {
        Ok(inbound) => dispatch(service, session, inbound).await,
        Err(e) => Err(e),
    };
    let replies = replies.unwrap_or_else(|e| {
        tracing::warn!(room = %session.room_id, user_id = %session.user_id, error = %e, "ws command failed");
        vec![ClientEvent::Error(e.to_string())]
    });
    for reply in replies {
        if outbox.send(reply).is_err() {
            break;
        }
    }
}

/// Routes one inbound frame to the matching [`RoomService`] operation.
///
/// # Errors
///
/// Propagates the operation's error.
pub async fn dispatch(
    service: &RoomService,
    session: &Session,
    inbound: Inbound,
) -> Result<Replies, AppError> {
    let command = match inbound {
        Inbound::Chat(chat) => {
            return service
                .post_message(session, &chat.message, chat.user.as_deref())
                .await;
        }
        Inbound::Command(command) => command,
    };
    tracing::debug!(room = %session.room_id, ?command, "ws command");

    match command {
        ClientCommand::FetchMessages => service.fetch_messages(session).await,
        ClientCommand::FetchAllowedStatus => service.fetch_allowed_status(session).await,
        ClientCommand::JoinRoom => service.join_room(session).await,
        ClientCommand::FetchDisplayName => service.fetch_display_name(session).await,
        ClientCommand::UpdateDisplayName { name } => {
            service.update_display_name(session, &name).await
        }
        ClientCommand::GetIsochroneServiceRegion {
            latitude,
            longitude,
        } => {
            service
                .isochrone_service_regions(session, latitude, longitude)
                .await
        }
        ClientCommand::UpdateIntersection(area) => service.update_intersection(session, area).await,
        ClientCommand::DeleteIntersection => service.delete_intersection(session).await,
        ClientCommand::FetchIntersection => service.fetch_intersection(session).await,
        ClientCommand::FetchUsersMissingLocations => {
            service.fetch_users_missing_locations(session).await
        }
        ClientCommand::FetchLocationBubble => service.fetch_location_bubble(session).await,
        ClientCommand::UpdateLocationBubble(update) => {
            service.update_location_bubble(session, update).await
        }
        ClientCommand::CalculateIntersection => service.calculate_intersection(session).await,
        ClientCommand::FetchAreaQuery => service.fetch_area_query(session).await,
        ClientCommand::UpdateAreaQuery { query, lat, lng } => {
            service.update_area_query(session, &query, lat, lng).await
        }
        ClientCommand::GetNextPagePlaces { token } => {
            service.next_page_places(session, &token).await
        }
        ClientCommand::SavePlace { id, lat, lng } => {
            service.save_place(session, &id, lat, lng).await
        }
        ClientCommand::FetchPlaces => service.fetch_places(session).await,
        ClientCommand::VotePlace { place_id } => service.vote_place(session, &place_id).await,
        ClientCommand::FetchRoomName => service.fetch_room_name(session).await,
        ClientCommand::UpdateRoomName { name } => service.update_room_name(session, &name).await,
        ClientCommand::FetchMembers => service.fetch_members(session).await,
        ClientCommand::FetchPrivacy => service.fetch_privacy(session).await,
        ClientCommand::UpdatePrivacy { privacy } => {
            service.update_privacy(session, privacy).await
        }
        ClientCommand::ExitRoom { room_id } => service.exit_room(session, room_id).await,
        ClientCommand::ApproveUser { username } => {
            service.approve_user(session, &username).await
        }
        ClientCommand::ApproveAllUsers => service.approve_all_users(session).await,
        ClientCommand::RejectUser { username } => service.reject_user(session, &username).await,
        ClientCommand::FetchJoinRequests => service.fetch_join_requests(session).await,
        ClientCommand::FetchUserNotifications => service.fetch_user_notifications(session).await,
        ClientCommand::Unknown => Err(AppError::InvalidRequest("unknown command".to_string())),
    }
}
