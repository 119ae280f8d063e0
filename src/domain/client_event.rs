//! Events delivered to WebSocket clients.
//!
//! Every event becomes a single-key JSON object on the wire, e.g.
//! `{"message": "ada: hi"}` or `{"refresh_members": true}`. Events are
//! either replied directly to the socket that issued a command or
//! published to a room group through the [`super::ChannelLayer`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};

use super::{Intersection, LocationBubble, RoomId, UserId};

/// Client views that a group signal asks to reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshTarget {
    /// Room privacy flag.
    Privacy,
    /// Member list.
    Members,
    /// Intersection area.
    Area,
    /// Notification list.
    Notifications,
    /// Pending join requests.
    JoinRequests,
    /// Chat history.
    Chat,
    /// Members that have not shared a location.
    UsersMissingLocations,
    /// Room name.
    RoomName,
    /// Whether the viewer may take part.
    AllowedStatus,
    /// The viewer's area query.
    AreaQuery,
    /// Saved places.
    Places,
}

impl RefreshTarget {
    /// Returns the wire key, e.g. `"refresh_members"`.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Privacy => "refresh_privacy",
            Self::Members => "refresh_members",
            Self::Area => "refresh_area",
            Self::Notifications => "refresh_notifications",
            Self::JoinRequests => "refresh_join_requests",
            Self::Chat => "refresh_chat",
            Self::UsersMissingLocations => "refresh_users_missing_locations",
            Self::RoomName => "refresh_room_name",
            Self::AllowedStatus => "refresh_allowed_status",
            Self::AreaQuery => "refresh_area_query",
            Self::Places => "refresh_places",
        }
    }
}

/// Tabs highlighted for unseen activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HighlightTarget {
    /// Chat tab.
    Chat,
    /// Area tab.
    Area,
    /// Vote tab.
    Vote,
}

impl HighlightTarget {
    /// Returns the wire key, e.g. `"highlight_chat"`.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Chat => "highlight_chat",
            Self::Area => "highlight_area",
            Self::Vote => "highlight_vote",
        }
    }
}

/// A room member as listed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberView {
    /// Firebase uid.
    pub username: String,
    /// Effective display name.
    pub display_name: String,
}

/// A pending join request as listed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinRequestView {
    /// Requesting user's id.
    pub user_id: UserId,
    /// Requesting user's uid, used to approve or reject.
    pub username: String,
    /// Requesting user's effective display name.
    pub display_name: String,
}

/// The latest notification of one room, as listed to clients.
///
/// Exactly one of the optional detail fields is set, matching the
/// notification kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationView {
    /// Room the notification belongs to.
    pub room: RoomId,
    /// Room display name.
    pub room_display_name: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Whether the recipient has seen it.
    pub read: bool,
    /// Whether the room is the one the viewer is connected to.
    pub current_room: bool,
    /// Message body, for new messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_content: Option<String>,
    /// Message author, for new messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_user_display_name: Option<String>,
    /// Joining user, for joins.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_joined_display_name: Option<String>,
    /// Leaving user, for departures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_left_display_name: Option<String>,
    /// User whose location changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_location_display_name: Option<String>,
    /// Requesting user, for join requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_request_user_display_name: Option<String>,
    /// Set when the room became public.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub now_public: Option<bool>,
    /// Set when the room became private.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub now_private: Option<bool>,
    /// User who saved a place.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added_place_display_name: Option<String>,
    /// User who voted for a place.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voted_place_display_name: Option<String>,
}

/// A 180-second sample isochrone for one Targomo service region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionIsochrone {
    /// GeoJSON feature returned by Targomo.
    pub isochrone: Value,
    /// Service region name.
    pub region: String,
    /// Sample travel mode (`walk` or `transit`).
    pub travel_mode: String,
}

/// An event for one WebSocket client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// A new chat line broadcast to the room.
    Message(String),
    /// A historical chat line replayed to one client.
    FetchedMessage(String),
    /// The viewer's effective display name.
    DisplayName(String),
    /// The viewer's location bubble, `None` when unset.
    LocationBubble(Option<LocationBubble>),
    /// The room intersection, `None` when unset.
    Area(Option<Intersection>),
    /// One isochrone feature per location bubble (`None` when the provider failed).
    Isochrones(Vec<Option<Value>>),
    /// Members without a location bubble.
    UsersMissingLocations(Vec<MemberView>),
    /// The room name.
    RoomName(String),
    /// The viewer's area query.
    AreaQuery(Option<String>),
    /// Room members.
    Members(Vec<MemberView>),
    /// Pending join requests.
    JoinRequests(Vec<JoinRequestView>),
    /// Latest notification per room.
    Notifications(Vec<NotificationView>),
    /// Sample isochrones around a point, one per region and mode.
    RegionIsochrones {
        /// Sample results (`None` when a provider call failed).
        region_isochrones: Vec<Option<RegionIsochrone>>,
        /// Sampled longitude.
        location_lng: f64,
        /// Sampled latitude.
        location_lat: f64,
    },
    /// The room privacy flag.
    Privacy(bool),
    /// The viewer may not take part yet.
    NotAllowed,
    /// The viewer may take part.
    Allowed,
    /// A view should be reloaded.
    Refresh(RefreshTarget),
    /// Members should recompute the intersection.
    RecalculateIntersection,
    /// No service region covers the submitted location.
    RegionNotFound,
    /// A tab has unseen activity.
    Highlight(HighlightTarget),
    /// Ranked places enriched with provider details.
    Places(Vec<Value>),
    /// First page of an area query search.
    AreaQueryResults {
        /// Search results.
        results: Vec<Value>,
        /// Token for the next page, empty when none.
        next_page_token: String,
    },
    /// A subsequent page of an area query search.
    NextPagePlaceResults {
        /// Search results.
        results: Vec<Value>,
        /// Token that produced this page.
        token_used: String,
        /// Token for the next page, empty when none.
        next_page_token: String,
    },
    /// A command failed.
    Error(String),
}

impl ClientEvent {
    /// Renders the event as its wire JSON object.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Message(m) => json!({ "message": m }),
            Self::FetchedMessage(m) => json!({ "fetching_message": m }),
            Self::DisplayName(n) => json!({ "new_display_name": n }),
            Self::LocationBubble(b) => json!({ "location_bubble": b.as_ref().map_or_else(|| json!({}), |b| json!(b)) }),
            Self::Area(a) => json!({ "area": a.as_ref().map_or_else(|| json!({}), |a| json!(a)) }),
            Self::Isochrones(i) => json!({ "isochrones": i }),
            Self::UsersMissingLocations(u) => json!({ "users_missing_locations": u }),
            Self::RoomName(n) => json!({ "new_room_name": n }),
            Self::AreaQuery(q) => json!({ "area_query": q }),
            Self::Members(m) => json!({ "members": m }),
            Self::JoinRequests(r) => json!({ "requests": r }),
            Self::Notifications(n) => json!({ "notifications": n }),
            Self::RegionIsochrones {
                region_isochrones,
                location_lng,
                location_lat,
            } => json!({
                "region_isochrones": region_isochrones,
                "location_lng": location_lng,
                "location_lat": location_lat,
            }),
            Self::Privacy(p) => json!({ "privacy": p }),
            Self::NotAllowed => json!({ "not_allowed": true }),
            Self::Allowed => json!({ "allowed": true }),
            Self::Refresh(target) => single_flag(target.key()),
            Self::RecalculateIntersection => json!({ "recalculate_intersection": true }),
            Self::RegionNotFound => json!({ "region_not_found": true }),
            Self::Highlight(target) => single_flag(target.key()),
            Self::Places(p) => json!({ "places": p }),
            Self::AreaQueryResults {
                results,
                next_page_token,
            } => json!({
                "area_query_results": results,
                "next_page_places_token": next_page_token,
            }),
            Self::NextPagePlaceResults {
                results,
                token_used,
                next_page_token,
            } => json!({
                "next_page_place_results": results,
                "token_used": token_used,
                "next_page_places_token": next_page_token,
            }),
            Self::Error(e) => json!({ "error": e }),
        }
    }
}

fn single_flag(key: &str) -> Value {
    let mut map = serde_json::Map::new();
    map.insert(key.to_string(), Value::Bool(true));
    Value::Object(map)
}

#[cfg(test)]
#[allow(clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn signals_render_as_true_flags() {
        let v = ClientEvent::Refresh(RefreshTarget::UsersMissingLocations).to_json();
        assert_eq!(v, json!({ "refresh_users_missing_locations": true }));
        let v = ClientEvent::Highlight(HighlightTarget::Vote).to_json();
        assert_eq!(v, json!({ "highlight_vote": true }));
        assert_eq!(ClientEvent::NotAllowed.to_json(), json!({ "not_allowed": true }));
    }

    #[test]
    fn missing_bubble_and_area_render_as_empty_objects() {
        assert_eq!(
            ClientEvent::LocationBubble(None).to_json(),
            json!({ "location_bubble": {} })
        );
        assert_eq!(ClientEvent::Area(None).to_json(), json!({ "area": {} }));
    }

    #[test]
    fn area_uses_geojson_type_key() {
        let area = Intersection {
            room_id: RoomId::new(),
            geometry_type: "Polygon".to_string(),
            coordinates: json!([[[0, 0], [1, 0], [1, 1], [0, 0]]]),
            centroid_lat: 0.5,
            centroid_lng: 0.6,
        };
        let v = ClientEvent::Area(Some(area)).to_json();
        assert_eq!(v["area"]["type"], "Polygon");
        assert_eq!(v["area"]["centroid_lng"], 0.6);
        assert!(v["area"].get("room_id").is_none());
    }

    #[test]
    fn paged_results_carry_tokens() {
        let v = ClientEvent::NextPagePlaceResults {
            results: vec![json!({"name": "Cafe"})],
            token_used: "t1".to_string(),
            next_page_token: String::new(),
        }
        .to_json();
        assert_eq!(v["token_used"], "t1");
        assert_eq!(v["next_page_places_token"], "");
        assert_eq!(v["next_page_place_results"][0]["name"], "Cafe");
    }
}
