//! Location bubbles, service regions and the room intersection.

use futures_util::future::join_all;
use serde::Deserialize;

use super::{Replies, RoomService, Session, member_view};
use crate::domain::geometry::Point;
use crate::domain::{
    ClientEvent, Intersection, LocationBubble, NotificationKind, RefreshTarget, Transportation,
};
use crate::error::AppError;
use crate::geo::PolygonRequest;
use crate::geo::region::{sample_service_regions, select_service_region};

/// A user's new starting point and travel budget.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BubbleUpdate {
    /// Free-form address as entered.
    pub address: String,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Travel mode.
    pub transportation: Transportation,
    /// Hours of the travel budget.
    pub hours: u32,
    /// Minutes of the travel budget.
    pub minutes: u32,
    /// Google place id of the address.
    pub place_id: String,
}

impl RoomService {
    /// Samples every Targomo service region around a point and replies with
    /// the sample isochrones.
    ///
    /// # Errors
    ///
    /// Propagates persistence failures; failed samples are reported as
    /// `null` entries.
    pub async fn isochrone_service_regions(
        &self,
        session: &Session,
        latitude: f64,
        longitude: f64,
    ) -> Result<Replies, AppError> {
        if !self.allowed(session).await? {
            return Ok(Vec::new());
        }
        let region_isochrones =
            sample_service_regions(self.isochrones.as_ref(), latitude, longitude).await;
        Ok(vec![ClientEvent::RegionIsochrones {
            region_isochrones,
            location_lng: longitude,
            location_lat: latitude,
        }])
    }

    /// Stores the intersection computed by a client.
    ///
    /// # Errors
    ///
    /// Propagates persistence failures.
    pub async fn update_intersection(
        &self,
        session: &Session,
        mut area: Intersection,
    ) -> Result<Replies, AppError> {
        if !self.allowed(session).await? {
            return Ok(Vec::new());
        }
        area.room_id = session.room_id;
        self.store.upsert_intersection(&area).await?;
        self.refresh(session.room_id, &[RefreshTarget::Area]);
        Ok(Vec::new())
    }

    /// Removes the stored intersection.
    ///
    /// # Errors
    ///
    /// Propagates persistence failures.
    pub async fn delete_intersection(&self, session: &Session) -> Result<Replies, AppError> {
        if !self.allowed(session).await? {
            return Ok(Vec::new());
        }
        self.store.delete_intersection(session.room_id).await?;
        self.refresh(session.room_id, &[RefreshTarget::Area]);
        Ok(Vec::new())
    }

    /// Replies with the stored intersection and asks the caller to reload
    /// the views that depend on it.
    ///
    /// # Errors
    ///
    /// Propagates persistence failures.
    pub async fn fetch_intersection(&self, session: &Session) -> Result<Replies, AppError> {
        if !self.allowed(session).await? {
            return Ok(Vec::new());
        }
        let area = self.store.intersection(session.room_id).await?;
        Ok(vec![
            ClientEvent::Area(area),
            ClientEvent::Refresh(RefreshTarget::UsersMissingLocations),
            ClientEvent::Refresh(RefreshTarget::AreaQuery),
        ])
    }

    /// Lists the members that have not shared a location yet.
    ///
    /// # Errors
    ///
    /// Propagates persistence failures.
    pub async fn fetch_users_missing_locations(
        &self,
        session: &Session,
    ) -> Result<Replies, AppError> {
        if !self.allowed(session).await? {
            return Ok(Vec::new());
        }
        let bubbles = self.store.location_bubbles(session.room_id).await?;
        let missing = self
            .store
            .members(session.room_id)
            .await?
            .iter()
            .filter(|m| !bubbles.iter().any(|b| b.user_id == m.id))
            .map(member_view)
            .collect();
        Ok(vec![ClientEvent::UsersMissingLocations(missing)])
    }

    /// Replies with the caller's bubble, refreshing its Google place id
    /// first.
    ///
    /// # Errors
    ///
    /// Propagates persistence failures; a failed refresh keeps the stored
    /// place id.
    pub async fn fetch_location_bubble(&self, session: &Session) -> Result<Replies, AppError> {
        if !self.allowed(session).await? {
            return Ok(Vec::new());
        }
        let mut bubble = self
            .store
            .location_bubble(session.room_id, session.user_id)
            .await?;
        if let Some(bubble) = bubble.as_mut().filter(|b| !b.place_id.is_empty()) {
            match self.places.place_details(&bubble.place_id, &["place_id"]).await {
                Ok(details) => {
                    let fresh = details.get("place_id").and_then(serde_json::Value::as_str);
                    if let Some(fresh) = fresh.filter(|id| *id != bubble.place_id) {
                        tracing::debug!(old = %bubble.place_id, new = fresh, "bubble place id reissued");
                        bubble.place_id = fresh.to_string();
                        self.store.upsert_location_bubble(bubble).await?;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "bubble place id refresh failed"),
            }
        }
        Ok(vec![ClientEvent::LocationBubble(bubble)])
    }

    /// Sets the caller's bubble after locating the service region of its
    /// starting point.
    ///
    /// Replies `region_not_found` when no region covers the point.
    ///
    /// # Errors
    ///
    /// Propagates persistence failures.
    pub async fn update_location_bubble(
        &self,
        session: &Session,
        update: BubbleUpdate,
    ) -> Result<Replies, AppError> {
        if !self.allowed(session).await? {
            return Ok(Vec::new());
        }
        let room = session.room_id;
        let samples =
            sample_service_regions(self.isochrones.as_ref(), update.latitude, update.longitude)
                .await;
        let Some(region) =
            select_service_region(&samples, Point::new(update.longitude, update.latitude))
        else {
            tracing::error!(
                %room,
                lat = update.latitude,
                lng = update.longitude,
                "no isochrone service region covers location"
            );
            return Ok(vec![ClientEvent::RegionNotFound]);
        };

        let bubble = LocationBubble {
            user_id: session.user_id,
            room_id: room,
            address: update.address,
            latitude: update.latitude,
            longitude: update.longitude,
            transportation: update.transportation,
            hours: update.hours,
            minutes: update.minutes,
            region,
            place_id: update.place_id,
        };
        let created = self.store.upsert_location_bubble(&bubble).await?;
        self.notify_members(room, NotificationKind::UserLocation(session.user_id))
            .await?;
        tracing::info!(%room, user_id = %session.user_id, region = %bubble.region, created, "location bubble saved");

        let _ = self
            .channel_layer
            .group_send(room, ClientEvent::RecalculateIntersection);
        for other in self.member_rooms(room).await? {
            self.refresh(
                other,
                &[
                    RefreshTarget::Notifications,
                    RefreshTarget::UsersMissingLocations,
                ],
            );
        }
        Ok(Vec::new())
    }

    /// Fetches one isochrone per bubble so the caller can intersect them.
    ///
    /// With too few bubbles for a meaningful intersection the stored one is
    /// dropped instead.
    ///
    /// # Errors
    ///
    /// Propagates persistence failures; failed isochrone calls are reported
    /// as `null` entries.
    pub async fn calculate_intersection(&self, session: &Session) -> Result<Replies, AppError> {
        if !self.allowed(session).await? {
            return Ok(Vec::new());
        }
        let room = session.room_id;
        let bubbles = self.store.location_bubbles(room).await?;
        let members = self.store.members(room).await?.len();

        let enough = !bubbles.is_empty()
            && ((members > 1 && bubbles.len() > 1) || (members == 1 && bubbles.len() == 1));
        if !enough {
            self.store.delete_intersection(room).await?;
            self.refresh(room, &[RefreshTarget::Area]);
            return Ok(Vec::new());
        }

        let calls = bubbles.iter().map(|bubble| async move {
            let request = PolygonRequest {
                lat: bubble.latitude,
                lng: bubble.longitude,
                id: bubble.user_id.to_string(),
                mode: bubble.transportation,
                seconds: bubble.travel_seconds(),
            };
            match self.isochrones.polygon(&bubble.region, &request).await {
                Ok(isochrone) => Some(isochrone),
                Err(e) => {
                    tracing::warn!(user_id = %bubble.user_id, error = %e, "isochrone failed");
                    None
                }
            }
        });
        Ok(vec![ClientEvent::Isochrones(join_all(calls).await)])
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::indexing_slicing)]
mod tests {
    use serde_json::json;
    use tokio_test::assert_ok;

    use super::*;
    use crate::domain::RoomId;
    use crate::persistence::Store;
    use crate::service::testing::Harness;

    fn berlin(place_id: &str) -> BubbleUpdate {
        BubbleUpdate {
            address: "Alexanderplatz".to_string(),
            latitude: 52.52,
            longitude: 13.41,
            transportation: Transportation::Bike,
            hours: 0,
            minutes: 30,
            place_id: place_id.to_string(),
        }
    }

    #[tokio::test]
    async fn bubble_gets_detected_region_and_notifies() {
        let mut h = Harness::new();
        let room = RoomId::new();
        let (ada, session) = h.member("ada", room).await;
        h.drain();

        let replies = assert_ok!(h.service.update_location_bubble(&session, berlin("p1")).await);
        assert!(replies.is_empty());
        let stored = assert_ok!(h.store.location_bubble(room, ada.id).await);
        let Some(stored) = stored else {
            panic!("bubble not stored");
        };
        assert_eq!(stored.region, "westcentraleurope");
        assert_eq!(stored.travel_seconds(), 1800);

        let events = h.drain_group(room);
        assert_eq!(
            events,
            vec![
                ClientEvent::RecalculateIntersection,
                ClientEvent::Refresh(RefreshTarget::Notifications),
                ClientEvent::Refresh(RefreshTarget::UsersMissingLocations),
            ]
        );
        let missing = assert_ok!(h.service.fetch_users_missing_locations(&session).await);
        assert_eq!(missing, vec![ClientEvent::UsersMissingLocations(Vec::new())]);
    }

    #[tokio::test]
    async fn unknown_region_is_reported() {
        let h = Harness::with_region("atlantis");
        let room = RoomId::new();
        let (ada, session) = h.member("ada", room).await;
        let replies = assert_ok!(h.service.update_location_bubble(&session, berlin("p1")).await);
        assert_eq!(replies, vec![ClientEvent::RegionNotFound]);
        assert!(assert_ok!(h.store.location_bubble(room, ada.id).await).is_none());
    }

    #[tokio::test]
    async fn fetched_bubble_follows_reissued_place_id() {
        let h = Harness::new();
        let room = RoomId::new();
        let (ada, session) = h.member("ada", room).await;
        assert_ok!(h.service.update_location_bubble(&session, berlin("old")).await);
        h.places.add_details("old", json!({ "place_id": "new" })).await;

        let replies = assert_ok!(h.service.fetch_location_bubble(&session).await);
        let [ClientEvent::LocationBubble(Some(bubble))] = replies.as_slice() else {
            panic!("expected a bubble, got {replies:?}");
        };
        assert_eq!(bubble.place_id, "new");
        let stored = assert_ok!(h.store.location_bubble(room, ada.id).await);
        assert_eq!(stored.map(|b| b.place_id).as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn missing_bubble_replies_empty() {
        let h = Harness::new();
        let (_, session) = h.member("ada", RoomId::new()).await;
        let replies = assert_ok!(h.service.fetch_location_bubble(&session).await);
        assert_eq!(replies, vec![ClientEvent::LocationBubble(None)]);
    }

    #[tokio::test]
    async fn intersection_needs_enough_bubbles() {
        let mut h = Harness::new();
        let room = RoomId::new();
        let (_, ada) = h.member("ada", room).await;
        let (_, grace) = h.member("grace", room).await;
        assert_ok!(h.service.update_location_bubble(&ada, berlin("p1")).await);
        h.drain();

        let replies = assert_ok!(h.service.calculate_intersection(&ada).await);
        assert!(replies.is_empty());
        assert_eq!(h.drain_group(room), vec![ClientEvent::Refresh(RefreshTarget::Area)]);

        assert_ok!(h.service.update_location_bubble(&grace, berlin("p2")).await);
        let replies = assert_ok!(h.service.calculate_intersection(&ada).await);
        let [ClientEvent::Isochrones(isochrones)] = replies.as_slice() else {
            panic!("expected isochrones, got {replies:?}");
        };
        assert_eq!(isochrones.len(), 2);
        assert!(isochrones.iter().all(Option::is_some));
        assert_eq!(isochrones[0].as_ref().map(|i| i["properties"]["time"].clone()), Some(json!(1800)));
    }

    #[tokio::test]
    async fn stored_intersection_round_trip() {
        let mut h = Harness::new();
        let room = RoomId::new();
        let (_, session) = h.member("ada", room).await;
        h.drain();

        let area: Intersection = assert_ok!(serde_json::from_value(json!({
            "type": "Polygon",
            "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 0]]],
            "centroid_lng": 0.6,
            "centroid_lat": 0.3,
        })));
        assert_ok!(h.service.update_intersection(&session, area).await);
        assert_eq!(h.drain_group(room), vec![ClientEvent::Refresh(RefreshTarget::Area)]);

        let replies = assert_ok!(h.service.fetch_intersection(&session).await);
        let ClientEvent::Area(Some(stored)) = &replies[0] else {
            panic!("expected an area, got {replies:?}");
        };
        assert_eq!(stored.room_id, room);
        assert_eq!(replies[2], ClientEvent::Refresh(RefreshTarget::AreaQuery));

        assert_ok!(h.service.delete_intersection(&session).await);
        let replies = assert_ok!(h.service.fetch_intersection(&session).await);
        assert_eq!(replies[0], ClientEvent::Area(None));
    }

    #[tokio::test]
    async fn region_sample_reply_carries_location() {
        let h = Harness::new();
        let (_, session) = h.member("ada", RoomId::new()).await;
        let replies = assert_ok!(h.service.isochrone_service_regions(&session, 52.5, 13.4).await);
        let [ClientEvent::RegionIsochrones { region_isochrones, location_lng, location_lat }] =
            replies.as_slice()
        else {
            panic!("expected region isochrones, got {replies:?}");
        };
        assert_eq!(region_isochrones.iter().flatten().count(), 2);
        assert!((location_lng - 13.4).abs() < f64::EPSILON);
        assert!((location_lat - 52.5).abs() < f64::EPSILON);
    }
}
