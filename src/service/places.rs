//! Area queries, place search and voting.

use futures_util::future::join_all;
use serde_json::{Value, json};

use super::{Replies, RoomService, Session};
use crate::domain::{ClientEvent, NotificationKind, Place, RefreshTarget, rank_places};
use crate::error::AppError;

/// Place details fields shown in the place list.
pub const PLACE_DETAIL_FIELDS: [&str; 11] = [
    "formatted_phone_number",
    "geometry",
    "icon",
    "name",
    "opening_hours",
    "url",
    "place_id",
    "website",
    "rating",
    "price_level",
    "vicinity",
];

impl RoomService {
    /// Replies with the caller's area query.
    ///
    /// # Errors
    ///
    /// Propagates persistence failures.
    pub async fn fetch_area_query(&self, session: &Session) -> Result<Replies, AppError> {
        if !self.allowed(session).await? {
            return Ok(Vec::new());
        }
        let query = self
            .store
            .area_query(session.room_id, session.user_id)
            .await?;
        Ok(vec![
            ClientEvent::AreaQuery(query),
            ClientEvent::Refresh(RefreshTarget::AreaQuery),
        ])
    }

    /// Stores the caller's area query and replies with the first page of a
    /// text search around `(lat, lng)`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Upstream`] if the search fails.
    pub async fn update_area_query(
        &self,
        session: &Session,
        query: &str,
        lat: f64,
        lng: f64,
    ) -> Result<Replies, AppError> {
        if !self.allowed(session).await? {
            return Ok(Vec::new());
        }
        self.store
            .upsert_area_query(session.room_id, session.user_id, query)
            .await?;
        let page = self.places.text_search(query, lat, lng).await?;
        Ok(vec![ClientEvent::AreaQueryResults {
            results: page.results,
            next_page_token: page.next_page_token,
        }])
    }

    /// Replies with the search page behind `token`.
    ///
    /// Google rejects a fresh token for a short while, so `INVALID_REQUEST`
    /// answers are retried per the paging policy.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Upstream`] if a call fails or the token is still
    /// rejected after the last attempt.
    pub async fn next_page_places(&self, session: &Session, token: &str) -> Result<Replies, AppError> {
        if !self.allowed(session).await? {
            return Ok(Vec::new());
        }
        for attempt in 1..=self.paging.max_attempts {
            let page = self.places.next_page(token).await?;
            if !page.is_invalid_request() {
                return Ok(vec![ClientEvent::NextPagePlaceResults {
                    results: page.results,
                    token_used: token.to_string(),
                    next_page_token: page.next_page_token,
                }]);
            }
            tracing::info!(attempt, "next page token not valid yet");
            if attempt < self.paging.max_attempts {
                tokio::time::sleep(self.paging.retry_delay).await;
            }
        }
        Err(AppError::Upstream(format!(
            "google maps: next page token still invalid after {} attempts",
            self.paging.max_attempts
        )))
    }

    /// Saves a place to the room, refreshing its last-saved time.
    ///
    /// # Errors
    ///
    /// Propagates persistence failures.
    pub async fn save_place(
        &self,
        session: &Session,
        place_id: &str,
        lat: f64,
        lng: f64,
    ) -> Result<Replies, AppError> {
        if !self.allowed(session).await? {
            return Ok(Vec::new());
        }
        let room = session.room_id;
        let place = self.store.upsert_place(room, place_id, lat, lng, true).await?;
        self.notify_members(room, NotificationKind::AddedPlace(session.user_id))
            .await?;
        tracing::info!(%room, place = %place.key, place_id, "place saved");
        self.refresh(room, &[RefreshTarget::Places]);
        self.notify_member_rooms(room).await?;
        Ok(Vec::new())
    }

    /// Replies with the room's top places, enriched with Google details,
    /// vote counts and, when the caller has a bubble, travel time and
    /// distance from it.
    ///
    /// # Errors
    ///
    /// Propagates persistence failures. Failed details calls yield a bare
    /// `{"place_id": ...}` entry; a failed distance matrix leaves the
    /// travel fields out.
    pub async fn fetch_places(&self, session: &Session) -> Result<Replies, AppError> {
        if !self.allowed(session).await? {
            return Ok(Vec::new());
        }
        let room = session.room_id;
        let ranked = rank_places(self.store.place_tallies(room, session.user_id).await?);
        let bubble = self
            .store
            .location_bubble(room, session.user_id)
            .await?;

        let details = join_all(ranked.iter().map(|t| self.place_details(session, &t.place)));
        let matrix = async {
            let bubble = bubble.as_ref().filter(|_| !ranked.is_empty())?;
            let destinations: Vec<String> =
                ranked.iter().map(|t| t.place.place_id.clone()).collect();
            match self
                .places
                .distance_matrix(
                    &bubble.place_id,
                    &destinations,
                    bubble.transportation.distance_matrix_mode(),
                )
                .await
            {
                Ok(elements) => Some(elements),
                Err(e) => {
                    tracing::warn!(error = %e, "distance matrix failed");
                    None
                }
            }
        };
        let (mut results, matrix) = tokio::join!(details, matrix);

        for (result, tally) in results.iter_mut().zip(&ranked) {
            if let Value::Object(fields) = result {
                fields.insert("total_votes".to_string(), json!(tally.total_votes));
                fields.insert("user_voted_for".to_string(), json!(tally.user_voted_for));
            }
        }
        if let Some(elements) = matrix {
            for (result, element) in results.iter_mut().zip(&elements) {
                if let Value::Object(fields) = result {
                    let travel_time = element.get("duration").cloned().unwrap_or(Value::Null);
                    let distance = element.get("distance").cloned().unwrap_or(Value::Null);
                    fields.insert("travel_time".to_string(), travel_time);
                    fields.insert("distance".to_string(), distance);
                }
            }
        }
        Ok(vec![ClientEvent::Places(results)])
    }

    /// Fetches a place's details, following a reissued Google place id.
    ///
    /// A reissued id is stored over the old one without touching recency,
    /// and room members are notified of the caller adding a place.
    async fn place_details(&self, session: &Session, place: &Place) -> Value {
        let details = match self
            .places
            .place_details(&place.place_id, &PLACE_DETAIL_FIELDS)
            .await
        {
            Ok(details) => details,
            Err(e) => {
                tracing::warn!(place_id = %place.place_id, error = %e, "place details failed");
                return json!({ "place_id": place.place_id });
            }
        };

        let fresh_id = details.get("place_id").and_then(Value::as_str);
        let location = details.pointer("/geometry/location");
        let lat = location.and_then(|l| l.get("lat")).and_then(Value::as_f64);
        let lng = location.and_then(|l| l.get("lng")).and_then(Value::as_f64);
        if let (Some(fresh_id), Some(lat), Some(lng)) = (fresh_id, lat, lng)
            && fresh_id != place.place_id
        {
            tracing::debug!(old = %place.place_id, new = fresh_id, "place id reissued");
            if let Err(e) = self.store_reissued(session, fresh_id, lat, lng).await {
                tracing::warn!(error = %e, "failed to store reissued place id");
            }
        }
        details
    }

    async fn store_reissued(
        &self,
        session: &Session,
        place_id: &str,
        lat: f64,
        lng: f64,
    ) -> Result<(), AppError> {
        let room = session.room_id;
        self.store.upsert_place(room, place_id, lat, lng, false).await?;
        self.notify_members(room, NotificationKind::AddedPlace(session.user_id))
            .await
    }

    /// Moves the caller's single vote in this room to `place_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::PlaceNotFound`] if no place with that Google id
    /// is saved in the room.
    pub async fn vote_place(&self, session: &Session, place_id: &str) -> Result<Replies, AppError> {
        if !self.allowed(session).await? {
            return Ok(Vec::new());
        }
        let room = session.room_id;
        let place = self
            .store
            .place_by_place_id(room, place_id)
            .await?
            .ok_or_else(|| AppError::PlaceNotFound(place_id.to_string()))?;
        self.store
            .upsert_vote(room, session.user_id, place.key)
            .await?;
        self.notify_members(room, NotificationKind::VotedPlace(session.user_id))
            .await?;
        tracing::info!(%room, user_id = %session.user_id, place_id, "vote cast");
        self.notify_member_rooms(room).await?;
        self.refresh(room, &[RefreshTarget::Places]);
        Ok(Vec::new())
    }
}
