//! Candidate meeting places and their vote ranking.

use chrono::{DateTime, Utc};

use super::{PlaceKey, RoomId};

/// Number of places returned by a place listing.
pub const PLACE_LIST_LIMIT: usize = 10;

/// A place saved to a room.
///
/// Places are unique per `(room, lat, lng)`; the Google place id may be
/// refreshed when Google reissues it.
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    /// Database id.
    pub key: PlaceKey,
    /// Room the place was saved to.
    pub room_id: RoomId,
    /// Google place id.
    pub place_id: String,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Last time a member saved this place.
    pub last_saved: DateTime<Utc>,
}

/// A place with its vote count as seen by one user.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceTally {
    /// The place.
    pub place: Place,
    /// Number of votes cast for this place.
    pub total_votes: u32,
    /// Whether the viewing user's vote is on this place.
    pub user_voted_for: bool,
}

/// Orders tallies for display and keeps the top [`PLACE_LIST_LIMIT`].
///
/// Ordering is by the viewer's own vote, then total votes, then most
/// recently saved, all descending. Entries sharing a Google place id with
/// an earlier entry are folded into it: their votes are added and the
/// viewer flag is combined.
#[must_use]
pub fn rank_places(mut tallies: Vec<PlaceTally>) -> Vec<PlaceTally> {
    tallies.sort_by(|a, b| {
        b.user_voted_for
            .cmp(&a.user_voted_for)
            .then_with(|| b.total_votes.cmp(&a.total_votes))
            .then_with(|| b.place.last_saved.cmp(&a.place.last_saved))
    });
    tallies.truncate(PLACE_LIST_LIMIT);

    let mut ranked: Vec<PlaceTally> = Vec::with_capacity(tallies.len());
    for tally in tallies {
        if let Some(existing) = ranked
            .iter_mut()
            .find(|t| t.place.place_id == tally.place.place_id)
        {
            existing.total_votes = existing.total_votes.saturating_add(tally.total_votes);
            existing.user_voted_for |= tally.user_voted_for;
        } else {
            ranked.push(tally);
        }
    }
    ranked
}
