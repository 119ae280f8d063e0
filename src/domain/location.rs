//! Location bubbles and the shared intersection area of a room.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{RoomId, UserId};
use crate::error::AppError;

/// How a user travels to the meeting point.
///
/// The lowercase names are the Targomo travel-mode keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transportation {
    /// On foot.
    Walk,
    /// By bicycle.
    Bike,
    /// By car.
    Car,
    /// By public transport.
    Transit,
}

impl Transportation {
    /// Returns the Targomo travel-mode key.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Walk => "walk",
            Self::Bike => "bike",
            Self::Car => "car",
            Self::Transit => "transit",
        }
    }

    /// Returns the Google Distance Matrix `mode` parameter.
    #[must_use]
    pub const fn distance_matrix_mode(self) -> &'static str {
        match self {
            Self::Walk => "walking",
            Self::Bike => "bicycling",
            Self::Car => "driving",
            Self::Transit => "transit",
        }
    }
}

impl fmt::Display for Transportation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transportation {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "walk" => Ok(Self::Walk),
            "bike" => Ok(Self::Bike),
            "car" => Ok(Self::Car),
            "transit" => Ok(Self::Transit),
            other => Err(AppError::InvalidRequest(format!(
                "unknown transportation: {other}"
            ))),
        }
    }
}

/// A user's starting point and travel budget within a room.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationBubble {
    /// Owner.
    #[serde(skip)]
    pub user_id: UserId,
    /// Room.
    #[serde(skip)]
    pub room_id: RoomId,
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
    /// Targomo service region covering the starting point.
    pub region: String,
    /// Google place id of the starting point.
    pub place_id: String,
}

impl LocationBubble {
    /// Returns the travel budget in seconds.
    #[must_use]
    pub fn travel_seconds(&self) -> u32 {
        self.hours
            .saturating_mul(3600)
            .saturating_add(self.minutes.saturating_mul(60))
    }
}

/// The area every member of a room can reach, as computed by a client
/// from the members' isochrones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intersection {
    /// Room.
    #[serde(skip)]
    pub room_id: RoomId,
    /// GeoJSON geometry type (e.g. `"Polygon"`).
    #[serde(rename = "type")]
    pub geometry_type: String,
    /// GeoJSON coordinates, kept verbatim.
    pub coordinates: serde_json::Value,
    /// Centroid latitude.
    pub centroid_lat: f64,
    /// Centroid longitude.
    pub centroid_lng: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transportation_parses_known_modes() {
        assert_eq!("bike".parse::<Transportation>().ok(), Some(Transportation::Bike));
        assert!("boat".parse::<Transportation>().is_err());
    }

    #[test]
    fn distance_matrix_modes() {
        assert_eq!(Transportation::Bike.distance_matrix_mode(), "bicycling");
        assert_eq!(Transportation::Car.distance_matrix_mode(), "driving");
        assert_eq!(Transportation::Walk.distance_matrix_mode(), "walking");
        assert_eq!(Transportation::Transit.distance_matrix_mode(), "transit");
    }

    #[test]
    fn travel_budget_in_seconds() {
        let bubble = LocationBubble {
            user_id: UserId::new(1),
            room_id: RoomId::new(),
            address: "1 Main St".to_string(),
            latitude: 0.0,
            longitude: 0.0,
            transportation: Transportation::Walk,
            hours: 1,
            minutes: 30,
            region: "northamerica".to_string(),
            place_id: "abc".to_string(),
        };
        assert_eq!(bubble.travel_seconds(), 5400);
    }
}
