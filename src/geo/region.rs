//! Targomo service-region detection.
//!
//! Targomo computes isochrones per region. To find the region serving a
//! point, a short walk and transit isochrone is requested from every
//! region; regions whose isochrone reaches the point are candidates.

use futures_util::future::join_all;

use super::{IsochroneProvider, PolygonRequest};
use crate::domain::geometry::{Point, Shape};
use crate::domain::{RegionIsochrone, Transportation};

/// Targomo service regions, in sample order.
pub static SERVICE_REGIONS: [&str; 9] = [
    "africa",
    "central_america",
    "south_america",
    "australia",
    "britishisles",
    "asia",
    "easterneurope",
    "northamerica",
    "westcentraleurope",
];

/// Travel budget of a sample isochrone.
pub const SAMPLE_TRAVEL_SECONDS: u32 = 180;

/// Maximum distance in degrees between a point and a sample isochrone for
/// the region to still count as serving it.
pub const REGION_TOLERANCE: f64 = 1e-3;

/// Travel modes used for samples.
static SAMPLE_MODES: [Transportation; 2] = [Transportation::Walk, Transportation::Transit];

/// Requests a walk and a transit sample isochrone around `(lat, lng)` from
/// every service region, concurrently.
///
/// Results are ordered by region, walk before transit. A failed sample is
/// logged and yields `None`.
pub async fn sample_service_regions(
    provider: &dyn IsochroneProvider,
    lat: f64,
    lng: f64,
) -> Vec<Option<RegionIsochrone>> {
    let samples = SERVICE_REGIONS.iter().flat_map(|region| {
        SAMPLE_MODES.iter().map(move |mode| {
            let request = PolygonRequest {
                lat,
                lng,
                id: format!("region for {lat}, {lng}"),
                mode: *mode,
                seconds: SAMPLE_TRAVEL_SECONDS,
            };
            async move {
                match provider.polygon(region, &request).await {
                    Ok(isochrone) => Some(RegionIsochrone {
                        isochrone,
                        region: (*region).to_string(),
                        travel_mode: mode.as_str().to_string(),
                    }),
                    Err(e) => {
                        tracing::warn!(region, mode = %mode, error = %e, "region sample failed");
                        None
                    }
                }
            }
        })
    });
    join_all(samples).await
}

#[derive(Debug)]
struct Candidate<'a> {
    region: &'a str,
    travel_mode: &'a str,
    area: f64,
}

/// Picks the service region for `point` from sample results.
///
/// The first sample whose isochrone covers the point, or lies within
/// [`REGION_TOLERANCE`] of it, is taken. A later candidate replaces it when
/// the current pick is a walk sample, the candidate is a larger transit
/// sample, and the candidate is not `central_america`.
#[must_use]
pub fn select_service_region(samples: &[Option<RegionIsochrone>], point: Point) -> Option<String> {
    let mut candidates = samples.iter().flatten().filter_map(|sample| {
        let geometry = sample.isochrone.get("geometry")?;
        let shape = Shape::from_geojson(geometry)?;
        let reaches = shape.covers(point) || shape.distance(point) < REGION_TOLERANCE;
        reaches.then(|| Candidate {
            region: &sample.region,
            travel_mode: &sample.travel_mode,
            area: shape.area(),
        })
    });

    let first = candidates.next()?;
    let chosen = candidates.fold(first, |current, candidate| {
        if current.area < candidate.area
            && current.travel_mode == Transportation::Walk.as_str()
            && candidate.travel_mode == Transportation::Transit.as_str()
            && candidate.region != "central_america"
        {
            candidate
        } else {
            current
        }
    });
    Some(chosen.region.to_string())
}
