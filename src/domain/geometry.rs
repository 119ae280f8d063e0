//! Isochrone shapes in lng/lat degrees.
//!
//! GeoJSON geometries are converted with `geojson` into `geo` types.
//! Service-region detection needs point coverage, distance from a point and
//! area, all planar in degree space, which is adequate for comparing
//! isochrones of the same origin.

use geo::{Area, EuclideanDistance, Intersects, MultiPolygon};
use serde_json::Value;

pub use geo::Point;

/// A polygonal isochrone.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape(MultiPolygon<f64>);

impl Default for Shape {
    fn default() -> Self {
        Self(MultiPolygon::new(Vec::new()))
    }
}

impl Shape {
    /// Parses a GeoJSON `Polygon` or `MultiPolygon` geometry object.
    ///
    /// Returns `None` if the object is not one of those types or its
    /// coordinates are malformed.
    #[must_use]
    pub fn from_geojson(geometry: &Value) -> Option<Self> {
        let geometry: geojson::Geometry = serde_json::from_value(geometry.clone()).ok()?;
        match geo::Geometry::<f64>::try_from(geometry).ok()? {
            geo::Geometry::Polygon(polygon) => Some(Self(MultiPolygon::new(vec![polygon]))),
            geo::Geometry::MultiPolygon(polygons) => Some(Self(polygons)),
            _ => None,
        }
    }

    /// Returns `true` if the point lies inside or on the boundary of any
    /// member polygon.
    #[must_use]
    pub fn covers(&self, p: Point) -> bool {
        self.0.intersects(&p)
    }

    /// Returns the distance from the point to the shape (0 when covered).
    ///
    /// An empty shape is infinitely far away.
    #[must_use]
    pub fn distance(&self, p: Point) -> f64 {
        if self.0.0.is_empty() {
            return f64::INFINITY;
        }
        p.euclidean_distance(&self.0)
    }

    /// Returns the total area in square degrees.
    #[must_use]
    pub fn area(&self) -> f64 {
        self.0.unsigned_area()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    fn square_with_hole() -> Shape {
        let geometry = json!({
            "type": "MultiPolygon",
            "coordinates": [[
                [[0.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 4.0], [0.0, 0.0]],
                [[1.0, 1.0], [2.0, 1.0], [2.0, 2.0], [1.0, 2.0], [1.0, 1.0]]
            ]]
        });
        let Some(shape) = Shape::from_geojson(&geometry) else {
            panic!("valid geometry must parse");
        };
        shape
    }

    #[test]
    fn parses_polygon_and_multipolygon() {
        let poly = json!({"type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 0]]]});
        assert!(Shape::from_geojson(&poly).is_some());
        assert!(Shape::from_geojson(&json!({"type": "Point", "coordinates": [0, 0]})).is_none());
        assert!(Shape::from_geojson(&json!({"type": "Polygon", "coordinates": [[["x"]]]})).is_none());
    }

    #[test]
    fn covers_interior_and_boundary_but_not_holes() {
        let shape = square_with_hole();
        assert!(shape.covers(Point::new(3.0, 3.0)));
        assert!(shape.covers(Point::new(4.0, 2.0)));
        assert!(!shape.covers(Point::new(1.5, 1.5)));
        assert!(shape.covers(Point::new(1.0, 1.5)));
        assert!(!shape.covers(Point::new(5.0, 5.0)));
    }

    #[test]
    fn distance_to_outside_point() {
        let shape = square_with_hole();
        assert!((shape.distance(Point::new(5.0, 2.0)) - 1.0).abs() < 1e-12);
        assert!((shape.distance(Point::new(1.5, 1.25)) - 0.25).abs() < 1e-12);
        assert!(shape.distance(Point::new(3.0, 3.0)).abs() < f64::EPSILON);
        assert!(Shape::default().distance(Point::new(0.0, 0.0)).is_infinite());
    }

    #[test]
    fn area_subtracts_holes() {
        assert!((square_with_hole().area() - 15.0).abs() < 1e-12);
    }
}
