use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const EARTH_RADIUS: f64 = 6371000.0; // unit: meter

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvalidGeometry {
    #[error("polyline has no coordinates")]
    Empty,
    #[error("coordinate out of range: longitude={longitude}, latitude={latitude}")]
    OutOfRange { longitude: f64, latitude: f64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub latitude: f64,
    pub longitude: f64,
}

impl Point {
    // GeoJSON and most map data order coordinates as `[lon, lat]`.
    pub fn from_lon_lat(longitude: f64, latitude: f64) -> Self {
        Point {
            latitude,
            longitude,
        }
    }

    pub fn validate(&self) -> Result<(), InvalidGeometry> {
        // `contains` is false for NaN, so non-finite values are rejected too.
        if (-180.0..=180.0).contains(&self.longitude) && (-90.0..=90.0).contains(&self.latitude) {
            Ok(())
        } else {
            Err(InvalidGeometry::OutOfRange {
                longitude: self.longitude,
                latitude: self.latitude,
            })
        }
    }

    pub fn haversine_distance(&self, other: &Point) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();

        let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS * h.sqrt().min(1.0).asin()
    }
}

/// Distance in meters from `point` to the closest location on `polyline`,
/// considering every consecutive pair as a line segment (not only the
/// vertices). A polyline with a single coordinate is treated as a point.
pub fn distance_to_polyline(point: &Point, polyline: &[Point]) -> Result<f64, InvalidGeometry> {
    point.validate()?;
    validate_polyline(polyline)?;

    if polyline.len() == 1 {
        return Ok(point.haversine_distance(&polyline[0]));
    }

    let distance = polyline
        .iter()
        .tuple_windows()
        .map(|(a, b)| distance_to_segment(point, a, b))
        .fold(f64::INFINITY, f64::min);
    Ok(distance)
}

pub fn validate_polyline(polyline: &[Point]) -> Result<(), InvalidGeometry> {
    if polyline.is_empty() {
        return Err(InvalidGeometry::Empty);
    }
    polyline.iter().try_for_each(Point::validate)
}

// The closest point on `a`-`b` is found in a local equirectangular projection
// centered on `point`, then measured back on the sphere. Road segments are
// short enough for the projection error to be negligible.
fn distance_to_segment(point: &Point, a: &Point, b: &Point) -> f64 {
    let cos_lat = point.latitude.to_radians().cos();
    let project = |p: &Point| {
        (
            (p.longitude - point.longitude) * cos_lat,
            p.latitude - point.latitude,
        )
    };
    let (ax, ay) = project(a);
    let (bx, by) = project(b);
    let (dx, dy) = (bx - ax, by - ay);

    let length_sq = dx * dx + dy * dy;
    if length_sq < 1e-20 {
        // zero-length segment
        return point.haversine_distance(a);
    }

    let t = (-(ax * dx + ay * dy) / length_sq).clamp(0.0, 1.0);
    let closest = Point {
        latitude: a.latitude + t * (b.latitude - a.latitude),
        longitude: a.longitude + t * (b.longitude - a.longitude),
    };
    point.haversine_distance(&closest)
}
