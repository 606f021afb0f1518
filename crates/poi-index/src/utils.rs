//! Geographic coordinate conversions onto the normalized world square

use crate::morton::Point;
use geo::{Coord, Rect};
use std::f64::consts::PI;

/// Maximum latitude that can be represented in Web Mercator
pub const MAX_LATITUDE: f64 = 85.05112878;

/// Project WGS84 `(lat, lon)` in degrees onto the unit square
///
/// `x` grows eastwards from the antimeridian, `y` grows southwards from the
/// northern Mercator limit, matching the tile grid layout.
#[inline(always)]
pub fn project(lat: f64, lon: f64) -> Coord<f64> {
    let lat_rad = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    Coord {
        x: (lon + 180.0) / 360.0,
        y: (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0,
    }
}

/// Inverse of [`project`], returning `(lat, lon)` in degrees
#[inline(always)]
pub fn unproject(coord: Coord<f64>) -> (f64, f64) {
    let lon = coord.x * 360.0 - 180.0;
    let lat = (PI * (1.0 - 2.0 * coord.y)).sinh().atan().to_degrees();
    (lat, lon)
}

/// Fixed-point grid position of a WGS84 coordinate
#[inline]
pub fn point_from_degrees(lat: f64, lon: f64) -> Point {
    Point::from_normalized(project(lat, lon))
}

/// Normalized viewport covering the box between two WGS84 corners
pub fn viewport_from_degrees(south: f64, west: f64, north: f64, east: f64) -> Rect<f64> {
    Rect::new(project(south, west), project(north, east))
}

/// Check if a latitude is within Web Mercator bounds
#[inline(always)]
pub fn is_valid_latitude(lat: f64) -> bool {
    (-MAX_LATITUDE..=MAX_LATITUDE).contains(&lat)
}
