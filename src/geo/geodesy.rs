//! Spherical geodesy helpers used for radius searches.
//!
//! All calculations use the haversine/great-circle model on a sphere of
//! radius 6 371 000 m. The store indexes on raw lat/lon, so the bounding
//! rectangle produced here carries no correction near the poles or the
//! antimeridian.

use crate::geo::types::{Coord, Rect};

pub const EARTH_RADIUS_M: f64 = 6_371e3;

/// Great-circle distance in meters between two lat/lon pairs.
pub fn distance(lat_a: f64, lon_a: f64, lat_b: f64, lon_b: f64) -> f64 {
    let phi1 = lat_a.to_radians();
    let phi2 = lat_b.to_radians();
    let d_phi = (lat_b - lat_a).to_radians();
    let d_lambda = (lon_b - lon_a).to_radians();
    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Destination point after travelling `meters` from (lat, lon) along the
/// given forward bearing. Longitude is normalised to [-180, 180].
pub fn destination(lat: f64, lon: f64, meters: f64, bearing_deg: f64) -> (f64, f64) {
    let delta = meters / EARTH_RADIUS_M;
    let theta = bearing_deg.to_radians();
    let phi1 = lat.to_radians();
    let lambda1 = lon.to_radians();
    let phi2 = (phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * theta.cos()).asin();
    let mut lambda2 = lambda1
        + (theta.sin() * delta.sin() * phi1.cos()).atan2(delta.cos() - phi1.sin() * phi2.sin());
    lambda2 = (lambda2 + 3.0 * std::f64::consts::PI).rem_euclid(2.0 * std::f64::consts::PI)
        - std::f64::consts::PI;
    (phi2.to_degrees(), lambda2.to_degrees())
}

/// Flat lat/lon rectangle enclosing the circle of `meters` around the
/// center, built from the four cardinal destination points.
pub fn bounds_from(lat: f64, lon: f64, meters: f64) -> Rect {
    let (n_lat, _) = destination(lat, lon, meters, 0.0);
    let (_, e_lon) = destination(lat, lon, meters, 90.0);
    let (s_lat, _) = destination(lat, lon, meters, 180.0);
    let (_, w_lon) = destination(lat, lon, meters, 270.0);
    Rect {
        min: Coord::new(w_lon, s_lat),
        max: Coord::new(e_lon, n_lat),
    }
}

/// True when the coordinate lies within `meters` of the center (both as
/// lon/lat pairs).
pub fn coord_within_radius(c: Coord, center: Coord, meters: f64) -> bool {
    distance(c.y, c.x, center.y, center.x) <= meters
}
