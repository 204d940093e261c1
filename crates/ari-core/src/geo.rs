//! Great-circle distance and radius checks.

use crate::Coordinates;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance in kilometres on a mean-radius sphere.
pub fn distance_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
}

/// Distances are compared at 10 m resolution, matching what the reports print.
pub fn round_km(distance: f64) -> f64 {
    (distance * 100.0).round() / 100.0
}

/// Rounded distance from `origin` when it falls inside `radius_km` (inclusive).
pub fn within_radius(point: Option<Coordinates>, origin: Coordinates, radius_km: f64) -> Option<f64> {
    let point = point?;
    let distance = round_km(distance_km(origin.lat, origin.lng, point.lat, point.lng));
    (distance <= radius_km).then_some(distance)
}
