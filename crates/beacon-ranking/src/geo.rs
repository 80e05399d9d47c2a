//! Great-circle distance and proximity normalization
//!
//! Author: arkSong <arksong2018@gmail.com>
//! Version: 0.3.0-alpha
//! Date: 2025-07-02

use serde::{Deserialize, Serialize};

/// Mean earth radius in kilometers
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Ten miles
pub const DEFAULT_MAX_RADIUS_KM: f64 = 16.09;

/// A latitude/longitude pair in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Haversine distance in kilometers
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().clamp(0.0, 1.0).asin()
}

/// `max(0, 1 - d / max_radius)`; zero when either point is missing.
/// Distances at or beyond the radius score exactly zero.
pub fn proximity(a: Option<GeoPoint>, b: Option<GeoPoint>, max_radius_km: f64) -> f64 {
    let (Some(a), Some(b)) = (a, b) else {
        return 0.0;
    };
    let distance = haversine_km(a, b);
    if !distance.is_finite() || distance >= max_radius_km {
        return 0.0;
    }
    (1.0 - distance / max_radius_km).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    const SAN_FRANCISCO: GeoPoint = GeoPoint::new(37.7749, -122.4194);
    const OAKLAND: GeoPoint = GeoPoint::new(37.8044, -122.2712);
    const LOS_ANGELES: GeoPoint = GeoPoint::new(34.0522, -118.2437);

    #[test]
    fn test_haversine_known_distances() {
        assert_eq!(haversine_km(SAN_FRANCISCO, SAN_FRANCISCO), 0.0);
        let sf_la = haversine_km(SAN_FRANCISCO, LOS_ANGELES);
        assert!((sf_la - 559.0).abs() < 2.0, "got {sf_la}");
        let sf_oak = haversine_km(SAN_FRANCISCO, OAKLAND);
        assert!((sf_oak - 13.4).abs() < 0.5, "got {sf_oak}");
    }

    #[test]
    fn test_proximity_bounds() {
        assert_eq!(proximity(Some(SAN_FRANCISCO), Some(SAN_FRANCISCO), DEFAULT_MAX_RADIUS_KM), 1.0);
        assert_eq!(proximity(Some(SAN_FRANCISCO), Some(LOS_ANGELES), DEFAULT_MAX_RADIUS_KM), 0.0);
        assert_eq!(proximity(None, Some(SAN_FRANCISCO), DEFAULT_MAX_RADIUS_KM), 0.0);
        assert_eq!(proximity(Some(SAN_FRANCISCO), None, DEFAULT_MAX_RADIUS_KM), 0.0);

        let near = proximity(Some(SAN_FRANCISCO), Some(OAKLAND), DEFAULT_MAX_RADIUS_KM);
        assert!(near > 0.0 && near < 0.25, "got {near}");
    }

    #[test]
    fn test_hard_cutoff_at_radius() {
        // One degree of latitude is ~111.19 km; pick a point just past 16.09 km
        let north = GeoPoint::new(SAN_FRANCISCO.lat + 0.1448, SAN_FRANCISCO.lon);
        assert!(haversine_km(SAN_FRANCISCO, north) >= DEFAULT_MAX_RADIUS_KM);
        assert_eq!(proximity(Some(SAN_FRANCISCO), Some(north), DEFAULT_MAX_RADIUS_KM), 0.0);
    }
}
