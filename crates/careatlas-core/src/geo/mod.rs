//! Geospatial primitives: Haversine distance, a ball-tree over the unit
//! sphere, and the facility spatial index.

mod balltree;
mod spatial;

pub use balltree::BallTree;
pub use spatial::SpatialIndex;

use crate::config::constants::EARTH_RADIUS_KM;

/// Great-circle distance between two (lat, lng) points in degrees, km.
pub fn haversine_km(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lng1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lng2) = (b.0.to_radians(), b.1.to_radians());
    let dlat = lat2 - lat1;
    let dlng = lng2 - lng1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accra_to_kumasi_is_about_200_km() {
        let accra = (5.6037, -0.1870);
        let kumasi = (6.6885, -1.6244);
        let d = haversine_km(accra, kumasi);
        assert!((d - 200.0).abs() < 15.0, "got {d}");
    }

    #[test]
    fn zero_distance_to_self() {
        let p = (7.9465, -1.0232);
        assert!(haversine_km(p, p) < 1e-9);
    }

    #[test]
    fn symmetric() {
        let a = (9.4034, -0.8393);
        let b = (5.1036, -1.2466);
        assert!((haversine_km(a, b) - haversine_km(b, a)).abs() < 1e-9);
    }
}
