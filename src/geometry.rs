//! Distance calculations used by the landing detector and the correlator.
//!
//! Two distinct metrics are kept deliberately separate rather than unified
//! behind one "distance" function: the landing detector needs true
//! great-circle distance in nautical miles, while the correlator's
//! proximity test was documented upstream only as "coordinate units" with
//! no stated projection. Converting the latter to haversine would silently
//! change its behavior, so it stays a plain Euclidean distance in degrees.

const EARTH_RADIUS_NM: f64 = 3440.065;

/// Great-circle distance between two WGS84 points, in nautical miles.
/// Grounded on the haversine formula used throughout the flight-tracking
/// domain for landing/proximity checks.
pub fn haversine_nm(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_NM * c
}

/// Plain Euclidean distance between two (lat, lon) pairs treated as a flat
/// coordinate plane, in degrees. Not a great-circle distance: this is the
/// correlator's "coordinate units" proximity metric, preserved as-is.
pub fn euclidean_degrees(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    ((lat2 - lat1).powi(2) + (lon2 - lon1).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_is_symmetric() {
        let (lat1, lon1) = (-33.868, 151.209);
        let (lat2, lon2) = (-27.385, 153.118);
        let d1 = haversine_nm(lat1, lon1, lat2, lon2);
        let d2 = haversine_nm(lat2, lon2, lat1, lon1);
        assert!((d1 - d2).abs() < 1e-6);
    }

    #[test]
    fn haversine_zero_for_identical_points() {
        assert!(haversine_nm(-33.868, 151.209, -33.868, 151.209) < 1e-9);
    }

    #[test]
    fn haversine_known_distance_sydney_brisbane() {
        // Sydney (YSSY) to Brisbane (YBBN), roughly 450 nm great-circle.
        let d = haversine_nm(-33.9461, 151.1772, -27.3842, 153.1175);
        assert!((380.0..=470.0).contains(&d), "unexpected distance {d}");
    }

    #[test]
    fn euclidean_degrees_is_symmetric() {
        let d1 = euclidean_degrees(-33.868, 151.209, -27.385, 153.118);
        let d2 = euclidean_degrees(-27.385, 153.118, -33.868, 151.209);
        assert!((d1 - d2).abs() < 1e-12);
    }

    #[test]
    fn euclidean_degrees_zero_for_identical_points() {
        assert_eq!(euclidean_degrees(10.0, 20.0, 10.0, 20.0), 0.0);
    }
}
