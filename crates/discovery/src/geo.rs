//! Great-circle distance on a spherical Earth.

use lastbasket_baskets::GeoPoint;

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance between two points, in kilometers.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + lat_a.cos() * lat_b.cos() * (d_lng / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Round to two decimals, the precision exposed on the wire.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_distance_for_identical_points() {
        let p = GeoPoint { lat: 33.589, lng: -7.62 };
        assert_eq!(haversine_km(p, p), 0.0);
    }

    #[test]
    fn known_distance_casablanca_to_rabat() {
        // ~87 km apart.
        let casablanca = GeoPoint { lat: 33.5731, lng: -7.5898 };
        let rabat = GeoPoint { lat: 34.0209, lng: -6.8416 };
        let d = haversine_km(casablanca, rabat);
        assert!((85.0..90.0).contains(&d), "got {d}");
    }

    #[test]
    fn distance_is_symmetric() {
        let a = GeoPoint { lat: 52.52, lng: 13.405 };
        let b = GeoPoint { lat: 48.8566, lng: 2.3522 };
        assert!((haversine_km(a, b) - haversine_km(b, a)).abs() < 1e-9);
    }

    #[test]
    fn rounding_keeps_two_decimals() {
        assert_eq!(round2(3.14159), 3.14);
        assert_eq!(round2(6.666), 6.67);
        assert_eq!(round2(0.0), 0.0);
    }
}
