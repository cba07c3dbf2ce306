use crate::models::location::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Great-circle distance between two coordinates, used for the operator
/// map's distance-to-destination readout.
pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::haversine_km;
    use crate::models::location::GeoPoint;

    #[test]
    fn same_point_is_zero() {
        let p = GeoPoint {
            lat: 53.5511,
            lng: 9.9937,
        };
        assert!(haversine_km(&p, &p) < 1e-9);
    }

    #[test]
    fn hamburg_to_berlin_is_around_255_km() {
        let hamburg = GeoPoint {
            lat: 53.5511,
            lng: 9.9937,
        };
        let berlin = GeoPoint {
            lat: 52.52,
            lng: 13.405,
        };
        let distance = haversine_km(&hamburg, &berlin);
        assert!((distance - 255.0).abs() < 10.0);
    }
}
