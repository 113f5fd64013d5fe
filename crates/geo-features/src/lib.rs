//! Geodesic Feature Primitives
//!
//! Great-circle distance, initial bearing, wind-alignment cosine, and
//! nearest-point search over raw latitude/longitude pairs. Everything in
//! this crate is a pure function; upstream ingestion and the risk model
//! build on these primitives.

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle (haversine) distance between two coordinates in kilometers.
///
/// Symmetric in its arguments and zero when the points coincide.
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_r = lat1.to_radians();
    let lat2_r = lat2.to_radians();
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let a = (dlat / 2.0).sin().powi(2)
        + lat1_r.cos() * lat2_r.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// Initial bearing from point 1 to point 2 in degrees, normalized to [0, 360).
///
/// The result for coincident points is unspecified (currently 0.0); callers
/// must not rely on it.
pub fn bearing_deg(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_r = lat1.to_radians();
    let lat2_r = lat2.to_radians();
    let dlon_r = (lon2 - lon1).to_radians();

    let y = dlon_r.sin() * lat2_r.cos();
    let x = lat1_r.cos() * lat2_r.sin() - lat1_r.sin() * lat2_r.cos() * dlon_r.cos();

    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// Cosine alignment between the fire-to-asset bearing and the direction the
/// wind blows toward.
///
/// +1.0 means the wind pushes directly from the fire toward the asset,
/// -1.0 means it blows directly away.
pub fn wind_alignment_cos(fire_to_asset_bearing_deg: f64, wind_toward_deg: f64) -> f64 {
    (fire_to_asset_bearing_deg - wind_toward_deg).to_radians().cos()
}

/// Result of a nearest-point search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestPoint {
    /// Index of the winning candidate in the input slice.
    pub index: usize,
    pub lat: f64,
    pub lon: f64,
    pub distance_km: f64,
}

/// Find the candidate nearest to (lat, lon) by great-circle distance.
///
/// Returns `None` for an empty candidate set. Equal-distance ties go to the
/// first candidate in iteration order.
pub fn nearest_point(lat: f64, lon: f64, candidates: &[(f64, f64)]) -> Option<NearestPoint> {
    let mut best: Option<NearestPoint> = None;

    for (index, &(c_lat, c_lon)) in candidates.iter().enumerate() {
        let d = distance_km(lat, lon, c_lat, c_lon);
        if best.map_or(true, |b| d < b.distance_km) {
            best = Some(NearestPoint {
                index,
                lat: c_lat,
                lon: c_lon,
                distance_km: d,
            });
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_distance_zero_for_same_point() {
        assert!(distance_km(39.8, -121.6, 39.8, -121.6).abs() < EPS);
    }

    #[test]
    fn test_distance_one_degree_latitude() {
        // One degree of latitude is ~111.19 km on a 6371 km sphere.
        let d = distance_km(39.0, -121.0, 40.0, -121.0);
        assert!((d - 111.19).abs() < 0.1, "got {}", d);
    }

    #[test]
    fn test_bearing_due_north_and_east() {
        let north = bearing_deg(39.0, -121.0, 40.0, -121.0);
        assert!(north.abs() < 0.01, "north bearing: {}", north);

        let east = bearing_deg(0.0, 0.0, 0.0, 1.0);
        assert!((east - 90.0).abs() < 0.01, "east bearing: {}", east);
    }

    #[test]
    fn test_wind_alignment_extremes() {
        assert!((wind_alignment_cos(45.0, 45.0) - 1.0).abs() < EPS);
        assert!((wind_alignment_cos(45.0, 225.0) + 1.0).abs() < EPS);
        assert!(wind_alignment_cos(0.0, 90.0).abs() < EPS);
    }

    #[test]
    fn test_wind_alignment_wraps_at_360() {
        assert!((wind_alignment_cos(350.0, 710.0) - 1.0).abs() < EPS);
    }

    #[test]
    fn test_nearest_point_empty() {
        assert_eq!(nearest_point(39.8, -121.6, &[]), None);
    }

    #[test]
    fn test_nearest_point_picks_closest() {
        let candidates = [(39.9, -121.6), (39.81, -121.61), (38.0, -120.0)];
        let nearest = nearest_point(39.8, -121.6, &candidates).unwrap();
        assert_eq!(nearest.index, 1);
        assert!(nearest.distance_km < 2.0);
    }

    #[test]
    fn test_nearest_point_tie_first_wins() {
        let candidates = [(40.0, -121.0), (40.0, -121.0)];
        let nearest = nearest_point(39.0, -121.0, &candidates).unwrap();
        assert_eq!(nearest.index, 0);
    }

    proptest! {
        #[test]
        fn prop_distance_symmetric(
            lat1 in -89.0f64..89.0, lon1 in -179.0f64..179.0,
            lat2 in -89.0f64..89.0, lon2 in -179.0f64..179.0,
        ) {
            let ab = distance_km(lat1, lon1, lat2, lon2);
            let ba = distance_km(lat2, lon2, lat1, lon1);
            prop_assert!((ab - ba).abs() < 1e-6);
            prop_assert!(ab >= 0.0);
        }

        #[test]
        fn prop_distance_self_is_zero(lat in -89.0f64..89.0, lon in -179.0f64..179.0) {
            prop_assert!(distance_km(lat, lon, lat, lon).abs() < 1e-6);
        }

        #[test]
        fn prop_bearing_in_range(
            lat1 in -89.0f64..89.0, lon1 in -179.0f64..179.0,
            lat2 in -89.0f64..89.0, lon2 in -179.0f64..179.0,
        ) {
            let b = bearing_deg(lat1, lon1, lat2, lon2);
            prop_assert!((0.0..360.0).contains(&b), "bearing out of range: {}", b);
        }

        #[test]
        fn prop_alignment_bounded(a in 0.0f64..360.0, b in 0.0f64..360.0) {
            let c = wind_alignment_cos(a, b);
            prop_assert!((-1.0 - 1e-12..=1.0 + 1e-12).contains(&c));
        }
    }
}
