//! Transportation cost model.
//!
//! The cost of moving one unit between a facility and a demand point is the
//! great-circle distance between them in kilometres. No scaling factor is
//! applied: one kilometre costs one unit.

use crate::domain::{CandidateFacility, Coordinates, DemandPoint};

/// Mean earth radius used by the haversine formula, in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6367.0;

/// Great-circle distance in kilometres between two points given in decimal degrees.
pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = lat2 - lat1;
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);

    // Rounding can push h a hair above 1 for antipodal points.
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Per-unit cost of routing supply from `facility` to `demand_point`.
pub fn transport_cost_per_unit(facility: &CandidateFacility, demand_point: &DemandPoint) -> f64 {
    haversine_km(facility.location(), demand_point.location())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;
    use std::f64::consts::PI;

    #[rstest]
    #[case(Coordinates::new(0.0, 0.0), Coordinates::new(0.0, 0.0), 0.0)]
    #[case(Coordinates::new(0.0, 0.0), Coordinates::new(90.0, 0.0), EARTH_RADIUS_KM * PI / 2.0)]
    #[case(Coordinates::new(0.0, 0.0), Coordinates::new(0.0, 90.0), EARTH_RADIUS_KM * PI / 2.0)]
    #[case(Coordinates::new(0.0, 0.0), Coordinates::new(0.0, 180.0), EARTH_RADIUS_KM * PI)]
    #[case(Coordinates::new(90.0, 0.0), Coordinates::new(-90.0, 0.0), EARTH_RADIUS_KM * PI)]
    fn test_reference_distances(
        #[case] a: Coordinates,
        #[case] b: Coordinates,
        #[case] expected_km: f64,
    ) {
        let km = haversine_km(a, b);
        assert!(
            (km - expected_km).abs() < 1e-6,
            "expected {expected_km} km, got {km} km"
        );
    }

    #[test]
    fn test_quarter_great_circle() {
        // 6367 * pi / 2
        let km = haversine_km(Coordinates::new(0.0, 0.0), Coordinates::new(90.0, 0.0));
        assert!((km - 10001.1).abs() < 1.0, "quarter circle was {km} km");
    }

    #[test]
    fn test_brisbane_to_sydney() {
        let brisbane = Coordinates::new(-27.4698, 153.0251);
        let sydney = Coordinates::new(-33.8688, 151.2093);
        let km = haversine_km(brisbane, sydney);
        assert!(km > 725.0 && km < 735.0, "Brisbane-Sydney was {km} km");
    }

    #[test]
    fn test_cost_is_unscaled_distance() {
        let facility = CandidateFacility::new("Depot", -27.4698, 153.0251, 10, 0.0);
        let shop = DemandPoint::new("Shop", -27.5, 153.1, 1);
        assert_eq!(
            transport_cost_per_unit(&facility, &shop),
            haversine_km(facility.location(), shop.location())
        );
    }

    fn coordinates() -> impl Strategy<Value = Coordinates> {
        (-90.0f64..=90.0, -180.0f64..=180.0).prop_map(|(lat, lon)| Coordinates::new(lat, lon))
    }

    proptest! {
        #[test]
        fn prop_cost_is_symmetric(a in coordinates(), b in coordinates()) {
            let ab = haversine_km(a, b);
            let ba = haversine_km(b, a);
            prop_assert!((ab - ba).abs() < 1e-9);
        }

        #[test]
        fn prop_cost_is_bounded_and_non_negative(a in coordinates(), b in coordinates()) {
            let km = haversine_km(a, b);
            prop_assert!(km >= 0.0);
            prop_assert!(km <= EARTH_RADIUS_KM * PI + 1e-6);
        }

        #[test]
        fn prop_cost_to_self_is_zero(a in coordinates()) {
            prop_assert!(haversine_km(a, a).abs() < 1e-9);
        }
    }
}
