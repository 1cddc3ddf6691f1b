//! Property-Based Tests for Geohash Tiling
//!
//! # Test Properties
//!
//! 1. **Round-trip**: a point lies within decode_bounds(encode(point, p))
//! 2. **Refinement**: encode(point, p) is a prefix of encode(point, p + 1)
//! 3. **Coverage**: every grid sample inside a box encodes to a covering cell
//! 4. **Bounded fan-out**: optimal_precision keeps the cover within limits

#![cfg(test)]

use std::collections::HashSet;

use proptest::prelude::*;

use super::bounds::{GeoBounds, GeoPoint};
use super::geohash::{GeospatialIndexer, MAX_PRECISION, MIN_PRECISION};

// =============================================================================
// Property Strategies
// =============================================================================

fn point_strategy() -> impl Strategy<Value = (f64, f64)> {
    (-90.0f64..=90.0, -180.0f64..=180.0)
}

fn precision_strategy() -> impl Strategy<Value = usize> {
    MIN_PRECISION..=MAX_PRECISION
}

/// Boxes up to a few degrees across, anywhere on the globe
fn bounds_strategy() -> impl Strategy<Value = GeoBounds> {
    (-89.0f64..85.0, -179.0f64..175.0, 0.001f64..4.0, 0.001f64..4.0).prop_map(
        |(lat, lng, dlat, dlng)| GeoBounds::new(lat, lat + dlat, lng, lng + dlng),
    )
}

// =============================================================================
// Encoding Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn prop_round_trip_containment((lat, lng) in point_strategy(), precision in precision_strategy()) {
        let indexer = GeospatialIndexer::new();
        let cell = indexer.encode(lat, lng, precision).unwrap();
        let bounds = indexer.decode_bounds(&cell);
        prop_assert!(bounds.contains(&GeoPoint::new(lat, lng)), "{} -> {:?}", cell, bounds);
    }

    #[test]
    fn prop_refinement_prefix((lat, lng) in point_strategy(), precision in MIN_PRECISION..MAX_PRECISION) {
        let indexer = GeospatialIndexer::new();
        let coarse = indexer.encode(lat, lng, precision).unwrap();
        let fine = indexer.encode(lat, lng, precision + 1).unwrap();
        prop_assert!(fine.as_str().starts_with(coarse.as_str()));
    }

    #[test]
    fn prop_encode_deterministic((lat, lng) in point_strategy(), precision in precision_strategy()) {
        let indexer = GeospatialIndexer::new();
        prop_assert_eq!(
            indexer.encode(lat, lng, precision).unwrap(),
            indexer.encode(lat, lng, precision).unwrap()
        );
    }
}

// =============================================================================
// Covering Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_covering_has_no_gaps(bounds in bounds_strategy(), precision in 1usize..=4) {
        let indexer = GeospatialIndexer::new();
        let cells: HashSet<_> = indexer.covering_cells(&bounds, precision).unwrap().into_iter().collect();

        const STEPS: usize = 12;
        for i in 0..=STEPS {
            for j in 0..=STEPS {
                let lat = bounds.min_lat + bounds.lat_span() * i as f64 / STEPS as f64;
                let lng = bounds.min_lng + bounds.lng_span() * j as f64 / STEPS as f64;
                let lat = lat.min(bounds.max_lat);
                let lng = lng.min(bounds.max_lng);
                let cell = indexer.encode(lat, lng, precision).unwrap();
                prop_assert!(cells.contains(&cell), "gap at ({}, {}) -> {}", lat, lng, cell);
            }
        }
    }

    #[test]
    fn prop_covering_has_no_duplicates(bounds in bounds_strategy(), precision in 1usize..=4) {
        let indexer = GeospatialIndexer::new();
        let cells = indexer.covering_cells(&bounds, precision).unwrap();
        let unique: HashSet<_> = cells.iter().collect();
        prop_assert_eq!(unique.len(), cells.len());
    }

    #[test]
    fn prop_optimal_precision_bounded(bounds in bounds_strategy()) {
        let indexer = GeospatialIndexer::new();
        let precision = indexer.optimal_precision(&bounds).unwrap();
        let count = indexer.covering_count(&bounds, precision).unwrap();
        prop_assert!(count <= indexer.config().max_tiles_per_query as u64);
    }
}
