//! Viewport hit accounting
//!
//! Each viewport query is classified by how many of its tiles were cached:
//! all of them is a hit, none is a miss, anything in between is a partial
//! hit. Counters only grow until [`StatsTracker::reset`].

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Outcome of one viewport query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOutcome {
    Hit,
    Miss,
    PartialHit,
}

impl QueryOutcome {
    /// Classify a query from its tile counts
    pub fn classify(tiles_requested: usize, tiles_cached: usize) -> Self {
        if tiles_requested > 0 && tiles_cached >= tiles_requested {
            QueryOutcome::Hit
        } else if tiles_cached == 0 {
            QueryOutcome::Miss
        } else {
            QueryOutcome::PartialHit
        }
    }
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub partial_hits: u64,
    pub tiles_requested: u64,
    pub tiles_served_from_cache: u64,
    /// hits / (hits + misses + partial_hits)
    pub hit_rate: f64,
}

/// Process-lifetime query counters
#[derive(Debug, Default)]
pub struct StatsTracker {
    hits: AtomicU64,
    misses: AtomicU64,
    partial_hits: AtomicU64,
    tiles_requested: AtomicU64,
    tiles_served_from_cache: AtomicU64,
}

impl StatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one viewport query
    pub fn record_query(&self, tiles_requested: usize, tiles_cached: usize) -> QueryOutcome {
        let outcome = QueryOutcome::classify(tiles_requested, tiles_cached);
        let counter = match outcome {
            QueryOutcome::Hit => &self.hits,
            QueryOutcome::Miss => &self.misses,
            QueryOutcome::PartialHit => &self.partial_hits,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.tiles_requested
            .fetch_add(tiles_requested as u64, Ordering::Relaxed);
        self.tiles_served_from_cache
            .fetch_add(tiles_cached as u64, Ordering::Relaxed);
        outcome
    }

    pub fn snapshot(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let partial_hits = self.partial_hits.load(Ordering::Relaxed);
        let total = hits + misses + partial_hits;

        CacheStats {
            hits,
            misses,
            partial_hits,
            tiles_requested: self.tiles_requested.load(Ordering::Relaxed),
            tiles_served_from_cache: self.tiles_served_from_cache.load(Ordering::Relaxed),
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }

    /// Zero every counter
    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.partial_hits,
            &self.tiles_requested,
            &self.tiles_served_from_cache,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(QueryOutcome::classify(12, 12), QueryOutcome::Hit);
        assert_eq!(QueryOutcome::classify(12, 0), QueryOutcome::Miss);
        assert_eq!(QueryOutcome::classify(12, 5), QueryOutcome::PartialHit);
        assert_eq!(QueryOutcome::classify(0, 0), QueryOutcome::Miss);
    }

    #[test]
    fn test_hit_rate_arithmetic() {
        let stats = StatsTracker::new();
        stats.record_query(4, 4);
        stats.record_query(4, 0);
        stats.record_query(4, 2);
        stats.record_query(4, 4);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.hits, 2);
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.partial_hits, 1);
        assert_eq!(snapshot.tiles_requested, 16);
        assert_eq!(snapshot.tiles_served_from_cache, 10);
        assert_eq!(snapshot.hit_rate, 0.5);
    }

    #[test]
    fn test_empty_tracker_has_zero_rate() {
        assert_eq!(StatsTracker::new().snapshot(), CacheStats::default());
    }

    #[test]
    fn test_reset() {
        let stats = StatsTracker::new();
        stats.record_query(3, 1);
        stats.reset();
        assert_eq!(stats.snapshot(), CacheStats::default());
    }

    #[test]
    fn test_snapshot_json_shape() {
        let stats = StatsTracker::new();
        stats.record_query(2, 2);
        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(json["partialHits"], 0);
        assert_eq!(json["tilesServedFromCache"], 2);
        assert_eq!(json["hitRate"], 1.0);
    }
}
