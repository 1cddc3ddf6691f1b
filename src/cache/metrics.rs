//! Cache Metrics Collection
//!
//! Per-tier counters and moving-average latencies for the multi-tier
//! manager. Viewport-level hit accounting lives in [`crate::stats`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Cache metrics collector
#[derive(Debug, Default)]
pub struct CacheMetrics {
    // L1 metrics
    l1_hits: AtomicU64,
    l1_misses: AtomicU64,
    l1_entries: AtomicU64,
    l1_evictions: AtomicU64,

    // L2 metrics
    l2_hits: AtomicU64,
    l2_misses: AtomicU64,
    l2_write_errors: AtomicU64,

    // Source fetches
    fetches: AtomicU64,
    fetch_failures: AtomicU64,

    // Operation latencies (microseconds, using exponential moving average)
    l1_read_latency_us: AtomicU64,
    l2_read_latency_us: AtomicU64,
    l2_write_latency_us: AtomicU64,
    fetch_latency_us: AtomicU64,

    // L2 -> L1 backfills
    backfills: AtomicU64,
}

impl CacheMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    // L1 metrics
    pub fn record_l1_hit(&self) {
        self.l1_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_l1_miss(&self) {
        self.l1_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn update_l1_stats(&self, entries: u64, evictions: u64) {
        self.l1_entries.store(entries, Ordering::Relaxed);
        self.l1_evictions.store(evictions, Ordering::Relaxed);
    }

    pub fn l1_hits(&self) -> u64 {
        self.l1_hits.load(Ordering::Relaxed)
    }

    pub fn l1_misses(&self) -> u64 {
        self.l1_misses.load(Ordering::Relaxed)
    }

    pub fn l1_hit_ratio(&self) -> f64 {
        ratio(self.l1_hits(), self.l1_misses())
    }

    // L2 metrics
    pub fn record_l2_hit(&self) {
        self.l2_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_l2_miss(&self) {
        self.l2_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_l2_write_error(&self) {
        self.l2_write_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn l2_hits(&self) -> u64 {
        self.l2_hits.load(Ordering::Relaxed)
    }

    pub fn l2_misses(&self) -> u64 {
        self.l2_misses.load(Ordering::Relaxed)
    }

    pub fn l2_write_errors(&self) -> u64 {
        self.l2_write_errors.load(Ordering::Relaxed)
    }

    pub fn l2_hit_ratio(&self) -> f64 {
        ratio(self.l2_hits(), self.l2_misses())
    }

    // Fetch metrics
    pub fn record_fetch(&self) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_failure(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fetches(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    pub fn fetch_failures(&self) -> u64 {
        self.fetch_failures.load(Ordering::Relaxed)
    }

    pub fn record_backfill(&self) {
        self.backfills.fetch_add(1, Ordering::Relaxed);
    }

    pub fn backfills(&self) -> u64 {
        self.backfills.load(Ordering::Relaxed)
    }

    // Latency tracking
    pub fn record_l1_read_latency(&self, duration: Duration) {
        update_latency_ema(&self.l1_read_latency_us, duration);
    }

    pub fn record_l2_read_latency(&self, duration: Duration) {
        update_latency_ema(&self.l2_read_latency_us, duration);
    }

    pub fn record_l2_write_latency(&self, duration: Duration) {
        update_latency_ema(&self.l2_write_latency_us, duration);
    }

    pub fn record_fetch_latency(&self, duration: Duration) {
        update_latency_ema(&self.fetch_latency_us, duration);
    }

    pub fn l1_read_latency(&self) -> Duration {
        Duration::from_micros(self.l1_read_latency_us.load(Ordering::Relaxed))
    }

    pub fn l2_read_latency(&self) -> Duration {
        Duration::from_micros(self.l2_read_latency_us.load(Ordering::Relaxed))
    }

    pub fn l2_write_latency(&self) -> Duration {
        Duration::from_micros(self.l2_write_latency_us.load(Ordering::Relaxed))
    }

    pub fn fetch_latency(&self) -> Duration {
        Duration::from_micros(self.fetch_latency_us.load(Ordering::Relaxed))
    }

    /// Share of lookups answered by any tier
    pub fn overall_hit_ratio(&self) -> f64 {
        let hits = self.l1_hits() + self.l2_hits();
        // An L2 miss is the final miss; L1 misses fall through to L2
        ratio(hits, self.l2_misses())
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            l1_hits: self.l1_hits(),
            l1_misses: self.l1_misses(),
            l1_entries: self.l1_entries.load(Ordering::Relaxed),
            l1_evictions: self.l1_evictions.load(Ordering::Relaxed),
            l1_hit_ratio: self.l1_hit_ratio(),
            l1_read_latency_us: self.l1_read_latency().as_micros() as u64,

            l2_hits: self.l2_hits(),
            l2_misses: self.l2_misses(),
            l2_write_errors: self.l2_write_errors(),
            l2_hit_ratio: self.l2_hit_ratio(),
            l2_read_latency_us: self.l2_read_latency().as_micros() as u64,
            l2_write_latency_us: self.l2_write_latency().as_micros() as u64,

            fetches: self.fetches(),
            fetch_failures: self.fetch_failures(),
            fetch_latency_us: self.fetch_latency().as_micros() as u64,
            backfills: self.backfills(),

            overall_hit_ratio: self.overall_hit_ratio(),
        }
    }

    /// Reset all counters
    pub fn reset(&self) {
        for counter in [
            &self.l1_hits,
            &self.l1_misses,
            &self.l2_hits,
            &self.l2_misses,
            &self.l2_write_errors,
            &self.fetches,
            &self.fetch_failures,
            &self.backfills,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

fn ratio(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

fn update_latency_ema(target: &AtomicU64, duration: Duration) {
    let new_us = duration.as_micros() as u64;
    let alpha = 0.1; // EMA smoothing factor

    loop {
        let current = target.load(Ordering::Relaxed);
        let updated = if current == 0 {
            new_us
        } else {
            ((1.0 - alpha) * current as f64 + alpha * new_us as f64) as u64
        };

        if target
            .compare_exchange_weak(current, updated, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            break;
        }
    }
}

/// Snapshot of all cache metrics
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    // L1
    pub l1_hits: u64,
    pub l1_misses: u64,
    pub l1_entries: u64,
    pub l1_evictions: u64,
    pub l1_hit_ratio: f64,
    pub l1_read_latency_us: u64,

    // L2
    pub l2_hits: u64,
    pub l2_misses: u64,
    pub l2_write_errors: u64,
    pub l2_hit_ratio: f64,
    pub l2_read_latency_us: u64,
    pub l2_write_latency_us: u64,

    // Source
    pub fetches: u64,
    pub fetch_failures: u64,
    pub fetch_latency_us: u64,
    pub backfills: u64,

    // Overall
    pub overall_hit_ratio: f64,
}

/// Latency tracker helper
pub struct LatencyTracker {
    start: Instant,
}

impl LatencyTracker {
    /// Start tracking latency
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = CacheMetrics::new();
        assert_eq!(metrics.l1_hits(), 0);
        assert_eq!(metrics.l2_hits(), 0);
        assert_eq!(metrics.fetches(), 0);
    }

    #[test]
    fn test_hit_tracking() {
        let metrics = CacheMetrics::new();

        metrics.record_l1_hit();
        metrics.record_l1_hit();
        metrics.record_l1_miss();

        assert_eq!(metrics.l1_hits(), 2);
        assert_eq!(metrics.l1_misses(), 1);
        assert!((metrics.l1_hit_ratio() - 0.666).abs() < 0.01);
    }

    #[test]
    fn test_latency_tracking() {
        let metrics = CacheMetrics::new();

        metrics.record_l2_read_latency(Duration::from_micros(100));
        assert_eq!(metrics.l2_read_latency(), Duration::from_micros(100));

        // EMA should smooth values
        metrics.record_l2_read_latency(Duration::from_micros(200));
        let latency = metrics.l2_read_latency().as_micros();
        assert!(latency > 100 && latency < 200);
    }

    #[test]
    fn test_overall_hit_ratio() {
        let metrics = CacheMetrics::new();

        // Two L1 hits, one L1 miss answered by L2, one miss everywhere
        metrics.record_l1_hit();
        metrics.record_l1_hit();
        metrics.record_l1_miss();
        metrics.record_l2_hit();
        metrics.record_l1_miss();
        metrics.record_l2_miss();

        assert!((metrics.overall_hit_ratio() - 0.75).abs() < 0.01);
    }

    #[test]
    fn test_snapshot() {
        let metrics = CacheMetrics::new();

        metrics.record_l1_hit();
        metrics.record_l2_write_error();
        metrics.record_fetch();
        metrics.record_fetch_failure();
        metrics.record_backfill();
        metrics.update_l1_stats(10, 3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.l1_hits, 1);
        assert_eq!(snapshot.l2_write_errors, 1);
        assert_eq!(snapshot.fetches, 1);
        assert_eq!(snapshot.fetch_failures, 1);
        assert_eq!(snapshot.backfills, 1);
        assert_eq!(snapshot.l1_entries, 10);
        assert_eq!(snapshot.l1_evictions, 3);
    }

    #[test]
    fn test_reset() {
        let metrics = CacheMetrics::new();

        metrics.record_l1_hit();
        metrics.record_l2_hit();
        metrics.record_fetch();

        metrics.reset();

        assert_eq!(metrics.l1_hits(), 0);
        assert_eq!(metrics.l2_hits(), 0);
        assert_eq!(metrics.fetches(), 0);
    }

    #[test]
    fn test_latency_tracker() {
        let tracker = LatencyTracker::start();
        std::thread::sleep(Duration::from_millis(10));
        assert!(tracker.elapsed() >= Duration::from_millis(10));
    }
}
