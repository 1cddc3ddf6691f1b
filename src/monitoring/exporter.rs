//! Prometheus exposition
//!
//! The cache keeps its own atomic counters; this module mirrors a
//! snapshot of them into a private registry at scrape time. Counters can
//! be reset through the admin API, so everything is exported as a gauge.

use prometheus::{Encoder, Gauge, GaugeVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::cache::MetricsSnapshot;
use crate::error::{Error, Result};
use crate::stats::CacheStats;

const NAMESPACE: &str = "viewport_cache";

fn registration_error(name: &str, e: prometheus::Error) -> Error {
    Error::Internal(format!("Failed to register {}: {}", name, e))
}

/// Scrape-time exporter over a private registry
pub struct PrometheusExporter {
    registry: Registry,

    /// Viewport queries by outcome - labels: outcome (hit/miss/partial)
    queries: IntGaugeVec,
    tiles_requested: IntGauge,
    tiles_served_from_cache: IntGauge,
    viewport_hit_rate: Gauge,

    /// Tier lookups - labels: tier, result (hit/miss)
    tier_lookups: IntGaugeVec,
    /// Tier hit ratio - labels: tier
    tier_hit_ratio: GaugeVec,
    /// EMA latency in microseconds - labels: operation
    latency_us: IntGaugeVec,

    l1_entries: IntGauge,
    l1_evictions: IntGauge,
    l2_write_errors: IntGauge,
    fetches: IntGauge,
    fetch_failures: IntGauge,
    backfills: IntGauge,
}

impl PrometheusExporter {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        macro_rules! register {
            ($metric:expr, $name:expr) => {{
                let metric = $metric.map_err(|e| registration_error($name, e))?;
                registry
                    .register(Box::new(metric.clone()))
                    .map_err(|e| registration_error($name, e))?;
                metric
            }};
        }

        let opts = |name: &str, help: &str| Opts::new(name, help).namespace(NAMESPACE);

        Ok(Self {
            queries: register!(
                IntGaugeVec::new(opts("queries", "Viewport queries by outcome"), &["outcome"]),
                "queries"
            ),
            tiles_requested: register!(
                IntGauge::with_opts(opts("tiles_requested", "Tiles requested by viewport queries")),
                "tiles_requested"
            ),
            tiles_served_from_cache: register!(
                IntGauge::with_opts(opts(
                    "tiles_served_from_cache",
                    "Tiles answered from cache"
                )),
                "tiles_served_from_cache"
            ),
            viewport_hit_rate: register!(
                Gauge::with_opts(opts("hit_rate", "Fully cached viewport queries / all queries")),
                "hit_rate"
            ),
            tier_lookups: register!(
                IntGaugeVec::new(
                    opts("tier_lookups", "Cache tier lookups by result"),
                    &["tier", "result"]
                ),
                "tier_lookups"
            ),
            tier_hit_ratio: register!(
                GaugeVec::new(opts("tier_hit_ratio", "Hit ratio per cache tier"), &["tier"]),
                "tier_hit_ratio"
            ),
            latency_us: register!(
                IntGaugeVec::new(
                    opts("latency_microseconds", "Moving-average latency per operation"),
                    &["operation"]
                ),
                "latency_microseconds"
            ),
            l1_entries: register!(
                IntGauge::with_opts(opts("l1_entries", "Entries resident in the memory tier")),
                "l1_entries"
            ),
            l1_evictions: register!(
                IntGauge::with_opts(opts("l1_evictions", "Memory tier capacity evictions")),
                "l1_evictions"
            ),
            l2_write_errors: register!(
                IntGauge::with_opts(opts("l2_write_errors", "Failed shared tier writes")),
                "l2_write_errors"
            ),
            fetches: register!(
                IntGauge::with_opts(opts("fetches", "Source fetches after a full miss")),
                "fetches"
            ),
            fetch_failures: register!(
                IntGauge::with_opts(opts("fetch_failures", "Source fetches that failed")),
                "fetch_failures"
            ),
            backfills: register!(
                IntGauge::with_opts(opts("backfills", "Memory tier backfills from the shared tier")),
                "backfills"
            ),
            registry,
        })
    }

    /// Copy the current counters into the registry
    pub fn update(&self, stats: &CacheStats, metrics: &MetricsSnapshot) {
        self.queries.with_label_values(&["hit"]).set(stats.hits as i64);
        self.queries.with_label_values(&["miss"]).set(stats.misses as i64);
        self.queries
            .with_label_values(&["partial"])
            .set(stats.partial_hits as i64);
        self.tiles_requested.set(stats.tiles_requested as i64);
        self.tiles_served_from_cache
            .set(stats.tiles_served_from_cache as i64);
        self.viewport_hit_rate.set(stats.hit_rate);

        self.tier_lookups
            .with_label_values(&["l1", "hit"])
            .set(metrics.l1_hits as i64);
        self.tier_lookups
            .with_label_values(&["l1", "miss"])
            .set(metrics.l1_misses as i64);
        self.tier_lookups
            .with_label_values(&["l2", "hit"])
            .set(metrics.l2_hits as i64);
        self.tier_lookups
            .with_label_values(&["l2", "miss"])
            .set(metrics.l2_misses as i64);

        self.tier_hit_ratio.with_label_values(&["l1"]).set(metrics.l1_hit_ratio);
        self.tier_hit_ratio.with_label_values(&["l2"]).set(metrics.l2_hit_ratio);
        self.tier_hit_ratio
            .with_label_values(&["overall"])
            .set(metrics.overall_hit_ratio);

        self.latency_us
            .with_label_values(&["l1_read"])
            .set(metrics.l1_read_latency_us as i64);
        self.latency_us
            .with_label_values(&["l2_read"])
            .set(metrics.l2_read_latency_us as i64);
        self.latency_us
            .with_label_values(&["l2_write"])
            .set(metrics.l2_write_latency_us as i64);
        self.latency_us
            .with_label_values(&["fetch"])
            .set(metrics.fetch_latency_us as i64);

        self.l1_entries.set(metrics.l1_entries as i64);
        self.l1_evictions.set(metrics.l1_evictions as i64);
        self.l2_write_errors.set(metrics.l2_write_errors as i64);
        self.fetches.set(metrics.fetches as i64);
        self.fetch_failures.set(metrics.fetch_failures as i64);
        self.backfills.set(metrics.backfills as i64);
    }

    /// Encode the registry in the text exposition format
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| Error::Internal(format!("Failed to encode metrics: {}", e)))?;
        String::from_utf8(buffer).map_err(|e| Error::Internal(e.to_string()))
    }

    /// Content type of [`Self::render`] output
    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_after_update() {
        let exporter = PrometheusExporter::new().unwrap();
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            partial_hits: 1,
            tiles_requested: 40,
            tiles_served_from_cache: 30,
            hit_rate: 0.6,
        };
        let metrics = MetricsSnapshot {
            l1_hits: 7,
            l2_misses: 2,
            ..Default::default()
        };

        exporter.update(&stats, &metrics);
        let text = exporter.render().unwrap();

        assert!(text.contains("viewport_cache_queries{outcome=\"hit\"} 3"));
        assert!(text.contains("viewport_cache_queries{outcome=\"partial\"} 1"));
        assert!(text.contains("viewport_cache_tiles_requested 40"));
        assert!(text.contains("viewport_cache_hit_rate 0.6"));
        assert!(text.lines().any(|line| {
            line.starts_with("viewport_cache_tier_lookups{")
                && line.contains("tier=\"l1\"")
                && line.contains("result=\"hit\"")
                && line.ends_with(" 7")
        }));
    }

    #[test]
    fn test_exporters_are_independent() {
        let first = PrometheusExporter::new().unwrap();
        let second = PrometheusExporter::new().unwrap();
        first.update(
            &CacheStats {
                hits: 1,
                ..Default::default()
            },
            &MetricsSnapshot::default(),
        );

        assert!(!second.render().unwrap().contains("outcome=\"hit\"} 1"));
        assert!(second.render().unwrap().contains("viewport_cache_fetches 0"));
    }
}
