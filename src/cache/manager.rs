//! Cache Manager - Unified Multi-Tier Cache
//!
//! Orchestrates the L1 (process memory) and L2 (shared) tiers with a
//! strict fallback order: L1, then L2, then the caller's fetcher.
//! An L2 hit backfills L1. A fetched value is written to L2 with the
//! long TTL and to L1 with a TTL that never exceeds it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::compression::{CompressionConfig, PayloadCodec};
use super::entry::{CacheKey, CacheOptions};
use super::l1::{L1Cache, L1Config, L1Stats};
use super::l2::{InMemorySharedBackend, L2Cache, L2Stats, SharedBackend};
use super::metrics::{CacheMetrics, LatencyTracker, MetricsSnapshot};
use super::{DEFAULT_L2_TTL, MAX_TTL};
use crate::error::{Error, Result};

/// Cache tier enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    /// L1 - process memory
    L1,
    /// L2 - shared store
    L2,
}

impl std::fmt::Display for CacheTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheTier::L1 => write!(f, "L1 (memory)"),
            CacheTier::L2 => write!(f, "L2 (shared)"),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    /// L1 configuration
    pub l1: L1Config,
    /// TTL for shared-tier writes that do not specify one
    #[serde(with = "crate::config::serde_secs")]
    pub l2_default_ttl: Duration,
    /// Shared-tier payload compression
    pub compression: CompressionConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l1: L1Config::default(),
            l2_default_ttl: DEFAULT_L2_TTL,
            compression: CompressionConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Validate tier sizing and TTL ordering
    pub fn validate(&self) -> Result<()> {
        if self.l1.max_entries == 0 {
            return Err(Error::Config("l1.maxEntries must be greater than 0".into()));
        }
        if self.l2_default_ttl.is_zero() {
            return Err(Error::Config("l2DefaultTtl must be greater than 0".into()));
        }
        if self.l2_default_ttl > MAX_TTL {
            return Err(Error::Config(format!(
                "l2DefaultTtl ({:?}) must not exceed {:?}",
                self.l2_default_ttl, MAX_TTL
            )));
        }
        if self.l1.default_ttl > self.l2_default_ttl {
            return Err(Error::Config(format!(
                "l1.defaultTtl ({:?}) must not exceed l2DefaultTtl ({:?})",
                self.l1.default_ttl, self.l2_default_ttl
            )));
        }
        Ok(())
    }
}

/// Cache lookup result
#[derive(Debug)]
pub struct CacheLookup {
    /// The cached payload
    pub data: Bytes,
    /// Which tier answered
    pub tier: CacheTier,
    /// Lookup latency
    pub latency: Duration,
}

/// Per-tier statistics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierStats {
    pub l1: L1Stats,
    pub l2: L2Stats,
}

/// Unified multi-tier cache manager
pub struct MultiTierCacheManager {
    /// L1 (memory) cache
    l1: L1Cache,
    /// L2 (shared) cache
    l2: L2Cache,
    /// Configuration
    config: CacheConfig,
    /// Metrics collector
    metrics: Arc<CacheMetrics>,
}

impl MultiTierCacheManager {
    /// Create a new cache manager with default configuration
    pub fn new(backend: Arc<dyn SharedBackend>) -> Self {
        Self::with_config(CacheConfig::default(), backend)
    }

    /// Create a new cache manager with custom configuration
    pub fn with_config(config: CacheConfig, backend: Arc<dyn SharedBackend>) -> Self {
        Self {
            l1: L1Cache::with_config(config.l1.clone()),
            l2: L2Cache::new(backend, PayloadCodec::with_config(config.compression.clone())),
            config,
            metrics: Arc::new(CacheMetrics::new()),
        }
    }

    /// Create with an in-memory shared backend
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemorySharedBackend::new()))
    }

    /// Look a key up in L1, then L2. An L2 hit is copied into L1.
    pub async fn get(&self, key: &CacheKey) -> Option<CacheLookup> {
        let start = LatencyTracker::start();

        let tracker = LatencyTracker::start();
        if let Some(data) = self.l1.get(key) {
            self.metrics.record_l1_hit();
            self.metrics.record_l1_read_latency(tracker.elapsed());
            tracing::trace!(key = %key, "L1 hit");
            return Some(CacheLookup {
                data,
                tier: CacheTier::L1,
                latency: start.elapsed(),
            });
        }
        self.metrics.record_l1_miss();

        let tracker = LatencyTracker::start();
        if let Some(data) = self.l2.get(key).await {
            self.metrics.record_l2_hit();
            self.metrics.record_l2_read_latency(tracker.elapsed());
            tracing::debug!(key = %key, "L2 hit, backfilling L1");

            // Remaining L2 lifetime is unknown; the L1 default never exceeds the L2 default
            self.l1.put(key.clone(), data.clone(), self.config.l1.default_ttl);
            self.metrics.record_backfill();

            return Some(CacheLookup {
                data,
                tier: CacheTier::L2,
                latency: start.elapsed(),
            });
        }
        self.metrics.record_l2_miss();
        tracing::debug!(key = %key, "Cache miss");

        None
    }

    /// Look a key up and deserialize it. An undecodable payload is a miss.
    pub async fn get_json<V: DeserializeOwned>(&self, key: &CacheKey) -> Option<V> {
        let lookup = self.get(key).await?;
        match serde_json::from_slice(&lookup.data) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key = %key, tier = %lookup.tier, error = %e, "Undecodable cache payload, treating as miss");
                None
            }
        }
    }

    /// Write to L2 then L1.
    ///
    /// L1 is written even when the L2 write fails; the L2 error is returned
    /// for the caller to log.
    pub async fn set(&self, key: &CacheKey, data: Bytes, options: &CacheOptions) -> Result<()> {
        let tracker = LatencyTracker::start();
        let shared = self.l2.set(key, &data, options.ttl, &options.tags).await;
        self.metrics.record_l2_write_latency(tracker.elapsed());

        let l1_ttl = options.effective_l1_ttl(self.config.l1.default_ttl);
        self.l1.put(key.clone(), data, l1_ttl);

        shared.inspect_err(|_| self.metrics.record_l2_write_error())
    }

    /// Serialize a value and write it through both tiers
    pub async fn set_json<V: Serialize + ?Sized>(
        &self,
        key: &CacheKey,
        value: &V,
        options: &CacheOptions,
    ) -> Result<()> {
        let data = Bytes::from(serde_json::to_vec(value)?);
        self.set(key, data, options).await
    }

    /// Return the cached value, or run `fetcher` and cache its result.
    ///
    /// Fetcher errors are returned unchanged and nothing is cached for
    /// them. Cache failures are logged and never surface here.
    pub async fn get_or_fetch<V, E, F, Fut>(
        &self,
        key: &CacheKey,
        fetcher: F,
        options: &CacheOptions,
    ) -> std::result::Result<V, E>
    where
        V: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
    {
        if let Some(value) = self.get_json(key).await {
            return Ok(value);
        }

        self.metrics.record_fetch();
        let tracker = LatencyTracker::start();
        let fetched = fetcher().await;
        self.metrics.record_fetch_latency(tracker.elapsed());

        let value = fetched.inspect_err(|_| self.metrics.record_fetch_failure())?;

        if let Err(e) = self.set_json(key, &value, options).await {
            tracing::warn!(key = %key, error = %e, "Failed to cache fetched value");
        }
        Ok(value)
    }

    /// Delete a key from both tiers
    pub async fn delete(&self, key: &CacheKey) -> Result<bool> {
        let in_l1 = self.l1.remove(key);
        let in_l2 = self.l2.delete(key).await?;
        Ok(in_l1 || in_l2)
    }

    /// Invalidate a tag in L2. L1 is not tag-indexed; see [`Self::clear_l1`].
    pub async fn invalidate_tag(&self, tag: &str) -> Result<u64> {
        self.l2.invalidate_tag(tag).await
    }

    /// Drop every L1 entry
    pub fn clear_l1(&self) {
        self.l1.clear();
    }

    /// Check shared tier reachability
    pub async fn ping(&self) -> Result<()> {
        self.l2.ping().await
    }

    /// Get metrics snapshot
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics
            .update_l1_stats(self.l1.len() as u64, self.l1.evictions());
        self.metrics.snapshot()
    }

    /// Reset manager counters
    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    /// Get per-tier statistics
    pub fn tier_stats(&self) -> TierStats {
        TierStats {
            l1: self.l1.stats(),
            l2: self.l2.stats(),
        }
    }

    /// Get reference to L1 cache
    pub fn l1(&self) -> &L1Cache {
        &self.l1
    }

    /// Get reference to L2 cache
    pub fn l2(&self) -> &L2Cache {
        &self.l2
    }

    /// Get configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

// =============================================================================
// Tests
// =============================================================================
