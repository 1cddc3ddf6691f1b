//! Multi-Tier Cache System
//!
//! Layered caching with L1 (process memory), L2 (shared store) and an
//! edge tier expressed as HTTP caching directives.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                     MultiTierCacheManager                             │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  L1 Cache (memory)    │ L2 Cache (shared)      │ Edge (HTTP)         │
//! │  ┌────────────────┐   │ ┌──────────────────┐   │ ┌────────────────┐  │
//! │  │ HashMap + FIFO │   │ │ SharedBackend    │   │ │ Cache-Control  │  │
//! │  │ max entries    │   │ │ TTL + tag index  │   │ │ ETag / 304     │  │
//! │  │ short TTL      │   │ │ LZ4 payloads     │   │ │ Vary           │  │
//! │  └────────────────┘   │ └──────────────────┘   │ └────────────────┘  │
//! │         │             │          │             │                     │
//! │         └─────── L2 hit backfills L1 ──────────┘                     │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Invariants
//!
//! - Lookups go L1, then L2, then the caller's fetcher
//! - An L1 entry never outlives the TTL of the L2 write that created it
//! - L2 failures degrade to misses; they never fail a lookup

pub mod compression;
pub mod edge;
mod entry;
mod l1;
mod l2;
mod manager;
mod metrics;
mod policy;

pub use compression::{CompressionAlgorithm, CompressionConfig, PayloadCodec};
pub use edge::{etag_for, with_http_caching, HttpCacheOptions};
pub use entry::{content_hash, CacheKey, CacheOptions};
pub use l1::{L1Cache, L1Config, L1Stats};
pub use l2::{InMemorySharedBackend, L2Cache, L2Stats, SharedBackend, SharedBackendStats};
pub use manager::{CacheConfig, CacheLookup, CacheTier, MultiTierCacheManager, TierStats};
pub use metrics::{CacheMetrics, LatencyTracker, MetricsSnapshot};
pub use policy::EvictionPolicy;

use std::time::Duration;

/// Default L1 maximum entry count
pub const DEFAULT_L1_MAX_ENTRIES: usize = 1_000;

/// Default L1 TTL (1 minute)
pub const DEFAULT_L1_TTL: Duration = Duration::from_secs(60);

/// Default L2 TTL (5 minutes)
pub const DEFAULT_L2_TTL: Duration = Duration::from_secs(300);

/// Longest TTL any tier accepts (30 days); longer TTLs are clamped
pub const MAX_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

// =============================================================================
// Tests
// =============================================================================
