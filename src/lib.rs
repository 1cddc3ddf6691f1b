//! Viewport Cache - Tile-Based Geospatial Query Cache
//!
//! Caches the results of map viewport queries ("items inside this bounding
//! box, with these filters") by splitting each viewport into geohash tiles
//! and caching every tile independently. Overlapping viewports share tiles,
//! so panning and zooming mostly hit cache.
//!
//! # Architecture
//!
//! ```text
//! ViewportQuery
//!      │
//!      ▼
//! GeospatialIndexer ── optimal precision, covering tiles
//!      │
//!      ▼
//! TileStore ── (tile, filter signature) ──▶ MultiTierCacheManager
//!      ▲                                     ├─ L1  process memory, bounded
//!      │                                     ├─ L2  shared backend, tags
//! InvalidationEngine / CacheWarmer           └─ Edge HTTP caching headers
//! ```
//!
//! # Modules
//!
//! - [`cache`] - L1/L2/edge tiers and the multi-tier manager
//! - [`config`] - YAML service configuration
//! - [`error`] - Error types
//! - [`geo`] - Geohash tiling
//! - [`invalidation`] - Tag-based purges after data changes
//! - [`monitoring`] - Health checks and Prometheus exposition
//! - [`service`] - Wires one instance of every component together
//! - [`stats`] - Viewport hit accounting
//! - [`tiles`] - Tile entries, filter signatures and the tile store
//! - [`warmer`] - Batched pre-population of regions

pub mod cache;
pub mod config;
pub mod error;
pub mod geo;
pub mod invalidation;
pub mod monitoring;
pub mod service;
pub mod stats;
pub mod tiles;
pub mod warmer;

// Re-export commonly used types
pub use cache::{CacheKey, CacheOptions, MultiTierCacheManager, SharedBackend};
pub use config::ServiceConfig;
pub use error::{Error, Result};
pub use geo::{GeoBounds, GeoCell, GeoPoint, GeospatialIndexer};
pub use invalidation::{InvalidationEngine, InvalidationReport};
pub use service::{ServiceSnapshot, ViewportCacheService};
pub use stats::{CacheStats, StatsTracker};
pub use tiles::{
    GeoItem, GeoRecord, TileFetcher, TileStore, ViewportFilters, ViewportQuery, ViewportResult,
};
pub use warmer::{CacheWarmer, WarmReport};
