//! Viewport cache service
//!
//! Owns one instance of every component and wires them together. There is
//! no process-wide state: each service is independent, so tests and
//! multi-tenant hosts can run several side by side.

use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::Response;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use crate::cache::{
    with_http_caching, InMemorySharedBackend, MetricsSnapshot, MultiTierCacheManager,
    SharedBackend, TierStats,
};
use crate::config::ServiceConfig;
use crate::error::Result;
use crate::geo::{GeoBounds, GeoCell, GeospatialIndexer};
use crate::invalidation::{InvalidationEngine, InvalidationReport};
use crate::monitoring::{HealthCheck, HealthResponse};
use crate::stats::{CacheStats, StatsTracker};
use crate::tiles::{
    GeoItem, PopulateReport, ResolvedViewport, TileCacheEntry, TileFetcher, TileStore,
    ViewportFilters, ViewportQuery, ViewportResult,
};
use crate::warmer::{CacheWarmer, WarmReport};

/// Everything the admin API reports in one document
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSnapshot {
    pub stats: CacheStats,
    pub metrics: MetricsSnapshot,
    pub tiers: TierStats,
}

/// Tile cache for items of type `T`
pub struct ViewportCacheService<T> {
    config: ServiceConfig,
    manager: Arc<MultiTierCacheManager>,
    indexer: Arc<GeospatialIndexer>,
    stats: Arc<StatsTracker>,
    store: Arc<TileStore<T>>,
    invalidation: InvalidationEngine,
    warmer: CacheWarmer<T>,
    health: HealthCheck,
}

impl<T> ViewportCacheService<T>
where
    T: GeoItem + Serialize + DeserializeOwned + Clone + Send + Sync,
{
    /// Build a service over an in-memory shared tier
    pub fn new(config: ServiceConfig) -> Result<Self> {
        Self::with_backend(config, Arc::new(InMemorySharedBackend::new()))
    }

    /// Build a service over the given shared tier
    pub fn with_backend(config: ServiceConfig, backend: Arc<dyn SharedBackend>) -> Result<Self> {
        config.validate()?;

        let manager = Arc::new(MultiTierCacheManager::with_config(config.cache.clone(), backend));
        let indexer = Arc::new(GeospatialIndexer::with_config(config.tiling.clone()));
        let stats = Arc::new(StatsTracker::new());
        let store = Arc::new(TileStore::new(
            Arc::clone(&manager),
            Arc::clone(&indexer),
            Arc::clone(&stats),
            config.tiles.clone(),
        ));
        let invalidation = InvalidationEngine::new(
            Arc::clone(&manager),
            Arc::clone(&indexer),
            config.tiles.blanket_tag.as_str(),
        );
        let warmer = CacheWarmer::new(Arc::clone(&store), config.warmer.clone());

        let health = HealthCheck::new();
        health.set_ready(true);

        info!(
            backend = manager.l2().backend_name(),
            namespace = %config.tiles.namespace,
            max_precision = config.tiling.max_precision,
            "Viewport cache service ready"
        );

        Ok(Self {
            config,
            manager,
            indexer,
            stats,
            store,
            invalidation,
            warmer,
            health,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn manager(&self) -> &Arc<MultiTierCacheManager> {
        &self.manager
    }

    pub fn indexer(&self) -> &GeospatialIndexer {
        &self.indexer
    }

    pub fn store(&self) -> &Arc<TileStore<T>> {
        &self.store
    }

    pub fn health_check(&self) -> &HealthCheck {
        &self.health
    }

    // =========================================================================
    // Tiles
    // =========================================================================

    /// Look up the tiles covering a viewport
    pub async fn query_viewport(&self, query: &ViewportQuery) -> Result<ViewportResult<T>> {
        self.store.query_viewport(query).await
    }

    /// Store fetched items into the given tiles
    pub async fn populate(
        &self,
        items: Vec<T>,
        cells: &[GeoCell],
        filters: &ViewportFilters,
        precision: usize,
    ) -> Result<PopulateReport> {
        self.store.populate(items, cells, filters, precision).await
    }

    /// Look up, fetch what is missing, and cache it
    pub async fn resolve_viewport<F>(&self, query: &ViewportQuery, fetcher: &F) -> Result<ResolvedViewport<T>>
    where
        F: TileFetcher<T> + ?Sized,
    {
        self.store.resolve_viewport(query, fetcher).await
    }

    pub async fn get_tile(&self, cell: &GeoCell, filters: &ViewportFilters) -> Option<TileCacheEntry<T>> {
        self.store.get(cell, filters).await
    }

    pub async fn set_tile(&self, cell: &GeoCell, items: Vec<T>, filters: &ViewportFilters) -> Result<()> {
        self.store.set(cell, items, filters).await
    }

    // =========================================================================
    // Invalidation & warming
    // =========================================================================

    /// Purge every tile that could contain the point
    pub async fn invalidate_location(&self, lat: f64, lng: f64) -> Result<InvalidationReport> {
        self.invalidation.invalidate_location(lat, lng).await
    }

    /// Purge every tile in the namespace
    pub async fn invalidate_all(&self) -> InvalidationReport {
        self.invalidation.invalidate_all().await
    }

    pub async fn warm_region<F>(
        &self,
        bounds: &GeoBounds,
        precision: usize,
        filters: &ViewportFilters,
        fetcher: &F,
    ) -> Result<WarmReport>
    where
        F: TileFetcher<T> + ?Sized,
    {
        self.warmer.warm_region(bounds, precision, filters, fetcher).await
    }

    // =========================================================================
    // Observability
    // =========================================================================

    /// Viewport query counters
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Zero the viewport counters and the tier metrics
    pub fn reset_stats(&self) {
        self.stats.reset();
        self.manager.reset_metrics();
        info!("Statistics reset");
    }

    pub fn snapshot(&self) -> ServiceSnapshot {
        ServiceSnapshot {
            stats: self.stats.snapshot(),
            metrics: self.manager.metrics(),
            tiers: self.manager.tier_stats(),
        }
    }

    pub async fn health(&self) -> HealthResponse {
        self.health.report(&self.manager).await
    }

    /// JSON response carrying the configured edge caching headers
    pub fn respond<V: Serialize + ?Sized>(
        &self,
        value: &V,
        if_none_match: Option<&str>,
    ) -> Result<Response<Full<Bytes>>> {
        with_http_caching(value, &self.config.http, if_none_match)
    }
}
