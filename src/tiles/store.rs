//! Tile store
//!
//! Per-tile cache entries keyed by (cell, filter signature), stored through
//! the multi-tier manager. Probing never fetches; callers fetch the
//! uncached tiles and feed the results back through [`TileStore::populate`],
//! or let [`TileStore::resolve_viewport`] do both steps with a
//! [`TileFetcher`].

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{join_all, try_join_all};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::entry::{GeoItem, TileCacheEntry};
use super::filter::ViewportFilters;
use super::query::{PopulateReport, ViewportQuery, ViewportResult};
use crate::cache::{CacheKey, CacheOptions, MultiTierCacheManager, DEFAULT_L2_TTL, MAX_TTL};
use crate::error::{BoxError, Error, Result};
use crate::geo::{GeoCell, GeospatialIndexer, MAX_PRECISION, MIN_PRECISION};
use crate::stats::StatsTracker;

/// Source of truth for tile contents
#[async_trait]
pub trait TileFetcher<T>: Send + Sync {
    /// Items inside `cell` matching `filters`
    async fn fetch(
        &self,
        cell: &GeoCell,
        filters: &ViewportFilters,
    ) -> std::result::Result<Vec<T>, BoxError>;
}

/// Tile store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TileStoreConfig {
    /// Key namespace (`<namespace>:<tile key>`)
    pub namespace: String,
    /// Tag carried by every tile entry for whole-namespace sweeps
    pub blanket_tag: String,
    /// Shared-tier TTL for tile entries
    #[serde(with = "crate::config::serde_secs")]
    pub tile_ttl: Duration,
}

impl Default for TileStoreConfig {
    fn default() -> Self {
        Self {
            namespace: "viewport".to_string(),
            blanket_tag: "viewport".to_string(),
            tile_ttl: DEFAULT_L2_TTL,
        }
    }
}

impl TileStoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(Error::Config("tiles.namespace must not be empty".into()));
        }
        if self.blanket_tag.is_empty() {
            return Err(Error::Config("tiles.blanketTag must not be empty".into()));
        }
        if self.tile_ttl.is_zero() || self.tile_ttl > MAX_TTL {
            return Err(Error::Config(format!(
                "tiles.tileTtl must be greater than 0 and at most {:?}",
                MAX_TTL
            )));
        }
        Ok(())
    }
}

/// Viewport answered from cache plus source
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedViewport<T> {
    /// Cached items followed by freshly fetched ones
    pub items: Vec<T>,
    pub all_cells: Vec<GeoCell>,
    /// Tiles that had to be fetched
    pub fetched_cells: Vec<GeoCell>,
    pub precision: usize,
    /// Cache hit rate before fetching
    pub hit_rate: f64,
    pub populate: PopulateReport,
}

/// Tile cache over the multi-tier manager
pub struct TileStore<T> {
    manager: Arc<MultiTierCacheManager>,
    indexer: Arc<GeospatialIndexer>,
    stats: Arc<StatsTracker>,
    config: TileStoreConfig,
    _items: PhantomData<fn() -> T>,
}

impl<T> TileStore<T>
where
    T: GeoItem + Serialize + DeserializeOwned + Clone + Send + Sync,
{
    pub fn new(
        manager: Arc<MultiTierCacheManager>,
        indexer: Arc<GeospatialIndexer>,
        stats: Arc<StatsTracker>,
        config: TileStoreConfig,
    ) -> Self {
        Self {
            manager,
            indexer,
            stats,
            config,
            _items: PhantomData,
        }
    }

    pub fn config(&self) -> &TileStoreConfig {
        &self.config
    }

    pub fn indexer(&self) -> &GeospatialIndexer {
        &self.indexer
    }

    /// Cache key for a tile under the given filters
    pub fn cache_key(&self, cell: &GeoCell, filters: &ViewportFilters) -> CacheKey {
        CacheKey::new(
            self.config.namespace.as_str(),
            filters.signature().tile_key(cell),
        )
    }

    /// Cached entry for a tile, if any. Never fetches.
    pub async fn get(
        &self,
        cell: &GeoCell,
        filters: &ViewportFilters,
    ) -> Option<TileCacheEntry<T>> {
        self.manager.get_json(&self.cache_key(cell, filters)).await
    }

    /// Store a tile, replacing any previous entry.
    ///
    /// Bounds come from decoding the cell. The entry is tagged with the
    /// cell tag and the blanket tag. A shared-tier failure is returned
    /// after the memory tier has been written.
    pub async fn set(&self, cell: &GeoCell, items: Vec<T>, filters: &ViewportFilters) -> Result<()> {
        let entry = TileCacheEntry::new(cell.clone(), items, self.indexer.decode_bounds(cell));
        let options = CacheOptions::with_ttl(self.config.tile_ttl)
            .tag(self.config.blanket_tag.as_str())
            .tag(cell.tag());

        self.manager
            .set_json(&self.cache_key(cell, filters), &entry, &options)
            .await
    }

    /// Look up every tile covering the viewport concurrently
    #[instrument(skip(self, query), fields(filters = %query.filters.signature()))]
    pub async fn query_viewport(&self, query: &ViewportQuery) -> Result<ViewportResult<T>> {
        query.validate()?;

        let precision = self.indexer.optimal_precision(&query.bounds)?;
        let all_cells = self.indexer.covering_cells(&query.bounds, precision)?;

        let lookups = join_all(all_cells.iter().map(|cell| self.get(cell, &query.filters))).await;

        let mut cached_items = Vec::new();
        let mut uncached_cells = Vec::new();
        for (cell, lookup) in all_cells.iter().zip(lookups) {
            match lookup {
                Some(entry) => cached_items.extend(entry.items),
                None => uncached_cells.push(cell.clone()),
            }
        }

        let total = all_cells.len();
        let cached = total - uncached_cells.len();
        let hit_rate = if total == 0 {
            0.0
        } else {
            cached as f64 / total as f64
        };
        let outcome = self.stats.record_query(total, cached);

        debug!(
            precision,
            tiles = total,
            cached,
            items = cached_items.len(),
            outcome = ?outcome,
            "Viewport looked up"
        );

        Ok(ViewportResult {
            cached_items,
            uncached_cells,
            all_cells,
            precision,
            hit_rate,
        })
    }

    /// Group fetched items into the requested tiles and store each tile.
    ///
    /// Every requested tile is written, empty ones included. An item joins
    /// the requested tile related to its own cell by prefix; items with no
    /// such tile are logged and dropped.
    #[instrument(skip(self, items, cells, filters), fields(items = items.len(), cells = cells.len()))]
    pub async fn populate(
        &self,
        items: Vec<T>,
        cells: &[GeoCell],
        filters: &ViewportFilters,
        precision: usize,
    ) -> Result<PopulateReport> {
        if !(MIN_PRECISION..=MAX_PRECISION).contains(&precision) {
            return Err(Error::InvalidPrecision {
                precision,
                min: MIN_PRECISION,
                max: MAX_PRECISION,
            });
        }

        let mut report = PopulateReport::default();
        let mut groups: HashMap<&GeoCell, Vec<T>> =
            cells.iter().map(|cell| (cell, Vec::new())).collect();

        for item in items {
            match self.assign(&item, cells, precision) {
                Some(cell) => {
                    report.items_assigned += 1;
                    groups.entry(cell).or_default().push(item);
                }
                None => report.items_unmatched += 1,
            }
        }

        if report.items_unmatched > 0 {
            warn!(
                unmatched = report.items_unmatched,
                "Dropped items outside every requested tile"
            );
        }

        let writes = groups
            .into_iter()
            .map(|(cell, items)| async move { (cell, self.set(cell, items, filters).await) });

        for (cell, outcome) in join_all(writes).await {
            match outcome {
                Ok(()) => report.tiles_written += 1,
                Err(e) => {
                    report.tiles_failed += 1;
                    warn!(cell = %cell, error = %e, "Tile write did not reach the shared tier");
                }
            }
        }

        debug!(?report, "Populated tiles");
        Ok(report)
    }

    /// Requested tile an item belongs to
    fn assign<'a>(&self, item: &T, cells: &'a [GeoCell], precision: usize) -> Option<&'a GeoCell> {
        let location = item.location();
        let own = match self.indexer.encode(location.lat, location.lng, precision) {
            Ok(cell) => cell,
            Err(e) => {
                warn!(error = %e, "Item has an invalid location");
                return None;
            }
        };

        let mut related = cells.iter().filter(|cell| cell.is_related(&own));
        let first = related.next()?;
        if first.precision() <= own.precision() {
            // Same or coarser requested tiles are disjoint; at most one matches
            return Some(first);
        }

        // Finer requested tiles: pick the one that holds the point
        std::iter::once(first)
            .chain(related)
            .find(|cell| self.indexer.decode_bounds(cell).contains(&location))
            .or(Some(first))
    }

    /// Look up the viewport, fetch every uncached tile, and write them back.
    ///
    /// The first fetcher failure is returned as [`Error::Fetch`] and nothing
    /// is cached for that query.
    #[instrument(skip(self, query, fetcher))]
    pub async fn resolve_viewport<F>(&self, query: &ViewportQuery, fetcher: &F) -> Result<ResolvedViewport<T>>
    where
        F: TileFetcher<T> + ?Sized,
    {
        let lookup = self.query_viewport(query).await?;
        if lookup.uncached_cells.is_empty() {
            return Ok(ResolvedViewport {
                items: lookup.cached_items,
                all_cells: lookup.all_cells,
                fetched_cells: Vec::new(),
                precision: lookup.precision,
                hit_rate: lookup.hit_rate,
                populate: PopulateReport::default(),
            });
        }

        let fetches = lookup.uncached_cells.iter().map(|cell| async move {
            fetcher
                .fetch(cell, &query.filters)
                .await
                .map_err(|e| Error::fetch(cell.as_str(), e))
        });
        let fetched: Vec<T> = try_join_all(fetches).await?.into_iter().flatten().collect();

        info!(
            tiles = lookup.uncached_cells.len(),
            items = fetched.len(),
            "Fetched uncached tiles"
        );

        let populate = self
            .populate(
                fetched.clone(),
                &lookup.uncached_cells,
                &query.filters,
                lookup.precision,
            )
            .await?;

        let mut items = lookup.cached_items;
        items.extend(fetched);

        Ok(ResolvedViewport {
            items,
            all_cells: lookup.all_cells,
            fetched_cells: lookup.uncached_cells,
            precision: lookup.precision,
            hit_rate: lookup.hit_rate,
            populate,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{GeoBounds, GeoPoint};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn store() -> TileStore<GeoPoint> {
        TileStore::new(
            Arc::new(MultiTierCacheManager::in_memory()),
            Arc::new(GeospatialIndexer::new()),
            Arc::new(StatsTracker::new()),
            TileStoreConfig::default(),
        )
    }

    fn cell(s: &str) -> GeoCell {
        GeoCell::parse(s).unwrap()
    }

    fn london() -> ViewportQuery {
        ViewportQuery::new(GeoBounds::new(51.28, 51.69, -0.51, 0.33), ViewportFilters::none())
    }

    struct CountingFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TileFetcher<GeoPoint> for CountingFetcher {
        async fn fetch(
            &self,
            cell: &GeoCell,
            _filters: &ViewportFilters,
        ) -> std::result::Result<Vec<GeoPoint>, BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let center = GeospatialIndexer::new().decode_bounds(cell).center();
            Ok(vec![center])
        }
    }

    #[test]
    fn test_cache_key_format() {
        let store = store();
        let filters = ViewportFilters::none().category("dairy").open_now(true);
        assert_eq!(
            store.cache_key(&cell("gcpv"), &filters).storage_key(),
            "viewport:gcpv|c:dairy|on:1"
        );
    }

    #[tokio::test]
    async fn test_set_uses_decoded_bounds() {
        let store = store();
        let gcpv = cell("gcpv");
        store
            .set(&gcpv, vec![GeoPoint::new(51.5074, -0.1278)], &ViewportFilters::none())
            .await
            .unwrap();

        let entry = store.get(&gcpv, &ViewportFilters::none()).await.unwrap();
        assert_eq!(entry.bounds, store.indexer().decode_bounds(&gcpv));
        assert_eq!(entry.item_count, 1);
        assert!(store.get(&gcpv, &ViewportFilters::none().open_now(true)).await.is_none());
    }

    #[tokio::test]
    async fn test_query_empty_cache() {
        let store = store();
        let result = store.query_viewport(&london()).await.unwrap();

        assert_eq!(result.precision, 4);
        assert_eq!(result.all_cells.len(), 12);
        assert_eq!(result.uncached_cells.len(), 12);
        assert_eq!(result.hit_rate, 0.0);
        assert!(result.cached_items.is_empty());
    }

    #[tokio::test]
    async fn test_partial_hit_rate() {
        let store = store();
        let query = london();
        let cells = store.query_viewport(&query).await.unwrap().all_cells;

        for c in cells.iter().take(3) {
            store.set(c, Vec::new(), &query.filters).await.unwrap();
        }

        let result = store.query_viewport(&query).await.unwrap();
        assert_eq!(result.hit_rate, 3.0 / 12.0);
        assert_eq!(result.uncached_cells.len(), 9);
        assert_eq!(store.stats.snapshot().partial_hits, 1);
    }

    #[tokio::test]
    async fn test_invalid_query_rejected() {
        let store = store();
        let query = ViewportQuery::new(GeoBounds::new(52.0, 51.0, 0.0, 1.0), ViewportFilters::none());
        assert!(matches!(
            store.query_viewport(&query).await,
            Err(Error::InvalidBounds(_))
        ));
    }

    #[tokio::test]
    async fn test_populate_writes_empty_cells_and_drops_strays() {
        let store = store();
        let cells = vec![cell("gcpv"), cell("gcpu")];
        let items = vec![
            GeoPoint::new(51.5074, -0.1278), // gcpv
            GeoPoint::new(40.7, -74.0),      // New York, outside both
        ];

        let report = store
            .populate(items, &cells, &ViewportFilters::none(), 4)
            .await
            .unwrap();

        assert_eq!(report.tiles_written, 2);
        assert_eq!(report.items_assigned, 1);
        assert_eq!(report.items_unmatched, 1);

        let gcpv = store.get(&cell("gcpv"), &ViewportFilters::none()).await.unwrap();
        assert_eq!(gcpv.item_count, 1);
        let gcpu = store.get(&cell("gcpu"), &ViewportFilters::none()).await.unwrap();
        assert!(gcpu.is_empty());
        // No tile is created for the stray item
        assert!(store.get(&cell("dr5r"), &ViewportFilters::none()).await.is_none());
    }

    #[tokio::test]
    async fn test_populate_matches_finer_item_cells() {
        let store = store();
        let cells = vec![cell("gcpv")];
        let report = store
            .populate(
                vec![GeoPoint::new(51.5074, -0.1278)], // gcpvj0d
                &cells,
                &ViewportFilters::none(),
                7,
            )
            .await
            .unwrap();
        assert_eq!(report.items_assigned, 1);
        assert_eq!(report.items_unmatched, 0);
    }

    #[tokio::test]
    async fn test_populate_picks_containing_finer_cell() {
        let store = store();
        // Requested tiles are finer than the populate precision; the item
        // encodes to gcpv, which prefixes both
        let cells = vec![cell("gcpvj1"), cell("gcpvj0")];
        let report = store
            .populate(
                vec![GeoPoint::new(51.5074, -0.1278)],
                &cells,
                &ViewportFilters::none(),
                4,
            )
            .await
            .unwrap();

        assert_eq!(report.tiles_written, 2);
        assert_eq!(report.items_assigned, 1);

        let holder = store.get(&cell("gcpvj0"), &ViewportFilters::none()).await.unwrap();
        assert_eq!(holder.item_count, 1);
        let neighbour = store.get(&cell("gcpvj1"), &ViewportFilters::none()).await.unwrap();
        assert!(neighbour.is_empty());
    }

    #[tokio::test]
    async fn test_populate_rejects_bad_precision() {
        let store = store();
        let result = store
            .populate(Vec::new(), &[], &ViewportFilters::none(), 13)
            .await;
        assert!(matches!(result, Err(Error::InvalidPrecision { .. })));
    }

    #[tokio::test]
    async fn test_resolve_viewport_fetches_only_uncached() {
        let store = store();
        let fetcher = CountingFetcher {
            calls: AtomicUsize::new(0),
        };

        let first = store.resolve_viewport(&london(), &fetcher).await.unwrap();
        assert_eq!(first.fetched_cells.len(), 12);
        assert_eq!(first.items.len(), 12);
        assert_eq!(first.populate.tiles_written, 12);

        let second = store.resolve_viewport(&london(), &fetcher).await.unwrap();
        assert!(second.fetched_cells.is_empty());
        assert_eq!(second.hit_rate, 1.0);
        assert_eq!(second.items.len(), 12);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 12);
    }
}
