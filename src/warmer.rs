//! Cache Warmer
//!
//! Populates the tile store for a region ahead of demand. Tiles are
//! fetched concurrently within a batch and batches run one after another,
//! optionally separated by a delay, bounding the load on the source.
//! A failing tile is logged and skipped.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};
use crate::geo::{GeoBounds, GeoCell};
use crate::tiles::{GeoItem, TileFetcher, TileStore, ViewportFilters};

/// Warmer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WarmerConfig {
    /// Tiles fetched concurrently per batch
    pub batch_size: usize,
    /// Pause between batches
    #[serde(with = "crate::config::serde_secs")]
    pub batch_delay: Duration,
}

impl Default for WarmerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_delay: Duration::ZERO,
        }
    }
}

impl WarmerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("warmer.batchSize must be greater than 0".into()));
        }
        Ok(())
    }
}

/// Outcome of warming a region
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmReport {
    pub precision: usize,
    pub cells_total: usize,
    pub batches: usize,
    pub tiles_warmed: usize,
    pub items_cached: usize,
    /// Tiles whose fetch or write failed
    pub failed_cells: Vec<GeoCell>,
}

pub struct CacheWarmer<T> {
    store: Arc<TileStore<T>>,
    config: WarmerConfig,
}

impl<T> CacheWarmer<T>
where
    T: GeoItem + Serialize + DeserializeOwned + Clone + Send + Sync,
{
    pub fn new(store: Arc<TileStore<T>>, config: WarmerConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &WarmerConfig {
        &self.config
    }

    /// Warm a region using the configured batch size
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
        self.warm_region_in_batches(bounds, precision, filters, fetcher, self.config.batch_size)
            .await
    }

    /// Warm a region with an explicit batch size
    #[instrument(skip(self, filters, fetcher))]
    pub async fn warm_region_in_batches<F>(
        &self,
        bounds: &GeoBounds,
        precision: usize,
        filters: &ViewportFilters,
        fetcher: &F,
        batch_size: usize,
    ) -> Result<WarmReport>
    where
        F: TileFetcher<T> + ?Sized,
    {
        if batch_size == 0 {
            return Err(Error::Config("batch size must be greater than 0".into()));
        }

        // Tiles outside the tiling range are never queried nor swept by location
        let tiling = self.store.indexer().config();
        if !tiling.precisions().contains(&precision) {
            return Err(Error::InvalidPrecision {
                precision,
                min: tiling.min_precision,
                max: tiling.max_precision,
            });
        }

        let cells = self.store.indexer().covering_cells(bounds, precision)?;
        let mut report = WarmReport {
            precision,
            cells_total: cells.len(),
            ..Default::default()
        };

        info!(cells = cells.len(), batch_size, "Warming region");

        for (index, batch) in cells.chunks(batch_size).enumerate() {
            if index > 0 && !self.config.batch_delay.is_zero() {
                tokio::time::sleep(self.config.batch_delay).await;
            }

            let outcomes = join_all(batch.iter().map(|cell| self.warm_cell(cell, filters, fetcher))).await;

            for (cell, outcome) in batch.iter().zip(outcomes) {
                match outcome {
                    Ok(items) => {
                        report.tiles_warmed += 1;
                        report.items_cached += items;
                    }
                    Err(e) => {
                        warn!(cell = %cell, error = %e, "Skipping tile that failed to warm");
                        report.failed_cells.push(cell.clone());
                    }
                }
            }

            report.batches += 1;
            debug!(batch = index, size = batch.len(), "Warmed batch");
        }

        info!(
            warmed = report.tiles_warmed,
            failed = report.failed_cells.len(),
            batches = report.batches,
            "Region warmed"
        );
        Ok(report)
    }

    async fn warm_cell<F>(&self, cell: &GeoCell, filters: &ViewportFilters, fetcher: &F) -> Result<usize>
    where
        F: TileFetcher<T> + ?Sized,
    {
        let items = fetcher
            .fetch(cell, filters)
            .await
            .map_err(|e| Error::fetch(cell.as_str(), e))?;
        let count = items.len();
        self.store.set(cell, items, filters).await?;
        Ok(count)
    }
}
