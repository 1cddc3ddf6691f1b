//! Invalidation Engine
//!
//! Purges tile entries after a data mutation.
//!
//! # Strategy
//!
//! - Location: the point is encoded at every configured precision and each
//!   `tile:<cell>` tag is swept from the shared tier
//! - Everything: the blanket namespace tag is swept
//! - The memory tier has no tag index, so it is cleared whole in both cases
//!
//! The shared tier is swept before the memory tier is cleared, so a lookup
//! racing the invalidation cannot backfill a purged entry into memory.
//! Invalidating absent entries is a no-op.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::cache::MultiTierCacheManager;
use crate::error::Result;
use crate::geo::{GeoCell, GeoPoint, GeospatialIndexer};

/// Outcome of one invalidation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidationReport {
    /// Tags swept from the shared tier
    pub tags: Vec<String>,
    /// Shared-tier entries removed
    pub entries_removed: u64,
    /// Tags whose sweep failed; retry these
    pub failed_tags: Vec<String>,
}

impl InvalidationReport {
    /// Whether every tag was swept
    pub fn is_complete(&self) -> bool {
        self.failed_tags.is_empty()
    }
}

/// Removes cache entries affected by data changes
pub struct InvalidationEngine {
    manager: Arc<MultiTierCacheManager>,
    indexer: Arc<GeospatialIndexer>,
    blanket_tag: String,
}

impl InvalidationEngine {
    pub fn new(
        manager: Arc<MultiTierCacheManager>,
        indexer: Arc<GeospatialIndexer>,
        blanket_tag: impl Into<String>,
    ) -> Self {
        Self {
            manager,
            indexer,
            blanket_tag: blanket_tag.into(),
        }
    }

    /// Purge every tile, at every precision, that could contain the point
    #[instrument(skip(self))]
    pub async fn invalidate_location(&self, lat: f64, lng: f64) -> Result<InvalidationReport> {
        GeoPoint::new(lat, lng).validate()?;

        let tags = self
            .indexer
            .config()
            .precisions()
            .map(|precision| self.indexer.encode(lat, lng, precision).map(|cell| cell.tag()))
            .collect::<Result<Vec<_>>>()?;

        let report = self.sweep(tags).await;
        info!(
            removed = report.entries_removed,
            failed = report.failed_tags.len(),
            "Invalidated location"
        );
        Ok(report)
    }

    /// Purge one tile under every filter signature
    #[instrument(skip(self), fields(cell = %cell))]
    pub async fn invalidate_cell(&self, cell: &GeoCell) -> InvalidationReport {
        self.sweep(vec![cell.tag()]).await
    }

    /// Purge every tile in the namespace
    #[instrument(skip(self))]
    pub async fn invalidate_all(&self) -> InvalidationReport {
        let report = self.sweep(vec![self.blanket_tag.clone()]).await;
        info!(
            removed = report.entries_removed,
            complete = report.is_complete(),
            "Invalidated all tiles"
        );
        report
    }

    async fn sweep(&self, tags: Vec<String>) -> InvalidationReport {
        let outcomes = join_all(tags.iter().map(|tag| self.manager.invalidate_tag(tag))).await;

        let mut report = InvalidationReport::default();
        for (tag, outcome) in tags.iter().zip(outcomes) {
            match outcome {
                Ok(removed) => report.entries_removed += removed,
                Err(e) => {
                    warn!(tag = %tag, error = %e, "Tag invalidation failed");
                    report.failed_tags.push(tag.clone());
                }
            }
        }
        report.tags = tags;

        self.manager.clear_l1();
        report
    }
}
