//! Viewport queries and their results

use serde::{Deserialize, Serialize};

use super::filter::ViewportFilters;
use crate::error::Result;
use crate::geo::{GeoBounds, GeoCell};

/// A bounding box plus filters; lives for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportQuery {
    #[serde(flatten)]
    pub bounds: GeoBounds,
    #[serde(default)]
    pub filters: ViewportFilters,
}

impl ViewportQuery {
    pub fn new(bounds: GeoBounds, filters: ViewportFilters) -> Self {
        Self { bounds, filters }
    }

    /// Reject malformed boxes before any tile computation
    pub fn validate(&self) -> Result<()> {
        self.bounds.validate()
    }
}

/// Outcome of probing the cache for every tile of a viewport
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportResult<T> {
    /// Items from every cached tile, in tile order
    pub cached_items: Vec<T>,
    /// Tiles the caller must fetch from source
    pub uncached_cells: Vec<GeoCell>,
    /// Every tile covering the viewport
    pub all_cells: Vec<GeoCell>,
    /// Precision the tiles were computed at
    pub precision: usize,
    /// (all - uncached) / all
    pub hit_rate: f64,
}

impl<T> ViewportResult<T> {
    /// Whether every tile was served from cache
    pub fn is_complete(&self) -> bool {
        self.uncached_cells.is_empty()
    }
}

/// Outcome of writing freshly fetched items back as tiles
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulateReport {
    /// Tiles stored in both tiers
    pub tiles_written: usize,
    /// Tiles whose shared-tier write failed (still held in memory)
    pub tiles_failed: usize,
    /// Items placed into a requested tile
    pub items_assigned: usize,
    /// Items matching no requested tile; logged and dropped
    pub items_unmatched: usize,
}
