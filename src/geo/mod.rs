//! Geospatial Indexing
//!
//! Fixed-precision spatial cells ("tiles") over WGS84 coordinates.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    GeospatialIndexer                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  encode(lat, lng, p) ──▶ GeoCell ──▶ decode_bounds(cell)      │
//! │                                                               │
//! │  GeoBounds ──▶ optimal_precision ──▶ covering_cells(p)        │
//! │               (≤ max_tiles_per_query)                         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Larger viewports resolve to coarser precisions so a query never fans
//! out to more than a bounded number of tiles.

mod bounds;
mod geohash;
mod proptest;

pub use bounds::{GeoBounds, GeoPoint};
pub use geohash::{
    GeoCell, GeospatialIndexer, TilingConfig, MAX_COVERING_CELLS, MAX_PRECISION, MIN_PRECISION,
};
