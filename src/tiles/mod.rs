//! Tile-Based Viewport Cache
//!
//! A viewport query is answered tile by tile:
//!
//! ```text
//! ViewportQuery ──▶ optimal_precision ──▶ covering_cells
//!                                              │
//!                       ┌──────────────────────┼──────────────────────┐
//!                       ▼                      ▼                      ▼
//!                 get(cell, sig)         get(cell, sig)  ...    get(cell, sig)
//!                       │                      │                      │
//!                       └──────── cached items + uncached cells ──────┘
//!                                              │
//!                        caller fetches uncached cells, then populate
//! ```
//!
//! Keys are `<namespace>:<cell>|c:<category>|p:<produce>|co:<county>|on:1`
//! with only the active filters appended.

mod entry;
mod filter;
mod query;
mod store;

pub use entry::{GeoItem, GeoRecord, TileCacheEntry};
pub use filter::{FilterSignature, ViewportFilters};
pub use query::{PopulateReport, ViewportQuery, ViewportResult};
pub use store::{ResolvedViewport, TileFetcher, TileStore, TileStoreConfig};
