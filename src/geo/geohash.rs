//! Geohash Tiling
//!
//! Encodes points to fixed-precision geohash cells, decodes cells back to
//! their rectangular bounds, and enumerates the cells covering a bounding box.
//!
//! # Design
//!
//! - Standard base32 geohash with longitude on even bits
//! - Encoding is plain bisection, so a cell at precision `p` is always a
//!   string prefix of the cell at `p + 1` for the same point
//! - Covering works on integer row/column indices, which makes the cover
//!   gap-free and duplicate-free by construction

use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use super::bounds::{GeoBounds, GeoPoint, LAT_RANGE, LNG_RANGE};
use crate::error::{Error, Result};

/// Geohash alphabet
const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Bits encoded per geohash character
const BITS_PER_CHAR: usize = 5;

/// Lowest supported precision
pub const MIN_PRECISION: usize = 1;

/// Highest supported precision (60 bits, fits a u64 index pair)
pub const MAX_PRECISION: usize = 12;

/// Largest cover `covering_cells` will materialise
pub const MAX_COVERING_CELLS: u64 = 65_536;

// =============================================================================
// GeoCell
// =============================================================================

/// Geohash cell identifier ("tile")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeoCell(String);

impl GeoCell {
    /// Parse and validate a cell string
    pub fn parse(cell: impl Into<String>) -> Result<Self> {
        let cell = cell.into();
        if cell.is_empty() || cell.len() > MAX_PRECISION {
            return Err(Error::InvalidCell {
                reason: format!("length must be 1..={}", MAX_PRECISION),
                cell,
            });
        }
        if let Some(bad) = cell.bytes().find(|b| char_index(*b).is_none()) {
            return Err(Error::InvalidCell {
                reason: format!("'{}' is not a geohash character", bad as char),
                cell,
            });
        }
        Ok(Self(cell))
    }

    /// Cell id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Precision (number of characters)
    pub fn precision(&self) -> usize {
        self.0.len()
    }

    /// True if `self` contains `other` or `other` contains `self`
    pub fn is_related(&self, other: &GeoCell) -> bool {
        self.0.starts_with(&other.0) || other.0.starts_with(&self.0)
    }

    /// Tag under which every tile entry for this cell is registered
    pub fn tag(&self) -> String {
        format!("tile:{}", self.0)
    }
}

impl fmt::Display for GeoCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for GeoCell {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Bit helpers
// =============================================================================

fn char_index(byte: u8) -> Option<u8> {
    BASE32.iter().position(|c| *c == byte).map(|i| i as u8)
}

/// (lat_bits, lng_bits) for a precision; longitude takes the odd extra bit
#[inline]
fn bit_split(precision: usize) -> (u32, u32) {
    let total = precision * BITS_PER_CHAR;
    ((total / 2) as u32, total.div_ceil(2) as u32)
}

fn check_precision(precision: usize) -> Result<()> {
    if (MIN_PRECISION..=MAX_PRECISION).contains(&precision) {
        Ok(())
    } else {
        Err(Error::InvalidPrecision {
            precision,
            min: MIN_PRECISION,
            max: MAX_PRECISION,
        })
    }
}

/// Bisect `value` over [lo, hi) into a `bits`-wide index.
///
/// Midpoints are dyadic fractions of the range and are exact in f64.
fn bisect(value: f64, mut lo: f64, mut hi: f64, bits: u32) -> u64 {
    let mut idx = 0u64;
    for _ in 0..bits {
        let mid = (lo + hi) / 2.0;
        if value >= mid {
            idx = (idx << 1) | 1;
            lo = mid;
        } else {
            idx <<= 1;
            hi = mid;
        }
    }
    idx
}

/// Row/column of the cell containing a point
fn point_indices(lat: f64, lng: f64, precision: usize) -> (u64, u64) {
    let (lat_bits, lng_bits) = bit_split(precision);
    (
        bisect(lat, LAT_RANGE.0, LAT_RANGE.1, lat_bits),
        bisect(lng, LNG_RANGE.0, LNG_RANGE.1, lng_bits),
    )
}

/// Interleave row/column indices into a geohash string
fn cell_from_indices(lat_idx: u64, lng_idx: u64, precision: usize) -> GeoCell {
    let (mut lat_left, mut lng_left) = bit_split(precision);
    let mut out = String::with_capacity(precision);
    let mut chunk = 0u8;

    for bit in 0..precision * BITS_PER_CHAR {
        let b = if bit % 2 == 0 {
            lng_left -= 1;
            (lng_idx >> lng_left) & 1
        } else {
            lat_left -= 1;
            (lat_idx >> lat_left) & 1
        };
        chunk = (chunk << 1) | b as u8;
        if bit % BITS_PER_CHAR == BITS_PER_CHAR - 1 {
            out.push(BASE32[chunk as usize] as char);
            chunk = 0;
        }
    }

    GeoCell(out)
}

/// Split a geohash back into row/column indices
fn cell_indices(cell: &GeoCell) -> (u64, u64) {
    let mut lat_idx = 0u64;
    let mut lng_idx = 0u64;
    let mut bit = 0usize;

    for byte in cell.as_str().bytes() {
        // GeoCell is validated on construction
        let value = char_index(byte).unwrap_or(0);
        for shift in (0..BITS_PER_CHAR).rev() {
            let b = u64::from((value >> shift) & 1);
            if bit % 2 == 0 {
                lng_idx = (lng_idx << 1) | b;
            } else {
                lat_idx = (lat_idx << 1) | b;
            }
            bit += 1;
        }
    }

    (lat_idx, lng_idx)
}

// =============================================================================
// Tiling configuration
// =============================================================================

/// Precision selection limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TilingConfig {
    /// Coarsest precision a query may use
    pub min_precision: usize,
    /// Finest precision a query may use
    pub max_precision: usize,
    /// Upper bound on tiles per query (honoured down to `min_precision`)
    pub max_tiles_per_query: usize,
}

impl Default for TilingConfig {
    fn default() -> Self {
        Self {
            min_precision: 1,
            max_precision: 8,
            max_tiles_per_query: 48,
        }
    }
}

impl TilingConfig {
    /// Validate precision limits
    pub fn validate(&self) -> Result<()> {
        check_precision(self.min_precision)?;
        check_precision(self.max_precision)?;
        if self.min_precision > self.max_precision {
            return Err(Error::Config(format!(
                "min_precision {} exceeds max_precision {}",
                self.min_precision, self.max_precision
            )));
        }
        if self.max_tiles_per_query == 0 || self.max_tiles_per_query as u64 > MAX_COVERING_CELLS {
            return Err(Error::Config(format!(
                "max_tiles_per_query must be in 1..={}",
                MAX_COVERING_CELLS
            )));
        }
        Ok(())
    }

    /// Precisions from coarse to fine
    pub fn precisions(&self) -> RangeInclusive<usize> {
        self.min_precision..=self.max_precision
    }
}

// =============================================================================
// Indexer
// =============================================================================

/// Spatial indexer mapping coordinates and boxes to geohash cells
#[derive(Debug, Clone, Default)]
pub struct GeospatialIndexer {
    config: TilingConfig,
}

impl GeospatialIndexer {
    /// Create an indexer with default limits
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an indexer with custom limits
    pub fn with_config(config: TilingConfig) -> Self {
        Self { config }
    }

    /// Get configuration
    pub fn config(&self) -> &TilingConfig {
        &self.config
    }

    /// Encode a point at the given precision
    pub fn encode(&self, lat: f64, lng: f64, precision: usize) -> Result<GeoCell> {
        check_precision(precision)?;
        GeoPoint::new(lat, lng).validate()?;
        let (lat_idx, lng_idx) = point_indices(lat, lng, precision);
        Ok(cell_from_indices(lat_idx, lng_idx, precision))
    }

    /// Rectangular bounds a cell represents
    pub fn decode_bounds(&self, cell: &GeoCell) -> GeoBounds {
        let (lat_bits, lng_bits) = bit_split(cell.precision());
        let (lat_idx, lng_idx) = cell_indices(cell);

        let lat_height = (LAT_RANGE.1 - LAT_RANGE.0) / (1u64 << lat_bits) as f64;
        let lng_width = (LNG_RANGE.1 - LNG_RANGE.0) / (1u64 << lng_bits) as f64;

        let min_lat = LAT_RANGE.0 + lat_idx as f64 * lat_height;
        let min_lng = LNG_RANGE.0 + lng_idx as f64 * lng_width;

        GeoBounds::new(min_lat, min_lat + lat_height, min_lng, min_lng + lng_width)
    }

    /// Number of cells `covering_cells` would return, without allocating
    pub fn covering_count(&self, bounds: &GeoBounds, precision: usize) -> Result<u64> {
        check_precision(precision)?;
        bounds.validate()?;
        let (lat_lo, lng_lo) = point_indices(bounds.min_lat, bounds.min_lng, precision);
        let (lat_hi, lng_hi) = point_indices(bounds.max_lat, bounds.max_lng, precision);
        Ok((lat_hi - lat_lo + 1) * (lng_hi - lng_lo + 1))
    }

    /// Same-precision cells whose union covers `bounds`.
    ///
    /// Every point inside the box encodes to exactly one returned cell; the
    /// result holds no duplicates and is ordered south-west to north-east.
    /// Covers larger than [`MAX_COVERING_CELLS`] are rejected.
    pub fn covering_cells(&self, bounds: &GeoBounds, precision: usize) -> Result<Vec<GeoCell>> {
        let count = self.covering_count(bounds, precision)?;
        if count > MAX_COVERING_CELLS {
            return Err(Error::InvalidBounds(format!(
                "{} cells at precision {} exceeds the limit of {}",
                count, precision, MAX_COVERING_CELLS
            )));
        }

        let (lat_lo, lng_lo) = point_indices(bounds.min_lat, bounds.min_lng, precision);
        let (lat_hi, lng_hi) = point_indices(bounds.max_lat, bounds.max_lng, precision);

        let mut cells = Vec::with_capacity(count as usize);
        for lat_idx in lat_lo..=lat_hi {
            for lng_idx in lng_lo..=lng_hi {
                cells.push(cell_from_indices(lat_idx, lng_idx, precision));
            }
        }
        Ok(cells)
    }

    /// Finest precision whose cover stays within `max_tiles_per_query`.
    ///
    /// Falls back to `min_precision` when even that is too many tiles.
    pub fn optimal_precision(&self, bounds: &GeoBounds) -> Result<usize> {
        bounds.validate()?;
        for precision in self.config.precisions().rev() {
            if self.covering_count(bounds, precision)? <= self.config.max_tiles_per_query as u64 {
                return Ok(precision);
            }
        }
        Ok(self.config.min_precision)
    }
}

// =============================================================================
// Tests
// =============================================================================
