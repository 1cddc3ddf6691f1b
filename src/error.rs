//! Error types for the viewport cache

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error returned by caller-supplied fetchers
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur in the viewport cache
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed
    #[error("Failed to parse configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // =========================================================================
    // Query Errors
    // =========================================================================
    /// Bounding box is degenerate, inverted or out of range
    #[error("Invalid bounding box: {0}")]
    InvalidBounds(String),

    /// Geocell string contains characters outside the geohash alphabet
    #[error("Invalid geocell '{cell}': {reason}")]
    InvalidCell { cell: String, reason: String },

    /// Precision outside the supported range
    #[error("Invalid precision {precision}: must be between {min} and {max}")]
    InvalidPrecision { precision: usize, min: usize, max: usize },

    /// Coordinate outside the valid latitude/longitude range
    #[error("Invalid coordinate ({lat}, {lng})")]
    InvalidCoordinate { lat: f64, lng: f64 },

    // =========================================================================
    // Tier Errors
    // =========================================================================
    /// Shared (L2) tier access failed
    #[error("Shared tier error: {0}")]
    SharedTier(String),

    /// Value could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Compression failed
    #[error("Compression with {algorithm} failed: {reason}")]
    CompressionFailed { algorithm: String, reason: String },

    /// Decompression failed
    #[error("Decompression with {algorithm} failed: {reason}")]
    DecompressionFailed { algorithm: String, reason: String },

    // =========================================================================
    // Source Errors
    // =========================================================================
    /// Caller-supplied fetcher failed for a tile
    #[error("Fetch failed for tile {cell}: {source}")]
    Fetch {
        cell: String,
        #[source]
        source: BoxError,
    },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap a fetcher failure for the given tile
    pub fn fetch(cell: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Error::Fetch {
            cell: cell.into(),
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_keeps_source() {
        let err = Error::fetch("gcpv", "upstream timed out");
        assert_eq!(
            err.to_string(),
            "Fetch failed for tile gcpv: upstream timed out"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
