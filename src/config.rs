//! Service configuration
//!
//! Every section has defaults, so an empty file is a valid configuration.
//! Durations are written in seconds and may be fractional.
//!
//! ```yaml
//! cache:
//!   l1:
//!     maxEntries: 1000
//!     defaultTtl: 60
//!     evictionPolicy: insertion-order
//!   l2DefaultTtl: 300
//! tiling:
//!   minPrecision: 1
//!   maxPrecision: 8
//!   maxTilesPerQuery: 48
//! tiles:
//!   namespace: viewport
//!   tileTtl: 300
//! warmer:
//!   batchSize: 10
//!   batchDelay: 0.5
//! http:
//!   sMaxageSecs: 300
//!   staleWhileRevalidateSecs: 600
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cache::{CacheConfig, HttpCacheOptions};
use crate::error::{Error, Result};
use crate::geo::TilingConfig;
use crate::tiles::TileStoreConfig;
use crate::warmer::WarmerConfig;

/// Complete service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServiceConfig {
    pub cache: CacheConfig,
    pub tiling: TilingConfig,
    pub tiles: TileStoreConfig,
    pub warmer: WarmerConfig,
    pub http: HttpCacheOptions,
}

impl ServiceConfig {
    /// Load and validate a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&contents)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse and validate YAML
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Self = if contents.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(contents)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.cache.validate()?;
        self.tiling.validate()?;
        self.tiles.validate()?;
        self.warmer.validate()?;

        if self.cache.l1.default_ttl > self.tiles.tile_ttl {
            return Err(Error::Config(format!(
                "cache.l1.defaultTtl ({:?}) must not exceed tiles.tileTtl ({:?})",
                self.cache.l1.default_ttl, self.tiles.tile_ttl
            )));
        }
        Ok(())
    }
}

/// Serde adapter for `Duration` as (fractional) seconds
pub mod serde_secs {
    use std::time::Duration;

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|_| de::Error::custom(format!("invalid duration: {} seconds", secs)))
    }
}
