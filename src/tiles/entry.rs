//! Tile entries and the item contract

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::{GeoBounds, GeoCell, GeoPoint};

/// A cacheable record with a point location
pub trait GeoItem {
    fn location(&self) -> GeoPoint;
}

impl GeoItem for GeoPoint {
    fn location(&self) -> GeoPoint {
        *self
    }
}

/// Point record with free-form properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoRecord {
    pub id: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub properties: serde_json::Value,
}

impl GeoRecord {
    pub fn new(id: impl Into<String>, lat: f64, lng: f64) -> Self {
        Self {
            id: id.into(),
            lat,
            lng,
            properties: serde_json::Value::Null,
        }
    }

    pub fn with_properties(mut self, properties: serde_json::Value) -> Self {
        self.properties = properties;
        self
    }
}

impl GeoItem for GeoRecord {
    fn location(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

/// Cached contents of one tile for one filter signature.
///
/// `bounds` comes from decoding `cell`, never from the query that filled
/// it. Entries are replaced whole, never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileCacheEntry<T> {
    pub cell: GeoCell,
    pub items: Vec<T>,
    pub bounds: GeoBounds,
    pub created_at: DateTime<Utc>,
    pub item_count: usize,
}

impl<T> TileCacheEntry<T> {
    pub fn new(cell: GeoCell, items: Vec<T>, bounds: GeoBounds) -> Self {
        Self {
            item_count: items.len(),
            cell,
            items,
            bounds,
            created_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
