//! Filter signatures
//!
//! Active filters are an ordered struct, serialized in one fixed order so
//! the same filters always produce the same key segment.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geo::GeoCell;

/// Filters that shape a viewport result
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewportFilters {
    pub category: Option<String>,
    pub produce: Option<String>,
    pub county: Option<String>,
    pub open_now: bool,
}

impl ViewportFilters {
    /// No filters
    pub fn none() -> Self {
        Self::default()
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn produce(mut self, produce: impl Into<String>) -> Self {
        self.produce = Some(produce.into());
        self
    }

    pub fn county(mut self, county: impl Into<String>) -> Self {
        self.county = Some(county.into());
        self
    }

    pub fn open_now(mut self, open_now: bool) -> Self {
        self.open_now = open_now;
        self
    }

    /// Deterministic signature of the active filters
    pub fn signature(&self) -> FilterSignature {
        let mut parts = Vec::with_capacity(4);
        fn present(value: &Option<String>) -> Option<&str> {
            value.as_deref().filter(|v| !v.is_empty())
        }

        if let Some(category) = present(&self.category) {
            parts.push(format!("c:{}", escape(category)));
        }
        if let Some(produce) = present(&self.produce) {
            parts.push(format!("p:{}", escape(produce)));
        }
        if let Some(county) = present(&self.county) {
            parts.push(format!("co:{}", escape(county)));
        }
        if self.open_now {
            parts.push("on:1".to_string());
        }

        FilterSignature(parts.join("|"))
    }
}

/// Percent-escape the separator so values can never forge another segment
fn escape(value: &str) -> String {
    value.replace('%', "%25").replace('|', "%7C")
}

/// Key segment derived from [`ViewportFilters`]; empty when no filter is set
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FilterSignature(String);

impl FilterSignature {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Tile key: `<cell>` followed by `|<signature>` when filters are set
    pub fn tile_key(&self, cell: &GeoCell) -> String {
        if self.0.is_empty() {
            cell.as_str().to_string()
        } else {
            format!("{}|{}", cell, self.0)
        }
    }
}

impl fmt::Display for FilterSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(s: &str) -> GeoCell {
        GeoCell::parse(s).unwrap()
    }

    #[test]
    fn test_no_filters_is_bare_cell() {
        let sig = ViewportFilters::none().signature();
        assert!(sig.is_empty());
        assert_eq!(sig.tile_key(&cell("gcpv")), "gcpv");
    }

    #[test]
    fn test_full_key_order() {
        let filters = ViewportFilters::none()
            .open_now(true)
            .county("Kent")
            .produce("apples")
            .category("orchard");
        assert_eq!(
            filters.signature().tile_key(&cell("u10h")),
            "u10h|c:orchard|p:apples|co:Kent|on:1"
        );
    }

    #[test]
    fn test_only_present_filters_appended() {
        let filters = ViewportFilters::none().produce("eggs");
        assert_eq!(filters.signature().as_str(), "p:eggs");

        let filters = ViewportFilters::none().open_now(true);
        assert_eq!(filters.signature().tile_key(&cell("gcpv")), "gcpv|on:1");
    }

    #[test]
    fn test_empty_strings_are_absent() {
        let filters = ViewportFilters {
            category: Some(String::new()),
            ..Default::default()
        };
        assert!(filters.signature().is_empty());
    }

    #[test]
    fn test_different_filters_never_collide() {
        let a = ViewportFilters::none().category("x|p:y");
        let b = ViewportFilters::none().category("x").produce("y");
        assert_ne!(a.signature(), b.signature());

        let a = ViewportFilters::none().category("dairy");
        let b = ViewportFilters::none().produce("dairy");
        assert_ne!(a.signature(), b.signature());
    }

    #[test]
    fn test_same_filters_same_signature() {
        let a = ViewportFilters::none().county("Devon").open_now(true);
        let b = ViewportFilters::none().open_now(true).county("Devon");
        assert_eq!(a.signature(), b.signature());
    }

    #[test]
    fn test_filters_from_json() {
        let filters: ViewportFilters =
            serde_json::from_str(r#"{"category":"dairy","openNow":true}"#).unwrap();
        assert_eq!(filters.signature().as_str(), "c:dairy|on:1");
    }
}
