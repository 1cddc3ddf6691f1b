//! Geographic points and bounding boxes

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Valid latitude range in degrees
pub const LAT_RANGE: (f64, f64) = (-90.0, 90.0);

/// Valid longitude range in degrees
pub const LNG_RANGE: (f64, f64) = (-180.0, 180.0);

/// A point location in WGS84 degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    /// Create a new point
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Check the point lies within the valid coordinate ranges
    pub fn validate(&self) -> Result<()> {
        let lat_ok = self.lat.is_finite() && (LAT_RANGE.0..=LAT_RANGE.1).contains(&self.lat);
        let lng_ok = self.lng.is_finite() && (LNG_RANGE.0..=LNG_RANGE.1).contains(&self.lng);
        if lat_ok && lng_ok {
            Ok(())
        } else {
            Err(Error::InvalidCoordinate {
                lat: self.lat,
                lng: self.lng,
            })
        }
    }
}

/// Rectangular region; both edges are inclusive
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl GeoBounds {
    /// Create bounds without validation
    pub fn new(min_lat: f64, max_lat: f64, min_lng: f64, max_lng: f64) -> Self {
        Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        }
    }

    /// The whole globe
    pub fn world() -> Self {
        Self::new(LAT_RANGE.0, LAT_RANGE.1, LNG_RANGE.0, LNG_RANGE.1)
    }

    /// Reject non-finite, inverted, zero-span and out-of-range boxes.
    ///
    /// Boxes crossing the antimeridian (min_lng > max_lng) are rejected;
    /// callers split them into two boxes.
    pub fn validate(&self) -> Result<()> {
        let values = [self.min_lat, self.max_lat, self.min_lng, self.max_lng];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidBounds(format!(
                "non-finite coordinate in {:?}",
                self
            )));
        }
        if self.min_lat < LAT_RANGE.0 || self.max_lat > LAT_RANGE.1 {
            return Err(Error::InvalidBounds(format!(
                "latitude span [{}, {}] outside [-90, 90]",
                self.min_lat, self.max_lat
            )));
        }
        if self.min_lng < LNG_RANGE.0 || self.max_lng > LNG_RANGE.1 {
            return Err(Error::InvalidBounds(format!(
                "longitude span [{}, {}] outside [-180, 180]",
                self.min_lng, self.max_lng
            )));
        }
        if self.min_lat >= self.max_lat {
            return Err(Error::InvalidBounds(format!(
                "minLat {} must be below maxLat {}",
                self.min_lat, self.max_lat
            )));
        }
        if self.min_lng >= self.max_lng {
            return Err(Error::InvalidBounds(format!(
                "minLng {} must be below maxLng {}",
                self.min_lng, self.max_lng
            )));
        }
        Ok(())
    }

    /// Check whether a point lies inside (edges inclusive)
    pub fn contains(&self, point: &GeoPoint) -> bool {
        point.lat >= self.min_lat
            && point.lat <= self.max_lat
            && point.lng >= self.min_lng
            && point.lng <= self.max_lng
    }

    /// Latitude span in degrees
    pub fn lat_span(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Longitude span in degrees
    pub fn lng_span(&self) -> f64 {
        self.max_lng - self.min_lng
    }

    /// Center point
    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }
}
