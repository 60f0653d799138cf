//! Geographic bounding box used for archive requests.

use serde::{Deserialize, Serialize};

/// A latitude/longitude bounding box in degrees.
///
/// The archive's `area` keyword orders the corners as north, west, south, east.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub north: f64,
    pub west: f64,
    pub south: f64,
    pub east: f64,
}

impl BoundingBox {
    pub fn new(north: f64, west: f64, south: f64, east: f64) -> Self {
        Self {
            north,
            west,
            south,
            east,
        }
    }

    /// Parse an `area` string: "north,west,south,east"
    pub fn from_area_string(s: &str) -> Result<Self, BboxParseError> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(BboxParseError::InvalidFormat(s.to_string()));
        }

        let mut values = [0.0f64; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| BboxParseError::InvalidNumber(part.to_string()))?;
        }

        let bbox = Self::new(values[0], values[1], values[2], values[3]);
        if bbox.south > bbox.north {
            return Err(BboxParseError::Inverted(s.to_string()));
        }
        Ok(bbox)
    }

    /// Corners in archive `area` order.
    pub fn to_area(&self) -> [f64; 4] {
        [self.north, self.west, self.south, self.east]
    }

    /// Check if a point is inside the box. Longitudes in 0..360 are accepted.
    pub fn contains_point(&self, lon: f64, lat: f64) -> bool {
        let lon = normalize_longitude(lon);
        lon >= self.west && lon <= self.east && lat >= self.south && lat <= self.north
    }
}

/// Map a longitude in degrees to the -180..180 convention.
pub fn normalize_longitude(lon: f64) -> f64 {
    if lon > 180.0 {
        lon - 360.0
    } else {
        lon
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BboxParseError {
    #[error("Invalid area format: {0}. Expected 'north,west,south,east'")]
    InvalidFormat(String),

    #[error("Invalid number in area: {0}")]
    InvalidNumber(String),

    #[error("South edge is north of the north edge: {0}")]
    Inverted(String),
}
