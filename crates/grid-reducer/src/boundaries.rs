//! Country boundaries from a Natural Earth style GeoJSON FeatureCollection.
//!
//! Each feature carries `ISO_A2` (falling back to `ISO_A2_EH`), `ISO_A3`
//! and `NAME`/`ADMIN` properties. Natural Earth marks unknown codes with
//! `-99`; those are treated as absent.

use std::collections::HashMap;
use std::path::Path;

use era5_common::bbox::normalize_longitude;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{ReduceError, ReduceResult};

#[derive(Debug, Deserialize)]
struct RawCollection {
    features: Vec<RawFeature>,
}

#[derive(Debug, Deserialize)]
struct RawFeature {
    #[serde(default)]
    properties: Option<HashMap<String, Value>>,
    #[serde(default)]
    geometry: Option<RawGeometry>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum RawGeometry {
    Polygon {
        coordinates: Vec<Vec<Vec<f64>>>,
    },
    MultiPolygon {
        coordinates: Vec<Vec<Vec<Vec<f64>>>>,
    },
    #[serde(other)]
    Unsupported,
}

/// One polygon: an outer ring and optional holes, as (lon, lat) vertices.
#[derive(Debug, Clone)]
struct Polygon {
    exterior: Vec<(f64, f64)>,
    holes: Vec<Vec<(f64, f64)>>,
}

impl Polygon {
    fn from_rings(rings: Vec<Vec<Vec<f64>>>) -> ReduceResult<Self> {
        let mut rings = rings
            .into_iter()
            .map(ring_from_positions)
            .collect::<ReduceResult<Vec<_>>>()?;
        if rings.is_empty() {
            return Err(ReduceError::Boundaries("polygon without rings".to_string()));
        }
        let exterior = rings.remove(0);
        Ok(Self {
            exterior,
            holes: rings,
        })
    }

    fn contains(&self, lon: f64, lat: f64) -> bool {
        ring_contains(&self.exterior, lon, lat)
            && !self.holes.iter().any(|h| ring_contains(h, lon, lat))
    }
}

fn ring_from_positions(positions: Vec<Vec<f64>>) -> ReduceResult<Vec<(f64, f64)>> {
    positions
        .into_iter()
        .map(|p| match p.as_slice() {
            [lon, lat, ..] => Ok((normalize_longitude(*lon), *lat)),
            _ => Err(ReduceError::Boundaries(format!("invalid position {:?}", p))),
        })
        .collect()
}

/// Ray-casting point-in-polygon test.
fn ring_contains(ring: &[(f64, f64)], lon: f64, lat: f64) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;

    for i in 0..n {
        let (xi, yi) = ring[i];
        let (xj, yj) = ring[j];

        if ((yi > lat) != (yj > lat)) && (lon < (xj - xi) * (lat - yi) / (yj - yi) + xi) {
            inside = !inside;
        }
        j = i;
    }

    inside
}

/// An admin-0 country with its polygons.
#[derive(Debug, Clone)]
pub struct CountryFeature {
    pub iso_a2: Option<String>,
    pub iso_a3: Option<String>,
    pub name: String,
    pub admin: Option<String>,
    polygons: Vec<Polygon>,
    /// (west, south, east, north) of all polygons.
    extent: (f64, f64, f64, f64),
}

impl CountryFeature {
    /// Identifier used to label grid cells: alpha-2, else alpha-3, else name.
    pub fn code(&self) -> String {
        self.iso_a2
            .clone()
            .or_else(|| self.iso_a3.clone())
            .unwrap_or_else(|| self.name.clone())
            .to_uppercase()
    }

    /// Whether a selector names this country (alpha-2, alpha-3, name or
    /// admin name; case-insensitive).
    pub fn matches(&self, selector: &str) -> bool {
        let selector = selector.trim();
        [
            self.iso_a2.as_deref(),
            self.iso_a3.as_deref(),
            Some(self.name.as_str()),
            self.admin.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(|candidate| candidate.eq_ignore_ascii_case(selector))
    }

    /// Longitudes in 0..360 are accepted.
    pub fn contains_point(&self, lon: f64, lat: f64) -> bool {
        let lon = normalize_longitude(lon);
        let (west, south, east, north) = self.extent;
        if lon < west || lon > east || lat < south || lat > north {
            return false;
        }
        self.polygons.iter().any(|p| p.contains(lon, lat))
    }
}

/// All countries of a boundary source.
#[derive(Debug, Clone, Default)]
pub struct CountryBoundaries {
    features: Vec<CountryFeature>,
}

impl CountryBoundaries {
    /// Load a GeoJSON file.
    pub fn load(path: &Path) -> ReduceResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ReduceError::Boundaries(format!("failed to read {}: {}", path.display(), e))
        })?;
        let boundaries = Self::from_geojson_str(&text)?;
        info!(path = %path.display(), countries = boundaries.len(), "Loaded country boundaries");
        Ok(boundaries)
    }

    /// Parse a GeoJSON FeatureCollection. Features without a polygon
    /// geometry or without any identifying property are skipped.
    pub fn from_geojson_str(text: &str) -> ReduceResult<Self> {
        let raw: RawCollection =
            serde_json::from_str(text).map_err(|e| ReduceError::Boundaries(e.to_string()))?;

        let mut features = Vec::with_capacity(raw.features.len());
        for feature in raw.features {
            let props = feature.properties.unwrap_or_default();
            let polygons = match feature.geometry {
                Some(RawGeometry::Polygon { coordinates }) => {
                    vec![Polygon::from_rings(coordinates)?]
                }
                Some(RawGeometry::MultiPolygon { coordinates }) => coordinates
                    .into_iter()
                    .map(Polygon::from_rings)
                    .collect::<ReduceResult<Vec<_>>>()?,
                Some(RawGeometry::Unsupported) | None => continue,
            };

            let iso_a2 = property(&props, "ISO_A2").or_else(|| property(&props, "ISO_A2_EH"));
            let iso_a3 = property(&props, "ISO_A3").or_else(|| property(&props, "ISO_A3_EH"));
            let admin = property(&props, "ADMIN");
            let Some(name) = property(&props, "NAME").or_else(|| admin.clone()) else {
                debug!(?iso_a2, "Skipping boundary feature without a name");
                continue;
            };

            let extent = polygons
                .iter()
                .flat_map(|p| p.exterior.iter())
                .fold(
                    (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
                    |(w, s, e, n), (lon, lat)| (w.min(*lon), s.min(*lat), e.max(*lon), n.max(*lat)),
                );

            features.push(CountryFeature {
                iso_a2,
                iso_a3,
                name,
                admin,
                polygons,
                extent,
            });
        }

        Ok(Self { features })
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn features(&self) -> &[CountryFeature] {
        &self.features
    }

    /// Features named by `selector`.
    pub fn matching(&self, selector: &str) -> Vec<&CountryFeature> {
        self.features.iter().filter(|f| f.matches(selector)).collect()
    }

    /// First country containing the point, if any.
    pub fn locate(&self, lon: f64, lat: f64) -> Option<&CountryFeature> {
        self.features.iter().find(|f| f.contains_point(lon, lat))
    }
}

fn property(props: &HashMap<String, Value>, key: &str) -> Option<String> {
    props
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "-99")
        .map(str::to_string)
}
