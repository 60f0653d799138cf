//! Boolean country mask aligned with a dataset's latitude/longitude axes.

use std::collections::BTreeSet;

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::boundaries::CountryBoundaries;
use crate::error::{ReduceError, ReduceResult};

/// Grid cells belonging to exactly one resolved country, row-major `[lat][lon]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionMask {
    country_code: String,
    region_name: String,
    n_lat: usize,
    n_lon: usize,
    cells: Vec<bool>,
}

impl RegionMask {
    /// Label every grid cell with the selected country containing it.
    ///
    /// The selector may be an ISO alpha-2 code, an alpha-3 code or a country
    /// name. Fails with `AmbiguousRegion` unless exactly one distinct country
    /// ends up on the grid.
    pub fn resolve(
        boundaries: &CountryBoundaries,
        selector: &str,
        latitudes: &[f64],
        longitudes: &[f64],
    ) -> ReduceResult<Self> {
        let candidates = boundaries.matching(selector);
        if candidates.is_empty() {
            warn!(selector, "No boundary feature matches region selector");
        }

        let n_lon = longitudes.len();
        let labels = (0..latitudes.len() * n_lon)
            .into_par_iter()
            .map(|idx| {
                let lat = latitudes[idx / n_lon];
                let lon = longitudes[idx % n_lon];
                candidates
                    .iter()
                    .position(|c| c.contains_point(lon, lat))
            })
            .collect::<Vec<_>>();

        let found = labels.iter().flatten().copied().collect::<BTreeSet<_>>();
        let codes = found
            .iter()
            .map(|i| candidates[*i].code())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();

        if codes.len() != 1 {
            return Err(ReduceError::AmbiguousRegion {
                selector: selector.to_string(),
                found: codes,
            });
        }

        // Several features may share one code (e.g. overseas parts); keep the first name.
        let name = found
            .iter()
            .next()
            .map(|i| candidates[*i].name.clone())
            .unwrap_or_default();

        let mask = Self {
            country_code: codes[0].clone(),
            region_name: name,
            n_lat: latitudes.len(),
            n_lon,
            cells: labels.iter().map(Option::is_some).collect(),
        };
        debug!(
            selector,
            country = %mask.country_code,
            cells = mask.count(),
            "Resolved region mask"
        );
        Ok(mask)
    }

    /// Build a mask from per-cell country labels, `None` for unlabelled cells.
    pub fn from_labels(
        selector: &str,
        n_lat: usize,
        n_lon: usize,
        labels: &[Option<&str>],
    ) -> ReduceResult<Self> {
        if labels.len() != n_lat * n_lon {
            return Err(ReduceError::ShapeMismatch {
                mask_lat: n_lat,
                mask_lon: n_lon,
                grid_lat: labels.len() / n_lon.max(1),
                grid_lon: n_lon,
            });
        }

        let found = labels
            .iter()
            .flatten()
            .map(|l| l.to_uppercase())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();
        if found.len() != 1 {
            return Err(ReduceError::AmbiguousRegion {
                selector: selector.to_string(),
                found,
            });
        }

        Ok(Self {
            country_code: found[0].clone(),
            region_name: selector.to_string(),
            n_lat,
            n_lon,
            cells: labels.iter().map(Option::is_some).collect(),
        })
    }

    pub fn country_code(&self) -> &str {
        &self.country_code
    }

    pub fn region_name(&self) -> &str {
        &self.region_name
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.n_lat, self.n_lon)
    }

    pub fn cells(&self) -> &[bool] {
        &self.cells
    }

    /// Number of cells inside the region.
    pub fn count(&self) -> usize {
        self.cells.iter().filter(|c| **c).count()
    }

    /// Check the mask against a dataset grid.
    pub fn check_shape(&self, n_lat: usize, n_lon: usize) -> ReduceResult<()> {
        if (self.n_lat, self.n_lon) != (n_lat, n_lon) {
            return Err(ReduceError::ShapeMismatch {
                mask_lat: self.n_lat,
                mask_lon: self.n_lon,
                grid_lat: n_lat,
                grid_lon: n_lon,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::{
        boundaries_geojson, cells_inside, ALPINE_COUNTRIES, ALPINE_LATITUDES, ALPINE_LONGITUDES,
        AUSTRIA, SWITZERLAND,
    };

    fn alpine() -> CountryBoundaries {
        CountryBoundaries::from_geojson_str(&boundaries_geojson(&ALPINE_COUNTRIES)).unwrap()
    }

    #[test]
    fn test_resolve_austria() {
        let mask =
            RegionMask::resolve(&alpine(), "AUT", &ALPINE_LATITUDES, &ALPINE_LONGITUDES).unwrap();
        assert_eq!(mask.country_code(), "AT");
        assert_eq!(mask.region_name(), "Austria");
        assert_eq!(mask.shape(), (3, 9));
        assert_eq!(mask.count(), cells_inside(&AUSTRIA));
        // 8.5E and 9.5E are west of the Austrian box
        assert!(!mask.cells()[0]);
        assert!(!mask.cells()[1]);
        assert!(mask.cells()[2]);
    }

    #[test]
    fn test_resolve_switzerland() {
        let mask =
            RegionMask::resolve(&alpine(), "ch", &ALPINE_LATITUDES, &ALPINE_LONGITUDES).unwrap();
        assert_eq!(mask.count(), cells_inside(&SWITZERLAND));
    }

    #[test]
    fn test_country_off_grid_is_ambiguous() {
        let err = RegionMask::resolve(&alpine(), "DE", &ALPINE_LATITUDES, &ALPINE_LONGITUDES)
            .unwrap_err();
        match err {
            ReduceError::AmbiguousRegion { found, .. } => assert!(found.is_empty()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_selector_is_ambiguous() {
        let err = RegionMask::resolve(&alpine(), "Atlantis", &ALPINE_LATITUDES, &ALPINE_LONGITUDES)
            .unwrap_err();
        assert!(matches!(err, ReduceError::AmbiguousRegion { .. }));
    }

    #[test]
    fn test_two_countries_sharing_a_name() {
        let json = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","properties":{"ISO_A2":"CD","NAME":"Congo"},
             "geometry":{"type":"Polygon","coordinates":[[[0,0],[2,0],[2,2],[0,2],[0,0]]]}},
            {"type":"Feature","properties":{"ISO_A2":"CG","NAME":"Congo"},
             "geometry":{"type":"Polygon","coordinates":[[[2,0],[4,0],[4,2],[2,2],[2,0]]]}}
        ]}"#;
        let boundaries = CountryBoundaries::from_geojson_str(json).unwrap();
        let err = RegionMask::resolve(&boundaries, "Congo", &[1.0], &[1.0, 3.0]).unwrap_err();
        match err {
            ReduceError::AmbiguousRegion { found, .. } => assert_eq!(found, vec!["CD", "CG"]),
            other => panic!("unexpected error: {other}"),
        }

        // Only one of them on the grid
        let mask = RegionMask::resolve(&boundaries, "Congo", &[1.0], &[3.0]).unwrap();
        assert_eq!(mask.country_code(), "CG");
    }

    #[test]
    fn test_from_labels() {
        let mask =
            RegionMask::from_labels("AT", 2, 2, &[Some("at"), None, Some("AT"), None]).unwrap();
        assert_eq!(mask.country_code(), "AT");
        assert_eq!(mask.cells(), &[true, false, true, false]);

        let err = RegionMask::from_labels("AT", 1, 2, &[Some("AT"), Some("DE")]).unwrap_err();
        assert!(matches!(err, ReduceError::AmbiguousRegion { .. }));

        assert!(RegionMask::from_labels("AT", 2, 2, &[Some("AT")]).is_err());
    }

    #[test]
    fn test_check_shape() {
        let mask = RegionMask::from_labels("AT", 1, 2, &[Some("AT"), None]).unwrap();
        assert!(mask.check_shape(1, 2).is_ok());
        assert!(matches!(mask.check_shape(2, 1), Err(ReduceError::ShapeMismatch { .. })));
    }
}
