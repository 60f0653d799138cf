//! Country boundary and grid fixtures.
//!
//! Countries are axis-aligned boxes so the expected mask of any grid cell
//! can be worked out by hand. Cell centres never fall on a box edge.

use std::path::{Path, PathBuf};

/// Request area covering Austria, `north,west,south,east`.
pub const AUSTRIA_AREA: &str = "49.03,9.5,46.35,17.17";

/// A rectangular stand-in for a country polygon.
#[derive(Debug, Clone, Copy)]
pub struct CountryBox {
    pub iso_a2: &'static str,
    /// Natural Earth places the real code here when `iso_a2` is `-99`.
    pub iso_a2_eh: &'static str,
    pub iso_a3: &'static str,
    pub name: &'static str,
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl CountryBox {
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon > self.west && lon < self.east && lat > self.south && lat < self.north
    }
}

pub const AUSTRIA: CountryBox = CountryBox {
    iso_a2: "AT",
    iso_a2_eh: "AT",
    iso_a3: "AUT",
    name: "Austria",
    west: 10.0,
    south: 46.5,
    east: 17.0,
    north: 49.0,
};

pub const SWITZERLAND: CountryBox = CountryBox {
    iso_a2: "CH",
    iso_a2_eh: "CH",
    iso_a3: "CHE",
    name: "Switzerland",
    west: 6.0,
    south: 45.5,
    east: 10.0,
    north: 48.0,
};

pub const GERMANY: CountryBox = CountryBox {
    iso_a2: "DE",
    iso_a2_eh: "DE",
    iso_a3: "DEU",
    name: "Germany",
    west: 6.0,
    south: 49.0,
    east: 15.0,
    north: 55.0,
};

/// Natural Earth ships France with `ISO_A2 = -99`.
pub const FRANCE: CountryBox = CountryBox {
    iso_a2: "-99",
    iso_a2_eh: "FR",
    iso_a3: "-99",
    name: "France",
    west: -5.0,
    south: 42.0,
    east: 6.0,
    north: 51.0,
};

pub const ALPINE_COUNTRIES: [CountryBox; 4] = [AUSTRIA, SWITZERLAND, GERMANY, FRANCE];

/// Latitude axis of the synthetic alpine grid, north to south like ERA5.
pub const ALPINE_LATITUDES: [f64; 3] = [48.5, 47.5, 46.75];

/// Longitude axis of the synthetic alpine grid.
pub const ALPINE_LONGITUDES: [f64; 9] = [8.5, 9.5, 10.5, 11.5, 12.5, 13.5, 14.5, 15.5, 16.5];

/// Number of alpine grid cells inside `country`.
pub fn cells_inside(country: &CountryBox) -> usize {
    ALPINE_LATITUDES
        .iter()
        .flat_map(|lat| ALPINE_LONGITUDES.iter().map(move |lon| (*lon, *lat)))
        .filter(|(lon, lat)| country.contains(*lon, *lat))
        .count()
}

/// Render countries as a Natural Earth style GeoJSON FeatureCollection.
pub fn boundaries_geojson(countries: &[CountryBox]) -> String {
    let features = countries
        .iter()
        .map(|c| {
            format!(
                r#"{{"type":"Feature","properties":{{"ISO_A2":"{}","ISO_A2_EH":"{}","ISO_A3":"{}","NAME":"{}","ADMIN":"{}"}},"geometry":{{"type":"Polygon","coordinates":[[[{w},{s}],[{e},{s}],[{e},{n}],[{w},{n}],[{w},{s}]]]}}}}"#,
                c.iso_a2,
                c.iso_a2_eh,
                c.iso_a3,
                c.name,
                c.name,
                w = c.west,
                s = c.south,
                e = c.east,
                n = c.north
            )
        })
        .collect::<Vec<_>>()
        .join(",");
    format!(r#"{{"type":"FeatureCollection","features":[{}]}}"#, features)
}

/// Write [`ALPINE_COUNTRIES`] to `dir/countries.geojson`.
pub fn write_alpine_boundaries(dir: &Path) -> PathBuf {
    let path = dir.join("countries.geojson");
    std::fs::write(&path, boundaries_geojson(&ALPINE_COUNTRIES))
        .expect("Failed to write boundaries");
    path
}
