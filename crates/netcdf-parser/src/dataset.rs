//! Gridded dataset abstraction shared by the NetCDF reader and tests.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::error::{NetCdfError, NetCdfResult};

/// A time x latitude x longitude field per variable.
///
/// Axes are available immediately; variable data is only read when
/// [`GriddedDataset::read_variable`] is called.
pub trait GriddedDataset {
    /// Timestamps of the time axis, ascending.
    fn times(&self) -> &[DateTime<Utc>];

    /// Latitude axis in degrees.
    fn latitudes(&self) -> &[f64];

    /// Longitude axis in degrees, in whichever convention the source uses.
    fn longitudes(&self) -> &[f64];

    /// Names of the data variables on the time/lat/lon grid.
    fn variable_names(&self) -> Vec<String>;

    /// Read one variable's values, fill values mapped to NaN.
    fn read_variable(&self, name: &str) -> NetCdfResult<VariableCube>;

    fn has_variable(&self, name: &str) -> bool {
        self.variable_names().iter().any(|v| v == name)
    }
}

/// Dense values of one variable, row-major `[time][lat][lon]`.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableCube {
    pub name: String,
    pub n_times: usize,
    pub n_lat: usize,
    pub n_lon: usize,
    pub values: Vec<f64>,
}

impl VariableCube {
    pub fn new(
        name: impl Into<String>,
        n_times: usize,
        n_lat: usize,
        n_lon: usize,
        values: Vec<f64>,
    ) -> NetCdfResult<Self> {
        let name = name.into();
        let expected = n_times * n_lat * n_lon;
        if values.len() != expected {
            return Err(NetCdfError::InvalidFormat(format!(
                "variable {} has {} values, expected {} ({} x {} x {})",
                name,
                values.len(),
                expected,
                n_times,
                n_lat,
                n_lon
            )));
        }
        Ok(Self {
            name,
            n_times,
            n_lat,
            n_lon,
            values,
        })
    }

    /// Number of cells in one timestep.
    pub fn cells_per_step(&self) -> usize {
        self.n_lat * self.n_lon
    }

    /// Spatial slice for one timestep, row-major `[lat][lon]`.
    pub fn timestep(&self, t: usize) -> &[f64] {
        let len = self.cells_per_step();
        &self.values[t * len..(t + 1) * len]
    }

    pub fn at(&self, t: usize, lat: usize, lon: usize) -> f64 {
        self.values[(t * self.n_lat + lat) * self.n_lon + lon]
    }
}

/// A fully materialised dataset, used for tests and synthetic inputs.
#[derive(Debug, Clone, Default)]
pub struct MemoryDataset {
    times: Vec<DateTime<Utc>>,
    latitudes: Vec<f64>,
    longitudes: Vec<f64>,
    variables: BTreeMap<String, Vec<f64>>,
}

impl MemoryDataset {
    pub fn new(times: Vec<DateTime<Utc>>, latitudes: Vec<f64>, longitudes: Vec<f64>) -> Self {
        Self {
            times,
            latitudes,
            longitudes,
            variables: BTreeMap::new(),
        }
    }

    /// Add a variable; `values` must be `[time][lat][lon]` sized to the axes.
    pub fn with_variable(mut self, name: &str, values: Vec<f64>) -> NetCdfResult<Self> {
        let expected = self.times.len() * self.latitudes.len() * self.longitudes.len();
        if values.len() != expected {
            return Err(NetCdfError::InvalidFormat(format!(
                "variable {} has {} values, expected {}",
                name,
                values.len(),
                expected
            )));
        }
        self.variables.insert(name.to_string(), values);
        Ok(self)
    }
}

impl GriddedDataset for MemoryDataset {
    fn times(&self) -> &[DateTime<Utc>] {
        &self.times
    }

    fn latitudes(&self) -> &[f64] {
        &self.latitudes
    }

    fn longitudes(&self) -> &[f64] {
        &self.longitudes
    }

    fn variable_names(&self) -> Vec<String> {
        self.variables.keys().cloned().collect()
    }

    fn read_variable(&self, name: &str) -> NetCdfResult<VariableCube> {
        let values = self
            .variables
            .get(name)
            .ok_or_else(|| NetCdfError::MissingData(format!("{} variable", name)))?;
        VariableCube::new(
            name,
            self.times.len(),
            self.latitudes.len(),
            self.longitudes.len(),
            values.clone(),
        )
    }
}
