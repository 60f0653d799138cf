//! Error types for spatial reduction.

use chrono::{DateTime, Utc};
use netcdf_parser::NetCdfError;
use thiserror::Error;

pub type ReduceResult<T> = Result<T, ReduceError>;

#[derive(Error, Debug)]
pub enum ReduceError {
    /// The selector did not resolve to exactly one country on the grid.
    #[error("Region '{selector}' resolved to {} countries on the grid: {found:?}", found.len())]
    AmbiguousRegion { selector: String, found: Vec<String> },

    /// Strict mode: a timestep had no finite value inside the region.
    #[error("No value for {variable} at {time}")]
    MissingSample { variable: String, time: DateTime<Utc> },

    #[error("Variable {0} is not in the dataset")]
    UnknownVariable(String),

    #[error("Mask grid is {mask_lat}x{mask_lon} but dataset grid is {grid_lat}x{grid_lon}")]
    ShapeMismatch {
        mask_lat: usize,
        mask_lon: usize,
        grid_lat: usize,
        grid_lon: usize,
    },

    #[error("Dataset has no time steps")]
    EmptyDataset,

    #[error("Dataset error: {0}")]
    Dataset(#[from] NetCdfError),

    /// Boundary file could not be read or decoded.
    #[error("Invalid boundary source: {0}")]
    Boundaries(String),
}
