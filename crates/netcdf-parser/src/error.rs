//! Error types for NetCDF parsing operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for NetCDF parser operations.
pub type NetCdfResult<T> = Result<T, NetCdfError>;

/// Error types for NetCDF parsing.
#[derive(Error, Debug)]
pub enum NetCdfError {
    /// File I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Missing required variable, dimension or attribute
    #[error("Missing required data: {0}")]
    MissingData(String),

    /// Invalid data format
    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    /// Files opened together disagree on their spatial grid
    #[error("Grid of {path} does not match the other artifacts: {message}")]
    GridMismatch { path: PathBuf, message: String },

    /// No artifact matched the store's glob pattern
    #[error("No files found in {dir} matching {pattern}")]
    NoFiles { dir: PathBuf, pattern: String },

    /// The glob pattern itself is malformed
    #[error("Invalid glob pattern: {0}")]
    Pattern(String),
}

impl From<netcdf::Error> for NetCdfError {
    fn from(err: netcdf::Error) -> Self {
        NetCdfError::InvalidFormat(err.to_string())
    }
}
