//! NetCDF reader for ERA5 artifacts downloaded from the archive.
//!
//! Downloaded files share one latitude/longitude grid and carry disjoint
//! slices of the time axis. [`ArtifactStore`] opens every file matching a
//! glob pattern as a single [`NetCdfDataset`]; variable values are read from
//! disk only when requested, so a dataset handle is cheap to hold.
//!
//! Requires libhdf5 and libnetcdf on the host.

pub mod dataset;
pub mod error;
pub mod native;
pub mod store;

pub use dataset::{GriddedDataset, MemoryDataset, VariableCube};
pub use error::{NetCdfError, NetCdfResult};
pub use native::{parse_time_units, silence_hdf5_errors};
pub use store::{ArtifactStore, NetCdfDataset};
