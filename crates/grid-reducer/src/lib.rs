//! Spatial reduction of ERA5 grids to per-country hourly series.
//!
//! 1. A region selector (ISO alpha-2, alpha-3 or country name) is resolved
//!    against [`CountryBoundaries`] into a [`RegionMask`] on the dataset grid.
//! 2. Accumulated variables are first-differenced along time.
//! 3. Each timestep is averaged over the finite cells inside the mask.
//! 4. One [`CountrySeries`](era5_common::CountrySeries) per variable.

pub mod accumulate;
pub mod boundaries;
pub mod error;
pub mod mask;
pub mod reducer;

pub use accumulate::{deaccumulate, deaccumulate_series};
pub use boundaries::{CountryBoundaries, CountryFeature};
pub use error::{ReduceError, ReduceResult};
pub use mask::RegionMask;
pub use reducer::{reduce_with_mask, spatial_mean, ReduceOptions, SpatialReducer};
