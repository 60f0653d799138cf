//! Conversion of accumulated fields to hourly increments.
//!
//! The archive delivers radiation and precipitation as running totals that
//! restart once a day. First differences along time recover the amount for
//! the hour ending at each timestamp; a restart shows up as a negative step
//! and is clamped to zero.

use netcdf_parser::{NetCdfResult, VariableCube};
use rayon::prelude::*;

/// Increment between two consecutive accumulated values.
///
/// Missing inputs stay missing.
#[inline]
pub fn increment(previous: f64, current: f64) -> f64 {
    let diff = current - previous;
    if diff < 0.0 {
        0.0
    } else {
        diff
    }
}

/// First differences of one series; the result is one element shorter.
pub fn deaccumulate_series(values: &[f64]) -> Vec<f64> {
    values.windows(2).map(|w| increment(w[0], w[1])).collect()
}

/// First differences of every cell along time.
///
/// Timestep `t` of the result is the increment ending at input timestep
/// `t + 1`; the first input timestep has no predecessor and is dropped.
pub fn deaccumulate(cube: &VariableCube) -> NetCdfResult<VariableCube> {
    let n_times = cube.n_times.saturating_sub(1);
    let values = (1..cube.n_times)
        .into_par_iter()
        .flat_map_iter(|t| {
            let previous = cube.timestep(t - 1);
            cube.timestep(t)
                .iter()
                .zip(previous)
                .map(|(c, p)| increment(*p, *c))
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    VariableCube::new(cube.name.clone(), n_times, cube.n_lat, cube.n_lon, values)
}
