//! Spatial reduction of gridded variables to per-country hourly series.

use chrono::{DateTime, Duration, Utc};
use era5_common::{classify_variable, CountrySeries, Sample, StatKind};
use netcdf_parser::{GriddedDataset, VariableCube};
use rayon::prelude::*;
use tracing::{info, instrument, warn};

use crate::accumulate::deaccumulate;
use crate::boundaries::CountryBoundaries;
use crate::error::{ReduceError, ReduceResult};
use crate::mask::RegionMask;

/// Options for [`SpatialReducer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ReduceOptions {
    /// Fail the whole reduction when any timestep has no value.
    pub strict: bool,
}

impl ReduceOptions {
    pub fn strict() -> Self {
        Self { strict: true }
    }
}

/// Mean of the finite, unmasked cells of every timestep.
///
/// A timestep without any such cell yields `None`.
pub fn spatial_mean(cube: &VariableCube, mask: &[bool]) -> Vec<Option<f64>> {
    (0..cube.n_times)
        .into_par_iter()
        .map(|t| {
            let (sum, count) = cube
                .timestep(t)
                .iter()
                .zip(mask)
                .filter(|(v, inside)| **inside && v.is_finite())
                .fold((0.0, 0usize), |(sum, count), (v, _)| (sum + v, count + 1));
            (count > 0).then(|| sum / count as f64)
        })
        .collect()
}

/// Pair increments with the timestamp ending their interval.
///
/// An increment is only kept when its two source timestamps are one hour
/// apart; across a gap in the time axis it would span the whole gap.
fn hourly_increments(
    times: &[DateTime<Utc>],
    means: Vec<Option<f64>>,
    variable: &str,
) -> Vec<Sample> {
    let mut dropped = 0;
    let samples = times
        .windows(2)
        .zip(means)
        .filter_map(|(pair, value)| {
            if pair[1] - pair[0] == Duration::hours(1) {
                Some(Sample::new(pair[1], value))
            } else {
                dropped += 1;
                None
            }
        })
        .collect();

    if dropped > 0 {
        warn!(variable, dropped, "Dropped increments spanning a gap in the time axis");
    }
    samples
}

/// Reduces gridded datasets to country series against a boundary source.
#[derive(Debug, Clone)]
pub struct SpatialReducer {
    boundaries: CountryBoundaries,
    options: ReduceOptions,
}

impl SpatialReducer {
    pub fn new(boundaries: CountryBoundaries) -> Self {
        Self {
            boundaries,
            options: ReduceOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ReduceOptions) -> Self {
        self.options = options;
        self
    }

    pub fn boundaries(&self) -> &CountryBoundaries {
        &self.boundaries
    }

    /// Resolve `region` on the dataset grid and reduce every variable.
    #[instrument(skip(self, dataset, variables), fields(variable_count = variables.len()))]
    pub fn reduce<D>(
        &self,
        dataset: &D,
        variables: &[String],
        region: &str,
    ) -> ReduceResult<Vec<CountrySeries>>
    where
        D: GriddedDataset + ?Sized,
    {
        if dataset.times().is_empty() {
            return Err(ReduceError::EmptyDataset);
        }
        let mask = RegionMask::resolve(
            &self.boundaries,
            region,
            dataset.latitudes(),
            dataset.longitudes(),
        )?;
        reduce_with_mask(dataset, variables, &mask, self.options)
    }
}

/// Reduce every variable of `dataset` over an already resolved mask.
pub fn reduce_with_mask<D>(
    dataset: &D,
    variables: &[String],
    mask: &RegionMask,
    options: ReduceOptions,
) -> ReduceResult<Vec<CountrySeries>>
where
    D: GriddedDataset + ?Sized,
{
    let times = dataset.times();
    if times.is_empty() {
        return Err(ReduceError::EmptyDataset);
    }
    mask.check_shape(dataset.latitudes().len(), dataset.longitudes().len())?;

    if let Some(missing) = variables.iter().find(|v| !dataset.has_variable(v)) {
        return Err(ReduceError::UnknownVariable(missing.clone()));
    }

    let mut output = Vec::with_capacity(variables.len());
    for variable in variables {
        let stat_kind = classify_variable(variable);
        let cube = dataset.read_variable(variable)?;

        let samples = match stat_kind {
            StatKind::Instant => times
                .iter()
                .zip(spatial_mean(&cube, mask.cells()))
                .map(|(time, value)| Sample::new(*time, value))
                .collect::<Vec<_>>(),
            StatKind::IntegratedFlux => {
                let means = spatial_mean(&deaccumulate(&cube)?, mask.cells());
                hourly_increments(times, means, variable)
            }
        };

        let series = CountrySeries::new(variable.as_str(), mask.country_code(), stat_kind, samples);
        let gaps = series.missing().count();
        if gaps > 0 {
            if let (true, Some(first)) = (options.strict, series.missing().next()) {
                return Err(ReduceError::MissingSample {
                    variable: variable.clone(),
                    time: first.time,
                });
            }
            warn!(
                variable = %variable,
                country = %series.country_code,
                gaps,
                "Series has missing samples"
            );
        }

        info!(
            variable = %variable,
            country = %series.country_code,
            stat = %stat_kind,
            samples = series.len(),
            "Reduced variable"
        );
        output.push(series);
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use netcdf_parser::MemoryDataset;
    use test_utils::{
        assert_approx_eq, assert_series_approx_eq, boundaries_geojson, field_from_fn,
        field_from_series, hourly_times, utc_midnight, ALPINE_COUNTRIES, ALPINE_LATITUDES,
        ALPINE_LONGITUDES,
    };

    fn vars(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn alpine_reducer() -> SpatialReducer {
        SpatialReducer::new(
            CountryBoundaries::from_geojson_str(&boundaries_geojson(&ALPINE_COUNTRIES)).unwrap(),
        )
    }

    fn alpine_dataset(n_times: usize) -> MemoryDataset {
        MemoryDataset::new(
            hourly_times(utc_midnight(2025, 1, 1), n_times),
            ALPINE_LATITUDES.to_vec(),
            ALPINE_LONGITUDES.to_vec(),
        )
    }

    #[test]
    fn test_flux_difference_example() {
        let ds = alpine_dataset(4)
            .with_variable("tp", field_from_series(&[0.0, 10.0, 25.0, 5.0], 3, 9))
            .unwrap();

        let series = alpine_reducer().reduce(&ds, &vars(&["tp"]), "AT").unwrap();
        assert_eq!(series.len(), 1);
        let tp = &series[0];
        assert_eq!(tp.stat_kind, StatKind::IntegratedFlux);
        assert_eq!(tp.country_code, "AT");

        let times = ds.times();
        assert_eq!(tp.samples.iter().map(|s| s.time).collect::<Vec<_>>(), times[1..].to_vec());
        assert_series_approx_eq!(
            tp.samples.iter().map(|s| s.value).collect(),
            vec![Some(10.0), Some(15.0), Some(0.0)],
            1e-9
        );
    }

    #[test]
    fn test_flux_not_differenced_across_time_gap() {
        let mut times = hourly_times(utc_midnight(2025, 1, 31) + chrono::Duration::hours(22), 2);
        times.extend(hourly_times(utc_midnight(2025, 3, 1), 2));
        let grid = (ALPINE_LATITUDES.to_vec(), ALPINE_LONGITUDES.to_vec());
        let ds = MemoryDataset::new(times.clone(), grid.0, grid.1)
            .with_variable("tp", field_from_series(&[1.0, 2.0, 50.0, 51.0], 3, 9))
            .unwrap()
            .with_variable("t2m", field_from_series(&[270.0, 271.0, 280.0, 281.0], 3, 9))
            .unwrap();

        let series = alpine_reducer().reduce(&ds, &vars(&["tp", "t2m"]), "AT").unwrap();
        let tp = &series[0];
        let stamps = tp.samples.iter().map(|s| s.time).collect::<Vec<_>>();
        assert_eq!(stamps, vec![times[1], times[3]]);
        assert_series_approx_eq!(
            tp.samples.iter().map(|s| s.value).collect(),
            vec![Some(1.0), Some(1.0)],
            1e-9
        );
        assert_eq!(tp.missing().count(), 0);

        // instantaneous values are unaffected by the gap
        assert_eq!(series[1].len(), 4);
    }

    #[test]
    fn test_instant_mean_ignores_cells_outside_country() {
        // Swiss cells (lon index 0 and 1) are hot, Austrian cells vary by longitude.
        let ds = alpine_dataset(2)
            .with_variable(
                "t2m",
                field_from_fn(2, 3, 9, |t, _, lon| {
                    if lon < 2 {
                        1000.0
                    } else {
                        270.0 + lon as f64 + t as f64
                    }
                }),
            )
            .unwrap();

        let series = alpine_reducer().reduce(&ds, &vars(&["t2m"]), "Austria").unwrap();
        let t2m = &series[0];
        assert_eq!(t2m.stat_kind, StatKind::Instant);
        assert_eq!(t2m.len(), 2);
        // mean of lon indices 2..=8 is 5
        assert_approx_eq!(t2m.samples[0].value.unwrap(), 275.0, 1e-9);
        assert_approx_eq!(t2m.samples[1].value.unwrap(), 276.0, 1e-9);
    }

    #[test]
    fn test_nan_cells_excluded_and_all_nan_is_missing() {
        let ds = alpine_dataset(2)
            .with_variable(
                "t2m",
                field_from_fn(2, 3, 9, |t, lat, _| match (t, lat) {
                    (0, 0) => f64::NAN,
                    (0, _) => 280.0,
                    _ => f64::NAN,
                }),
            )
            .unwrap();

        let series = alpine_reducer().reduce(&ds, &vars(&["t2m"]), "AT").unwrap();
        assert_series_approx_eq!(
            series[0].samples.iter().map(|s| s.value).collect(),
            vec![Some(280.0), None],
            1e-9
        );
    }

    #[test]
    fn test_strict_mode_rejects_gaps() {
        let ds = alpine_dataset(2)
            .with_variable("t2m", field_from_series(&[280.0, f64::NAN], 3, 9))
            .unwrap();

        let err = alpine_reducer()
            .with_options(ReduceOptions::strict())
            .reduce(&ds, &vars(&["t2m"]), "AT")
            .unwrap_err();
        match err {
            ReduceError::MissingSample { variable, time } => {
                assert_eq!(variable, "t2m");
                assert_eq!(time, ds.times()[1]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_variable() {
        let ds = alpine_dataset(2).with_variable("t2m", vec![0.0; 54]).unwrap();
        let err = alpine_reducer().reduce(&ds, &vars(&["t2m", "u10"]), "AT").unwrap_err();
        assert!(matches!(err, ReduceError::UnknownVariable(v) if v == "u10"));
    }

    #[test]
    fn test_empty_dataset() {
        let ds = alpine_dataset(0).with_variable("t2m", Vec::new()).unwrap();
        let err = alpine_reducer().reduce(&ds, &vars(&["t2m"]), "AT").unwrap_err();
        assert!(matches!(err, ReduceError::EmptyDataset));
    }

    #[test]
    fn test_ambiguous_region_propagates() {
        let ds = alpine_dataset(1).with_variable("t2m", vec![0.0; 27]).unwrap();
        let err = alpine_reducer().reduce(&ds, &vars(&["t2m"]), "Germany").unwrap_err();
        assert!(matches!(err, ReduceError::AmbiguousRegion { .. }));
    }

    #[test]
    fn test_mask_shape_mismatch() {
        let ds = alpine_dataset(1).with_variable("t2m", vec![0.0; 27]).unwrap();
        let mask = RegionMask::from_labels("AT", 1, 1, &[Some("AT")]).unwrap();
        let err =
            reduce_with_mask(&ds, &vars(&["t2m"]), &mask, ReduceOptions::default()).unwrap_err();
        assert!(matches!(err, ReduceError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_one_series_per_variable_in_order() {
        let ds = alpine_dataset(3)
            .with_variable("ssrd", field_from_series(&[0.0, 3.0, 7.0], 3, 9))
            .unwrap()
            .with_variable("t2m", field_from_series(&[1.0, 2.0, 3.0], 3, 9))
            .unwrap();

        let series = alpine_reducer().reduce(&ds, &vars(&["t2m", "ssrd"]), "AT").unwrap();
        assert_eq!(series.iter().map(|s| s.variable.as_str()).collect::<Vec<_>>(), ["t2m", "ssrd"]);
        assert_eq!(series[0].len(), 3);
        assert_eq!(series[1].len(), 2);
        assert_eq!(series[1].stat_kind, StatKind::IntegratedFlux);
    }

    #[test]
    fn test_spatial_mean_all_masked_out() {
        let cube = VariableCube::new("t2m", 1, 1, 2, vec![1.0, 2.0]).unwrap();
        assert_eq!(spatial_mean(&cube, &[false, false]), vec![None]);
        assert_eq!(spatial_mean(&cube, &[true, true]), vec![Some(1.5)]);
    }
}
