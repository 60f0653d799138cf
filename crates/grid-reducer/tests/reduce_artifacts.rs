//! End-to-end reduction of NetCDF artifacts on disk.

use era5_common::StatKind;
use grid_reducer::{CountryBoundaries, ReduceOptions, SpatialReducer};
use netcdf_parser::ArtifactStore;
use test_utils::{
    assert_approx_eq, cumulative, field_from_fn, hourly_times, temp_test_dir, utc_midnight,
    write_alpine_boundaries, Era5Fixture, ALPINE_LATITUDES, ALPINE_LONGITUDES,
};

fn write_day(dir: &std::path::Path, day: u32) {
    let times = hourly_times(utc_midnight(2025, 1, day), 24);
    // 1 mm per hour accumulated from midnight, restarting each day
    let accumulated = cumulative(&[0.001; 24]);
    Era5Fixture::new(times, ALPINE_LATITUDES.to_vec(), ALPINE_LONGITUDES.to_vec())
        .with_variable("t2m", field_from_fn(24, 3, 9, |t, _, _| 270.0 + t as f64))
        .with_variable("tp", field_from_fn(24, 3, 9, |t, _, _| accumulated[t]))
        .write(&dir.join(format!("era5_2025_01_{:02}_{:02}.nc", day, day)))
        .unwrap();
}

#[test]
fn test_reduce_two_days_for_austria() {
    let dir = temp_test_dir();
    write_day(dir.path(), 1);
    write_day(dir.path(), 2);
    let boundaries = CountryBoundaries::load(&write_alpine_boundaries(dir.path())).unwrap();

    let dataset = ArtifactStore::new(dir.path(), "era5_*.nc").open().unwrap();
    let reducer = SpatialReducer::new(boundaries).with_options(ReduceOptions::strict());
    let series = reducer
        .reduce(&dataset, &["t2m".to_string(), "tp".to_string()], "AT")
        .unwrap();

    let t2m = &series[0];
    assert_eq!(t2m.stat_kind, StatKind::Instant);
    assert_eq!(t2m.len(), 48);
    assert_approx_eq!(t2m.samples[5].value.unwrap(), 275.0, 1e-4);
    assert_approx_eq!(t2m.samples[29].value.unwrap(), 275.0, 1e-4);

    let tp = &series[1];
    assert_eq!(tp.stat_kind, StatKind::IntegratedFlux);
    assert_eq!(tp.len(), 47);
    assert_eq!(tp.samples[0].time, utc_midnight(2025, 1, 1) + chrono::Duration::hours(1));
    assert_approx_eq!(tp.samples[0].value.unwrap(), 0.001, 1e-6);
    // Day rollover: the running total restarts, clamped to zero
    assert_eq!(tp.samples[23].time, utc_midnight(2025, 1, 2));
    assert_approx_eq!(tp.samples[23].value.unwrap(), 0.0, 1e-9);
    assert_approx_eq!(tp.samples[24].value.unwrap(), 0.001, 1e-6);
}

#[test]
fn test_reduce_subset_of_store() {
    let dir = temp_test_dir();
    write_day(dir.path(), 1);
    write_day(dir.path(), 2);
    let boundaries = CountryBoundaries::load(&write_alpine_boundaries(dir.path())).unwrap();

    let day = utc_midnight(2025, 1, 2);
    let dataset = ArtifactStore::new(dir.path(), "era5_*.nc")
        .open_range(day, day + chrono::Duration::hours(23))
        .unwrap();
    let series = SpatialReducer::new(boundaries)
        .reduce(&dataset, &["t2m".to_string()], "Switzerland")
        .unwrap();

    assert_eq!(series[0].country_code, "CH");
    assert_eq!(series[0].len(), 24);
    assert_eq!(series[0].samples[0].time, utc_midnight(2025, 1, 2));
}
