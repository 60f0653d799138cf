//! Reading ERA5 artifacts written to disk.

use chrono::Duration;
use netcdf_parser::{ArtifactStore, GriddedDataset, NetCdfDataset, NetCdfError};
use test_utils::{
    assert_approx_eq, field_from_fn, hourly_times, temp_test_dir, utc_midnight, Era5Fixture,
};

fn fixture(start_day: u32, hours: usize) -> Era5Fixture {
    let times = hourly_times(utc_midnight(2025, 1, start_day), hours);
    let offset = (start_day as usize - 1) * 24;
    Era5Fixture::new(times, vec![48.0, 47.0], vec![10.0, 11.0, 12.0])
        .with_variable(
            "t2m",
            field_from_fn(hours, 2, 3, |t, lat, lon| {
                270.0 + (offset + t) as f64 + lat as f64 * 0.1 + lon as f64 * 0.01
            }),
        )
        .with_variable("tp", field_from_fn(hours, 2, 3, |t, _, _| (offset + t) as f64 * 0.001))
}

#[test]
fn test_open_single_artifact() {
    let dir = temp_test_dir();
    let path = dir.path().join("era5_2025_01_01_01.nc");
    fixture(1, 24).write(&path).unwrap();

    let ds = NetCdfDataset::open(&path).unwrap();
    assert_eq!(ds.times().len(), 24);
    assert_eq!(ds.times()[0], utc_midnight(2025, 1, 1));
    assert_eq!(ds.latitudes(), &[48.0, 47.0]);
    assert_eq!(ds.longitudes(), &[10.0, 11.0, 12.0]);
    assert!(ds.has_variable("t2m"));
    assert!(ds.has_variable("tp"));
    assert!(!ds.has_variable("latitude"));

    let cube = ds.read_variable("t2m").unwrap();
    assert_eq!(cube.n_times, 24);
    assert_approx_eq!(cube.at(3, 1, 2), 273.12, 1e-3);
}

#[test]
fn test_store_concatenates_files_in_time_order() {
    let dir = temp_test_dir();
    // Written out of order on purpose; the store sorts by first timestamp.
    fixture(2, 24).write(&dir.path().join("era5_2025_01_02_02.nc")).unwrap();
    fixture(1, 24).write(&dir.path().join("era5_2025_01_01_01.nc")).unwrap();
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let store = ArtifactStore::new(dir.path(), "*.nc");
    assert_eq!(store.list().unwrap().len(), 2);

    let ds = store.open().unwrap();
    assert_eq!(ds.times().len(), 48);
    assert!(ds.times().windows(2).all(|w| w[1] - w[0] == Duration::hours(1)));

    let tp = ds.read_variable("tp").unwrap();
    assert_approx_eq!(tp.at(30, 0, 0), 0.030, 1e-6);
}

#[test]
fn test_open_range_selects_inclusive_window() {
    let dir = temp_test_dir();
    fixture(1, 24).write(&dir.path().join("a.nc")).unwrap();
    fixture(2, 24).write(&dir.path().join("b.nc")).unwrap();

    let start = utc_midnight(2025, 1, 1) + Duration::hours(20);
    let end = utc_midnight(2025, 1, 2) + Duration::hours(3);
    let ds = ArtifactStore::new(dir.path(), "*.nc").open_range(start, end).unwrap();

    assert_eq!(ds.times().len(), 8);
    assert_eq!(ds.times()[0], start);
    assert_eq!(*ds.times().last().unwrap(), end);

    let tp = ds.read_variable("tp").unwrap();
    assert_eq!(tp.n_times, 8);
    assert_approx_eq!(tp.at(0, 1, 1), 0.020, 1e-6);
    assert_approx_eq!(tp.at(7, 1, 1), 0.027, 1e-6);
}

#[test]
fn test_packed_values_are_unpacked_and_missing_is_nan() {
    let dir = temp_test_dir();
    let path = dir.path().join("packed.nc");
    let times = hourly_times(utc_midnight(2025, 3, 1), 2);
    let values = vec![273.15, f64::NAN, 280.5, 290.0, 300.25, 301.0, 265.0, 266.0];
    Era5Fixture::new(times, vec![47.0, 46.0], vec![13.0, 14.0])
        .with_variable("t2m", values)
        .packed()
        .write(&path)
        .unwrap();

    let cube = NetCdfDataset::open(&path).unwrap().read_variable("t2m").unwrap();
    assert_approx_eq!(cube.values[0], 273.15, 0.006);
    assert!(cube.values[1].is_nan());
    assert_approx_eq!(cube.values[4], 300.25, 0.006);
}

#[test]
fn test_empty_store_reports_no_files() {
    let dir = temp_test_dir();
    let err = ArtifactStore::new(dir.path(), "*.nc").open().unwrap_err();
    assert!(matches!(err, NetCdfError::NoFiles { .. }));
}

#[test]
fn test_grid_mismatch_rejected() {
    let dir = temp_test_dir();
    fixture(1, 2).write(&dir.path().join("a.nc")).unwrap();
    let times = hourly_times(utc_midnight(2025, 1, 2), 2);
    Era5Fixture::new(times, vec![48.0, 47.0], vec![10.0, 11.0])
        .with_variable("t2m", vec![0.0; 8])
        .write(&dir.path().join("b.nc"))
        .unwrap();

    let err = ArtifactStore::new(dir.path(), "*.nc").open().unwrap_err();
    assert!(matches!(err, NetCdfError::GridMismatch { .. }));
}

#[test]
fn test_overlapping_artifacts_rejected() {
    let dir = temp_test_dir();
    fixture(1, 24).write(&dir.path().join("a.nc")).unwrap();
    fixture(1, 24).write(&dir.path().join("b.nc")).unwrap();

    let err = ArtifactStore::new(dir.path(), "*.nc").open().unwrap_err();
    assert!(matches!(err, NetCdfError::InvalidFormat(_)));
}
