//! Native NetCDF reading using the netcdf library.
//!
//! ERA5 artifacts delivered by the archive are NetCDF-4 files with a
//! `valid_time` axis (older deliveries use `time`), `latitude`/`longitude`
//! axes and one variable per requested parameter. Packed variables carry
//! `scale_factor`/`add_offset`; fill values are mapped to NaN.

use std::path::{Path, PathBuf};
use std::sync::Once;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use tracing::debug;

use crate::error::{NetCdfError, NetCdfResult};

const TIME_DIMS: &[&str] = &["valid_time", "time"];
const LAT_DIMS: &[&str] = &["latitude", "lat"];
const LON_DIMS: &[&str] = &["longitude", "lon"];

/// Silence HDF5's automatic error printing to stderr.
///
/// The HDF5 C library prints verbose error messages to stderr even when errors
/// are handled gracefully by the Rust code (e.g., when checking for optional
/// attributes that don't exist). This function disables that output by calling
/// H5Eset_auto2 with null handlers. Safe to call multiple times.
pub fn silence_hdf5_errors() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        // SAFETY: H5Eset_auto2 is thread-safe and we're passing null pointers
        // to disable error output, which is a documented valid use.
        unsafe {
            hdf5_metno_sys::h5e::H5Eset_auto2(
                hdf5_metno_sys::h5e::H5E_DEFAULT,
                None,
                std::ptr::null_mut(),
            );
        }
    });
}

/// Axes and variable inventory of one artifact.
#[derive(Debug, Clone)]
pub struct FileAxes {
    pub path: PathBuf,
    pub times: Vec<DateTime<Utc>>,
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
    pub variables: Vec<String>,
    time_dim: String,
    lat_dim: String,
    lon_dim: String,
}

/// Open a file and read its coordinate axes. Variable data is not touched.
pub fn read_axes(path: &Path) -> NetCdfResult<FileAxes> {
    silence_hdf5_errors();

    let file = netcdf::open(path).map_err(|e| {
        NetCdfError::InvalidFormat(format!("Failed to open {}: {}", path.display(), e))
    })?;

    let time_dim = find_dimension(&file, TIME_DIMS)?;
    let lat_dim = find_dimension(&file, LAT_DIMS)?;
    let lon_dim = find_dimension(&file, LON_DIMS)?;

    let time_var = file
        .variable(&time_dim)
        .ok_or_else(|| NetCdfError::MissingData(format!("{} variable", time_dim)))?;
    let units = get_string_attr(&time_var, "units")
        .ok_or_else(|| NetCdfError::MissingData(format!("{} units", time_dim)))?;
    let (step_seconds, epoch) = parse_time_units(&units)?;
    let times = read_all_f64(&time_var)?
        .into_iter()
        .map(|offset| {
            epoch + Duration::milliseconds((offset * step_seconds * 1000.0).round() as i64)
        })
        .collect::<Vec<_>>();

    let latitudes = read_coordinate(&file, &lat_dim)?;
    let longitudes = read_coordinate(&file, &lon_dim)?;

    let variables = file
        .variables()
        .filter(|var| {
            let dims: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
            dims.contains(&time_dim) && dims.contains(&lat_dim) && dims.contains(&lon_dim)
        })
        .map(|var| var.name())
        .collect::<Vec<_>>();

    debug!(
        path = %path.display(),
        times = times.len(),
        lat = latitudes.len(),
        lon = longitudes.len(),
        variables = ?variables,
        "Read NetCDF axes"
    );

    Ok(FileAxes {
        path: path.to_path_buf(),
        times,
        latitudes,
        longitudes,
        variables,
        time_dim,
        lat_dim,
        lon_dim,
    })
}

/// Read a variable as `[time][lat][lon]` f64 values with packing and fill applied.
pub fn read_variable(axes: &FileAxes, name: &str) -> NetCdfResult<Vec<f64>> {
    silence_hdf5_errors();

    let file = netcdf::open(&axes.path).map_err(|e| {
        NetCdfError::InvalidFormat(format!("Failed to open {}: {}", axes.path.display(), e))
    })?;
    let var = file
        .variable(name)
        .ok_or_else(|| NetCdfError::MissingData(format!("{} variable", name)))?;

    check_dimension_order(axes, &var)?;

    let raw = read_all_f64(&var)?;
    let expected = axes.times.len() * axes.latitudes.len() * axes.longitudes.len();
    if raw.len() != expected {
        return Err(NetCdfError::InvalidFormat(format!(
            "{} in {} has {} values, expected {}",
            name,
            axes.path.display(),
            raw.len(),
            expected
        )));
    }

    let scale_factor = get_f64_attr(&var, "scale_factor").unwrap_or(1.0);
    let add_offset = get_f64_attr(&var, "add_offset").unwrap_or(0.0);
    let fill_value = get_f64_attr(&var, "_FillValue");
    let missing_value = get_f64_attr(&var, "missing_value");

    Ok(raw
        .into_iter()
        .map(|val| {
            if val.is_nan() || Some(val) == fill_value || Some(val) == missing_value {
                f64::NAN
            } else {
                val * scale_factor + add_offset
            }
        })
        .collect())
}

/// Parse CF time units such as `"seconds since 1970-01-01"`.
///
/// Returns the length of one unit in seconds and the reference instant.
pub fn parse_time_units(units: &str) -> NetCdfResult<(f64, DateTime<Utc>)> {
    let (unit, reference) = units
        .split_once(" since ")
        .ok_or_else(|| NetCdfError::InvalidFormat(format!("Unsupported time units: {}", units)))?;

    let step_seconds = match unit.trim().to_ascii_lowercase().as_str() {
        "seconds" | "second" | "s" => 1.0,
        "minutes" | "minute" => 60.0,
        "hours" | "hour" | "h" => 3600.0,
        "days" | "day" | "d" => 86400.0,
        other => {
            return Err(NetCdfError::InvalidFormat(format!(
                "Unsupported time unit: {}",
                other
            )))
        }
    };

    let reference = reference.trim().trim_end_matches('Z');
    let reference = reference.split('.').next().unwrap_or(reference);

    let parsed = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(reference, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(reference, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| {
            NetCdfError::InvalidFormat(format!("Unsupported reference time: {}", units))
        })?;

    Ok((step_seconds, Utc.from_utc_datetime(&parsed)))
}

// =============================================================================
// Internal helpers
// =============================================================================

fn find_dimension(file: &netcdf::File, candidates: &[&str]) -> NetCdfResult<String> {
    candidates
        .iter()
        .find(|name| file.dimension(name).is_some())
        .map(|name| name.to_string())
        .ok_or_else(|| NetCdfError::MissingData(format!("one of {:?} dimensions", candidates)))
}

fn read_coordinate(file: &netcdf::File, name: &str) -> NetCdfResult<Vec<f64>> {
    let var = file
        .variable(name)
        .ok_or_else(|| NetCdfError::MissingData(format!("{} variable", name)))?;
    read_all_f64(&var)
}

/// Time, latitude and longitude must appear in that order; any other
/// dimension (e.g. `number`) must be a singleton.
fn check_dimension_order(axes: &FileAxes, var: &netcdf::Variable) -> NetCdfResult<()> {
    let mut grid_dims = Vec::new();
    for dim in var.dimensions() {
        let name = dim.name();
        if name == axes.time_dim || name == axes.lat_dim || name == axes.lon_dim {
            grid_dims.push(name);
        } else if dim.len() != 1 {
            return Err(NetCdfError::InvalidFormat(format!(
                "{} has non-singleton extra dimension {} ({})",
                var.name(),
                name,
                dim.len()
            )));
        }
    }

    if grid_dims != [axes.time_dim.clone(), axes.lat_dim.clone(), axes.lon_dim.clone()] {
        return Err(NetCdfError::InvalidFormat(format!(
            "{} dimensions {:?} are not ordered time, latitude, longitude",
            var.name(),
            grid_dims
        )));
    }
    Ok(())
}

/// Read a variable of any numeric storage type as f64.
fn read_all_f64(var: &netcdf::Variable) -> NetCdfResult<Vec<f64>> {
    if let Ok(values) = var.get_values::<f64, _>(..) {
        return Ok(values);
    }
    if let Ok(values) = var.get_values::<f32, _>(..) {
        return Ok(values.into_iter().map(f64::from).collect());
    }
    if let Ok(values) = var.get_values::<i16, _>(..) {
        return Ok(values.into_iter().map(f64::from).collect());
    }
    if let Ok(values) = var.get_values::<i32, _>(..) {
        return Ok(values.into_iter().map(f64::from).collect());
    }
    var.get_values::<i64, _>(..)
        .map(|values| values.into_iter().map(|v| v as f64).collect())
        .map_err(|e| NetCdfError::InvalidFormat(format!("Failed to read {}: {}", var.name(), e)))
}

/// Check if a variable has an attribute with the given name.
/// This avoids HDF5 error spam when checking for optional attributes.
fn has_attr(var: &netcdf::Variable, name: &str) -> bool {
    var.attributes().any(|attr| attr.name() == name)
}

/// Helper to get f64 attribute.
fn get_f64_attr(var: &netcdf::Variable, name: &str) -> Option<f64> {
    if !has_attr(var, name) {
        return None;
    }
    let attr_value = var.attribute_value(name)?.ok()?;
    f64::try_from(attr_value).ok()
}

/// Helper to get a string attribute.
fn get_string_attr(var: &netcdf::Variable, name: &str) -> Option<String> {
    if !has_attr(var, name) {
        return None;
    }
    match var.attribute_value(name)?.ok()? {
        netcdf::AttributeValue::Str(s) => Some(s),
        _ => None,
    }
}
