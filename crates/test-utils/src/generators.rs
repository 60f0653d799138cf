//! Synthetic ERA5 data generators.
//!
//! Fields are laid out row-major `[time][lat][lon]`, matching the order the
//! archive delivers and the reducer consumes.

use std::path::Path;

use chrono::{DateTime, Duration, TimeZone, Utc};

/// `n` hourly timestamps starting at `start`.
pub fn hourly_times(start: DateTime<Utc>, n: usize) -> Vec<DateTime<Utc>> {
    (0..n).map(|i| start + Duration::hours(i as i64)).collect()
}

/// Midnight UTC of the given day.
pub fn utc_midnight(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .expect("valid date")
}

/// A field computed per `(time, lat, lon)` index.
pub fn field_from_fn<F>(n_times: usize, n_lat: usize, n_lon: usize, f: F) -> Vec<f64>
where
    F: Fn(usize, usize, usize) -> f64,
{
    let mut values = Vec::with_capacity(n_times * n_lat * n_lon);
    for t in 0..n_times {
        for lat in 0..n_lat {
            for lon in 0..n_lon {
                values.push(f(t, lat, lon));
            }
        }
    }
    values
}

/// Broadcast one value per timestep over the whole grid.
pub fn field_from_series(series: &[f64], n_lat: usize, n_lon: usize) -> Vec<f64> {
    field_from_fn(series.len(), n_lat, n_lon, |t, _, _| series[t])
}

/// Running sum of per-step increments, like an accumulated flux.
pub fn cumulative(increments: &[f64]) -> Vec<f64> {
    increments
        .iter()
        .scan(0.0, |acc, x| {
            *acc += x;
            Some(*acc)
        })
        .collect()
}

/// Contents of a synthetic ERA5 NetCDF artifact.
#[derive(Debug, Clone)]
pub struct Era5Fixture {
    pub times: Vec<DateTime<Utc>>,
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
    pub variables: Vec<(String, Vec<f64>)>,
    /// Store data variables as packed `i16` with `scale_factor`/`add_offset`.
    pub packed: bool,
}

/// Fill value written for NaN cells of packed variables.
pub const PACKED_MISSING: i16 = -32767;

/// Scale used when packing variables.
pub const PACK_SCALE: f64 = 0.01;

/// Offset used when packing variables.
pub const PACK_OFFSET: f64 = 250.0;

impl Era5Fixture {
    pub fn new(times: Vec<DateTime<Utc>>, latitudes: Vec<f64>, longitudes: Vec<f64>) -> Self {
        Self {
            times,
            latitudes,
            longitudes,
            variables: Vec::new(),
            packed: false,
        }
    }

    pub fn with_variable(mut self, name: &str, values: Vec<f64>) -> Self {
        assert_eq!(
            values.len(),
            self.times.len() * self.latitudes.len() * self.longitudes.len(),
            "variable {} does not match the fixture axes",
            name
        );
        self.variables.push((name.to_string(), values));
        self
    }

    pub fn packed(mut self) -> Self {
        self.packed = true;
        self
    }

    /// Write the fixture as a NetCDF-4 file laid out like an ERA5 delivery.
    pub fn write(&self, path: &Path) -> Result<(), netcdf::Error> {
        let mut file = netcdf::create(path)?;

        file.add_dimension("valid_time", self.times.len())?;
        file.add_dimension("latitude", self.latitudes.len())?;
        file.add_dimension("longitude", self.longitudes.len())?;

        let seconds = self.times.iter().map(|t| t.timestamp()).collect::<Vec<i64>>();
        let mut time_var = file.add_variable::<i64>("valid_time", &["valid_time"])?;
        time_var.put_attribute("units", "seconds since 1970-01-01")?;
        time_var.put_attribute("calendar", "proleptic_gregorian")?;
        time_var.put_values(&seconds, ..)?;

        let mut lat_var = file.add_variable::<f64>("latitude", &["latitude"])?;
        lat_var.put_attribute("units", "degrees_north")?;
        lat_var.put_values(&self.latitudes, ..)?;

        let mut lon_var = file.add_variable::<f64>("longitude", &["longitude"])?;
        lon_var.put_attribute("units", "degrees_east")?;
        lon_var.put_values(&self.longitudes, ..)?;

        let dims = ["valid_time", "latitude", "longitude"];
        for (name, values) in &self.variables {
            if self.packed {
                let packed = values
                    .iter()
                    .map(|v| {
                        if v.is_nan() {
                            PACKED_MISSING
                        } else {
                            ((v - PACK_OFFSET) / PACK_SCALE).round() as i16
                        }
                    })
                    .collect::<Vec<i16>>();
                let mut var = file.add_variable::<i16>(name, &dims)?;
                var.put_attribute("scale_factor", PACK_SCALE)?;
                var.put_attribute("add_offset", PACK_OFFSET)?;
                var.put_attribute("missing_value", PACKED_MISSING)?;
                var.put_values(&packed, ..)?;
            } else {
                let mut var = file.add_variable::<f32>(name, &dims)?;
                let values = values.iter().map(|v| *v as f32).collect::<Vec<f32>>();
                var.put_values(&values, ..)?;
            }
        }

        Ok(())
    }
}
