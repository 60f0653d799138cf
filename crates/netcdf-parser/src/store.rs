//! Local artifact store: every downloaded file matching a glob pattern,
//! opened as one dataset on a combined time axis.

use std::ops::Range;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::dataset::{GriddedDataset, VariableCube};
use crate::error::{NetCdfError, NetCdfResult};
use crate::native::{self, FileAxes};

/// Directory of downloaded artifacts addressed by a glob pattern.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
    pattern: String,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>, pattern: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            pattern: pattern.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Matching files, sorted by path.
    pub fn list(&self) -> NetCdfResult<Vec<PathBuf>> {
        let pattern = self.dir.join(&self.pattern);
        let pattern = pattern.to_string_lossy();
        let mut files = glob::glob(&pattern)
            .map_err(|e| NetCdfError::Pattern(e.to_string()))?
            .filter_map(Result::ok)
            .filter(|p| p.is_file())
            .collect::<Vec<_>>();
        files.sort();
        Ok(files)
    }

    /// Open every matching file as one dataset.
    pub fn open(&self) -> NetCdfResult<NetCdfDataset> {
        let files = self.list()?;
        if files.is_empty() {
            return Err(NetCdfError::NoFiles {
                dir: self.dir.clone(),
                pattern: self.pattern.clone(),
            });
        }
        NetCdfDataset::open_many(&files)
    }

    /// Open every matching file and restrict the time axis to `[start, end]`.
    pub fn open_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> NetCdfResult<NetCdfDataset> {
        Ok(self.open()?.subset(start, end))
    }
}

/// One or more NetCDF files sharing a spatial grid, concatenated along time.
#[derive(Debug, Clone)]
pub struct NetCdfDataset {
    files: Vec<FileAxes>,
    times: Vec<DateTime<Utc>>,
    latitudes: Vec<f64>,
    longitudes: Vec<f64>,
    variables: Vec<String>,
    /// Selected slice of the combined time axis.
    window: Range<usize>,
}

impl NetCdfDataset {
    /// Open a single artifact.
    pub fn open(path: &Path) -> NetCdfResult<Self> {
        Self::open_many(&[path.to_path_buf()])
    }

    /// Open several artifacts; they are ordered by their first timestamp.
    pub fn open_many(paths: &[PathBuf]) -> NetCdfResult<Self> {
        let mut files = paths
            .iter()
            .map(|p| native::read_axes(p))
            .collect::<NetCdfResult<Vec<_>>>()?;
        files.retain(|f| !f.times.is_empty());
        files.sort_by_key(|f| f.times[0]);

        let first = files
            .first()
            .ok_or_else(|| NetCdfError::MissingData("time steps in any artifact".to_string()))?;
        let latitudes = first.latitudes.clone();
        let longitudes = first.longitudes.clone();

        for file in &files[1..] {
            if file.latitudes != latitudes || file.longitudes != longitudes {
                return Err(NetCdfError::GridMismatch {
                    path: file.path.clone(),
                    message: format!(
                        "{}x{} grid vs {}x{}",
                        file.latitudes.len(),
                        file.longitudes.len(),
                        latitudes.len(),
                        longitudes.len()
                    ),
                });
            }
        }

        for pair in files.windows(2) {
            let prev_last = pair[0].times.last().copied();
            if prev_last.is_some_and(|t| t >= pair[1].times[0]) {
                return Err(NetCdfError::InvalidFormat(format!(
                    "time axes of {} and {} overlap",
                    pair[0].path.display(),
                    pair[1].path.display()
                )));
            }
        }

        let variables = first
            .variables
            .iter()
            .filter(|v| files.iter().all(|f| f.variables.contains(v)))
            .cloned()
            .collect::<Vec<_>>();
        let times = files.iter().flat_map(|f| f.times.iter().copied()).collect::<Vec<_>>();

        info!(
            files = files.len(),
            times = times.len(),
            lat = latitudes.len(),
            lon = longitudes.len(),
            "Opened ERA5 dataset"
        );

        Ok(Self {
            window: 0..times.len(),
            files,
            times,
            latitudes,
            longitudes,
            variables,
        })
    }

    /// Restrict the time axis to timestamps within `[start, end]`.
    pub fn subset(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        let lo = self.times.partition_point(|t| *t < start);
        let hi = self.times.partition_point(|t| *t <= end);
        self.window = lo..hi.max(lo);
        debug!(
            start = %start,
            end = %end,
            selected = self.window.len(),
            "Subset dataset time axis"
        );
        self
    }

    /// Files backing this dataset.
    pub fn paths(&self) -> Vec<&Path> {
        self.files.iter().map(|f| f.path.as_path()).collect()
    }
}

impl GriddedDataset for NetCdfDataset {
    fn times(&self) -> &[DateTime<Utc>] {
        &self.times[self.window.clone()]
    }

    fn latitudes(&self) -> &[f64] {
        &self.latitudes
    }

    fn longitudes(&self) -> &[f64] {
        &self.longitudes
    }

    fn variable_names(&self) -> Vec<String> {
        self.variables.clone()
    }

    fn read_variable(&self, name: &str) -> NetCdfResult<VariableCube> {
        if !self.variables.iter().any(|v| v == name) {
            return Err(NetCdfError::MissingData(format!("{} variable", name)));
        }

        let cells = self.latitudes.len() * self.longitudes.len();
        let mut values = Vec::with_capacity(self.window.len() * cells);
        let mut offset = 0;

        for file in &self.files {
            let file_range = offset..offset + file.times.len();
            offset = file_range.end;

            let lo = file_range.start.max(self.window.start);
            let hi = file_range.end.min(self.window.end);
            if lo >= hi {
                continue;
            }

            let data = native::read_variable(file, name)?;
            let local = (lo - file_range.start)..(hi - file_range.start);
            values.extend_from_slice(&data[local.start * cells..local.end * cells]);
        }

        VariableCube::new(
            name,
            self.window.len(),
            self.latitudes.len(),
            self.longitudes.len(),
            values,
        )
    }
}
