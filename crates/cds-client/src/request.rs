//! Retrieval request body for ERA5 datasets.

use era5_common::{BoundingBox, TimeWindow};
use serde::{Deserialize, Serialize};

/// Keyword set of one retrieval, sent as the `inputs` of a process execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrieveRequest {
    pub product_type: Vec<String>,
    pub variable: Vec<String>,
    pub year: String,
    pub month: String,
    pub day: Vec<String>,
    pub time: Vec<String>,
    pub data_format: String,
    pub download_format: String,
    /// North, west, south, east.
    pub area: [f64; 4],
}

impl RetrieveRequest {
    /// Every hour of every day in `window`, unarchived NetCDF over `extent`.
    pub fn new(window: &TimeWindow, variables: &[String], extent: &BoundingBox) -> Self {
        Self {
            product_type: vec!["reanalysis".to_string()],
            variable: variables.to_vec(),
            year: window.year(),
            month: window.month(),
            day: window.day_list(),
            time: TimeWindow::hour_list(),
            data_format: "netcdf".to_string(),
            download_format: "unarchived".to_string(),
            area: extent.to_area(),
        }
    }

    /// Number of fields this request asks for.
    pub fn field_count(&self) -> usize {
        self.variable.len() * self.day.len() * self.time.len()
    }
}

/// POST body of a process execution.
#[derive(Debug, Serialize)]
pub(crate) struct ExecuteBody<'a> {
    pub inputs: &'a RetrieveRequest,
}
