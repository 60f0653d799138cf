//! Configuration loading for the ingester.
//!
//! One YAML file (default `config/era5.yaml`) with `${VAR}` and
//! `${VAR:-default}` substitution. Command-line flags and their environment
//! variables take precedence over the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use cds_client::{CdsClientConfig, SchedulerConfig};
use era5_common::BoundingBox;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngesterConfig {
    #[serde(default)]
    pub cds: CdsConfig,
    #[serde(default)]
    pub download: SchedulerConfig,
    #[serde(default)]
    pub reduce: ReduceConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// Remote archive and request shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdsConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_dataset")]
    pub dataset: String,
    #[serde(default = "default_variables")]
    pub variables: Vec<String>,
    /// Request extent as "north,west,south,east".
    #[serde(default = "default_area")]
    pub area: String,
    /// Largest field count (variables x days x 24) one request may ask for.
    #[serde(default = "default_field_limit")]
    pub field_limit: usize,
    #[serde(default = "default_submit_batch_size")]
    pub submit_batch_size: usize,
    #[serde(default = "default_submit_batch_delay_secs")]
    pub submit_batch_delay_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for CdsConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: String::new(),
            dataset: default_dataset(),
            variables: default_variables(),
            area: default_area(),
            field_limit: default_field_limit(),
            submit_batch_size: default_submit_batch_size(),
            submit_batch_delay_secs: default_submit_batch_delay_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_api_url() -> String {
    "https://cds.climate.copernicus.eu/api".to_string()
}

fn default_dataset() -> String {
    "reanalysis-era5-land".to_string()
}

fn default_variables() -> Vec<String> {
    vec![
        "2m_temperature".to_string(),
        "snow_cover".to_string(),
        "surface_net_solar_radiation".to_string(),
    ]
}

fn default_area() -> String {
    "49.03,9.5,46.35,17.17".to_string()
}

fn default_field_limit() -> usize {
    12000
}

fn default_submit_batch_size() -> usize {
    10
}

fn default_submit_batch_delay_secs() -> u64 {
    25
}

fn default_request_timeout_secs() -> u64 {
    600
}

impl CdsConfig {
    pub fn extent(&self) -> Result<BoundingBox> {
        BoundingBox::from_area_string(&self.area)
            .with_context(|| format!("Invalid cds.area '{}'", self.area))
    }

    pub fn submit_batch_delay(&self) -> Duration {
        Duration::from_secs(self.submit_batch_delay_secs)
    }

    pub fn client_config(&self) -> CdsClientConfig {
        let mut config = CdsClientConfig::new(&self.api_url, &self.api_key);
        config.request_timeout = Duration::from_secs(self.request_timeout_secs);
        config
    }
}

/// Spatial reduction inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReduceConfig {
    /// GeoJSON FeatureCollection of country polygons.
    #[serde(default = "default_boundaries_path")]
    pub boundaries_path: PathBuf,
    /// ISO alpha-2, alpha-3 or country name.
    #[serde(default = "default_region")]
    pub region: String,
    /// Artifacts picked up by the `reduce` command.
    #[serde(default = "default_pattern")]
    pub pattern: String,
    #[serde(default)]
    pub strict: bool,
}

impl Default for ReduceConfig {
    fn default() -> Self {
        Self {
            boundaries_path: default_boundaries_path(),
            region: default_region(),
            pattern: default_pattern(),
            strict: false,
        }
    }
}

fn default_boundaries_path() -> PathBuf {
    PathBuf::from("./data/boundaries/ne_10m_admin_0_countries.geojson")
}

fn default_region() -> String {
    "AT".to_string()
}

fn default_pattern() -> String {
    "*.nc".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string. Empty disables persistence.
    #[serde(default)]
    pub url: String,
}

impl IngesterConfig {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        let config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config from {:?}", path))?;

        debug!(
            dataset = %config.cds.dataset,
            variables = ?config.cds.variables,
            download_dir = %config.download.download_dir.display(),
            "Loaded configuration"
        );
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content)?;
        let config: IngesterConfig = serde_yaml::from_str(&expanded).context("Invalid YAML")?;
        Ok(config)
    }

    /// Apply values given on the command line or through the environment.
    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(url) = &overrides.api_url {
            self.cds.api_url = url.clone();
        }
        if let Some(key) = &overrides.api_key {
            self.cds.api_key = key.clone();
        }
        if let Some(url) = &overrides.database_url {
            self.database.url = url.clone();
        }
        if let Some(dir) = &overrides.download_dir {
            self.download.download_dir = dir.clone();
        }
    }
}

/// Values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub database_url: Option<String>,
    pub download_dir: Option<PathBuf>,
}

/// Expand `${VAR}` and `${VAR:-default}` references.
fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = String::with_capacity(content.len());
    let mut rest = content;

    while let Some(pos) = rest.find("${") {
        result.push_str(&rest[..pos]);
        let after = &rest[pos + 2..];
        let close = after
            .find('}')
            .with_context(|| format!("Unclosed variable substitution: ${{{}", after))?;
        result.push_str(&resolve_var_expr(&after[..close])?);
        rest = &after[close + 1..];
    }
    result.push_str(rest);

    Ok(result)
}

fn resolve_var_expr(expr: &str) -> Result<String> {
    if let Some((name, default)) = expr.split_once(":-") {
        match std::env::var(name.trim()) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Ok(default.to_string()),
        }
    } else {
        std::env::var(expr.trim()).with_context(|| format!("Environment variable {} not set", expr))
    }
}
