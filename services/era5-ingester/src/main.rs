//! ERA5 country-series ingester.
//!
//! Fetches ERA5 grids from the Copernicus Climate Data Store and reduces them
//! to hourly per-country series:
//! - Requests chunked by calendar month and the archive's field limit
//! - Bounded concurrent polling with exponential backoff
//! - Streamed downloads keyed by window identifier
//! - Country masking, flux de-accumulation and spatial means
//! - Idempotent persistence to PostgreSQL

mod config;
mod pipeline;
mod report;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use cds_client::{CdsClient, CdsSource, DataSource, LocalFileSource};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use era5_common::classify_variable;
use grid_reducer::{CountryBoundaries, ReduceOptions, SpatialReducer};
use netcdf_parser::ArtifactStore;
use storage::{MemorySeriesStore, PgSeriesStore, SeriesStore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use config::{IngesterConfig, Overrides};
use pipeline::{day_range_instants, reduce_directory, FetchRequest, Orchestrator, PipelineSettings};

#[derive(Parser, Debug)]
#[command(name = "era5-ingester")]
#[command(about = "Fetch ERA5 data and persist per-country hourly series")]
struct Args {
    /// Configuration file
    #[arg(long, env = "ERA5_CONFIG", default_value = "config/era5.yaml")]
    config: PathBuf,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty")]
    log_format: LogFormat,

    /// Serve Prometheus metrics on this port
    #[arg(long, env = "METRICS_PORT")]
    metrics_port: Option<u16>,

    /// Archive API root
    #[arg(long, env = "CDSAPI_URL")]
    api_url: Option<String>,

    /// Archive API key
    #[arg(long, env = "CDSAPI_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Directory for downloaded artifacts
    #[arg(long, env = "ERA5_DOWNLOAD_DIR")]
    download_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch a date range from the archive, reduce it and persist the series
    Fetch {
        /// First day (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,
        /// Last day, inclusive
        #[arg(long)]
        end: NaiveDate,
        /// Region selector (defaults to reduce.region)
        #[arg(long)]
        region: Option<String>,
        /// Fail on any timestep without data
        #[arg(long)]
        strict: bool,
        /// Use artifacts already in the download directory instead of the archive
        #[arg(long)]
        offline: bool,
        /// Keep results in memory only
        #[arg(long)]
        no_persist: bool,
    },
    /// Reduce artifacts already in the download directory
    Reduce {
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
        #[arg(long)]
        region: Option<String>,
        /// Dataset variable to reduce (repeatable); all by default
        #[arg(long = "variable")]
        variables: Vec<String>,
        #[arg(long)]
        strict: bool,
        #[arg(long)]
        no_persist: bool,
    },
    /// Print stored samples of one series as CSV
    Series {
        /// Dataset variable name, e.g. t2m
        #[arg(long)]
        variable: String,
        /// ISO alpha-2 country code
        #[arg(long)]
        country: String,
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args.log_level, args.log_format);

    if let Some(port) = args.metrics_port {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!(%addr, "Prometheus metrics exporter listening");
    }

    let mut config = IngesterConfig::load(&args.config)?;
    config.apply_overrides(&Overrides {
        api_url: args.api_url.clone(),
        api_key: args.api_key.clone(),
        database_url: args.database_url.clone(),
        download_dir: args.download_dir.clone(),
    });

    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            signal.cancel();
        }
    });

    match args.command {
        Command::Fetch {
            start,
            end,
            region,
            strict,
            offline,
            no_persist,
        } => {
            let store = open_store(&config, no_persist).await?;
            let reducer = load_reducer(&config, strict || config.reduce.strict)?;
            let request = FetchRequest {
                start,
                end,
                variables: config.cds.variables.clone(),
                extent: config.cds.extent()?,
                region: region.unwrap_or_else(|| config.reduce.region.clone()),
            };
            let settings = PipelineSettings {
                field_limit: config.cds.field_limit,
                submit_batch_size: config.cds.submit_batch_size,
                submit_batch_delay: config.cds.submit_batch_delay(),
            };

            let download_dir = &config.download.download_dir;
            tokio::fs::create_dir_all(download_dir)
                .await
                .with_context(|| format!("Failed to create {}", download_dir.display()))?;

            let source: Arc<dyn DataSource> = if offline {
                Arc::new(LocalFileSource::new(&config.download.download_dir))
            } else {
                if config.cds.api_key.is_empty() {
                    anyhow::bail!("No archive API key configured; set CDSAPI_KEY or cds.api_key");
                }
                let client = Arc::new(CdsClient::new(config.cds.client_config())?);
                Arc::new(CdsSource::new(client, &config.cds.dataset, config.download.clone()))
            };

            info!(
                dataset = %config.cds.dataset,
                start = %request.start,
                end = %request.end,
                region = %request.region,
                offline,
                "Starting fetch"
            );

            let orchestrator = Orchestrator::new(source, store, reducer, settings);
            let report = orchestrator.run(&request, cancel).await;
            report.log();
            println!("{}", serde_json::to_string_pretty(&report)?);

            if !report.is_success() {
                let reason = report.abort_reason.as_deref().unwrap_or("unknown");
                anyhow::bail!("Run failed: {}", reason);
            }
        }
        Command::Reduce {
            start,
            end,
            region,
            variables,
            strict,
            no_persist,
        } => {
            let store = open_store(&config, no_persist).await?;
            let reducer = load_reducer(&config, strict || config.reduce.strict)?;
            let artifacts =
                ArtifactStore::new(&config.download.download_dir, &config.reduce.pattern);
            let region = region.unwrap_or_else(|| config.reduce.region.clone());
            let variables = (!variables.is_empty()).then_some(variables);

            let summaries = reduce_directory(
                store.as_ref(),
                reducer,
                artifacts,
                start,
                end,
                variables,
                &region,
            )
            .await?;
            println!("{}", serde_json::to_string_pretty(&summaries)?);
        }
        Command::Series {
            variable,
            country,
            start,
            end,
        } => {
            if config.database.url.is_empty() {
                anyhow::bail!("No database configured; set DATABASE_URL or database.url");
            }
            let store = PgSeriesStore::connect(&config.database.url).await?;
            let stat_kind = classify_variable(&variable);
            let (first, last) = day_range_instants(start, end);

            let series = store.fetch(&variable, &country, stat_kind, first, last).await?;
            info!(
                variable = %variable,
                country = %series.country_code,
                samples = series.len(),
                "Loaded series"
            );

            println!("valid_time,value,stat");
            for (time, value) in series.present() {
                println!("{},{},{}", time.to_rfc3339(), value, stat_kind);
            }
        }
    }

    Ok(())
}

fn init_tracing(log_level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let builder = fmt().with_env_filter(filter).with_target(true).with_level(true);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn open_store(config: &IngesterConfig, no_persist: bool) -> Result<Arc<dyn SeriesStore>> {
    if no_persist {
        warn!("Persistence disabled, results are kept in memory only");
        return Ok(Arc::new(MemorySeriesStore::new()));
    }
    if config.database.url.is_empty() {
        anyhow::bail!("No database configured; set DATABASE_URL or pass --no-persist");
    }

    let store = PgSeriesStore::connect(&config.database.url)
        .await
        .context("Failed to connect to PostgreSQL")?;
    store.migrate().await.context("Failed to run migrations")?;
    Ok(Arc::new(store))
}

fn load_reducer(config: &IngesterConfig, strict: bool) -> Result<SpatialReducer> {
    let boundaries = CountryBoundaries::load(&config.reduce.boundaries_path).with_context(|| {
        format!(
            "Failed to load country boundaries from {}",
            config.reduce.boundaries_path.display()
        )
    })?;
    info!(countries = boundaries.len(), "Loaded country boundaries");

    let options = if strict {
        ReduceOptions::strict()
    } else {
        ReduceOptions::default()
    };
    Ok(SpatialReducer::new(boundaries).with_options(options))
}
