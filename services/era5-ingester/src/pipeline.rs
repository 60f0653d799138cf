//! The orchestrator: chunk, submit, poll, reduce, persist.
//!
//! Chunking, submission and reduction run one after another on the caller's
//! task; only polling is concurrent. Submission is fail-fast: one rejected
//! window aborts the run before anything is polled. Windows whose task did
//! not download are reported and left out of the reduction.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use cds_client::{DataSource, RemoteTask, TaskOutcome};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use era5_common::{chunk, split_to_budget, BoundingBox, CountrySeries, FetchBudget, TimeWindow};
use grid_reducer::SpatialReducer;
use metrics::counter;
use netcdf_parser::{ArtifactStore, GriddedDataset, NetCdfDataset};
use storage::SeriesStore;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::report::{RunReport, SeriesSummary, Stage, WindowReport, WindowStatus};

/// What to fetch and where to reduce it.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Archive parameter names, e.g. `2m_temperature`.
    pub variables: Vec<String>,
    pub extent: BoundingBox,
    pub region: String,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub field_limit: usize,
    pub submit_batch_size: usize,
    pub submit_batch_delay: Duration,
}

pub struct Orchestrator<S: ?Sized, T: ?Sized> {
    source: Arc<S>,
    store: Arc<T>,
    reducer: Arc<SpatialReducer>,
    settings: PipelineSettings,
}

impl<S, T> Orchestrator<S, T>
where
    S: DataSource + ?Sized,
    T: SeriesStore + ?Sized,
{
    pub fn new(
        source: Arc<S>,
        store: Arc<T>,
        reducer: SpatialReducer,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            source,
            store,
            reducer: Arc::new(reducer),
            settings,
        }
    }

    /// Run every stage for `request`. Never fails; the report says how far
    /// the run got and why it stopped.
    #[instrument(
        skip_all,
        fields(start = %request.start, end = %request.end, region = %request.region)
    )]
    pub async fn run(&self, request: &FetchRequest, cancel: CancellationToken) -> RunReport {
        let mut report = RunReport::new();

        let windows = match self.plan(request) {
            Ok(windows) => windows,
            Err(e) => {
                report.abort(format!("chunking failed: {:#}", e));
                return report;
            }
        };
        report.windows = windows.iter().map(WindowReport::pending).collect();
        info!(windows = windows.len(), "Planned request windows");

        report.stage = Stage::Submitting;
        let tasks = match self.submit_all(&windows, request, &cancel).await {
            Ok(tasks) => tasks,
            Err(e) => {
                report.abort(format!("{:#}", e));
                return report;
            }
        };

        report.stage = Stage::Polling;
        let outcomes = self.source.collect(tasks, cancel.clone()).await;

        let mut downloaded = Vec::new();
        for (window, outcome) in report.windows.iter_mut().zip(&outcomes) {
            if let Some(path) = outcome.path() {
                downloaded.push(path.clone());
            } else {
                window.status = WindowStatus::skipped(outcome).unwrap_or(WindowStatus::Pending);
                window.detail = describe(outcome);
                counter!("era5_windows_skipped_total", "reason" => window.status.as_str())
                    .increment(1);
            }
        }

        report.stage = Stage::Reducing;
        if downloaded.is_empty() {
            warn!("No window downloaded, nothing to reduce");
            report.stage = Stage::Persisted;
            return report;
        }

        let series = match self.reduce(downloaded, &request.region).await {
            Ok(series) => series,
            Err(e) => {
                report.abort(format!("reduction failed: {:#}", e));
                return report;
            }
        };

        for s in &series {
            match self.store.upsert(s).await {
                Ok(rows) => {
                    counter!("era5_series_rows_written_total").increment(rows as u64);
                    report.series.push(SeriesSummary::new(s, rows));
                }
                Err(e) => {
                    report.abort(format!(
                        "persisting {} for {} failed: {}",
                        s.variable, s.country_code, e
                    ));
                    return report;
                }
            }
        }

        for (window, outcome) in report.windows.iter_mut().zip(&outcomes) {
            if outcome.is_downloaded() {
                window.status = WindowStatus::Persisted;
                counter!("era5_windows_persisted_total").increment(1);
            }
        }
        report.stage = Stage::Persisted;
        report
    }

    /// Calendar-month windows, split further where they exceed the field limit.
    fn plan(&self, request: &FetchRequest) -> Result<Vec<TimeWindow>> {
        let budget = FetchBudget::new(request.variables.len(), self.settings.field_limit);
        let windows = chunk(request.start, request.end)?;
        Ok(split_to_budget(windows, &budget)?)
    }

    async fn submit_all(
        &self,
        windows: &[TimeWindow],
        request: &FetchRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<RemoteTask>> {
        let batch_size = self.settings.submit_batch_size.max(1);
        let mut tasks = Vec::with_capacity(windows.len());

        for (index, batch) in windows.chunks(batch_size).enumerate() {
            if index > 0 {
                info!(
                    delay_secs = self.settings.submit_batch_delay.as_secs(),
                    submitted = tasks.len(),
                    "Pausing between submission batches"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.settings.submit_batch_delay) => {}
                }
            }
            if cancel.is_cancelled() {
                anyhow::bail!(
                    "cancelled after submitting {} of {} windows",
                    tasks.len(),
                    windows.len()
                );
            }

            for window in batch {
                let task = self
                    .source
                    .fetch_window(window, &request.variables, &request.extent)
                    .await
                    .with_context(|| format!("submission of window {} failed", window))?;
                counter!("era5_windows_submitted_total").increment(1);
                tasks.push(task);
            }
        }

        Ok(tasks)
    }

    async fn reduce(&self, paths: Vec<PathBuf>, region: &str) -> Result<Vec<CountrySeries>> {
        let reducer = self.reducer.clone();
        let region = region.to_string();

        tokio::task::spawn_blocking(move || -> Result<Vec<CountrySeries>> {
            let dataset = NetCdfDataset::open_many(&paths)?;
            let variables = dataset.variable_names();
            Ok(reducer.reduce(&dataset, &variables, &region)?)
        })
        .await
        .context("reduction task panicked")?
    }
}

fn describe(outcome: &TaskOutcome) -> Option<String> {
    match outcome {
        TaskOutcome::Downloaded(_) => None,
        TaskOutcome::Failed(reason) => Some(reason.clone()),
        TaskOutcome::TimedOut { attempts } => Some(format!("no result after {} polls", attempts)),
        TaskOutcome::Cancelled => Some("cancelled".to_string()),
    }
}

/// First and last hour of an inclusive day range.
pub fn day_range_instants(start: NaiveDate, end: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let first = Utc.from_utc_datetime(&start.and_time(NaiveTime::default()));
    let last =
        Utc.from_utc_datetime(&end.and_time(NaiveTime::default())) + chrono::Duration::hours(23);
    (first, last)
}

/// Reduce artifacts already on disk for `[start, end]` and persist the result.
///
/// `variables` selects dataset variables by their short names; `None`
/// reduces everything on the grid.
pub async fn reduce_directory<T>(
    store: &T,
    reducer: SpatialReducer,
    artifacts: ArtifactStore,
    start: NaiveDate,
    end: NaiveDate,
    variables: Option<Vec<String>>,
    region: &str,
) -> Result<Vec<SeriesSummary>>
where
    T: SeriesStore + ?Sized,
{
    if end < start {
        anyhow::bail!("end {} is before start {}", end, start);
    }
    let (first, last) = day_range_instants(start, end);
    let region_owned = region.to_string();

    let series = tokio::task::spawn_blocking(move || -> Result<Vec<CountrySeries>> {
        let dataset = artifacts
            .open_range(first, last)
            .with_context(|| format!("Failed to open artifacts in {}", artifacts.dir().display()))?;
        let variables = variables.unwrap_or_else(|| dataset.variable_names());
        Ok(reducer.reduce(&dataset, &variables, &region_owned)?)
    })
    .await
    .context("reduction task panicked")??;

    let mut summaries = Vec::with_capacity(series.len());
    for s in &series {
        let rows = store
            .upsert(s)
            .await
            .with_context(|| format!("Failed to persist {} for {}", s.variable, s.country_code))?;
        summaries.push(SeriesSummary::new(s, rows));
    }

    info!(region, series = summaries.len(), "Reduced local artifacts");
    Ok(summaries)
}
