//! Where artifacts come from: the remote archive or files already on disk.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use era5_common::{BoundingBox, TimeWindow};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::client::ArchiveClient;
use crate::error::SubmitError;
use crate::scheduler::{PollScheduler, SchedulerConfig};
use crate::submit::TaskSubmitter;
use crate::task::{RemoteTask, TaskOutcome};

/// Capability the orchestrator drives: request windows, then collect them.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Request one window of `variables` over `extent`.
    async fn fetch_window(
        &self,
        window: &TimeWindow,
        variables: &[String],
        extent: &BoundingBox,
    ) -> Result<RemoteTask, SubmitError>;

    /// Resolve requested windows to outcomes, in input order.
    async fn collect(&self, tasks: Vec<RemoteTask>, cancel: CancellationToken) -> Vec<TaskOutcome>;
}

/// Fetches from the remote archive: submit, then poll and download.
pub struct CdsSource<C: ?Sized> {
    submitter: TaskSubmitter<C>,
    scheduler: PollScheduler<C>,
}

impl<C> CdsSource<C>
where
    C: ArchiveClient + ?Sized + 'static,
{
    pub fn new(client: Arc<C>, dataset: impl Into<String>, config: SchedulerConfig) -> Self {
        Self {
            submitter: TaskSubmitter::new(client.clone(), dataset),
            scheduler: PollScheduler::new(client, config),
        }
    }
}

#[async_trait]
impl<C> DataSource for CdsSource<C>
where
    C: ArchiveClient + ?Sized + 'static,
{
    async fn fetch_window(
        &self,
        window: &TimeWindow,
        variables: &[String],
        extent: &BoundingBox,
    ) -> Result<RemoteTask, SubmitError> {
        self.submitter.submit(window, variables, extent).await
    }

    async fn collect(&self, tasks: Vec<RemoteTask>, cancel: CancellationToken) -> Vec<TaskOutcome> {
        self.scheduler.run(tasks, cancel).await
    }
}

/// Serves windows from artifacts already in a directory, named
/// `<identifier>.nc`. Runs without network access.
#[derive(Debug, Clone)]
pub struct LocalFileSource {
    dir: PathBuf,
}

impl LocalFileSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl DataSource for LocalFileSource {
    async fn fetch_window(
        &self,
        window: &TimeWindow,
        _variables: &[String],
        _extent: &BoundingBox,
    ) -> Result<RemoteTask, SubmitError> {
        let identifier = window.identifier();
        let path = self.dir.join(format!("{}.nc", identifier));
        debug!(window = %window, path = %path.display(), "Resolving window from local files");
        Ok(RemoteTask::new(format!("file://{}", path.display()), identifier))
    }

    async fn collect(&self, tasks: Vec<RemoteTask>, cancel: CancellationToken) -> Vec<TaskOutcome> {
        let outcomes = tasks
            .iter()
            .map(|task| {
                if cancel.is_cancelled() {
                    return TaskOutcome::Cancelled;
                }
                let path = self.dir.join(task.file_name());
                if path.is_file() {
                    TaskOutcome::Downloaded(path)
                } else {
                    TaskOutcome::Failed(format!("no local artifact at {}", path.display()))
                }
            })
            .collect::<Vec<_>>();

        info!(
            found = outcomes.iter().filter(|o| o.is_downloaded()).count(),
            total = outcomes.len(),
            dir = %self.dir.display(),
            "Collected local artifacts"
        );
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockArchive, MockStep};
    use chrono::NaiveDate;

    fn january() -> TimeWindow {
        TimeWindow::new(
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
        )
        .unwrap()
    }

    fn february() -> TimeWindow {
        TimeWindow::new(
            NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 2, 28).unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_local_source_resolves_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("era5_2025_01.nc"), b"CDF").unwrap();
        let source = LocalFileSource::new(dir.path());
        let extent = BoundingBox::new(1.0, 0.0, 0.0, 1.0);
        let vars = vec!["t2m".to_string()];

        let jan = source.fetch_window(&january(), &vars, &extent).await.unwrap();
        let feb = source.fetch_window(&february(), &vars, &extent).await.unwrap();
        let outcomes = source.collect(vec![jan, feb], CancellationToken::new()).await;

        assert_eq!(outcomes[0], TaskOutcome::Downloaded(dir.path().join("era5_2025_01.nc")));
        assert!(matches!(outcomes[1], TaskOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn test_local_source_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let source = LocalFileSource::new(dir.path());
        let task = RemoteTask::new("file:///x", "era5_2025_01");
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(source.collect(vec![task], cancel).await, vec![TaskOutcome::Cancelled]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cds_source_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Arc::new(
            MockArchive::new()
                .with_script("era5_2025_01", vec![MockStep::Running, MockStep::Successful]),
        );
        let config = SchedulerConfig {
            download_dir: dir.path().to_path_buf(),
            ..SchedulerConfig::default()
        };
        let source: Box<dyn DataSource> =
            Box::new(CdsSource::new(archive.clone(), "reanalysis-era5-land", config));

        let task = source
            .fetch_window(&january(), &["t2m".to_string()], &BoundingBox::new(1.0, 0.0, 0.0, 1.0))
            .await
            .unwrap();
        let outcomes = source.collect(vec![task], CancellationToken::new()).await;

        assert_eq!(outcomes, vec![TaskOutcome::Downloaded(dir.path().join("era5_2025_01.nc"))]);
        assert_eq!(archive.polls("era5_2025_01"), 2);
    }
}
