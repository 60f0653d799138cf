//! Concurrent polling of submitted tasks.
//!
//! Every task runs in its own tokio task. A semaphore bounds how many tasks
//! talk to the archive at once; a task holds its permit from its first
//! status request until it reaches a terminal outcome.

use std::path::PathBuf;
use std::sync::Arc;

use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::backoff::BackoffPolicy;
use crate::client::{ArchiveClient, JobStatus};
use crate::task::{RemoteTask, TaskOutcome};

fn default_max_concurrent() -> usize {
    3
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./data/raw/cds")
}

/// Scheduler settings, fixed at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Tasks allowed to poll concurrently.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Where artifacts are written as `<identifier>.nc`.
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    #[serde(default)]
    pub backoff: BackoffPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            download_dir: default_download_dir(),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Polls tasks until each one is downloaded, fails, times out or is cancelled.
pub struct PollScheduler<C: ?Sized> {
    client: Arc<C>,
    config: SchedulerConfig,
}

impl<C> PollScheduler<C>
where
    C: ArchiveClient + ?Sized + 'static,
{
    pub fn new(client: Arc<C>, config: SchedulerConfig) -> Self {
        Self { client, config }
    }

    /// Poll all tasks; outcomes come back in input order.
    ///
    /// No task's failure affects its siblings. Once `cancel` fires, tasks
    /// still waiting for a permit or sleeping between polls resolve as
    /// [`TaskOutcome::Cancelled`]; a request already in flight completes.
    #[instrument(
        skip_all,
        fields(tasks = tasks.len(), max_concurrent = self.config.max_concurrent)
    )]
    pub async fn run(&self, tasks: Vec<RemoteTask>, cancel: CancellationToken) -> Vec<TaskOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));
        let mut handles = Vec::with_capacity(tasks.len());

        for task in tasks {
            let semaphore = semaphore.clone();
            let client = self.client.clone();
            let config = self.config.clone();
            let cancel = cancel.clone();

            let handle = tokio::spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };
                let outcome = match permit {
                    Some(_) => poll_task(client.as_ref(), &config, &task, &cancel).await,
                    None => TaskOutcome::Cancelled,
                };
                record_outcome(&task, &outcome);
                outcome
            });
            handles.push(handle);
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(error = %e, "Poll task panicked");
                    TaskOutcome::Failed(format!("poll task aborted: {}", e))
                }
            };
            outcomes.push(outcome);
        }

        let downloaded = outcomes.iter().filter(|o| o.is_downloaded()).count();
        info!(downloaded, total = outcomes.len(), "Polling finished");
        outcomes
    }
}

fn record_outcome(task: &RemoteTask, outcome: &TaskOutcome) {
    counter!(format!("cds_tasks_{}_total", outcome.label())).increment(1);
    match outcome {
        TaskOutcome::Downloaded(path) => {
            info!(task = %task.identifier, path = %path.display(), "Task downloaded");
        }
        TaskOutcome::Failed(reason) => {
            warn!(task = %task.identifier, reason = %reason, "Task failed");
        }
        TaskOutcome::TimedOut { attempts } => {
            warn!(task = %task.identifier, attempts, "Task timed out");
        }
        TaskOutcome::Cancelled => {
            info!(task = %task.identifier, "Task cancelled");
        }
    }
}

/// Poll one task to completion.
pub async fn poll_task<C>(
    client: &C,
    config: &SchedulerConfig,
    task: &RemoteTask,
    cancel: &CancellationToken,
) -> TaskOutcome
where
    C: ArchiveClient + ?Sized,
{
    let mut attempts = 0u32;
    debug!(task = %task.identifier, "Started polling task");

    loop {
        if cancel.is_cancelled() {
            return TaskOutcome::Cancelled;
        }

        attempts += 1;
        counter!("cds_poll_attempts_total").increment(1);

        match client.job_status(task).await {
            Ok(JobStatus::Successful { results_url }) => {
                return fetch_artifact(client, config, task, results_url).await;
            }
            Ok(JobStatus::Failed { reason }) => return TaskOutcome::Failed(reason),
            Ok(status) => {
                debug!(
                    task = %task.identifier,
                    status = ?status,
                    attempt = attempts,
                    "Task not ready"
                );
            }
            Err(e) if e.is_retryable() => {
                warn!(
                    task = %task.identifier,
                    error = %e,
                    attempt = attempts,
                    "Transient error polling task"
                );
            }
            Err(e) => return TaskOutcome::Failed(e.to_string()),
        }

        if attempts >= config.backoff.max_retries {
            return TaskOutcome::TimedOut { attempts };
        }

        let delay = config.backoff.delay(attempts);
        debug!(
            task = %task.identifier,
            delay_secs = delay.as_secs_f64(),
            "Waiting before next poll"
        );
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return TaskOutcome::Cancelled,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

async fn fetch_artifact<C>(
    client: &C,
    config: &SchedulerConfig,
    task: &RemoteTask,
    results_url: Option<String>,
) -> TaskOutcome
where
    C: ArchiveClient + ?Sized,
{
    let Some(results_url) = results_url else {
        return TaskOutcome::Failed("job succeeded without a results link".to_string());
    };

    let href = match client.asset_href(task, &results_url).await {
        Ok(Some(href)) => href,
        Ok(None) => return TaskOutcome::Failed("results document has no asset href".to_string()),
        Err(e) => return TaskOutcome::Failed(format!("failed to read results: {}", e)),
    };

    let dest = config.download_dir.join(task.file_name());
    match client.download(task, &href, &dest).await {
        Ok(_) => TaskOutcome::Downloaded(dest),
        Err(e) => TaskOutcome::Failed(format!("download failed: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockArchive, MockStep};
    use std::time::Duration;

    fn config(dir: &std::path::Path, max_concurrent: usize, max_retries: u32) -> SchedulerConfig {
        SchedulerConfig {
            max_concurrent,
            download_dir: dir.to_path_buf(),
            backoff: BackoffPolicy::new(Duration::from_secs(1), max_retries, 10),
        }
    }

    fn tasks(ids: &[&str]) -> Vec<RemoteTask> {
        ids.iter()
            .map(|id| RemoteTask::new(format!("mock://jobs/{}", id), *id))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_outcomes_in_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Arc::new(
            MockArchive::new()
                .with_script(
                    "slow",
                    vec![MockStep::Queued, MockStep::Running, MockStep::Successful],
                )
                .with_script("bad", vec![MockStep::Failed("no data".to_string())]),
        );
        let scheduler = PollScheduler::new(archive.clone(), config(dir.path(), 3, 7));

        let outcomes = scheduler
            .run(tasks(&["slow", "bad", "fast"]), CancellationToken::new())
            .await;

        assert_eq!(outcomes[0], TaskOutcome::Downloaded(dir.path().join("slow.nc")));
        assert_eq!(outcomes[1], TaskOutcome::Failed("no data".to_string()));
        assert_eq!(outcomes[2], TaskOutcome::Downloaded(dir.path().join("fast.nc")));
        assert_eq!(archive.polls("slow"), 3);
        assert_eq!(archive.polls("bad"), 1);
        assert!(dir.path().join("fast.nc").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Arc::new(
            MockArchive::new()
                .with_default_script(vec![MockStep::Queued, MockStep::Successful])
                .with_poll_latency(Duration::from_millis(50)),
        );
        let scheduler = PollScheduler::new(archive.clone(), config(dir.path(), 3, 7));
        let ids = (0..10).map(|i| format!("t{}", i)).collect::<Vec<_>>();
        let ids = ids.iter().map(String::as_str).collect::<Vec<_>>();

        let outcomes = scheduler.run(tasks(&ids), CancellationToken::new()).await;

        assert!(outcomes.iter().all(TaskOutcome::is_downloaded));
        assert_eq!(archive.max_in_flight(), 3);
        assert_eq!(archive.total_polls(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_after_max_retries() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Arc::new(MockArchive::new().with_default_script(vec![MockStep::Queued]));
        let scheduler = PollScheduler::new(archive.clone(), config(dir.path(), 3, 4));

        let start = tokio::time::Instant::now();
        let outcomes = scheduler.run(tasks(&["never"]), CancellationToken::new()).await;

        assert_eq!(outcomes, vec![TaskOutcome::TimedOut { attempts: 4 }]);
        assert_eq!(archive.polls("never"), 4);
        // Three sleeps of at least 1 s, 2 s and 4 s
        assert!(start.elapsed() >= Duration::from_secs(7));
        assert!(!dir.path().join("never.nc").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let dir = tempfile::tempdir().unwrap();
        let script = vec![MockStep::Transient, MockStep::Transient, MockStep::Successful];
        let archive = Arc::new(MockArchive::new().with_script("flaky", script));
        let scheduler = PollScheduler::new(archive.clone(), config(dir.path(), 1, 7));

        let outcomes = scheduler.run(tasks(&["flaky"]), CancellationToken::new()).await;
        assert!(outcomes[0].is_downloaded());
        assert_eq!(archive.polls("flaky"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_authorization_error_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let archive =
            Arc::new(MockArchive::new().with_script("denied", vec![MockStep::Unauthorized]));
        let scheduler = PollScheduler::new(archive.clone(), config(dir.path(), 1, 7));

        let outcomes = scheduler.run(tasks(&["denied"]), CancellationToken::new()).await;
        assert!(matches!(&outcomes[0], TaskOutcome::Failed(reason) if reason.contains("401")));
        assert_eq!(archive.polls("denied"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_without_results_or_asset() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Arc::new(
            MockArchive::new()
                .with_script("nolink", vec![MockStep::SuccessfulWithoutResults])
                .with_script("noasset", vec![MockStep::SuccessfulWithoutAsset])
                .with_script("broken", vec![MockStep::SuccessfulBrokenDownload]),
        );
        let scheduler = PollScheduler::new(archive, config(dir.path(), 3, 7));

        let outcomes = scheduler
            .run(tasks(&["nolink", "noasset", "broken"]), CancellationToken::new())
            .await;
        assert!(outcomes.iter().all(|o| matches!(o, TaskOutcome::Failed(_))));
        assert!(!dir.path().join("broken.nc").exists());
        assert!(!dir.path().join("broken.nc.partial").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_run() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Arc::new(MockArchive::new());
        let scheduler = PollScheduler::new(archive.clone(), config(dir.path(), 3, 7));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcomes = scheduler.run(tasks(&["a", "b"]), cancel).await;
        assert_eq!(outcomes, vec![TaskOutcome::Cancelled, TaskOutcome::Cancelled]);
        assert_eq!(archive.total_polls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Arc::new(MockArchive::new().with_default_script(vec![MockStep::Queued]));
        let scheduler = PollScheduler::new(archive.clone(), config(dir.path(), 1, 7));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            trigger.cancel();
        });

        let outcomes = scheduler.run(tasks(&["sleeping", "waiting"]), cancel).await;
        assert_eq!(outcomes, vec![TaskOutcome::Cancelled, TaskOutcome::Cancelled]);
        // Only the permit holder polled; no request after cancellation
        assert_eq!(archive.total_polls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_in_flight_completes_after_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Arc::new(MockArchive::new().with_poll_latency(Duration::from_secs(1)));
        let scheduler = PollScheduler::new(archive.clone(), config(dir.path(), 1, 7));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            trigger.cancel();
        });

        let outcomes = scheduler.run(tasks(&["running", "queued"]), cancel).await;
        assert_eq!(
            outcomes,
            vec![TaskOutcome::Downloaded(dir.path().join("running.nc")), TaskOutcome::Cancelled]
        );
        assert!(dir.path().join("running.nc").exists());
        assert_eq!(archive.polls("queued"), 0);
    }
}
