//! Scripted in-memory archive for tests.
//!
//! Each task identifier gets a script of poll responses; the last step
//! repeats once the script is exhausted.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::client::{ArchiveClient, JobStatus, SubmittedJob};
use crate::download::write_stream;
use crate::error::TransportError;
use crate::request::RetrieveRequest;
use crate::task::RemoteTask;

/// One scripted poll response.
#[derive(Debug, Clone, PartialEq)]
pub enum MockStep {
    Queued,
    Running,
    /// Successful with a results link and an asset.
    Successful,
    SuccessfulWithoutResults,
    SuccessfulWithoutAsset,
    /// Successful, but the asset download breaks off.
    SuccessfulBrokenDownload,
    Failed(String),
    /// A 503 from the status endpoint.
    Transient,
    /// A 401 from the status endpoint.
    Unauthorized,
}

pub struct MockArchive {
    scripts: Mutex<HashMap<String, Vec<MockStep>>>,
    default_script: Vec<MockStep>,
    polls: Mutex<HashMap<String, usize>>,
    submissions: Mutex<Vec<RetrieveRequest>>,
    rejections: Mutex<HashMap<usize, u16>>,
    poll_latency: Duration,
    payload: Bytes,
    payloads: Mutex<HashMap<String, Bytes>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for MockArchive {
    fn default() -> Self {
        Self::new()
    }
}

impl MockArchive {
    /// Every task succeeds on its first poll.
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            default_script: vec![MockStep::Successful],
            polls: Mutex::new(HashMap::new()),
            submissions: Mutex::new(Vec::new()),
            rejections: Mutex::new(HashMap::new()),
            poll_latency: Duration::from_millis(10),
            payload: Bytes::from_static(b"CDF\x02mock-era5"),
            payloads: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_script(self, identifier: &str, steps: Vec<MockStep>) -> Self {
        lock(&self.scripts).insert(identifier.to_string(), steps);
        self
    }

    pub fn with_default_script(mut self, steps: Vec<MockStep>) -> Self {
        self.default_script = steps;
        self
    }

    pub fn with_poll_latency(mut self, latency: Duration) -> Self {
        self.poll_latency = latency;
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Serve `payload` for one task instead of the shared payload.
    pub fn with_payload_for(self, identifier: &str, payload: impl Into<Bytes>) -> Self {
        lock(&self.payloads).insert(identifier.to_string(), payload.into());
        self
    }

    /// Answer the `index`-th submission (0-based) with HTTP `status`.
    pub fn reject_submission(self, index: usize, status: u16) -> Self {
        lock(&self.rejections).insert(index, status);
        self
    }

    /// Number of status requests issued for a task.
    pub fn polls(&self, identifier: &str) -> usize {
        lock(&self.polls).get(identifier).copied().unwrap_or(0)
    }

    pub fn total_polls(&self) -> usize {
        lock(&self.polls).values().sum()
    }

    pub fn submissions(&self) -> Vec<RetrieveRequest> {
        lock(&self.submissions).clone()
    }

    /// Highest number of concurrent status requests observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_step(&self, identifier: &str) -> MockStep {
        let call = {
            let mut polls = lock(&self.polls);
            let count = polls.entry(identifier.to_string()).or_insert(0);
            *count += 1;
            *count - 1
        };
        let scripts = lock(&self.scripts);
        let script = scripts.get(identifier).unwrap_or(&self.default_script);
        script
            .get(call)
            .or_else(|| script.last())
            .cloned()
            .unwrap_or(MockStep::Queued)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn status_error(status: u16, url: &str) -> TransportError {
    TransportError::Status {
        status,
        url: url.to_string(),
        body: String::new(),
    }
}

#[async_trait]
impl ArchiveClient for MockArchive {
    async fn submit(
        &self,
        dataset: &str,
        request: &RetrieveRequest,
    ) -> Result<SubmittedJob, TransportError> {
        let index = {
            let mut submissions = lock(&self.submissions);
            submissions.push(request.clone());
            submissions.len() - 1
        };
        if let Some(status) = lock(&self.rejections).get(&index).copied() {
            return Err(status_error(status, dataset));
        }
        let job_id = format!("job-{}", index);
        Ok(SubmittedJob {
            status_url: format!("mock://jobs/{}", job_id),
            job_id,
        })
    }

    fn auth_headers(&self) -> Vec<(String, String)> {
        vec![("PRIVATE-TOKEN".to_string(), "mock-key".to_string())]
    }

    async fn job_status(&self, task: &RemoteTask) -> Result<JobStatus, TransportError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.poll_latency).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let results_url = format!("{}/results", task.result_url);
        Ok(match self.next_step(&task.identifier) {
            MockStep::Queued => JobStatus::Queued,
            MockStep::Running => JobStatus::Running,
            MockStep::Successful => JobStatus::Successful {
                results_url: Some(results_url),
            },
            MockStep::SuccessfulWithoutResults => JobStatus::Successful { results_url: None },
            MockStep::SuccessfulWithoutAsset => JobStatus::Successful {
                results_url: Some(format!("{}#no-asset", results_url)),
            },
            MockStep::SuccessfulBrokenDownload => JobStatus::Successful {
                results_url: Some(format!("{}#broken", results_url)),
            },
            MockStep::Failed(reason) => JobStatus::Failed { reason },
            MockStep::Transient => return Err(status_error(503, &task.result_url)),
            MockStep::Unauthorized => return Err(status_error(401, &task.result_url)),
        })
    }

    async fn asset_href(
        &self,
        _task: &RemoteTask,
        results_url: &str,
    ) -> Result<Option<String>, TransportError> {
        if results_url.ends_with("#no-asset") {
            return Ok(None);
        }
        let broken = results_url.ends_with("#broken");
        Ok(Some(format!(
            "mock://download/{}",
            if broken { "broken" } else { "asset.nc" }
        )))
    }

    async fn download(
        &self,
        task: &RemoteTask,
        href: &str,
        dest: &Path,
    ) -> Result<u64, TransportError> {
        let payload = lock(&self.payloads)
            .get(&task.identifier)
            .cloned()
            .unwrap_or_else(|| self.payload.clone());
        let mut chunks = vec![Ok(payload)];
        if href.ends_with("/broken") {
            chunks.push(Err(TransportError::Decode("connection reset".to_string())));
        }
        write_stream(futures::stream::iter(chunks), dest, 1024).await
    }
}
