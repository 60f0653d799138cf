//! HTTP transport to the archive's retrieve API.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::download::stream_to_file;
use crate::error::TransportError;
use crate::request::{ExecuteBody, RetrieveRequest};
use crate::task::RemoteTask;

/// Header carrying the personal access token.
pub const AUTH_HEADER: &str = "PRIVATE-TOKEN";

/// Status of a job as reported by the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// `accepted` or `queued`
    Queued,
    Running,
    /// Finished; carries the `results` link when present.
    Successful { results_url: Option<String> },
    /// `failed`, `rejected`, `dismissed`, or no status at all.
    Failed { reason: String },
    /// Any status the client does not know; treated as not ready.
    Other(String),
}

/// A freshly submitted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedJob {
    pub job_id: String,
    pub status_url: String,
}

/// Operations the poll scheduler and submitter need from the archive.
#[async_trait]
pub trait ArchiveClient: Send + Sync {
    /// Start a retrieval of `dataset`.
    async fn submit(
        &self,
        dataset: &str,
        request: &RetrieveRequest,
    ) -> Result<SubmittedJob, TransportError>;

    /// Headers tasks must carry for follow-up requests.
    fn auth_headers(&self) -> Vec<(String, String)>;

    /// Current status of a task's job.
    async fn job_status(&self, task: &RemoteTask) -> Result<JobStatus, TransportError>;

    /// Follow a `results` link to the asset href; `None` when the results
    /// document has no asset.
    async fn asset_href(
        &self,
        task: &RemoteTask,
        results_url: &str,
    ) -> Result<Option<String>, TransportError>;

    /// Stream the asset to `dest`; returns the number of bytes written.
    async fn download(
        &self,
        task: &RemoteTask,
        href: &str,
        dest: &Path,
    ) -> Result<u64, TransportError>;
}

#[derive(Debug, Deserialize)]
struct Link {
    rel: String,
    href: String,
}

#[derive(Debug, Deserialize)]
struct JobDocument {
    #[serde(rename = "jobID")]
    job_id: Option<String>,
    status: Option<String>,
    #[serde(default)]
    links: Vec<Link>,
    #[serde(default)]
    message: Option<String>,
}

impl JobDocument {
    fn link(&self, rel: &str) -> Option<String> {
        self.links.iter().find(|l| l.rel == rel).map(|l| l.href.clone())
    }

    fn into_status(self) -> JobStatus {
        let results_url = self.link("results");
        match self.status.as_deref() {
            Some("accepted") | Some("queued") => JobStatus::Queued,
            Some("running") => JobStatus::Running,
            Some("successful") => JobStatus::Successful { results_url },
            Some(s @ ("failed" | "rejected" | "dismissed")) => JobStatus::Failed {
                reason: match self.message {
                    Some(message) => format!("job {}: {}", s, message),
                    None => format!("job {}", s),
                },
            },
            Some(other) => JobStatus::Other(other.to_string()),
            None => JobStatus::Failed {
                reason: "status missing from job document".to_string(),
            },
        }
    }
}

/// Parse a job status document.
pub fn parse_job_status(body: &str) -> Result<JobStatus, TransportError> {
    let doc: JobDocument =
        serde_json::from_str(body).map_err(|e| TransportError::Decode(e.to_string()))?;
    Ok(doc.into_status())
}

/// Extract `asset.value.href` from a results document.
pub fn parse_asset_href(body: &str) -> Result<Option<String>, TransportError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| TransportError::Decode(e.to_string()))?;
    Ok(value
        .pointer("/asset/value/href")
        .and_then(|v| v.as_str())
        .map(str::to_string))
}

/// Connection settings for [`CdsClient`].
#[derive(Debug, Clone)]
pub struct CdsClientConfig {
    /// e.g. `https://cds.climate.copernicus.eu/api`
    pub api_url: String,
    pub api_key: String,
    pub request_timeout: Duration,
    /// Read size hint for streamed downloads.
    pub chunk_size: usize,
}

impl CdsClientConfig {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
            request_timeout: Duration::from_secs(600),
            chunk_size: 1024,
        }
    }
}

/// reqwest-backed client for the archive.
pub struct CdsClient {
    client: Client,
    config: CdsClientConfig,
}

impl CdsClient {
    pub fn new(config: CdsClientConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(4)
            .tcp_nodelay(true)
            .build()?;

        Ok(Self { client, config })
    }

    fn base(&self) -> &str {
        self.config.api_url.trim_end_matches('/')
    }

    fn execution_url(&self, dataset: &str) -> String {
        format!("{}/retrieve/v1/processes/{}/execution", self.base(), dataset)
    }

    fn job_url(&self, job_id: &str) -> String {
        format!("{}/retrieve/v1/jobs/{}", self.base(), job_id)
    }

    fn with_task_headers(request: RequestBuilder, task: &RemoteTask) -> RequestBuilder {
        task.auth_headers
            .iter()
            .fold(request, |req, (name, value)| req.header(name.as_str(), value.as_str()))
    }
}

/// Turn a non-success response into a [`TransportError::Status`].
async fn check_status(response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Status {
        status: status.as_u16(),
        url,
        body,
    })
}

#[async_trait]
impl ArchiveClient for CdsClient {
    #[instrument(
        skip(self, dataset, request),
        fields(dataset = %dataset, days = request.day.len())
    )]
    async fn submit(
        &self,
        dataset: &str,
        request: &RetrieveRequest,
    ) -> Result<SubmittedJob, TransportError> {
        let response = self
            .client
            .post(self.execution_url(dataset))
            .header(AUTH_HEADER, &self.config.api_key)
            .json(&ExecuteBody { inputs: request })
            .send()
            .await?;
        let body = check_status(response).await?.text().await?;
        let doc: JobDocument =
            serde_json::from_str(&body).map_err(|e| TransportError::Decode(e.to_string()))?;

        let job_id = doc
            .job_id
            .clone()
            .ok_or_else(|| TransportError::Decode("submission response has no jobID".to_string()))?;
        let status_url = doc.link("monitor").unwrap_or_else(|| self.job_url(&job_id));

        debug!(job_id = %job_id, status_url = %status_url, "Submitted retrieval");
        Ok(SubmittedJob { job_id, status_url })
    }

    fn auth_headers(&self) -> Vec<(String, String)> {
        vec![(AUTH_HEADER.to_string(), self.config.api_key.clone())]
    }

    async fn job_status(&self, task: &RemoteTask) -> Result<JobStatus, TransportError> {
        let request = Self::with_task_headers(self.client.get(&task.result_url), task);
        let body = check_status(request.send().await?).await?.text().await?;
        parse_job_status(&body)
    }

    async fn asset_href(
        &self,
        task: &RemoteTask,
        results_url: &str,
    ) -> Result<Option<String>, TransportError> {
        let request = Self::with_task_headers(self.client.get(results_url), task);
        let body = check_status(request.send().await?).await?.text().await?;
        parse_asset_href(&body)
    }

    #[instrument(
        skip(self, task, href, dest),
        fields(task = %task.identifier, dest = %dest.display())
    )]
    async fn download(
        &self,
        task: &RemoteTask,
        href: &str,
        dest: &Path,
    ) -> Result<u64, TransportError> {
        let request = Self::with_task_headers(self.client.get(href), task);
        let response = check_status(request.send().await?).await?;
        stream_to_file(response, dest, self.config.chunk_size).await
    }
}
