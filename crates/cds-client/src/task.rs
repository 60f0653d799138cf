//! Remote retrieval tasks and their terminal outcomes.

use std::path::PathBuf;

/// A submitted retrieval, addressed by its status URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTask {
    /// Job status endpoint returned by the submission.
    pub result_url: String,
    /// Headers sent with every status, results and download request.
    pub auth_headers: Vec<(String, String)>,
    /// Names the downloaded artifact: `<identifier>.nc`.
    pub identifier: String,
}

impl RemoteTask {
    pub fn new(result_url: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            result_url: result_url.into(),
            auth_headers: Vec::new(),
            identifier: identifier.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.auth_headers.push((name.into(), value.into()));
        self
    }

    /// File name of the downloaded artifact.
    pub fn file_name(&self) -> String {
        format!("{}.nc", self.identifier)
    }
}

/// Terminal state of one polled task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Downloaded(PathBuf),
    Failed(String),
    TimedOut { attempts: u32 },
    Cancelled,
}

impl TaskOutcome {
    pub fn is_downloaded(&self) -> bool {
        matches!(self, TaskOutcome::Downloaded(_))
    }

    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            TaskOutcome::Downloaded(path) => Some(path),
            _ => None,
        }
    }

    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            TaskOutcome::Downloaded(_) => "downloaded",
            TaskOutcome::Failed(_) => "failed",
            TaskOutcome::TimedOut { .. } => "timed_out",
            TaskOutcome::Cancelled => "cancelled",
        }
    }
}
