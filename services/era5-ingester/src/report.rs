//! Per-window run report.

use std::fmt;

use cds_client::TaskOutcome;
use era5_common::{CountrySeries, StatKind, TimeWindow};
use serde::Serialize;
use tracing::{info, warn};

/// Orchestrator stage. `Persisted` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Chunking,
    Submitting,
    Polling,
    Reducing,
    Persisted,
    Failed,
}

/// What became of one requested window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WindowStatus {
    /// The run stopped before this window reached a terminal state.
    Pending,
    Persisted,
    SkippedTimeout,
    SkippedFailed,
    SkippedCancelled,
}

impl WindowStatus {
    /// Status of a window whose task did not download.
    pub fn skipped(outcome: &TaskOutcome) -> Option<Self> {
        match outcome {
            TaskOutcome::Downloaded(_) => None,
            TaskOutcome::Failed(_) => Some(WindowStatus::SkippedFailed),
            TaskOutcome::TimedOut { .. } => Some(WindowStatus::SkippedTimeout),
            TaskOutcome::Cancelled => Some(WindowStatus::SkippedCancelled),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WindowStatus::Pending => "pending",
            WindowStatus::Persisted => "persisted",
            WindowStatus::SkippedTimeout => "skipped-timeout",
            WindowStatus::SkippedFailed => "skipped-failed",
            WindowStatus::SkippedCancelled => "skipped-cancelled",
        }
    }
}

impl fmt::Display for WindowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WindowReport {
    pub start: String,
    pub end: String,
    pub identifier: String,
    pub status: WindowStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl WindowReport {
    pub fn pending(window: &TimeWindow) -> Self {
        Self {
            start: window.start().to_string(),
            end: window.end().to_string(),
            identifier: window.identifier(),
            status: WindowStatus::Pending,
            detail: None,
        }
    }
}

/// One persisted series.
#[derive(Debug, Clone, Serialize)]
pub struct SeriesSummary {
    pub variable: String,
    pub country_code: String,
    pub stat_kind: StatKind,
    pub samples: usize,
    pub missing: usize,
    pub rows_written: usize,
}

impl SeriesSummary {
    pub fn new(series: &CountrySeries, rows_written: usize) -> Self {
        Self {
            variable: series.variable.clone(),
            country_code: series.country_code.clone(),
            stat_kind: series.stat_kind,
            samples: series.len(),
            missing: series.missing().count(),
            rows_written,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub stage: Stage,
    pub windows: Vec<WindowReport>,
    pub series: Vec<SeriesSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            stage: Stage::Chunking,
            windows: Vec::new(),
            series: Vec::new(),
            abort_reason: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.stage == Stage::Persisted
    }

    pub fn count(&self, status: WindowStatus) -> usize {
        self.windows.iter().filter(|w| w.status == status).count()
    }

    /// Mark the run failed at the current stage.
    pub fn abort(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(stage = ?self.stage, reason = %reason, "Run aborted");
        self.stage = Stage::Failed;
        self.abort_reason = Some(reason);
    }

    /// Emit one log line per window and a summary.
    pub fn log(&self) {
        for window in &self.windows {
            info!(
                window = %window.identifier,
                status = %window.status,
                detail = window.detail.as_deref().unwrap_or(""),
                "Window result"
            );
        }
        info!(
            stage = ?self.stage,
            persisted = self.count(WindowStatus::Persisted),
            skipped_timeout = self.count(WindowStatus::SkippedTimeout),
            skipped_failed = self.count(WindowStatus::SkippedFailed),
            skipped_cancelled = self.count(WindowStatus::SkippedCancelled),
            series = self.series.len(),
            "Run finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_skipped_status_per_outcome() {
        assert_eq!(WindowStatus::skipped(&TaskOutcome::Downloaded(PathBuf::from("a.nc"))), None);
        assert_eq!(
            WindowStatus::skipped(&TaskOutcome::Failed("boom".into())),
            Some(WindowStatus::SkippedFailed)
        );
        assert_eq!(
            WindowStatus::skipped(&TaskOutcome::TimedOut { attempts: 7 }),
            Some(WindowStatus::SkippedTimeout)
        );
        assert_eq!(
            WindowStatus::skipped(&TaskOutcome::Cancelled),
            Some(WindowStatus::SkippedCancelled)
        );
    }

    #[test]
    fn test_report_serializes_status_labels() {
        let mut report = RunReport::new();
        report.windows.push(WindowReport {
            start: "2024-01-01".into(),
            end: "2024-01-31".into(),
            identifier: "era5_2024_01".into(),
            status: WindowStatus::SkippedTimeout,
            detail: None,
        });
        report.abort("reduction failed");

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["stage"], "failed");
        assert_eq!(json["windows"][0]["status"], "skipped-timeout");
        assert_eq!(json["abort_reason"], "reduction failed");
        assert!(!report.is_success());
        assert_eq!(report.count(WindowStatus::SkippedTimeout), 1);
    }
}
