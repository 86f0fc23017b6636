//! Pipeline stage model

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Final status of a pipeline run
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failed,
}

impl RunStatus {
    /// Failed as soon as one stage failed; skipped stages do not count
    pub fn from_stages(stages: &[PipelineStage]) -> Self {
        if stages.iter().any(|s| s.status == StageStatus::Failed) {
            RunStatus::Failed
        } else {
            RunStatus::Success
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

impl StageStatus {
    /// Marker used in the stage summary
    pub fn icon(&self) -> &'static str {
        match self {
            StageStatus::Pending => "○",
            StageStatus::Running => "⟳",
            StageStatus::Success => "✓",
            StageStatus::Failed => "✗",
            StageStatus::Skipped => "⊘",
        }
    }
}

/// Timing and result of one stage, as reported in the run summary
#[derive(Clone, Debug, Serialize)]
pub struct PipelineStage {
    /// Key used in the JSON summary: build, test, publish, deploy
    pub name: &'static str,
    /// Label used in the console summary
    pub display_name: &'static str,
    pub status: StageStatus,
    /// Unset for stages that never ran
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Wall-clock time between start and finish
    pub duration_ms: Option<u64>,
    /// Failure or skip reason
    pub message: Option<String>,
}

impl PipelineStage {
    pub fn new(name: &'static str, display_name: &'static str) -> Self {
        Self {
            name,
            display_name,
            status: StageStatus::Pending,
            started_at: None,
            finished_at: None,
            duration_ms: None,
            message: None,
        }
    }

    /// Mark the stage running and stamp its start time
    pub fn start(&mut self) {
        self.status = StageStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Close a started stage with the outcome it produced
    pub fn record<T>(&mut self, outcome: &StageOutcome<T>) {
        match outcome {
            StageOutcome::Succeeded(_) => self.close(StageStatus::Success, None),
            StageOutcome::Failed(reason) => self.close(StageStatus::Failed, Some(reason.clone())),
            StageOutcome::Skipped(reason) => self.skip(reason.clone()),
        }
    }

    /// Mark a stage that never ran
    pub fn skip(&mut self, reason: impl Into<String>) {
        self.status = StageStatus::Skipped;
        self.message = Some(reason.into());
    }

    fn close(&mut self, status: StageStatus, message: Option<String>) {
        let now = Utc::now();
        self.status = status;
        self.message = message;
        self.finished_at = Some(now);
        self.duration_ms = self
            .started_at
            .map(|started| (now - started).num_milliseconds().max(0) as u64);
    }

    /// One line of the console summary
    pub fn summary_line(&self) -> String {
        let duration = self
            .duration_ms
            .map(|ms| format!("{}ms", ms))
            .unwrap_or_else(|| "-".to_string());
        match self.message {
            Some(ref message) => format!("{} {} ({}) - {}", self.status.icon(), self.display_name, duration, message),
            None => format!("{} {} ({})", self.status.icon(), self.display_name, duration),
        }
    }
}

/// Result of one stage, handed explicitly to the next stage
#[derive(Clone, Debug, PartialEq)]
pub enum StageOutcome<T> {
    Succeeded(T),
    Failed(String),
    Skipped(String),
}

impl<T> StageOutcome<T> {
    /// Convert a stage result, keeping only the error message
    pub fn from_result<E: std::fmt::Display>(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => StageOutcome::Succeeded(value),
            Err(e) => StageOutcome::Failed(e.to_string()),
        }
    }

    /// Value of a successful stage
    pub fn succeeded(&self) -> Option<&T> {
        match self {
            StageOutcome::Succeeded(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StageOutcome::Succeeded(_))
    }

    /// Why a downstream stage will not run
    pub fn gate_reason(&self, stage: &str) -> Option<String> {
        match self {
            StageOutcome::Succeeded(_) => None,
            StageOutcome::Failed(reason) => Some(format!("{} failed: {}", stage, reason)),
            StageOutcome::Skipped(reason) => Some(format!("{} skipped: {}", stage, reason)),
        }
    }
}

/// Where a log line came from
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogStream {
    /// Progress messages and echoed command lines
    Pipeline,
    Warning,
    Stdout,
    Stderr,
}

impl LogStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStream::Pipeline => "pipeline",
            LogStream::Warning => "warning",
            LogStream::Stdout => "stdout",
            LogStream::Stderr => "stderr",
        }
    }
}

/// One line on the log channel, written as JSON by `--log-file`
#[derive(Clone, Debug, Serialize)]
pub struct LogLine {
    /// When the line was read, not when the child printed it
    pub timestamp: DateTime<Utc>,
    pub stream: LogStream,
    pub content: String,
}

impl LogLine {
    pub fn new(stream: LogStream, content: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            stream,
            content: content.into(),
        }
    }
}
