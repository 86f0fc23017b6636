//! Unified error handling
//!
//! `ShipError` covers every failure the pipeline stages can report. External
//! tool failures pass their exit status and stderr through unchanged.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Pipeline error
#[derive(Debug, Error)]
pub enum ShipError {
    /// The child process could not be started (tool missing from PATH, etc.)
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Waiting on or writing to the child process failed
    #[error("failed while running `{command}`: {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("`{command}` was cancelled")]
    Cancelled { command: String },

    /// The tool ran and reported failure. `command` is already redacted.
    #[error("`{command}` exited with status {code}{}", format_stderr(.stderr))]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid image reference `{reference}`: {reason}")]
    InvalidImageRef { reference: String, reason: String },

    #[error("invalid build id `{0}`: must be a docker tag other than `latest`")]
    InvalidBuildId(String),

    #[error("missing source: {} does not exist", .0.display())]
    MissingSource(PathBuf),

    #[error("cluster `{name}` not found in resource group `{resource_group}`")]
    ClusterNotFound {
        resource_group: String,
        name: String,
    },

    #[error("cluster `{name}` in resource group `{resource_group}` has no service principal (got `{found}`)")]
    ServicePrincipalMissing {
        resource_group: String,
        name: String,
        found: String,
    },

    #[error("requirement on line {line_no} is not pinned to an exact version: `{line}`")]
    UnpinnedRequirement { line_no: usize, line: String },

    #[error("{} already contains a git repository", .0.display())]
    AlreadyInitialized(PathBuf),

    #[error("repository host rejected the request with {status}: {body}")]
    RepoHost { status: u16, body: String },

    #[error("cluster deletion did not complete within {0:?}")]
    DeletionPending(Duration),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn format_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {}", trimmed)
    }
}

/// stderr fragments that indicate an infrastructure hiccup rather than bad input
const TRANSIENT_MARKERS: &[&str] = &[
    "timeout",
    "timed out",
    "connection reset",
    "connection refused",
    "temporary failure",
    "tls handshake",
    "503 service unavailable",
    "502 bad gateway",
    "too many requests",
    "i/o timeout",
];

impl ShipError {
    /// Whether an operator can reasonably retry the same invocation unchanged
    pub fn is_transient(&self) -> bool {
        match self {
            ShipError::Timeout { .. } | ShipError::DeletionPending(_) => true,
            ShipError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ShipError::RepoHost { status, .. } => *status >= 500 || *status == 429,
            ShipError::CommandFailed { stderr, .. } => {
                let lower = stderr.to_lowercase();
                TRANSIENT_MARKERS.iter().any(|m| lower.contains(m))
            }
            _ => false,
        }
    }

    /// Process exit code used by the CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            ShipError::Cancelled { .. } => 130,
            ShipError::Config(_)
            | ShipError::InvalidImageRef { .. }
            | ShipError::InvalidBuildId(_) => 2,
            _ => 1,
        }
    }
}

/// Convenience alias
pub type ShipResult<T> = Result<T, ShipError>;
