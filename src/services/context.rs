//! Pipeline context
//!
//! The one value threaded through every stage: which run this is, how to
//! run commands, and how to stop.

use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::domain::stage::{LogLine, LogStream};
use crate::error::{ShipError, ShipResult};
use crate::infra::command::{CommandExecutor, CommandOutput, CommandSpec};

/// Pipeline execution context
#[derive(Clone)]
pub struct PipelineContext {
    /// Unique id of this invocation, attached to every log line
    pub run_id: String,
    /// Runs every external tool; swapped for a scripted double in tests
    pub executor: Arc<dyn CommandExecutor>,
    /// Cancelled on Ctrl-C; stages check it between commands
    pub cancel_token: CancellationToken,
    /// Mirror of progress messages for `--log-file`
    pub log_tx: Option<broadcast::Sender<LogLine>>,
}

impl PipelineContext {
    /// Fresh context with a new run id and no log channel
    pub fn new(executor: Arc<dyn CommandExecutor>, cancel_token: CancellationToken) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            executor,
            cancel_token,
            log_tx: None,
        }
    }

    /// Also send progress messages to `log_tx`
    pub fn with_log_channel(mut self, log_tx: broadcast::Sender<LogLine>) -> Self {
        self.log_tx = Some(log_tx);
        self
    }

    /// Progress message for the operator
    pub fn log(&self, content: &str) {
        tracing::info!(run_id = %self.run_id, "{}", content);
        if let Some(ref tx) = self.log_tx {
            let _ = tx.send(LogLine::new(LogStream::Pipeline, content));
        }
    }

    pub fn warn(&self, content: &str) {
        tracing::warn!(run_id = %self.run_id, "{}", content);
        if let Some(ref tx) = self.log_tx {
            let _ = tx.send(LogLine::new(LogStream::Warning, content));
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Fail fast before starting `what` if the run was cancelled
    pub fn ensure_active(&self, what: &str) -> ShipResult<()> {
        if self.is_cancelled() {
            Err(ShipError::Cancelled {
                command: what.to_string(),
            })
        } else {
            Ok(())
        }
    }

    /// Run a command, failing on non-zero exit
    pub async fn run(&self, spec: CommandSpec) -> ShipResult<CommandOutput> {
        self.ensure_active(&spec.to_string())?;
        self.executor.run_checked(&spec).await
    }

    /// Run a command, leaving exit status interpretation to the caller
    pub async fn run_unchecked(&self, spec: CommandSpec) -> ShipResult<CommandOutput> {
        self.ensure_active(&spec.to_string())?;
        self.executor.run(&spec).await
    }
}
