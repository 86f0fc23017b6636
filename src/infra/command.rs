//! Command execution
//!
//! Every external tool (`docker`, `az`, `kubectl`, `pipenv`, `git`) is run
//! through [`CommandExecutor`]. The production [`CommandRunner`] supports:
//! - line-by-line log streaming of stdout/stderr
//! - timeout control
//! - cancellation
//! - secret redaction in everything it logs

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Secret;
use crate::domain::stage::{LogLine, LogStream};
use crate::error::{ShipError, ShipResult};

/// One command-line argument
#[derive(Clone, Debug)]
enum Arg {
    Plain(String),
    Secret(Secret),
}

/// A command to run, built up fluently
#[derive(Clone, Debug)]
pub struct CommandSpec {
    program: String,
    args: Vec<Arg>,
    work_dir: Option<PathBuf>,
    stdin: Option<Secret>,
    stream_output: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            work_dir: None,
            stdin: None,
            stream_output: true,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(Arg::Plain(arg.into()));
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|a| Arg::Plain(a.into())));
        self
    }

    /// Argument shown as `***` in logs and errors
    pub fn secret_arg(mut self, secret: &Secret) -> Self {
        self.args.push(Arg::Secret(secret.clone()));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.work_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Feed a secret on stdin (e.g. `docker login --password-stdin`)
    pub fn stdin_secret(mut self, secret: &Secret) -> Self {
        self.stdin = Some(secret.clone());
        self
    }

    /// Capture output without forwarding it to the log
    pub fn quiet(mut self) -> Self {
        self.stream_output = false;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn work_dir(&self) -> Option<&Path> {
        self.work_dir.as_deref()
    }

    pub fn stdin(&self) -> Option<&Secret> {
        self.stdin.as_ref()
    }

    pub fn streams_output(&self) -> bool {
        self.stream_output
    }

    /// Arguments with secrets revealed; only for handing to the OS
    pub fn exposed_args(&self) -> Vec<&str> {
        self.args
            .iter()
            .map(|a| match a {
                Arg::Plain(s) => s.as_str(),
                Arg::Secret(s) => s.expose(),
            })
            .collect()
    }

    /// Full command line with secrets revealed; only for test doubles
    pub fn exposed_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.exposed_args())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Convert a non-zero exit into [`ShipError::CommandFailed`]
    pub fn check(&self, output: CommandOutput) -> ShipResult<CommandOutput> {
        if output.success() {
            Ok(output)
        } else {
            Err(ShipError::CommandFailed {
                command: self.to_string(),
                code: output.code,
                stderr: output.stderr,
            })
        }
    }
}

/// Redacted command line
impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            match arg {
                Arg::Plain(s) => write!(f, " {}", s)?,
                Arg::Secret(_) => f.write_str(" ***")?,
            }
        }
        Ok(())
    }
}

/// Captured result of a finished command
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommandOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Runs external commands
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run to completion; a non-zero exit is still `Ok`
    async fn run(&self, spec: &CommandSpec) -> ShipResult<CommandOutput>;

    /// Run and fail on a non-zero exit
    async fn run_checked(&self, spec: &CommandSpec) -> ShipResult<CommandOutput> {
        let output = self.run(spec).await?;
        spec.check(output)
    }
}

/// Executes commands as child processes
#[derive(Clone)]
pub struct CommandRunner {
    timeout: Duration,
    cancel: CancellationToken,
    log_tx: Option<broadcast::Sender<LogLine>>,
}

impl CommandRunner {
    pub fn new(timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            timeout,
            cancel,
            log_tx: None,
        }
    }

    /// Also forward every output line to a broadcast channel
    pub fn with_log_channel(mut self, log_tx: broadcast::Sender<LogLine>) -> Self {
        self.log_tx = Some(log_tx);
        self
    }

    fn publish(&self, line: LogLine) {
        if let Some(ref tx) = self.log_tx {
            // No subscribers is fine
            let _ = tx.send(line);
        }
    }
}

#[async_trait]
impl CommandExecutor for CommandRunner {
    async fn run(&self, spec: &CommandSpec) -> ShipResult<CommandOutput> {
        let rendered = spec.to_string();
        info!(">>> {}", rendered);
        self.publish(LogLine::new(LogStream::Pipeline, format!(">>> {}", rendered)));

        let mut command = Command::new(spec.program());
        command
            .args(spec.exposed_args())
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = spec.work_dir() {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| ShipError::Spawn {
            program: spec.program().to_string(),
            source,
        })?;

        if let (Some(secret), Some(mut stdin)) = (spec.stdin(), child.stdin.take()) {
            stdin
                .write_all(secret.expose().as_bytes())
                .await
                .map_err(|source| ShipError::Wait {
                    command: rendered.clone(),
                    source,
                })?;
            // Dropping stdin closes the pipe so the tool sees EOF
            drop(stdin);
        }

        let stdout_task = spawn_reader(child.stdout.take(), LogStream::Stdout, spec.streams_output(), self.log_tx.clone());
        let stderr_task = spawn_reader(child.stderr.take(), LogStream::Stderr, spec.streams_output(), self.log_tx.clone());

        let result = tokio::select! {
            _ = self.cancel.cancelled() => {
                warn!("Command cancelled, killing process: {}", rendered);
                let _ = child.kill().await;
                Err(ShipError::Cancelled { command: rendered.clone() })
            }
            _ = tokio::time::sleep(self.timeout) => {
                error!("Command timed out after {:?}: {}", self.timeout, rendered);
                let _ = child.kill().await;
                Err(ShipError::Timeout { command: rendered.clone(), timeout: self.timeout })
            }
            status = child.wait() => {
                status.map_err(|source| ShipError::Wait { command: rendered.clone(), source })
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();
        let status = result?;

        let code = status.code().unwrap_or(-1);
        debug!(code, "{} finished", spec.program());

        Ok(CommandOutput { code, stdout, stderr })
    }
}

/// Drain one output stream to EOF, forwarding lines to the log as they arrive.
///
/// Lines are decoded lossily; stopping early would close the pipe and kill
/// the child with SIGPIPE.
fn spawn_reader<R>(
    reader: Option<R>,
    stream: LogStream,
    forward: bool,
    log_tx: Option<broadcast::Sender<LogLine>>,
) -> tokio::task::JoinHandle<String>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut captured = String::new();
        let Some(reader) = reader else {
            return captured;
        };
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!(stream = stream.as_str(), error = %e, "Failed to read command output");
                    break;
                }
            }
            let raw = buf.strip_suffix(b"\n").unwrap_or(&buf[..]);
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            let line = String::from_utf8_lossy(raw);
            if forward {
                match stream {
                    LogStream::Stderr => warn!(stream = stream.as_str(), "{}", line),
                    _ => info!(stream = stream.as_str(), "{}", line),
                }
                if let Some(ref tx) = log_tx {
                    let _ = tx.send(LogLine::new(stream, line.to_string()));
                }
            }
            captured.push_str(&line);
            captured.push('\n');
        }
        captured
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> CommandRunner {
        CommandRunner::new(Duration::from_secs(5), CancellationToken::new())
    }

    #[test]
    fn test_display_redacts_secrets() {
        let secret = Secret::new("hunter2");
        let spec = CommandSpec::new("az")
            .args(["login", "--service-principal", "--password"])
            .secret_arg(&secret);
        assert_eq!(spec.to_string(), "az login --service-principal --password ***");
        assert_eq!(
            spec.exposed_line(),
            "az login --service-principal --password hunter2"
        );
    }

    #[test]
    fn test_check_redacts_command_in_error() {
        let secret = Secret::new("hunter2");
        let spec = CommandSpec::new("az").arg("--password").secret_arg(&secret);
        let err = spec.check(CommandOutput::failed(1, "bad secret")).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("***"));
        assert!(!message.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_run_success_captures_stdout() {
        let spec = CommandSpec::new("echo").arg("hello");
        let output = runner().run(&spec).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "hello\n");
    }

    #[tokio::test]
    async fn test_run_nonzero_exit_is_ok_but_check_fails() {
        let spec = CommandSpec::new("sh").args(["-c", "echo oops >&2; exit 3"]);
        let output = runner().run(&spec).await.unwrap();
        assert_eq!(output.code, 3);
        assert_eq!(output.stderr, "oops\n");

        let err = runner().run_checked(&spec).await.unwrap_err();
        assert!(matches!(err, ShipError::CommandFailed { code: 3, .. }));
    }

    #[tokio::test]
    async fn test_invalid_utf8_does_not_stop_draining() {
        let spec = CommandSpec::new("sh")
            .args(["-c", "printf 'ok\\n\\377\\n'; head -c 300000 /dev/zero | tr '\\0' a; echo; echo done"])
            .quiet();
        let output = runner().run(&spec).await.unwrap();
        assert_eq!(output.code, 0);
        assert!(output.stdout.starts_with("ok\n\u{FFFD}\n"));
        assert!(output.stdout.ends_with("done\n"));
        assert!(output.stdout.len() > 300_000);
    }

    #[tokio::test]
    async fn test_run_not_found() {
        let spec = CommandSpec::new("nonexistent_command_12345");
        let result = runner().run(&spec).await;
        assert!(matches!(result, Err(ShipError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_stdin_secret_is_delivered() {
        let secret = Secret::new("from-stdin");
        let spec = CommandSpec::new("cat").stdin_secret(&secret).quiet();
        let output = runner().run(&spec).await.unwrap();
        assert_eq!(output.stdout, "from-stdin\n");
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let runner = CommandRunner::new(Duration::from_millis(100), CancellationToken::new());
        let spec = CommandSpec::new("sleep").arg("5");
        let result = runner.run(&spec).await;
        assert!(matches!(result, Err(ShipError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_cancel_kills_process() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let runner = CommandRunner::new(Duration::from_secs(5), cancel);
        let spec = CommandSpec::new("sleep").arg("5");
        let result = runner.run(&spec).await;
        assert!(matches!(result, Err(ShipError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_lines_forwarded_to_channel() {
        let (tx, mut rx) = broadcast::channel(16);
        let runner = runner().with_log_channel(tx);
        let spec = CommandSpec::new("echo").arg("streamed");
        runner.run(&spec).await.unwrap();

        let header = rx.recv().await.unwrap();
        assert_eq!(header.stream, LogStream::Pipeline);
        assert_eq!(header.content, ">>> echo streamed");
        let line = rx.recv().await.unwrap();
        assert_eq!(line.stream, LogStream::Stdout);
        assert_eq!(line.content, "streamed");
    }
}
