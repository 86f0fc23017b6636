//! Shared test doubles for the pipeline services.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::domain::image::BuildId;
use crate::error::{ShipError, ShipResult};
use crate::infra::command::{CommandExecutor, CommandOutput, CommandSpec};
use crate::infra::github::{CreatedRepository, RepoDescriptor, RepositoryHost};
use crate::services::context::PipelineContext;

type Responder = Box<dyn Fn(&CommandSpec) -> ShipResult<CommandOutput> + Send + Sync>;

struct Rule {
    pattern: String,
    remaining: Option<usize>,
    respond: Responder,
}

/// What the executor saw for one call
#[derive(Clone, Debug)]
pub struct Invocation {
    /// Command line with secrets revealed
    pub line: String,
    /// Command line as it would be logged
    pub redacted: String,
    pub stdin: Option<String>,
    pub work_dir: Option<PathBuf>,
}

/// Executor that records every call and answers from a script.
///
/// Rules match when the exposed command line contains the pattern; the first
/// live rule wins. Unmatched commands succeed with empty output.
#[derive(Default)]
pub struct ScriptedExecutor {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, pattern: &str, remaining: Option<usize>, respond: Responder) -> Self {
        self.rules.lock().unwrap().push(Rule {
            pattern: pattern.to_string(),
            remaining,
            respond,
        });
        self
    }

    /// Always answer `output` for matching commands
    pub fn on(self, pattern: &str, output: CommandOutput) -> Self {
        self.push(pattern, None, Box::new(move |_| Ok(output.clone())))
    }

    /// Answer `output` for the next matching command only
    pub fn once(self, pattern: &str, output: CommandOutput) -> Self {
        self.push(pattern, Some(1), Box::new(move |_| Ok(output.clone())))
    }

    /// Answer with a closure, e.g. to create files the real tool would
    pub fn on_with<F>(self, pattern: &str, respond: F) -> Self
    where
        F: Fn(&CommandSpec) -> ShipResult<CommandOutput> + Send + Sync + 'static,
    {
        self.push(pattern, None, Box::new(respond))
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.line).collect()
    }

    /// Lines containing `pattern`, in call order
    pub fn lines_matching(&self, pattern: &str) -> Vec<String> {
        self.lines().into_iter().filter(|l| l.contains(pattern)).collect()
    }

    /// Index of the first call containing `pattern`
    pub fn position(&self, pattern: &str) -> Option<usize> {
        self.lines().iter().position(|l| l.contains(pattern))
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn run(&self, spec: &CommandSpec) -> ShipResult<CommandOutput> {
        let line = spec.exposed_line();
        self.calls.lock().unwrap().push(Invocation {
            line: line.clone(),
            redacted: spec.to_string(),
            stdin: spec.stdin().map(|s| s.expose().to_string()),
            work_dir: spec.work_dir().map(|p| p.to_path_buf()),
        });

        let mut rules = self.rules.lock().unwrap();
        let rule = rules
            .iter_mut()
            .find(|r| r.remaining != Some(0) && line.contains(&r.pattern));
        match rule {
            Some(rule) => {
                if let Some(n) = rule.remaining.as_mut() {
                    *n -= 1;
                }
                (rule.respond)(spec)
            }
            None => Ok(CommandOutput::default()),
        }
    }
}

/// In-memory repository host
#[derive(Default)]
pub struct FakeRepositoryHost {
    pub created: Mutex<Vec<String>>,
    pub reject_with: Option<u16>,
}

#[async_trait]
impl RepositoryHost for FakeRepositoryHost {
    async fn create_repository(&self, descriptor: &RepoDescriptor) -> ShipResult<CreatedRepository> {
        if let Some(status) = self.reject_with {
            return Err(ShipError::RepoHost {
                status,
                body: r#"{"message":"Repository creation failed."}"#.to_string(),
            });
        }
        self.created.lock().unwrap().push(descriptor.name.clone());
        Ok(CreatedRepository {
            full_name: format!("octocat/{}", descriptor.name),
            html_url: format!("https://github.com/octocat/{}", descriptor.name),
            clone_url: format!("https://github.com/octocat/{}.git", descriptor.name),
            ssh_url: format!("git@github.com:octocat/{}.git", descriptor.name),
        })
    }
}

/// Pipeline context over the given executor
pub fn context(executor: std::sync::Arc<ScriptedExecutor>) -> PipelineContext {
    PipelineContext::new(executor, CancellationToken::new())
}

pub fn build_id() -> BuildId {
    BuildId::new("42").unwrap()
}
