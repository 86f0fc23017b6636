//! Project setup configuration (dependency lock and repository bootstrap)

use std::path::PathBuf;
use std::str::FromStr;

use crate::config::env::{constants, flag, process_env, require, var, Lookup, Secret};
use crate::error::{ShipError, ShipResult};

/// Dependency lock and requirements export
#[derive(Clone, Debug)]
pub struct LockConfig {
    /// Directory holding the Pipfile (`PIPENV_PROJECT_DIR`)
    pub project_dir: PathBuf,
    /// Written relative to `project_dir` unless absolute
    pub output: PathBuf,
    /// `pipenv lock --pre`, needed when a dev tool only ships pre-releases
    pub allow_prereleases: bool,
}

impl LockConfig {
    pub fn from_env() -> ShipResult<Self> {
        Self::from_lookup(&process_env)
    }

    pub fn from_lookup(lookup: Lookup<'_>) -> ShipResult<Self> {
        Ok(Self {
            project_dir: var(lookup, "PIPENV_PROJECT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            output: var(lookup, "REQUIREMENTS_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("requirements.txt")),
            allow_prereleases: flag(lookup, "PIPENV_ALLOW_PRERELEASES", false)?,
        })
    }

    /// Where the pinned requirements end up
    pub fn output_path(&self) -> PathBuf {
        if self.output.is_absolute() {
            self.output.clone()
        } else {
            self.project_dir.join(&self.output)
        }
    }
}

/// Which URL from the created repository becomes `origin`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoteProtocol {
    Https,
    Ssh,
}

impl FromStr for RemoteProtocol {
    type Err = ShipError;

    /// Case-insensitive `https` or `ssh`
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "https" => Ok(RemoteProtocol::Https),
            "ssh" => Ok(RemoteProtocol::Ssh),
            _ => Err(ShipError::Config(format!(
                "GIT_REMOTE_PROTOCOL must be https or ssh, got `{}`",
                value
            ))),
        }
    }
}

/// One-time repository bootstrap
#[derive(Clone, Debug)]
pub struct BootstrapConfig {
    /// Working tree to initialise and push
    pub project_dir: PathBuf,
    /// JSON body for `POST /user/repos`
    pub descriptor: PathBuf,
    pub github_user: String,
    /// Personal access token, sent as the basic auth password
    pub github_token: Secret,
    /// API root without a trailing slash
    pub api_base: String,
    /// Branch created for the initial commit
    pub branch: String,
    pub remote_protocol: RemoteProtocol,
    pub commit_message: String,
}

impl BootstrapConfig {
    pub fn from_env() -> ShipResult<Self> {
        Self::from_lookup(&process_env)
    }

    pub fn from_lookup(lookup: Lookup<'_>) -> ShipResult<Self> {
        let remote_protocol = match var(lookup, "GIT_REMOTE_PROTOCOL") {
            None => RemoteProtocol::Https,
            Some(v) => v.parse()?,
        };

        Ok(Self {
            project_dir: var(lookup, "PROJECT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            descriptor: var(lookup, "REPO_DESCRIPTOR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("repo.json")),
            github_user: require(lookup, "GITHUB_USER")?,
            github_token: Secret::new(require(lookup, "GITHUB_TOKEN")?),
            api_base: var(lookup, "GITHUB_API_URL")
                .unwrap_or_else(|| constants::DEFAULT_GITHUB_API.to_string())
                .trim_end_matches('/')
                .to_string(),
            branch: var(lookup, "GIT_BRANCH").unwrap_or_else(|| "main".to_string()),
            remote_protocol,
            commit_message: var(lookup, "GIT_INITIAL_COMMIT_MESSAGE")
                .unwrap_or_else(|| "Initial commit".to_string()),
        })
    }
}
