//! Environment variable loading
//!
//! Every config struct has a `from_env()` constructor backed by a
//! `from_lookup()` that takes any variable source, so tests never have to
//! touch the process environment.

use std::fmt;
use std::time::Duration;
use tracing::warn;

use crate::error::{ShipError, ShipResult};

/// Variable source: `std::env::var` in production, a map in tests
pub type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Read from the process environment
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Non-empty variable
pub fn var(lookup: Lookup<'_>, name: &str) -> Option<String> {
    lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Load a variable, accepting a deprecated or CI-specific fallback name
pub fn load_with_fallback(lookup: Lookup<'_>, primary: &str, fallback: &str) -> Option<String> {
    var(lookup, primary).or_else(|| {
        let value = var(lookup, fallback);
        if value.is_some() {
            warn!("{} is not set, using {}", primary, fallback);
        }
        value
    })
}

/// Value of `name`, or a config error naming it
pub fn require(lookup: Lookup<'_>, name: &str) -> ShipResult<String> {
    var(lookup, name).ok_or_else(|| ShipError::Config(format!("{} must be set", name)))
}

pub fn require_with_fallback(lookup: Lookup<'_>, primary: &str, fallback: &str) -> ShipResult<String> {
    load_with_fallback(lookup, primary, fallback)
        .ok_or_else(|| ShipError::Config(format!("{} (or {}) must be set", primary, fallback)))
}

/// `1`/`true`/`yes`/`on` and `0`/`false`/`no`/`off`, anything else is an error
pub fn flag(lookup: Lookup<'_>, name: &str, default: bool) -> ShipResult<bool> {
    match var(lookup, name) {
        None => Ok(default),
        Some(v) => match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ShipError::Config(format!("{} must be a boolean, got `{}`", name, v))),
        },
    }
}

/// Parse `name` with `FromStr`; unset is `Ok(None)`
pub fn parse_var<T: std::str::FromStr>(lookup: Lookup<'_>, name: &str) -> ShipResult<Option<T>> {
    match var(lookup, name) {
        None => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| ShipError::Config(format!("{} has an invalid value `{}`", name, v))),
    }
}

/// Secret material: passwords, client secrets, API tokens.
///
/// Never printed; use `expose()` at the single place the value is handed to
/// a tool.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// External command limits
#[derive(Clone, Debug)]
pub struct CommandConfig {
    pub timeout: Duration,
}

impl CommandConfig {
    pub fn from_env() -> ShipResult<Self> {
        Self::from_lookup(&process_env)
    }

    pub fn from_lookup(lookup: Lookup<'_>) -> ShipResult<Self> {
        let secs = parse_var(lookup, "COMMAND_TIMEOUT_SECS")?.unwrap_or(constants::COMMAND_TIMEOUT_SECS);
        if secs == 0 {
            return Err(ShipError::Config("COMMAND_TIMEOUT_SECS must be positive".to_string()));
        }
        Ok(Self {
            timeout: Duration::from_secs(secs),
        })
    }
}

/// Constants
pub mod constants {
    /// Per-command timeout (seconds)
    pub const COMMAND_TIMEOUT_SECS: u64 = 1800; // 30 minutes

    /// Interval between `az aks show` polls while waiting for deletion
    pub const DELETION_POLL_INTERVAL_SECS: u64 = 30;

    /// Default time to wait for cluster deletion with `--wait`
    pub const DELETION_WAIT_TIMEOUT_SECS: u64 = 1800;

    /// Capacity of the log broadcast channel
    pub const LOG_CHANNEL_CAPACITY: usize = 256;

    pub const DEFAULT_BASE_IMAGE: &str = "python:3.8-slim";
    pub const DEFAULT_APP_MODULE: &str = "fastapi_hello_world";
    pub const DEFAULT_APP_PORT: u16 = 80;
    pub const DEFAULT_MANIFEST: &str = "k8s/deployment.yaml";
    pub const DEFAULT_GITHUB_API: &str = "https://api.github.com";

    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}
