//! Cluster rollout and teardown configuration

use std::path::PathBuf;
use std::time::Duration;

use crate::config::env::{
    constants, flag, parse_var, process_env, require, require_with_fallback, var, Lookup, Secret,
};
use crate::domain::cluster::ClusterRef;
use crate::error::{ShipError, ShipResult};

/// Service principal used for `az login`
#[derive(Clone, Debug)]
pub struct AzureCredentials {
    /// Application (client) id
    pub username: String,
    pub password: Secret,
    /// Directory (tenant) id
    pub tenant: String,
}

impl AzureCredentials {
    pub fn from_lookup(lookup: Lookup<'_>) -> ShipResult<Self> {
        Ok(Self {
            username: require_with_fallback(lookup, "AZURE_SP_USERNAME", "AZURE_CLIENT_ID")?,
            password: Secret::new(require_with_fallback(
                lookup,
                "AZURE_SP_PASSWORD",
                "AZURE_CLIENT_SECRET",
            )?),
            tenant: require(lookup, "AZURE_TENANT_ID")?,
        })
    }
}

fn cluster_from_lookup(lookup: Lookup<'_>) -> ShipResult<ClusterRef> {
    Ok(ClusterRef::new(
        require(lookup, "RESOURCE_GROUP")?,
        require(lookup, "CLUSTER_NAME")?,
    ))
}

/// Rollout of the published image
#[derive(Clone, Debug)]
pub struct DeployConfig {
    pub cluster: ClusterRef,
    pub credentials: AzureCredentials,
    /// Manifest applied verbatim with `kubectl apply -f`
    pub manifest: PathBuf,
    /// Deployment restarted after the apply
    pub deployment: String,
    /// Current kubectl context namespace when unset
    pub namespace: Option<String>,
    /// Wait for `kubectl rollout status` after the restart
    pub rollout_wait: Option<Duration>,
}

impl DeployConfig {
    pub fn from_env() -> ShipResult<Self> {
        Self::from_lookup(&process_env)
    }

    pub fn from_lookup(lookup: Lookup<'_>) -> ShipResult<Self> {
        let deployment = require(lookup, "K8S_DEPLOYMENT")?;
        if deployment.contains('/') || deployment.chars().any(char::is_whitespace) {
            return Err(ShipError::Config(format!(
                "K8S_DEPLOYMENT must be a bare deployment name, got `{}`",
                deployment
            )));
        }

        Ok(Self {
            cluster: cluster_from_lookup(lookup)?,
            credentials: AzureCredentials::from_lookup(lookup)?,
            manifest: var(lookup, "K8S_MANIFEST")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(constants::DEFAULT_MANIFEST)),
            deployment,
            namespace: var(lookup, "K8S_NAMESPACE"),
            rollout_wait: parse_var::<u64>(lookup, "ROLLOUT_WAIT_SECS")?
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        })
    }
}

/// Cluster teardown
#[derive(Clone, Debug)]
pub struct DecommissionConfig {
    pub cluster: ClusterRef,
    /// Check that the cluster exists before touching its service principal
    pub verify_cluster: bool,
    /// Between `provisioningState` checks while waiting for deletion
    pub poll_interval: Duration,
    pub wait_timeout: Duration,
}

impl DecommissionConfig {
    pub fn from_env() -> ShipResult<Self> {
        Self::from_lookup(&process_env)
    }

    pub fn from_lookup(lookup: Lookup<'_>) -> ShipResult<Self> {
        Ok(Self {
            cluster: cluster_from_lookup(lookup)?,
            verify_cluster: flag(lookup, "DECOMMISSION_VERIFY_CLUSTER", true)?,
            poll_interval: Duration::from_secs(
                parse_var(lookup, "DELETION_POLL_INTERVAL_SECS")?
                    .unwrap_or(constants::DELETION_POLL_INTERVAL_SECS),
            ),
            wait_timeout: Duration::from_secs(
                parse_var(lookup, "DELETION_WAIT_TIMEOUT_SECS")?
                    .unwrap_or(constants::DELETION_WAIT_TIMEOUT_SECS),
            ),
        })
    }
}
