//! Cluster teardown
//!
//! 1. optionally verify the cluster exists
//! 2. look up its service principal (always live, never cached)
//! 3. delete the service principal
//! 4. submit the cluster deletion without waiting
//!
//! The returned [`DeletionJob`] can be polled or awaited by callers that
//! need to observe completion.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::DecommissionConfig;
use crate::domain::cluster::{ClusterRef, ServicePrincipalId};
use crate::error::{ShipError, ShipResult};
use crate::infra::command::{CommandOutput, CommandSpec};

use super::context::PipelineContext;

/// State of a submitted deletion
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionState {
    /// The cluster is still reported by `az aks show`
    InProgress,
    Completed,
}

/// Handle for an asynchronous `az aks delete --no-wait`
#[derive(Clone, Debug, Serialize)]
pub struct DeletionJob {
    pub cluster: ClusterRef,
    /// Already deleted when the job is returned
    pub service_principal: ServicePrincipalId,
    pub submitted_at: DateTime<Utc>,
}

impl DeletionJob {
    /// Query the cluster once
    pub async fn poll(&self, ctx: &PipelineContext) -> ShipResult<DeletionState> {
        match show_cluster(ctx, &self.cluster, "provisioningState").await? {
            Some(_) => Ok(DeletionState::InProgress),
            None => Ok(DeletionState::Completed),
        }
    }

    /// Poll until the cluster is gone or `timeout` elapses
    pub async fn wait(
        &self,
        ctx: &PipelineContext,
        interval: Duration,
        timeout: Duration,
    ) -> ShipResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.poll(ctx).await? == DeletionState::Completed {
                ctx.log(&format!("✓ Cluster {} deleted", self.cluster));
                return Ok(());
            }
            if Instant::now() + interval > deadline {
                return Err(ShipError::DeletionPending(timeout));
            }
            ctx.log(&format!("Cluster {} is still being deleted", self.cluster));
            tokio::select! {
                _ = ctx.cancel_token.cancelled() => {
                    return Err(ShipError::Cancelled {
                        command: format!("wait for deletion of {}", self.cluster),
                    });
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }
}

/// Delete the cluster's service principal, then submit the cluster deletion.
///
/// Returns as soon as Azure accepts the delete; use [`DeletionJob::wait`] to
/// block until the cluster is gone.
pub async fn decommission(ctx: &PipelineContext, config: &DecommissionConfig) -> ShipResult<DeletionJob> {
    let cluster = &config.cluster;
    ctx.log(&format!("Decommissioning cluster {}", cluster));

    if config.verify_cluster {
        if show_cluster(ctx, cluster, "id").await?.is_none() {
            return Err(ShipError::ClusterNotFound {
                resource_group: cluster.resource_group.clone(),
                name: cluster.name.clone(),
            });
        }
        ctx.log("✓ Cluster exists");
    } else {
        ctx.warn("Cluster existence check disabled");
    }

    let raw = show_cluster(ctx, cluster, "servicePrincipalProfile.clientId").await?;
    let raw = match raw {
        Some(raw) => raw,
        None => {
            return Err(ShipError::ClusterNotFound {
                resource_group: cluster.resource_group.clone(),
                name: cluster.name.clone(),
            })
        }
    };
    let service_principal = ServicePrincipalId::from_query_output(&raw).ok_or_else(|| {
        ShipError::ServicePrincipalMissing {
            resource_group: cluster.resource_group.clone(),
            name: cluster.name.clone(),
            found: raw.trim().to_string(),
        }
    })?;
    ctx.log(&format!("Service principal: {}", service_principal));

    ctx.run(
        CommandSpec::new("az")
            .args(["ad", "sp", "delete", "--id"])
            .arg(service_principal.as_str()),
    )
    .await?;
    ctx.log(&format!("✓ Service principal {} deleted", service_principal));

    ctx.run(
        CommandSpec::new("az")
            .args(["aks", "delete"])
            .args(cluster.az_args())
            .args(["--yes", "--no-wait"]),
    )
    .await?;
    ctx.log(&format!("✓ Deletion of {} submitted", cluster));

    Ok(DeletionJob {
        cluster: cluster.clone(),
        service_principal,
        submitted_at: Utc::now(),
    })
}

/// `az aks show --query <query>`; `None` when the cluster does not exist
async fn show_cluster(ctx: &PipelineContext, cluster: &ClusterRef, query: &str) -> ShipResult<Option<String>> {
    let spec = CommandSpec::new("az")
        .args(["aks", "show"])
        .args(cluster.az_args())
        .args(["--query", query, "--output", "tsv"])
        .quiet();
    let output = ctx.run_unchecked(spec.clone()).await?;

    if output.success() {
        Ok(Some(output.stdout))
    } else if is_not_found(&output) {
        Ok(None)
    } else {
        spec.check(output).map(|_| None)
    }
}

fn is_not_found(output: &CommandOutput) -> bool {
    let stderr = output.stderr.to_lowercase();
    stderr.contains("resourcenotfound")
        || stderr.contains("resourcegroupnotfound")
        || stderr.contains("could not be found")
        || stderr.contains("was not found")
}
