//! Cluster rollout
//!
//! Service principal login, credential fetch, manifest apply, then a rolling
//! restart so running pods pick up the new `latest` image. Apply always
//! comes before restart.

use serde::Serialize;
use std::time::Duration;

use crate::config::DeployConfig;
use crate::error::{ShipError, ShipResult};
use crate::infra::command::CommandSpec;

use super::context::PipelineContext;

/// What the rollout did
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RolloutReport {
    pub cluster: String,
    pub deployment: String,
    pub namespace: Option<String>,
    /// `kubectl apply` output, one line per resource
    pub applied: Vec<String>,
    /// Whether `kubectl rollout status` confirmed completion
    pub rollout_confirmed: bool,
}

/// Log in with the service principal, fetch cluster credentials, apply the
/// manifest and restart the deployment so its pods pull `latest`.
///
/// When `rollout_wait` is set, also waits on `kubectl rollout status`.
pub async fn deploy(ctx: &PipelineContext, config: &DeployConfig) -> ShipResult<RolloutReport> {
    if !tokio::fs::try_exists(&config.manifest).await? {
        return Err(ShipError::MissingSource(config.manifest.clone()));
    }

    let deployment = format!("deployment/{}", config.deployment);
    ctx.log(&format!("Deploying {} to {}", deployment, config.cluster));

    // [1/4] authenticate
    let creds = &config.credentials;
    let login = CommandSpec::new("az")
        .args(["login", "--service-principal", "--username", &creds.username, "--password"])
        .secret_arg(&creds.password)
        .args(["--tenant", &creds.tenant, "--output", "none"]);
    ctx.run(login).await?;

    // [2/4] cluster credentials into the local kube context
    let get_credentials = CommandSpec::new("az")
        .args(["aks", "get-credentials"])
        .args(config.cluster.az_args())
        .arg("--overwrite-existing");
    ctx.run(get_credentials).await?;

    // [3/4] apply the manifest verbatim
    let apply = with_namespace(
        CommandSpec::new("kubectl")
            .args(["apply", "-f"])
            .arg(config.manifest.to_string_lossy()),
        config.namespace.as_deref(),
    );
    let applied = ctx.run(apply).await?;
    let applied: Vec<String> = applied
        .stdout
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .collect();

    // [4/4] rolling restart
    let restart = with_namespace(
        CommandSpec::new("kubectl")
            .args(["rollout", "restart"])
            .arg(deployment.clone()),
        config.namespace.as_deref(),
    );
    ctx.run(restart).await?;
    ctx.log(&format!("✓ Restarted {}", deployment));

    let rollout_confirmed = match config.rollout_wait {
        Some(timeout) => {
            wait_for_rollout(ctx, &deployment, config.namespace.as_deref(), timeout).await?;
            true
        }
        None => false,
    };

    Ok(RolloutReport {
        cluster: config.cluster.to_string(),
        deployment: config.deployment.clone(),
        namespace: config.namespace.clone(),
        applied,
        rollout_confirmed,
    })
}

async fn wait_for_rollout(
    ctx: &PipelineContext,
    deployment: &str,
    namespace: Option<&str>,
    timeout: Duration,
) -> ShipResult<()> {
    let status = with_namespace(
        CommandSpec::new("kubectl")
            .args(["rollout", "status", deployment])
            .arg(format!("--timeout={}s", timeout.as_secs())),
        namespace,
    );
    ctx.run(status).await?;
    ctx.log(&format!("✓ Rollout of {} complete", deployment));
    Ok(())
}

fn with_namespace(spec: CommandSpec, namespace: Option<&str>) -> CommandSpec {
    match namespace {
        Some(ns) => spec.args(["--namespace", ns]),
        None => spec,
    }
}
