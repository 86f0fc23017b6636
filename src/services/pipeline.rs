//! Pipeline runner
//!
//! build → (image tests) → publish → deploy, each stage consuming the
//! previous stage's outcome explicitly.

use serde::Serialize;
use std::path::Path;

use crate::config::{BuildConfig, DeployConfig, RegistryConfig};
use crate::domain::image::{BuildId, BuiltImage, PublishedImage};
use crate::domain::stage::{PipelineStage, RunStatus, StageOutcome};
use crate::error::ShipResult;

use super::context::PipelineContext;
use super::deployer::{self, RolloutReport};
use super::publisher;
use super::{builder, verifier};

/// Everything one pipeline run needs
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub build: BuildConfig,
    pub registry: RegistryConfig,
    /// `None` stops after publishing
    pub deploy: Option<DeployConfig>,
}

/// Run summary, also written as JSON with `--summary`
#[derive(Clone, Debug, Serialize)]
pub struct PipelineReport {
    pub run_id: String,
    pub build_id: BuildId,
    pub status: RunStatus,
    pub stages: Vec<PipelineStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<PublishedImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollout: Option<RolloutReport>,
}

impl PipelineReport {
    /// Look up a stage by its key
    pub fn stage(&self, name: &str) -> Option<&PipelineStage> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Process exit code: 0 on success, 130 when the run was interrupted,
    /// 1 for any other failed stage
    pub fn exit_code(&self, cancelled: bool) -> i32 {
        match self.status {
            RunStatus::Success => 0,
            RunStatus::Failed if cancelled => 130,
            RunStatus::Failed => 1,
        }
    }

    /// Write the report as pretty-printed JSON
    pub async fn write_summary(&self, path: &Path) -> ShipResult<()> {
        let json = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(path, json).await?;
        tracing::info!(path = %path.display(), "Summary written");
        Ok(())
    }
}

/// Run build, image tests, publish and deploy in order.
///
/// Never fails itself: every stage error ends up in the report, and a failed
/// or skipped stage skips everything after it.
pub async fn run(ctx: &PipelineContext, config: &PipelineConfig) -> PipelineReport {
    let test_command = config.build.test_command.as_deref();

    let mut build_stage = PipelineStage::new("build", "Image Build");
    let mut test_stage = test_command.map(|_| PipelineStage::new("test", "Image Tests"));
    let mut publish_stage = PipelineStage::new("publish", "Publish");
    let mut deploy_stage = PipelineStage::new("deploy", "Deploy");
    let total = if test_stage.is_some() { 4 } else { 3 };
    let mut step = 0;

    ctx.log(&format!(
        "=== Pipeline {} for build {} ===",
        ctx.run_id, config.build.build_id
    ));
    ctx.log(&format!("Timestamp: {}", chrono::Utc::now().to_rfc3339()));

    // Build
    step += 1;
    ctx.log(&format!("[{}/{}] Building image...", step, total));
    build_stage.start();
    let mut artifact: StageOutcome<BuiltImage> =
        StageOutcome::from_result(builder::build(ctx, &config.build, &config.registry).await);
    build_stage.record(&artifact);

    // Image tests
    if let (Some(stage), Some(command)) = (test_stage.as_mut(), test_command) {
        step += 1;
        match artifact.succeeded() {
            Some(image) => {
                ctx.log(&format!("[{}/{}] Testing image...", step, total));
                stage.start();
                let tested = StageOutcome::from_result(verifier::verify(ctx, image, command).await);
                stage.record(&tested);
                if let StageOutcome::Failed(reason) = tested {
                    artifact = StageOutcome::Failed(format!("image tests failed: {}", reason));
                }
            }
            None => stage.skip(artifact.gate_reason("build").unwrap_or_default()),
        }
    }

    // Publish: the publisher itself refuses anything but a successful build
    step += 1;
    if artifact.is_success() {
        ctx.log(&format!("[{}/{}] Publishing image...", step, total));
        publish_stage.start();
    }
    let published: StageOutcome<PublishedImage> =
        match publisher::publish(ctx, &artifact, &config.registry).await {
            Ok(outcome) => outcome.into_stage(),
            Err(e) => StageOutcome::Failed(e.to_string()),
        };
    publish_stage.record(&published);

    // Deploy
    step += 1;
    let mut rollout = None;
    match (published.succeeded(), &config.deploy) {
        (Some(_), Some(deploy_config)) => {
            ctx.log(&format!("[{}/{}] Rolling out...", step, total));
            deploy_stage.start();
            let outcome = StageOutcome::from_result(deployer::deploy(ctx, deploy_config).await);
            deploy_stage.record(&outcome);
            if let StageOutcome::Succeeded(report) = outcome {
                rollout = Some(report);
            }
        }
        (Some(_), None) => deploy_stage.skip("deploy disabled"),
        (None, _) => deploy_stage.skip(published.gate_reason("publish").unwrap_or_default()),
    }

    let stages: Vec<PipelineStage> = std::iter::once(build_stage)
        .chain(test_stage)
        .chain([publish_stage, deploy_stage])
        .collect();
    let status = RunStatus::from_stages(&stages);

    ctx.log("=== Stage Summary ===");
    for stage in &stages {
        ctx.log(&stage.summary_line());
    }
    ctx.log(&format!("Status: {}", status.as_str()));

    tracing::info!(
        run_id = %ctx.run_id,
        build_id = %config.build.build_id,
        status = status.as_str(),
        "Pipeline finished"
    );

    PipelineReport {
        run_id: ctx.run_id.clone(),
        build_id: config.build.build_id.clone(),
        status,
        stages,
        image: published.succeeded().cloned(),
        rollout,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AzureCredentials, Secret};
    use crate::domain::cluster::ClusterRef;
    use crate::domain::stage::StageStatus;
    use crate::infra::command::CommandOutput;
    use crate::test_utils::{build_id, context, ScriptedExecutor};
    use std::path::Path;
    use std::sync::Arc;

    fn pipeline_config(dir: &Path, with_deploy: bool) -> PipelineConfig {
        std::fs::write(dir.join("Dockerfile"), "FROM scratch\n").unwrap();
        let manifest = dir.join("deployment.yaml");
        std::fs::write(&manifest, "kind: Deployment\n").unwrap();

        PipelineConfig {
            build: BuildConfig {
                context_dir: dir.to_path_buf(),
                dockerfile: dir.join("Dockerfile"),
                base_image: "python:3.8-slim".to_string(),
                build_id: build_id(),
                test_command: None,
            },
            registry: RegistryConfig {
                repository: "registry.example/app".to_string(),
                registry: "registry.example".to_string(),
                credentials: None,
            },
            deploy: with_deploy.then(|| DeployConfig {
                cluster: ClusterRef::new("rg-demo", "aks-demo"),
                credentials: AzureCredentials {
                    username: "app-id".to_string(),
                    password: Secret::new("pw"),
                    tenant: "tenant".to_string(),
                },
                manifest,
                deployment: "fastapi-hello-world".to_string(),
                namespace: None,
                rollout_wait: None,
            }),
        }
    }

    fn docker() -> ScriptedExecutor {
        ScriptedExecutor::new().on("docker image inspect", CommandOutput::ok("sha256:abc\n"))
    }

    fn statuses(report: &PipelineReport) -> Vec<(String, StageStatus)> {
        report
            .stages
            .iter()
            .map(|s| (s.name.to_string(), s.status))
            .collect()
    }

    #[tokio::test]
    async fn test_successful_run() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(docker());
        let ctx = context(executor.clone());

        let report = run(&ctx, &pipeline_config(dir.path(), true)).await;

        assert_eq!(report.status, RunStatus::Success);
        assert!(report.stages.iter().all(|s| s.status == StageStatus::Success));
        assert_eq!(
            executor.lines_matching("docker push"),
            vec![
                "docker push registry.example/app:42",
                "docker push registry.example/app:latest",
            ]
        );
        let image = report.image.as_ref().unwrap();
        assert_eq!(image.versioned.to_string(), "registry.example/app:42");
        assert_eq!(image.latest.to_string(), "registry.example/app:latest");

        let push_latest = executor.position("docker push registry.example/app:latest").unwrap();
        let apply = executor.position("kubectl apply").unwrap();
        let restart = executor.position("kubectl rollout restart").unwrap();
        assert!(push_latest < apply && apply < restart);
        assert!(report.rollout.is_some());
    }

    #[tokio::test]
    async fn test_failed_build_pushes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(docker().on("docker build", CommandOutput::failed(1, "pip failed")));
        let ctx = context(executor.clone());

        let report = run(&ctx, &pipeline_config(dir.path(), true)).await;

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(
            statuses(&report),
            vec![
                ("build".to_string(), StageStatus::Failed),
                ("publish".to_string(), StageStatus::Skipped),
                ("deploy".to_string(), StageStatus::Skipped),
            ]
        );
        assert!(executor.position("docker push").is_none());
        assert!(executor.position("docker login").is_none());
        assert!(executor.position("az login").is_none());
        assert!(report.image.is_none());
    }

    #[tokio::test]
    async fn test_failed_image_tests_block_publish() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(docker().on("docker run", CommandOutput::failed(1, "1 failed")));
        let ctx = context(executor.clone());
        let mut config = pipeline_config(dir.path(), true);
        config.build.test_command = Some(vec!["pytest".to_string()]);

        let report = run(&ctx, &config).await;

        assert_eq!(report.stage("build").unwrap().status, StageStatus::Success);
        assert_eq!(report.stage("test").unwrap().status, StageStatus::Failed);
        assert_eq!(report.stage("publish").unwrap().status, StageStatus::Skipped);
        assert!(executor.position("docker push").is_none());
    }

    #[tokio::test]
    async fn test_failed_publish_skips_deploy() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(docker().on("docker push", CommandOutput::failed(1, "denied")));
        let ctx = context(executor.clone());

        let report = run(&ctx, &pipeline_config(dir.path(), true)).await;

        assert_eq!(report.stage("publish").unwrap().status, StageStatus::Failed);
        let deploy = report.stage("deploy").unwrap();
        assert_eq!(deploy.status, StageStatus::Skipped);
        assert!(deploy.message.as_deref().unwrap().starts_with("publish failed"));
        assert!(executor.position("kubectl").is_none());
    }

    #[tokio::test]
    async fn test_deploy_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(docker());
        let ctx = context(executor.clone());

        let report = run(&ctx, &pipeline_config(dir.path(), false)).await;

        assert_eq!(report.status, RunStatus::Success);
        let deploy = report.stage("deploy").unwrap();
        assert_eq!(deploy.status, StageStatus::Skipped);
        assert_eq!(deploy.message.as_deref(), Some("deploy disabled"));
        assert!(executor.position("kubectl").is_none());
    }

    #[tokio::test]
    async fn test_cancelled_run_calls_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(docker());
        let ctx = context(executor.clone());
        ctx.cancel_token.cancel();

        let report = run(&ctx, &pipeline_config(dir.path(), true)).await;
        assert_eq!(report.status, RunStatus::Failed);
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_report_serializes() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(Arc::new(docker()));
        let report = run(&ctx, &pipeline_config(dir.path(), false)).await;

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["build_id"], "42");
        assert_eq!(json["status"], "success");
        assert_eq!(json["stages"][0]["name"], "build");
        assert_eq!(json["image"]["latest"]["tag"], "latest");
        assert!(json.get("rollout").is_none());

        let build = json["stages"][0].as_object().unwrap();
        let mut keys: Vec<_> = build.keys().cloned().collect();
        keys.sort();
        assert_eq!(
            keys,
            ["display_name", "duration_ms", "finished_at", "message", "name", "started_at", "status"]
        );
        assert_eq!(build["display_name"], "Image Build");
        assert!(build["finished_at"].is_string());

        let deploy = &json["stages"][2];
        assert_eq!(deploy["status"], "skipped");
        assert_eq!(deploy["message"], "deploy disabled");
        assert!(deploy["started_at"].is_null());
    }

    #[tokio::test]
    async fn test_exit_codes() {
        let dir = tempfile::tempdir().unwrap();

        let ctx = context(Arc::new(docker()));
        let report = run(&ctx, &pipeline_config(dir.path(), false)).await;
        assert_eq!(report.exit_code(ctx.is_cancelled()), 0);

        let ctx = context(Arc::new(docker().on("docker build", CommandOutput::failed(1, "boom"))));
        let report = run(&ctx, &pipeline_config(dir.path(), false)).await;
        assert_eq!(report.exit_code(ctx.is_cancelled()), 1);

        let ctx = context(Arc::new(docker()));
        ctx.cancel_token.cancel();
        let report = run(&ctx, &pipeline_config(dir.path(), false)).await;
        assert_eq!(report.exit_code(ctx.is_cancelled()), 130);
    }

    #[tokio::test]
    async fn test_summary_file_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(Arc::new(docker().on("docker push", CommandOutput::failed(1, "denied"))));
        let report = run(&ctx, &pipeline_config(dir.path(), true)).await;

        let path = dir.path().join("summary.json");
        report.write_summary(&path).await.unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["run_id"], ctx.run_id.as_str());
        assert_eq!(json["status"], "failed");
        assert_eq!(json["stages"][1]["name"], "publish");
        assert_eq!(json["stages"][1]["status"], "failed");
        assert_eq!(json["stages"][2]["status"], "skipped");
        assert!(json.get("image").is_none());
    }
}
