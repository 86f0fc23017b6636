//! Registry publish
//!
//! Pushes the build-id tag, then moves `latest` to the same image. Runs only
//! when the build stage succeeded.

use serde::Serialize;

use crate::config::RegistryConfig;
use crate::domain::image::{BuiltImage, PublishedImage};
use crate::domain::stage::StageOutcome;
use crate::error::ShipResult;
use crate::infra::command::CommandSpec;

use super::context::PipelineContext;

/// Publish result
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PublishOutcome {
    Published(PublishedImage),
    /// The build did not succeed; no registry call was made
    Skipped { reason: String },
}

impl PublishOutcome {
    /// Skipped publishes skip the stage rather than fail it
    pub fn into_stage(self) -> StageOutcome<PublishedImage> {
        match self {
            PublishOutcome::Published(image) => StageOutcome::Succeeded(image),
            PublishOutcome::Skipped { reason } => StageOutcome::Skipped(reason),
        }
    }
}

/// Publish the output of the build stage
pub async fn publish(
    ctx: &PipelineContext,
    build: &StageOutcome<BuiltImage>,
    registry: &RegistryConfig,
) -> ShipResult<PublishOutcome> {
    let image = match build {
        StageOutcome::Succeeded(image) => image,
        other => {
            let reason = other.gate_reason("build").unwrap_or_default();
            ctx.warn(&format!("Publish skipped: {}", reason));
            return Ok(PublishOutcome::Skipped { reason });
        }
    };

    let versioned = image.reference.clone();
    let latest = versioned.latest();

    if let Some(ref creds) = registry.credentials {
        ctx.log(&format!("Logging in to {} as {}", registry.registry, creds.username));
        let login = CommandSpec::new("docker")
            .args(["login", &registry.registry, "--username", &creds.username, "--password-stdin"])
            .stdin_secret(&creds.password);
        ctx.run(login).await?;
    }

    ctx.log(&format!("Pushing {}", versioned));
    ctx.run(CommandSpec::new("docker").arg("push").arg(versioned.to_string()))
        .await?;
    ctx.log(&format!("✓ Pushed: {}", versioned));

    // latest is derived from the versioned tag, never built separately
    ctx.run(
        CommandSpec::new("docker")
            .arg("tag")
            .arg(versioned.to_string())
            .arg(latest.to_string()),
    )
    .await?;
    ctx.log(&format!("Pushing {}", latest));
    ctx.run(CommandSpec::new("docker").arg("push").arg(latest.to_string()))
        .await?;
    ctx.log(&format!("✓ Pushed: {}", latest));

    Ok(PublishOutcome::Published(PublishedImage {
        versioned,
        latest,
        image_id: image.image_id.clone(),
    }))
}
