//! Image build
//!
//! `docker build` of the two-stage Dockerfile, tagged with the build id.

use std::path::Path;

use crate::config::{BuildConfig, RegistryConfig};
use crate::domain::image::{BuiltImage, ImageRef};
use crate::error::{ShipError, ShipResult};
use crate::infra::command::CommandSpec;

use super::context::PipelineContext;

/// Build `<repository>:<build-id>` and return its digest
pub async fn build(
    ctx: &PipelineContext,
    config: &BuildConfig,
    registry: &RegistryConfig,
) -> ShipResult<BuiltImage> {
    let image = registry.image_for(&config.build_id)?;

    ctx.log(&format!("Build context: {}", config.context_dir.display()));
    ctx.log(&format!("Dockerfile: {}", config.dockerfile.display()));
    ctx.log(&format!("Base image: {}", config.base_image));
    ctx.log(&format!("Target image: {}", image));

    // Missing sources abort before docker is involved
    ensure_exists(&config.context_dir).await?;
    ensure_exists(&config.dockerfile).await?;

    let spec = CommandSpec::new("docker")
        .args(["build", "--progress=plain", "--build-arg"])
        .arg(format!("BASE_IMAGE={}", config.base_image))
        .arg("-t")
        .arg(image.to_string())
        .arg("-f")
        .arg(config.dockerfile.to_string_lossy())
        .arg(config.context_dir.to_string_lossy());
    ctx.run(spec).await?;

    let built = inspect(ctx, &image).await?;
    ctx.log(&format!("✓ Image built: {} ({})", built.reference, built.image_id));
    Ok(built)
}

/// Look up the digest of a local image
pub async fn inspect(ctx: &PipelineContext, image: &ImageRef) -> ShipResult<BuiltImage> {
    let spec = CommandSpec::new("docker")
        .args(["image", "inspect", "--format", "{{.Id}}"])
        .arg(image.to_string())
        .quiet();
    let output = ctx.run(spec).await?;

    let image_id = output.stdout.trim().to_string();
    if image_id.is_empty() {
        return Err(ShipError::CommandFailed {
            command: format!("docker image inspect {}", image),
            code: 0,
            stderr: "no image id reported".to_string(),
        });
    }

    Ok(BuiltImage {
        reference: image.clone(),
        image_id,
    })
}

async fn ensure_exists(path: &Path) -> ShipResult<()> {
    if tokio::fs::try_exists(path).await? {
        Ok(())
    } else {
        Err(ShipError::MissingSource(path.to_path_buf()))
    }
}
