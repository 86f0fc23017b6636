//! Image test stage
//!
//! Runs the project's test command inside the freshly built image.

use crate::domain::image::BuiltImage;
use crate::error::{ShipError, ShipResult};
use crate::infra::command::CommandSpec;

use super::context::PipelineContext;

/// Run `command` in a throwaway container of `image`; non-zero exit fails
pub async fn verify(ctx: &PipelineContext, image: &BuiltImage, command: &[String]) -> ShipResult<()> {
    if command.is_empty() {
        return Err(ShipError::Config("test command is empty".to_string()));
    }

    ctx.log(&format!("Testing {} with `{}`", image.reference, command.join(" ")));
    let spec = CommandSpec::new("docker")
        .args(["run", "--rm"])
        .arg(image.reference.to_string())
        .args(command.iter().cloned());
    ctx.run(spec).await?;
    ctx.log("✓ Image tests passed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::image::ImageRef;
    use crate::infra::command::CommandOutput;
    use crate::test_utils::{context, ScriptedExecutor};
    use std::sync::Arc;

    fn image() -> BuiltImage {
        BuiltImage {
            reference: ImageRef::parse("registry.example/app:42").unwrap(),
            image_id: "sha256:abc".to_string(),
        }
    }

    #[tokio::test]
    async fn test_runs_command_in_image() {
        let executor = Arc::new(ScriptedExecutor::new());
        let ctx = context(executor.clone());
        let command = vec!["pytest".to_string(), "test/functional".to_string()];

        verify(&ctx, &image(), &command).await.unwrap();
        assert_eq!(
            executor.lines(),
            vec!["docker run --rm registry.example/app:42 pytest test/functional"]
        );
    }

    #[tokio::test]
    async fn test_failing_tests_fail_stage() {
        let executor = Arc::new(
            ScriptedExecutor::new().on("docker run", CommandOutput::failed(1, "1 failed, 3 passed")),
        );
        let ctx = context(executor);
        let err = verify(&ctx, &image(), &["pytest".to_string()]).await.unwrap_err();
        assert!(matches!(err, ShipError::CommandFailed { code: 1, .. }));
    }
}
