//! Two-stage Dockerfile
//!
//! The builder stage installs dependencies into the user site
//! (`/root/.local`); the runtime stage copies only that directory and the
//! application, so it never needs a compiler toolchain.

use std::path::Path;
use tracing::info;

use crate::config::DockerfileConfig;
use crate::error::{ShipError, ShipResult};

/// Render the Dockerfile. `BASE_IMAGE` stays overridable with `--build-arg`.
pub fn render(config: &DockerfileConfig) -> String {
    let package_dir = config
        .app_module
        .split('.')
        .next()
        .unwrap_or(&config.app_module);

    format!(
        r#"# syntax=docker/dockerfile:1
ARG BASE_IMAGE={base}

FROM ${{BASE_IMAGE}} AS builder
WORKDIR /app
COPY {requirements} .
RUN pip install --user --no-cache-dir -r {requirements}
COPY {package} ./{package}

FROM ${{BASE_IMAGE}}
WORKDIR /app
ENV PYTHONDONTWRITEBYTECODE=1 \
    PYTHONUNBUFFERED=1 \
    PATH=/root/.local/bin:$PATH
COPY --from=builder /root/.local /root/.local
COPY --from=builder /app/{package} ./{package}
EXPOSE {port}
CMD ["uvicorn", "{module}:app", "--host", "0.0.0.0", "--port", "{port}"]
"#,
        base = config.base_image,
        requirements = config.requirements_file,
        package = package_dir,
        module = config.app_module,
        port = config.port,
    )
}

/// Write the rendered Dockerfile, refusing to clobber an existing one unless `force`
pub async fn write(path: &Path, config: &DockerfileConfig, force: bool) -> ShipResult<()> {
    if !force && tokio::fs::try_exists(path).await? {
        return Err(ShipError::Config(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    tokio::fs::write(path, render(config)).await?;
    info!(path = %path.display(), "Dockerfile written");
    Ok(())
}
