//! Dependency lock and requirements export
//!
//! Build-time only: resolves the Pipfile into `Pipfile.lock`, installs the
//! locked set into pipenv's virtualenv, and exports a flat list of exact
//! pins for the image's dependency layer.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::LockConfig;
use crate::domain::requirements::PinnedRequirements;
use crate::error::{ShipError, ShipResult};
use crate::infra::command::CommandSpec;

use super::context::PipelineContext;

/// Result of a successful lock
#[derive(Clone, Debug, Serialize)]
pub struct LockReport {
    /// Requirements file that was written
    pub output: PathBuf,
    /// Number of pinned packages in it
    pub pinned: usize,
}

/// Lock the Pipfile, sync the environment and export exact pins.
///
/// The requirements file is only replaced once every line is an exact pin.
pub async fn lock(ctx: &PipelineContext, config: &LockConfig) -> ShipResult<LockReport> {
    let project = &config.project_dir;
    let pipfile = project.join("Pipfile");
    if !tokio::fs::try_exists(&pipfile).await? {
        return Err(ShipError::MissingSource(pipfile));
    }

    ctx.log("[1/3] Locking dependencies...");
    let mut lock = CommandSpec::new("pipenv").arg("lock").current_dir(project);
    if config.allow_prereleases {
        lock = lock.arg("--pre");
    }
    ctx.run(lock).await?;

    ctx.log("[2/3] Installing locked dependencies...");
    ctx.run(
        CommandSpec::new("pipenv")
            .args(["sync", "--dev"])
            .current_dir(project),
    )
    .await?;

    ctx.log("[3/3] Exporting pinned requirements...");
    let export = ctx
        .run(
            CommandSpec::new("pipenv")
                .arg("requirements")
                .current_dir(project)
                .quiet(),
        )
        .await?;

    // Validate before touching the existing file
    let requirements = PinnedRequirements::parse(&export.stdout)?;

    let output = config.output_path();
    write_atomically(&output, requirements.as_text()).await?;
    ctx.log(&format!(
        "✓ Wrote {} pinned requirements to {}",
        requirements.len(),
        output.display()
    ));

    Ok(LockReport {
        output,
        pinned: requirements.len(),
    })
}

/// Replace `path` in one rename, keeping the mode of the file it replaces.
///
/// A file that did not exist yet gets 0644 rather than the temp file's 0600.
async fn write_atomically(path: &Path, contents: &str) -> ShipResult<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let tmp = tempfile::NamedTempFile::new_in(dir)?;
    tokio::fs::write(tmp.path(), contents).await?;

    let permissions = match tokio::fs::metadata(path).await {
        Ok(existing) => existing.permissions(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => fresh_permissions(tmp.as_file())?,
        Err(e) => return Err(e.into()),
    };
    tmp.as_file().set_permissions(permissions)?;

    tmp.persist(path).map_err(|e| ShipError::Io(e.error))?;
    info!(path = %path.display(), "requirements written");
    Ok(())
}

#[cfg(unix)]
fn fresh_permissions(_file: &std::fs::File) -> std::io::Result<std::fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Ok(std::fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn fresh_permissions(file: &std::fs::File) -> std::io::Result<std::fs::Permissions> {
    Ok(file.metadata()?.permissions())
}
