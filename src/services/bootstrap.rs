//! Repository bootstrap
//!
//! One-time project setup: create the GitHub repository, then init, commit
//! and push the local tree. Not idempotent; a directory that already has a
//! `.git` is refused before any remote call.

use crate::config::{BootstrapConfig, RemoteProtocol};
use crate::error::{ShipError, ShipResult};
use crate::infra::command::CommandSpec;
use crate::infra::github::{CreatedRepository, RepoDescriptor, RepositoryHost};

use super::context::PipelineContext;

/// Create the hosted repository from the descriptor, then initialise the
/// project as a git repo and push it to the new remote.
///
/// Refuses a directory that already has `.git` before calling the host.
pub async fn bootstrap(
    ctx: &PipelineContext,
    config: &BootstrapConfig,
    host: &dyn RepositoryHost,
) -> ShipResult<CreatedRepository> {
    let project = &config.project_dir;
    if tokio::fs::try_exists(project.join(".git")).await? {
        return Err(ShipError::AlreadyInitialized(project.clone()));
    }

    let descriptor = RepoDescriptor::load(&config.descriptor).await?;
    ctx.log(&format!("[1/3] Creating repository {}...", descriptor.name));
    let repo = host.create_repository(&descriptor).await?;
    let remote = match config.remote_protocol {
        RemoteProtocol::Https => repo.clone_url.clone(),
        RemoteProtocol::Ssh => repo.ssh_url.clone(),
    };

    ctx.log("[2/3] Initializing local repository...");
    let git = |args: &[&str]| {
        CommandSpec::new("git")
            .args(args.iter().copied())
            .current_dir(project)
    };
    ctx.run(git(&["init"])).await?;
    ctx.run(git(&["add", "."])).await?;
    ctx.run(git(&["commit", "-m", &config.commit_message])).await?;
    ctx.run(git(&["branch", "-M", &config.branch])).await?;
    ctx.run(git(&["remote", "add", "origin", &remote])).await?;

    ctx.log(&format!("[3/3] Pushing {} to {}...", config.branch, remote));
    ctx.run(git(&["push", "-u", "origin", &config.branch])).await?;

    ctx.log(&format!("✓ {} is live at {}", repo.full_name, repo.html_url));
    Ok(repo)
}
