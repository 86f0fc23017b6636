//! aks-shipper - build, publish and deploy to AKS
//!
//! Usage:
//! - Full pipeline: `aks-shipper run --summary summary.json`
//! - Single stages: `aks-shipper build|publish|deploy`
//! - Teardown: `aks-shipper decommission --wait`
//! - Project setup: `aks-shipper bootstrap`, `aks-shipper lock`
//!
//! Every parameter except the flags below comes from the environment.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aks_shipper::config::env::constants;
use aks_shipper::config::{
    BootstrapConfig, BuildConfig, CommandConfig, DecommissionConfig, DeployConfig, DockerfileConfig,
    LockConfig, RegistryConfig,
};
use aks_shipper::domain::{BuildId, StageOutcome};
use aks_shipper::infra::{log_file, CommandRunner, GithubClient};
use aks_shipper::services::{
    bootstrap, builder, decommissioner, deployer, dockerfile, locker, pipeline, publisher,
    PipelineConfig, PipelineContext, PublishOutcome,
};
use aks_shipper::ShipError;

#[derive(Parser)]
#[command(name = "aks-shipper", version = constants::VERSION, about = "Build, publish and deploy a containerized service to AKS")]
struct Cli {
    /// Also write every log line as JSON to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build, test, publish and deploy in one run
    Run {
        /// Overrides BUILD_ID
        #[arg(long)]
        build_id: Option<String>,
        /// Stop after publishing
        #[arg(long)]
        skip_deploy: bool,
        /// Write the stage summary as JSON
        #[arg(long)]
        summary: Option<PathBuf>,
    },
    /// Build the image tagged with the build id
    Build {
        #[arg(long)]
        build_id: Option<String>,
    },
    /// Push an already built image and move `latest`
    Publish {
        #[arg(long)]
        build_id: Option<String>,
    },
    /// Apply the manifest and restart the deployment
    Deploy,
    /// Delete the cluster and its service principal
    Decommission {
        /// Do not check that the cluster exists first
        #[arg(long)]
        skip_verify: bool,
        /// Block until the cluster is gone
        #[arg(long)]
        wait: bool,
    },
    /// Lock dependencies and export pinned requirements
    Lock {
        /// Allow pre-release versions
        #[arg(long)]
        pre: bool,
    },
    /// Create the hosted repository and push the project
    Bootstrap,
    /// Render the two-stage Dockerfile
    Dockerfile {
        #[arg(long, default_value = "Dockerfile")]
        output: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to create runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run_cli(cli)) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            let code = err
                .downcast_ref::<ShipError>()
                .map(ShipError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code as u8)
        }
    }
}

async fn run_cli(cli: Cli) -> anyhow::Result<ExitCode> {
    let cancel = CancellationToken::new();
    spawn_ctrl_c_handler(cancel.clone());

    let command_config = CommandConfig::from_env()?;
    let mut runner = CommandRunner::new(command_config.timeout, cancel.clone());

    let (log_tx, writer) = match cli.log_file {
        Some(path) => {
            let (tx, rx) = broadcast::channel(constants::LOG_CHANNEL_CAPACITY);
            let file = tokio::fs::File::create(&path)
                .await
                .with_context(|| format!("failed to create log file {}", path.display()))?;
            runner = runner.with_log_channel(tx.clone());
            (Some(tx), Some(tokio::spawn(log_file::write_json_lines(file, rx))))
        }
        None => (None, None),
    };

    let mut ctx = PipelineContext::new(Arc::new(runner), cancel);
    if let Some(ref tx) = log_tx {
        ctx = ctx.with_log_channel(tx.clone());
    }
    info!(run_id = %ctx.run_id, version = constants::VERSION, "aks-shipper starting");

    let result = execute(cli.command, ctx).await;

    // Every sender must be gone before the writer sees the channel close
    drop(log_tx);
    if let Some(writer) = writer {
        if let Err(e) = writer.await? {
            warn!(error = %e, "Log file writer failed");
        }
    }

    result
}

async fn execute(command: Command, ctx: PipelineContext) -> anyhow::Result<ExitCode> {
    match command {
        Command::Run {
            build_id,
            skip_deploy,
            summary,
        } => {
            let mut build = BuildConfig::from_env()?;
            override_build_id(&mut build, build_id)?;
            let config = PipelineConfig {
                build,
                registry: RegistryConfig::from_env()?,
                deploy: if skip_deploy {
                    None
                } else {
                    Some(DeployConfig::from_env()?)
                },
            };

            let report = pipeline::run(&ctx, &config).await;
            if let Some(path) = summary {
                report
                    .write_summary(&path)
                    .await
                    .with_context(|| format!("failed to write summary {}", path.display()))?;
            }

            if let Some(image) = &report.image {
                println!("{}", image.versioned);
            }
            Ok(ExitCode::from(report.exit_code(ctx.is_cancelled()) as u8))
        }
        Command::Build { build_id } => {
            let mut build = BuildConfig::from_env()?;
            override_build_id(&mut build, build_id)?;
            let image = builder::build(&ctx, &build, &RegistryConfig::from_env()?).await?;
            println!("{}", image.reference);
            Ok(ExitCode::SUCCESS)
        }
        Command::Publish { build_id } => {
            let mut build = BuildConfig::from_env()?;
            override_build_id(&mut build, build_id)?;
            let registry = RegistryConfig::from_env()?;
            let image = builder::inspect(&ctx, &registry.image_for(&build.build_id)?).await?;

            match publisher::publish(&ctx, &StageOutcome::Succeeded(image), &registry).await? {
                PublishOutcome::Published(published) => {
                    println!("{}", published.versioned);
                    println!("{}", published.latest);
                    Ok(ExitCode::SUCCESS)
                }
                PublishOutcome::Skipped { reason } => {
                    warn!(reason = %reason, "Nothing published");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::Deploy => {
            let report = deployer::deploy(&ctx, &DeployConfig::from_env()?).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Decommission { skip_verify, wait } => {
            let mut config = DecommissionConfig::from_env()?;
            if skip_verify {
                config.verify_cluster = false;
            }
            let job = decommissioner::decommission(&ctx, &config).await?;
            if wait {
                job.wait(&ctx, config.poll_interval, config.wait_timeout).await?;
            }
            println!("{}", serde_json::to_string_pretty(&job)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Lock { pre } => {
            let mut config = LockConfig::from_env()?;
            config.allow_prereleases |= pre;
            let report = locker::lock(&ctx, &config).await?;
            println!("{}", report.output.display());
            Ok(ExitCode::SUCCESS)
        }
        Command::Bootstrap => {
            let config = BootstrapConfig::from_env()?;
            let host = GithubClient::new(&config.api_base, &config.github_user, config.github_token.clone())?;
            let repo = bootstrap::bootstrap(&ctx, &config, &host).await?;
            println!("{}", repo.html_url);
            Ok(ExitCode::SUCCESS)
        }
        Command::Dockerfile { output, force } => {
            dockerfile::write(&output, &DockerfileConfig::from_env()?, force).await?;
            info!(path = %output.display(), "Dockerfile written");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn override_build_id(build: &mut BuildConfig, build_id: Option<String>) -> anyhow::Result<()> {
    if let Some(id) = build_id {
        build.build_id = BuildId::new(id)?;
    }
    Ok(())
}

fn spawn_ctrl_c_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!(error = %e, "Failed to listen for Ctrl-C");
                    return;
                }
                warn!("Interrupted, cancelling the running command");
                cancel.cancel();
            }
            _ = cancel.cancelled() => {}
        }
    });
}
