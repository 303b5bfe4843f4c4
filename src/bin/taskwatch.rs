//! CLI binary for taskwatch.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use taskwatch::channels::DeliveryGateway;
use taskwatch::{Runtime, TaskwatchConfig, TriggerKind};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Taskwatch: scheduled task delivery with yes/no acknowledgment.
#[derive(Parser)]
#[command(name = "taskwatch", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Run the scheduler and the inbound reply loop until interrupted.
    Run,

    /// Run a single trigger now and exit.
    Once {
        /// dispatch, expiry, follow-up, status-report, archive or reset.
        trigger: TriggerKind,
    },

    /// Print the current status report without sending it.
    Status,

    /// Write a default configuration file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let path = cli
        .config
        .clone()
        .unwrap_or_else(TaskwatchConfig::default_config_path);

    if let Some(Command::InitConfig { force }) = cli.command {
        return init_config(&path, force);
    }

    let mut config = TaskwatchConfig::load_or_default(&path)
        .with_context(|| format!("loading config from {}", path.display()))?;
    config.apply_env_overrides();
    config.validate()?;
    taskwatch::logging::init_logging(&config.logging);

    let runtime = Runtime::from_config(config)?;
    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(runtime).await,
        Command::Once { trigger } => run_once(runtime, trigger).await,
        Command::Status => {
            let report = runtime.engine.status_report_at(chrono::Local::now()).await?;
            println!("{}", report.render());
            Ok(())
        }
        Command::InitConfig { .. } => Ok(()),
    }
}

fn init_config(path: &std::path::Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    TaskwatchConfig::default().save_to_file(path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

async fn run(runtime: Runtime) -> anyhow::Result<()> {
    println!("Taskwatch v{}", env!("CARGO_PKG_VERSION"));

    if !runtime.gateway.health_check().await {
        warn!("telegram gateway health check failed; continuing");
    }
    runtime.restore_pending();

    let cancel = CancellationToken::new();
    let scheduler = runtime.scheduler().run(cancel.child_token());

    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            ctrl_c_cancel.cancel();
        }
    });

    info!(gateway = runtime.gateway.id(), "taskwatch running");
    let inbound = runtime.run_inbound(cancel.clone()).await;
    cancel.cancel();
    scheduler.join().await;
    inbound?;
    Ok(())
}

async fn run_once(runtime: Runtime, trigger: TriggerKind) -> anyhow::Result<()> {
    runtime.restore_pending();
    let record = runtime.scheduler().run_once(trigger).await;
    println!("{}: {}", record.trigger, record.summary);
    if record.outcome == taskwatch::scheduler::TriggerOutcome::Error {
        anyhow::bail!("trigger {trigger} failed");
    }
    Ok(())
}
