use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use clap::{Parser, ValueEnum};
use futures::StreamExt;
use lifecycle_core::{load_config, ActionOutcome, LifecycleController, Services};
use shared::{domain::AssetId, protocol::InstallPathSelection};
use status_registry::StatusRegistry;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod sim;

use sim::{FlagPrompter, SimInstaller, SimLauncher, SimSaveSync, SimSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Command {
    Status,
    Install,
    InstallTo,
    Import,
    Cancel,
    Uninstall,
    Play,
    Stop,
    Update,
    Repair,
    Move,
}

/// Drives one asset's lifecycle against simulated subsystems and prints every status change.
#[derive(Parser, Debug)]
struct Args {
    asset: String,
    #[arg(value_enum)]
    command: Command,
    /// TOML config; `lifecycle.toml` in the working directory is used when present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Accept every confirmation prompt.
    #[arg(long)]
    yes: bool,
    /// Answer for directory pickers.
    #[arg(long)]
    dir: Option<PathBuf>,
    #[arg(long, default_value = "./library")]
    library: PathBuf,
    /// Start with the asset already installed under the library.
    #[arg(long)]
    installed: bool,
    /// The first launch reports an outdated version.
    #[arg(long)]
    outdated: bool,
    #[arg(long)]
    auto_sync: bool,
    #[arg(long, default_value_t = 5_000)]
    job_ms: u64,
    #[arg(long, default_value_t = 3_000)]
    run_ms: u64,
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = load_config(args.config.as_deref())?;
    let asset_id = AssetId::new(args.asset.clone());
    let registry = StatusRegistry::new();

    let installed_at = args
        .installed
        .then(|| args.library.join(asset_id.as_str()));
    let services = Services::new_with_dependencies(
        Arc::new(SimInstaller::new(
            installed_at,
            Duration::from_millis(args.job_ms),
        )),
        Arc::new(SimLauncher::new(
            Duration::from_millis(args.run_ms),
            args.outdated,
            config.version_mismatch_sentinel.clone(),
        )),
        Arc::new(SimSaveSync),
        Arc::new(FlagPrompter {
            accept: args.yes,
            directory: args.dir.clone(),
        }),
        Arc::new(SimSettings {
            library: args.library.clone(),
            auto_sync_saves: args.auto_sync,
        }),
    );

    let mut updates = Box::pin(registry.watch(asset_id.clone()));
    let printer = tokio::spawn(async move {
        while let Some(event) = updates.next().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(err) => warn!(%err, "failed to encode status event"),
            }
        }
    });

    let controller =
        LifecycleController::activate(asset_id.clone(), &registry, services, config).await?;
    let interrupt_after = controller.config().poll_interval * 2;

    let outcome = match args.command {
        Command::Status => ActionOutcome::Settled,
        Command::Install => controller.install(InstallPathSelection::Default).await,
        Command::InstallTo => controller.install(InstallPathSelection::ExplicitPath).await,
        Command::Import => controller.install(InstallPathSelection::ImportExisting).await,
        Command::Cancel => {
            let (_, cancelled) = tokio::join!(
                controller.install(InstallPathSelection::Default),
                async {
                    tokio::time::sleep(interrupt_after).await;
                    controller.cancel_install().await
                }
            );
            cancelled
        }
        Command::Uninstall => controller.uninstall().await,
        Command::Play => controller.play().await,
        Command::Stop => {
            let (_, stopped) = tokio::join!(controller.play(), async {
                tokio::time::sleep(interrupt_after).await;
                controller.stop().await
            });
            stopped
        }
        Command::Update => controller.update().await,
        Command::Repair => controller.repair().await,
        Command::Move => controller.move_install().await,
    };

    if outcome.is_settled() {
        info!(asset = %asset_id, command = ?args.command, "lifecycle_cli: finished");
    } else {
        warn!(asset = %asset_id, command = ?args.command, ?outcome, "lifecycle_cli: request did not run");
    }
    let status = controller.status();
    if status.is_transient() {
        warn!(asset = %asset_id, %status, "lifecycle_cli: exiting while the asset is still busy");
    }
    println!("{}", serde_json::to_string_pretty(&controller.snapshot())?);

    controller.deactivate().await;
    // Last sender gone: the printer drains what is buffered and ends.
    drop(registry);
    printer.await?;
    Ok(())
}
