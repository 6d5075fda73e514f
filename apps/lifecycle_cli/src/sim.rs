//! Stand-in subsystems so the controller can be driven end to end from a terminal.

use std::{
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use lifecycle_core::{Installer, Launcher, Prompter, SaveSync, SettingsSource};
use shared::{
    domain::{AssetDescriptor, AssetId, AssetSettings},
    protocol::{
        CancelHints, ConfirmRequest, DirectoryRequest, LaunchOptions, LaunchOutcome,
        ProgressSnapshot, SettingsScope,
    },
};
use tokio::{sync::Notify, time::Instant};
use tracing::info;

const STEP: Duration = Duration::from_millis(100);
const DOWNLOAD_BYTES: u64 = 4 * 1024 * 1024 * 1024;

struct Job {
    started: Instant,
    duration: Duration,
}

impl Job {
    fn fraction(&self) -> f64 {
        self.started.elapsed().as_secs_f64() / self.duration.as_secs_f64()
    }
}

#[derive(Default)]
struct SimState {
    install_path: Option<PathBuf>,
    version: u32,
    job: Option<Job>,
    aborted: bool,
}

pub struct SimInstaller {
    state: Mutex<SimState>,
    job_duration: Duration,
}

impl SimInstaller {
    pub fn new(install_path: Option<PathBuf>, job_duration: Duration) -> Self {
        Self {
            state: Mutex::new(SimState {
                install_path,
                version: 1,
                ..SimState::default()
            }),
            job_duration,
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs a timed job. Fails if the job is aborted before it completes.
    async fn run_job(&self, asset_id: &AssetId, kind: &str) -> Result<()> {
        {
            let mut state = self.state();
            state.aborted = false;
            state.job = Some(Job {
                started: Instant::now(),
                duration: self.job_duration,
            });
        }
        info!(asset = %asset_id, kind, "sim: job started");

        let deadline = Instant::now() + self.job_duration;
        while Instant::now() < deadline {
            tokio::time::sleep(STEP).await;
            if self.state().aborted {
                self.state().job = None;
                return Err(anyhow!("{kind} aborted"));
            }
        }
        self.state().job = None;
        Ok(())
    }
}

#[async_trait]
impl Installer for SimInstaller {
    async fn fetch_descriptor(&self, asset_id: &AssetId) -> Result<AssetDescriptor> {
        let state = self.state();
        Ok(AssetDescriptor {
            title: format!("Simulated {asset_id}"),
            developer: "Sim Studio".into(),
            version: Some(format!("1.{}", state.version)),
            short_description: Some("A placeholder asset driven by the lifecycle CLI.".into()),
            install_size_bytes: Some(DOWNLOAD_BYTES * 2),
            download_size_bytes: Some(DOWNLOAD_BYTES),
            is_installed: state.install_path.is_some(),
            install_path: state.install_path.clone(),
            cloud_save_enabled: true,
            save_folder: Some("{InstallDir}/Saved".into()),
            folder_name: Some(format!(".{asset_id}.partial")),
        })
    }

    async fn install(&self, asset_id: &AssetId, path: Option<&Path>) -> Result<()> {
        self.run_job(asset_id, "install").await?;
        let root = path.ok_or_else(|| anyhow!("no install location for asset {asset_id}"))?;
        self.state().install_path = Some(root.join(asset_id.as_str()));
        Ok(())
    }

    async fn import_existing(&self, _asset_id: &AssetId, path: &Path) -> Result<()> {
        self.state().install_path = Some(path.to_path_buf());
        Ok(())
    }

    async fn cancel_install(&self, asset_id: &AssetId, hints: CancelHints) -> Result<()> {
        info!(asset = %asset_id, ?hints, "sim: removing partial install");
        self.state().aborted = true;
        Ok(())
    }

    async fn uninstall(&self, _asset_id: &AssetId) -> Result<()> {
        self.state().install_path = None;
        Ok(())
    }

    async fn update(&self, asset_id: &AssetId) -> Result<()> {
        self.run_job(asset_id, "update").await?;
        self.state().version += 1;
        Ok(())
    }

    async fn repair(&self, asset_id: &AssetId) -> Result<()> {
        self.run_job(asset_id, "repair").await
    }

    async fn move_install(&self, asset_id: &AssetId, destination: &Path) -> Result<()> {
        self.run_job(asset_id, "move").await?;
        self.state().install_path = Some(destination.to_path_buf());
        Ok(())
    }

    async fn fetch_progress(&self, _asset_id: &AssetId) -> Result<Option<ProgressSnapshot>> {
        let state = self.state();
        Ok(state.job.as_ref().map(|job| {
            let fraction = job.fraction().min(1.0);
            ProgressSnapshot {
                percent: Some(fraction),
                transferred_bytes: (DOWNLOAD_BYTES as f64 * fraction) as u64,
                total_bytes: DOWNLOAD_BYTES,
                eta: job.duration.checked_sub(job.started.elapsed()),
            }
        }))
    }
}

/// A process that runs for a fixed time, or until stopped.
pub struct SimLauncher {
    run_time: Duration,
    outdated: Mutex<bool>,
    sentinel: String,
    stopped: Notify,
}

impl SimLauncher {
    pub fn new(run_time: Duration, outdated: bool, sentinel: String) -> Self {
        Self {
            run_time,
            outdated: Mutex::new(outdated),
            sentinel,
            stopped: Notify::new(),
        }
    }
}

#[async_trait]
impl Launcher for SimLauncher {
    async fn launch(&self, asset_id: &AssetId, options: LaunchOptions) -> Result<LaunchOutcome> {
        let outdated = {
            let mut outdated = self
                .outdated
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::take(&mut *outdated)
        };
        if outdated && !options.skip_version_check {
            return Ok(LaunchOutcome::Failed(format!(
                "{}: installed build is older than the server",
                self.sentinel
            )));
        }

        info!(asset = %asset_id, ?options, "sim: process running");
        tokio::select! {
            _ = tokio::time::sleep(self.run_time) => {}
            _ = self.stopped.notified() => info!(asset = %asset_id, "sim: process killed"),
        }
        Ok(LaunchOutcome::Exited)
    }

    async fn stop(&self, _asset_id: &AssetId) -> Result<()> {
        self.stopped.notify_one();
        Ok(())
    }
}

pub struct SimSaveSync;

#[async_trait]
impl SaveSync for SimSaveSync {
    async fn sync_saves(&self, save_path: &str, asset_id: &AssetId) -> Result<()> {
        tokio::time::sleep(STEP * 3).await;
        info!(asset = %asset_id, path = save_path, "sim: saves synced");
        Ok(())
    }
}

/// Answers prompts from command-line flags instead of asking.
pub struct FlagPrompter {
    pub accept: bool,
    pub directory: Option<PathBuf>,
}

#[async_trait]
impl Prompter for FlagPrompter {
    async fn confirm(&self, request: ConfirmRequest) -> bool {
        info!(
            title = request.title_key(),
            message = request.message_key(),
            warning = request.is_warning(),
            answer = self.accept,
            "sim: confirm"
        );
        self.accept
    }

    async fn select_directory(&self, request: DirectoryRequest) -> Option<PathBuf> {
        info!(title = request.title_key(), directory = ?self.directory, "sim: select directory");
        self.directory.clone()
    }
}

pub struct SimSettings {
    pub library: PathBuf,
    pub auto_sync_saves: bool,
}

#[async_trait]
impl SettingsSource for SimSettings {
    async fn fetch_settings(&self, scope: &SettingsScope) -> Result<AssetSettings> {
        Ok(match scope {
            SettingsScope::Default => AssetSettings {
                default_install_path: Some(self.library.clone()),
                ..AssetSettings::default()
            },
            SettingsScope::Asset(_) => AssetSettings {
                auto_sync_saves: self.auto_sync_saves,
                ..AssetSettings::default()
            },
        })
    }
}
