//! Collaborator seams. The controller only ever talks to these traits.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{AssetDescriptor, AssetId, AssetSettings},
    protocol::{
        CancelHints, ConfirmRequest, DirectoryRequest, LaunchOptions, LaunchOutcome,
        ProgressSnapshot, SettingsScope,
    },
};

#[async_trait]
pub trait Installer: Send + Sync {
    async fn fetch_descriptor(&self, asset_id: &AssetId) -> Result<AssetDescriptor>;
    /// `None` installs into the installer's own default location.
    async fn install(&self, asset_id: &AssetId, path: Option<&Path>) -> Result<()>;
    async fn import_existing(&self, asset_id: &AssetId, path: &Path) -> Result<()>;
    async fn cancel_install(&self, asset_id: &AssetId, hints: CancelHints) -> Result<()>;
    async fn uninstall(&self, asset_id: &AssetId) -> Result<()>;
    async fn update(&self, asset_id: &AssetId) -> Result<()>;
    async fn repair(&self, asset_id: &AssetId) -> Result<()>;
    async fn move_install(&self, asset_id: &AssetId, destination: &Path) -> Result<()>;
    async fn fetch_progress(&self, asset_id: &AssetId) -> Result<Option<ProgressSnapshot>>;
}

#[async_trait]
pub trait Launcher: Send + Sync {
    /// Resolves when the run ends.
    async fn launch(&self, asset_id: &AssetId, options: LaunchOptions) -> Result<LaunchOutcome>;
    async fn stop(&self, asset_id: &AssetId) -> Result<()>;
}

#[async_trait]
pub trait SaveSync: Send + Sync {
    async fn sync_saves(&self, save_path: &str, asset_id: &AssetId) -> Result<()>;
}

#[async_trait]
pub trait Prompter: Send + Sync {
    async fn confirm(&self, request: ConfirmRequest) -> bool;
    async fn select_directory(&self, request: DirectoryRequest) -> Option<PathBuf>;
}

#[async_trait]
pub trait SettingsSource: Send + Sync {
    async fn fetch_settings(&self, scope: &SettingsScope) -> Result<AssetSettings>;
}

pub struct MissingLauncher;

#[async_trait]
impl Launcher for MissingLauncher {
    async fn launch(&self, asset_id: &AssetId, _options: LaunchOptions) -> Result<LaunchOutcome> {
        Err(anyhow!("launcher unavailable for asset {asset_id}"))
    }

    async fn stop(&self, asset_id: &AssetId) -> Result<()> {
        Err(anyhow!("launcher unavailable for asset {asset_id}"))
    }
}

pub struct MissingSaveSync;

#[async_trait]
impl SaveSync for MissingSaveSync {
    async fn sync_saves(&self, _save_path: &str, asset_id: &AssetId) -> Result<()> {
        Err(anyhow!("save sync backend unavailable for asset {asset_id}"))
    }
}

/// Declines every prompt, which keeps every prompted action a no-op.
pub struct MissingPrompter;

#[async_trait]
impl Prompter for MissingPrompter {
    async fn confirm(&self, _request: ConfirmRequest) -> bool {
        false
    }

    async fn select_directory(&self, _request: DirectoryRequest) -> Option<PathBuf> {
        None
    }
}

pub struct MissingSettings;

#[async_trait]
impl SettingsSource for MissingSettings {
    async fn fetch_settings(&self, scope: &SettingsScope) -> Result<AssetSettings> {
        Err(anyhow!("settings store unavailable for {scope:?}"))
    }
}

#[derive(Clone)]
pub struct Services {
    pub installer: Arc<dyn Installer>,
    pub launcher: Arc<dyn Launcher>,
    pub save_sync: Arc<dyn SaveSync>,
    pub prompter: Arc<dyn Prompter>,
    pub settings: Arc<dyn SettingsSource>,
}

impl Services {
    pub fn new(installer: Arc<dyn Installer>) -> Self {
        Self::new_with_dependencies(
            installer,
            Arc::new(MissingLauncher),
            Arc::new(MissingSaveSync),
            Arc::new(MissingPrompter),
            Arc::new(MissingSettings),
        )
    }

    pub fn new_with_dependencies(
        installer: Arc<dyn Installer>,
        launcher: Arc<dyn Launcher>,
        save_sync: Arc<dyn SaveSync>,
        prompter: Arc<dyn Prompter>,
        settings: Arc<dyn SettingsSource>,
    ) -> Self {
        Self {
            installer,
            launcher,
            save_sync,
            prompter,
            settings,
        }
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn Launcher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn with_save_sync(mut self, save_sync: Arc<dyn SaveSync>) -> Self {
        self.save_sync = save_sync;
        self
    }

    pub fn with_prompter(mut self, prompter: Arc<dyn Prompter>) -> Self {
        self.prompter = prompter;
        self
    }

    pub fn with_settings(mut self, settings: Arc<dyn SettingsSource>) -> Self {
        self.settings = settings;
        self
    }
}
