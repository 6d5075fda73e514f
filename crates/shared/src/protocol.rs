use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::domain::AssetId;

/// Installer progress for one asset. Meaningful only while the asset is in a polling status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Fraction complete in `[0, 1]`, if the installer knows it.
    pub percent: Option<f64>,
    pub transferred_bytes: u64,
    pub total_bytes: u64,
    pub eta: Option<Duration>,
}

impl ProgressSnapshot {
    /// Value pushed into the status registry, clamped into `[0, 1]`.
    pub fn percent_complete(&self) -> Option<f64> {
        self.percent
            .filter(|value| value.is_finite())
            .map(|value| value.clamp(0.0, 1.0))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallPathSelection {
    #[default]
    Default,
    ExplicitPath,
    ImportExisting,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "asset_id", rename_all = "snake_case")]
pub enum SettingsScope {
    Default,
    Asset(AssetId),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchOptions {
    pub skip_version_check: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message", rename_all = "snake_case")]
pub enum LaunchOutcome {
    Exited,
    Failed(String),
}

impl LaunchOutcome {
    pub fn failure_message(&self) -> Option<&str> {
        match self {
            LaunchOutcome::Exited => None,
            LaunchOutcome::Failed(message) if message.is_empty() => None,
            LaunchOutcome::Failed(message) => Some(message),
        }
    }
}

/// Locations the installer should clean up when an install is aborted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelHints {
    pub install_path: Option<PathBuf>,
    pub folder_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmRequest {
    Uninstall,
    UpdateOutdated,
    StopInstall,
}

impl ConfirmRequest {
    pub fn is_warning(self) -> bool {
        matches!(self, ConfirmRequest::Uninstall | ConfirmRequest::StopInstall)
    }

    pub fn title_key(self) -> &'static str {
        match self {
            ConfirmRequest::Uninstall => "box.uninstall.title",
            ConfirmRequest::UpdateOutdated => "box.update.title",
            ConfirmRequest::StopInstall => "box.stopInstall.title",
        }
    }

    pub fn message_key(self) -> &'static str {
        match self {
            ConfirmRequest::Uninstall => "box.uninstall.message",
            ConfirmRequest::UpdateOutdated => "box.update.message",
            ConfirmRequest::StopInstall => "box.stopInstall.message",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectoryRequest {
    InstallPath,
    ImportPath,
    MoveDestination,
}

impl DirectoryRequest {
    pub fn title_key(self) -> &'static str {
        match self {
            DirectoryRequest::InstallPath => "box.installpath",
            DirectoryRequest::ImportPath => "box.importpath",
            DirectoryRequest::MoveDestination => "box.movepath",
        }
    }
}
