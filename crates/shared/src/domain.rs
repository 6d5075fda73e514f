use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

/// Stable key naming one manageable asset across every subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(pub String);

impl AssetId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    #[default]
    Idle,
    Installing,
    Updating,
    Repairing,
    Moving,
    Uninstalling,
    Playing,
    Done,
}

impl LifecycleStatus {
    /// Statuses during which the installer reports progress.
    pub const POLLING: [LifecycleStatus; 3] = [
        LifecycleStatus::Installing,
        LifecycleStatus::Updating,
        LifecycleStatus::Repairing,
    ];

    pub fn polls_progress(self) -> bool {
        Self::POLLING.contains(&self)
    }

    /// Anything other than `Idle` is expected to resolve on its own.
    pub fn is_transient(self) -> bool {
        self != LifecycleStatus::Idle
    }

    pub fn is_installing(self) -> bool {
        self == LifecycleStatus::Installing
    }

    pub fn is_playing(self) -> bool {
        self == LifecycleStatus::Playing
    }

    pub fn is_updating(self) -> bool {
        self == LifecycleStatus::Updating
    }

    pub fn is_repairing(self) -> bool {
        self == LifecycleStatus::Repairing
    }

    pub fn is_moving(self) -> bool {
        self == LifecycleStatus::Moving
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleStatus::Idle => "idle",
            LifecycleStatus::Installing => "installing",
            LifecycleStatus::Updating => "updating",
            LifecycleStatus::Repairing => "repairing",
            LifecycleStatus::Moving => "moving",
            LifecycleStatus::Uninstalling => "uninstalling",
            LifecycleStatus::Playing => "playing",
            LifecycleStatus::Done => "done",
        }
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-facing lifecycle actions, used for guards and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Install,
    CancelInstall,
    Uninstall,
    Play,
    Stop,
    Update,
    Repair,
    Move,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Install => "install",
            Action::CancelInstall => "cancel_install",
            Action::Uninstall => "uninstall",
            Action::Play => "play",
            Action::Stop => "stop",
            Action::Update => "update",
            Action::Repair => "repair",
            Action::Move => "move",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only metadata reported by the installer. Replaced wholesale on re-fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetDescriptor {
    pub title: String,
    pub developer: String,
    pub version: Option<String>,
    pub short_description: Option<String>,
    pub install_size_bytes: Option<u64>,
    pub download_size_bytes: Option<u64>,
    pub is_installed: bool,
    pub install_path: Option<PathBuf>,
    pub cloud_save_enabled: bool,
    /// Save folder template, possibly containing path tokens such as `{InstallDir}`.
    pub save_folder: Option<String>,
    /// Staging folder the installer uses while transferring.
    pub folder_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatLayer {
    pub name: String,
    pub prefix: PathBuf,
}

impl CompatLayer {
    pub fn is_proton(&self) -> bool {
        self.name.contains("Proton")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSettings {
    #[serde(default)]
    pub auto_sync_saves: bool,
    #[serde(default)]
    pub compat_layer: Option<CompatLayer>,
    #[serde(default)]
    pub save_path_override: Option<String>,
    #[serde(default)]
    pub default_install_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_install_update_and_repair_poll_progress() {
        let polling: Vec<_> = [
            LifecycleStatus::Idle,
            LifecycleStatus::Installing,
            LifecycleStatus::Updating,
            LifecycleStatus::Repairing,
            LifecycleStatus::Moving,
            LifecycleStatus::Uninstalling,
            LifecycleStatus::Playing,
            LifecycleStatus::Done,
        ]
        .into_iter()
        .filter(|status| status.polls_progress())
        .collect();

        assert_eq!(
            polling,
            vec![
                LifecycleStatus::Installing,
                LifecycleStatus::Updating,
                LifecycleStatus::Repairing
            ]
        );
    }

    #[test]
    fn only_idle_is_at_rest() {
        assert!(!LifecycleStatus::Idle.is_transient());
        assert!(LifecycleStatus::Done.is_transient());
        assert!(LifecycleStatus::Playing.is_transient());
    }

    #[test]
    fn status_serializes_as_snake_case() {
        let raw = serde_json::to_string(&LifecycleStatus::Uninstalling).expect("serialize");
        assert_eq!(raw, "\"uninstalling\"");
    }

    #[test]
    fn proton_layers_are_detected_by_name() {
        let layer = CompatLayer {
            name: "Proton - Experimental".into(),
            prefix: PathBuf::from("/prefix"),
        };
        assert!(layer.is_proton());
        assert!(!CompatLayer {
            name: "Wine 9.0".into(),
            prefix: PathBuf::from("/prefix"),
        }
        .is_proton());
    }
}
