//! What a front end should offer for the current state, derived purely from status.
//!
//! Labels are localization keys; rendering them is the caller's business.

use serde::Serialize;
use shared::{domain::LifecycleStatus, protocol::InstallPathSelection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryLabel {
    Install,
    Import,
    Cancel,
    Uninstall,
}

impl PrimaryLabel {
    pub fn key(self) -> &'static str {
        match self {
            PrimaryLabel::Install => "button.install",
            PrimaryLabel::Import => "button.import",
            PrimaryLabel::Cancel => "button.cancel",
            PrimaryLabel::Uninstall => "button.uninstall",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayLabel {
    Play,
    Stop,
    CancelUpdate,
    Syncing,
}

impl PlayLabel {
    pub fn key(self) -> &'static str {
        match self {
            PlayLabel::Play => "label.playing.start",
            PlayLabel::Stop => "label.playing.stop",
            PlayLabel::CancelUpdate => "label.cancel.update",
            PlayLabel::Syncing => "label.saves.syncing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusLabel {
    NotInstalled,
    Installed,
    Installing,
    Updating,
    Repairing,
    Moving,
    Uninstalling,
}

impl StatusLabel {
    pub fn key(self) -> &'static str {
        match self {
            StatusLabel::NotInstalled => "status.notinstalled",
            StatusLabel::Installed => "status.installed",
            StatusLabel::Installing => "status.installing",
            StatusLabel::Updating => "status.updating",
            StatusLabel::Repairing => "status.reparing",
            StatusLabel::Moving => "status.moving",
            StatusLabel::Uninstalling => "status.uninstalling",
        }
    }

    /// Whether progress belongs next to this label.
    pub fn shows_progress(self) -> bool {
        matches!(
            self,
            StatusLabel::Installing | StatusLabel::Updating | StatusLabel::Repairing
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Button<L> {
    pub label: L,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Affordances {
    pub primary: Button<PrimaryLabel>,
    /// Only offered once installed.
    pub play: Option<Button<PlayLabel>>,
    pub status: StatusLabel,
    pub progress: Option<f64>,
    /// Install location choice is only meaningful before the first install.
    pub show_path_selector: bool,
}

impl Affordances {
    pub fn derive(
        status: LifecycleStatus,
        installed: bool,
        selection: InstallPathSelection,
        syncing: bool,
        progress: Option<f64>,
    ) -> Self {
        let busy = matches!(
            status,
            LifecycleStatus::Playing
                | LifecycleStatus::Updating
                | LifecycleStatus::Repairing
                | LifecycleStatus::Moving
                | LifecycleStatus::Uninstalling
        );

        let primary_label = if installed {
            PrimaryLabel::Uninstall
        } else if status.is_installing() {
            PrimaryLabel::Cancel
        } else if selection == InstallPathSelection::ImportExisting {
            PrimaryLabel::Import
        } else {
            PrimaryLabel::Install
        };

        let play = installed.then(|| {
            let label = if status.is_updating() {
                PlayLabel::CancelUpdate
            } else if syncing {
                PlayLabel::Syncing
            } else if status.is_playing() {
                PlayLabel::Stop
            } else {
                PlayLabel::Play
            };
            Button {
                label,
                enabled: !(status.is_repairing()
                    || status.is_moving()
                    || status == LifecycleStatus::Uninstalling
                    || syncing),
            }
        });

        let status_label = match status {
            LifecycleStatus::Repairing => StatusLabel::Repairing,
            LifecycleStatus::Moving => StatusLabel::Moving,
            LifecycleStatus::Uninstalling => StatusLabel::Uninstalling,
            LifecycleStatus::Updating if installed => StatusLabel::Updating,
            LifecycleStatus::Installing => StatusLabel::Installing,
            _ if installed => StatusLabel::Installed,
            _ => StatusLabel::NotInstalled,
        };

        Self {
            primary: Button {
                label: primary_label,
                enabled: !busy,
            },
            play,
            status: status_label,
            progress: progress.filter(|_| status_label.shows_progress()),
            show_path_selector: !installed && !status.is_installing(),
        }
    }
}
