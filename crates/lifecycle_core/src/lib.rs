//! Per-asset lifecycle controller: guards user intents against the current status, drives the
//! installer, launcher and save-sync collaborators, and publishes one coherent status per asset.

pub mod affordances;
pub mod config;
mod controller;
mod poller;
pub mod saves;
pub mod services;
pub mod transitions;

#[cfg(test)]
#[path = "tests/fakes.rs"]
mod fakes;

pub use affordances::{Affordances, PlayLabel, PrimaryLabel, StatusLabel};
pub use config::{load_config, ConfigError, ControllerConfig};
pub use controller::{ActionOutcome, ControllerSnapshot, LifecycleController};
pub use poller::ProgressPoller;
pub use saves::SaveSyncState;
pub use services::{
    Installer, Launcher, MissingLauncher, MissingPrompter, MissingSaveSync, MissingSettings,
    Prompter, SaveSync, Services, SettingsSource,
};

/// Locks a std mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
