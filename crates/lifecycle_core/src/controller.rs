use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};

use serde::Serialize;
use shared::{
    domain::{Action, AssetDescriptor, AssetId, LifecycleStatus},
    error::{LifecycleError, Rejection},
    protocol::{
        CancelHints, ConfirmRequest, DirectoryRequest, InstallPathSelection, LaunchOptions,
        LaunchOutcome, ProgressSnapshot, SettingsScope,
    },
};
use status_registry::{RegistryError, StatusRegistry, StatusWriter};
use tracing::{debug, error, info, warn};

use crate::{
    affordances::Affordances,
    config::ControllerConfig,
    lock,
    poller::ProgressPoller,
    saves::{resolve_save_path, SaveSyncState},
    services::Services,
    transitions,
};

/// How a lifecycle request ended, from the caller's point of view.
///
/// Subsystem failures are absorbed into `Settled`: the status has reached a resting value and the
/// failure detail went to the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Settled,
    Declined,
    Rejected(Rejection),
}

impl ActionOutcome {
    pub fn is_settled(&self) -> bool {
        matches!(self, ActionOutcome::Settled)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ControllerSnapshot {
    pub asset_id: AssetId,
    pub status: LifecycleStatus,
    pub installed: bool,
    pub in_flight: Option<Action>,
    pub progress: ProgressSnapshot,
    pub saves: SaveSyncState,
    pub default_install_path: Option<PathBuf>,
    pub descriptor: Option<AssetDescriptor>,
}

#[derive(Default)]
struct ControllerState {
    descriptor: Option<AssetDescriptor>,
    default_install_path: Option<PathBuf>,
    /// Location handed to the installer by the install currently running, if any.
    install_target: Option<PathBuf>,
    install_cancelled: bool,
    saves: SaveSyncState,
    in_flight: Option<Action>,
}

impl ControllerState {
    fn installed(&self) -> bool {
        self.descriptor
            .as_ref()
            .is_some_and(|descriptor| descriptor.is_installed)
    }

    fn install_path(&self) -> Option<PathBuf> {
        self.descriptor
            .as_ref()
            .and_then(|descriptor| descriptor.install_path.clone())
    }
}

/// Marks a mutating action as in flight until dropped.
struct OperationTicket<'a> {
    state: &'a Mutex<ControllerState>,
}

impl Drop for OperationTicket<'_> {
    fn drop(&mut self) {
        lock(self.state).in_flight = None;
    }
}

/// Owns the lifecycle of exactly one asset and is the only writer of its registry entry.
pub struct LifecycleController {
    asset_id: AssetId,
    services: Services,
    config: ControllerConfig,
    writer: Arc<StatusWriter>,
    state: Mutex<ControllerState>,
    progress: Arc<Mutex<ProgressSnapshot>>,
    poller: ProgressPoller,
}

impl LifecycleController {
    /// Claims the asset's registry entry, loads its descriptor and resumes polling if an operation
    /// is already running.
    pub async fn activate(
        asset_id: AssetId,
        registry: &StatusRegistry,
        services: Services,
        config: ControllerConfig,
    ) -> Result<Self, RegistryError> {
        let writer = Arc::new(registry.claim(asset_id.clone())?);
        let progress = Arc::new(Mutex::new(ProgressSnapshot::default()));
        let poller = ProgressPoller::new(
            asset_id.clone(),
            Arc::clone(&services.installer),
            Arc::clone(&writer),
            Arc::clone(&progress),
            config.poll_interval,
        );

        let controller = Self {
            asset_id,
            services,
            config,
            writer,
            state: Mutex::new(ControllerState::default()),
            progress,
            poller,
        };

        let existing = registry.get_status(&controller.asset_id);
        match existing {
            None | Some(LifecycleStatus::Done) => controller.set_status(LifecycleStatus::Idle, None),
            Some(status) => controller.poller.sync(status),
        }

        controller.load_default_install_path().await;
        controller.refresh_descriptor().await;

        info!(
            asset = %controller.asset_id,
            status = %controller.status(),
            installed = controller.is_installed(),
            "lifecycle: activated"
        );
        Ok(controller)
    }

    /// Tears down the progress poll and releases the registry entry.
    pub async fn deactivate(self) {
        self.poller.shutdown().await;
        info!(asset = %self.asset_id, "lifecycle: deactivated");
    }

    pub fn asset_id(&self) -> &AssetId {
        &self.asset_id
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn status(&self) -> LifecycleStatus {
        self.writer.current()
    }

    pub fn is_installed(&self) -> bool {
        lock(&self.state).installed()
    }

    pub fn is_syncing(&self) -> bool {
        lock(&self.state).saves.sync_in_flight
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_running()
    }

    pub fn progress(&self) -> ProgressSnapshot {
        lock(&self.progress).clone()
    }

    pub fn descriptor(&self) -> Option<AssetDescriptor> {
        lock(&self.state).descriptor.clone()
    }

    pub fn save_state(&self) -> SaveSyncState {
        lock(&self.state).saves.clone()
    }

    pub fn default_install_path(&self) -> Option<PathBuf> {
        lock(&self.state).default_install_path.clone()
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        let progress = self.progress();
        let status = self.status();
        let state = lock(&self.state);
        ControllerSnapshot {
            asset_id: self.asset_id.clone(),
            status,
            installed: state.installed(),
            in_flight: state.in_flight,
            progress,
            saves: state.saves.clone(),
            default_install_path: state.default_install_path.clone(),
            descriptor: state.descriptor.clone(),
        }
    }

    pub fn affordances(&self, selection: InstallPathSelection) -> Affordances {
        let percent = self.progress().percent_complete();
        let status = self.status();
        let state = lock(&self.state);
        Affordances::derive(
            status,
            state.installed(),
            selection,
            state.saves.sync_in_flight,
            percent,
        )
    }

    /// Re-fetches the descriptor and the save settings that depend on it.
    pub async fn refresh(&self) {
        self.refresh_descriptor().await;
    }

    /// Installs into the selected location; while an install is running this cancels it instead.
    pub async fn install(&self, selection: InstallPathSelection) -> ActionOutcome {
        if transitions::install_means_cancel(self.status()) {
            return self.cancel_install().await;
        }
        let result = self.run_install(selection).await;
        self.finish(Action::Install, result)
    }

    pub async fn cancel_install(&self) -> ActionOutcome {
        let result = self.run_cancel_install().await;
        self.finish(Action::CancelInstall, result)
    }

    pub async fn uninstall(&self) -> ActionOutcome {
        let result = self.run_uninstall().await;
        self.finish(Action::Uninstall, result)
    }

    /// Launches the asset; while it runs or updates this stops it instead.
    pub async fn play(&self) -> ActionOutcome {
        if transitions::play_means_stop(self.status()) {
            return self.stop().await;
        }
        let result = self.run_play().await;
        self.finish(Action::Play, result)
    }

    pub async fn stop(&self) -> ActionOutcome {
        let result = self.run_stop().await;
        self.finish(Action::Stop, result)
    }

    pub async fn update(&self) -> ActionOutcome {
        let result = self.run_update().await;
        self.finish(Action::Update, result)
    }

    pub async fn repair(&self) -> ActionOutcome {
        let result = self.run_repair().await;
        self.finish(Action::Repair, result)
    }

    pub async fn move_install(&self) -> ActionOutcome {
        let result = self.run_move().await;
        self.finish(Action::Move, result)
    }

    async fn run_install(&self, selection: InstallPathSelection) -> Result<(), LifecycleError> {
        let _ticket = self.begin(Action::Install)?;

        let default_target = lock(&self.state).default_install_path.clone();
        let target = match selection {
            InstallPathSelection::Default => default_target,
            InstallPathSelection::ExplicitPath => Some(
                self.select_directory(Action::Install, DirectoryRequest::InstallPath)
                    .await?,
            ),
            InstallPathSelection::ImportExisting => {
                let path = self
                    .select_directory(Action::Install, DirectoryRequest::ImportPath)
                    .await?;
                return self.run_import(path).await;
            }
        };

        self.begin_install(target.clone());
        info!(asset = %self.asset_id, target = ?target, "lifecycle: installing");
        let result = self
            .services
            .installer
            .install(&self.asset_id, target.as_deref())
            .await;

        if result.is_ok() {
            // TODO: drop the grace delay once the installer acknowledges on-disk readiness.
            tokio::time::sleep(self.config.install_grace_delay).await;
        }
        if self.take_install_cancelled() {
            info!(asset = %self.asset_id, "lifecycle: install was cancelled");
            return Ok(());
        }

        self.settle().await;
        result.map_err(|err| LifecycleError::subsystem("install", &self.asset_id, err))
    }

    async fn run_import(&self, path: PathBuf) -> Result<(), LifecycleError> {
        self.begin_install(Some(path.clone()));
        info!(asset = %self.asset_id, path = %path.display(), "lifecycle: importing");
        let result = self
            .services
            .installer
            .import_existing(&self.asset_id, &path)
            .await;

        if self.take_install_cancelled() {
            info!(asset = %self.asset_id, "lifecycle: import was cancelled");
            return Ok(());
        }

        self.settle().await;
        result.map_err(|err| LifecycleError::subsystem("import_existing", &self.asset_id, err))
    }

    async fn run_cancel_install(&self) -> Result<(), LifecycleError> {
        self.check(Action::CancelInstall)?;

        if self.config.confirm_install_cancel {
            if !self
                .services
                .prompter
                .confirm(ConfirmRequest::StopInstall)
                .await
            {
                return Err(LifecycleError::UserDeclined(Action::CancelInstall));
            }
            // The install may have finished while the prompt was open.
            self.check(Action::CancelInstall)?;
        }

        let install_path = {
            let mut state = lock(&self.state);
            state.install_cancelled = true;
            state.install_target.clone()
        };
        let folder_name = match self
            .services
            .installer
            .fetch_descriptor(&self.asset_id)
            .await
        {
            Ok(descriptor) => descriptor.folder_name,
            Err(err) => {
                warn!(asset = %self.asset_id, error = %err, "lifecycle: no staging folder for cancel");
                None
            }
        };

        info!(asset = %self.asset_id, "lifecycle: cancelling install");
        let result = self
            .services
            .installer
            .cancel_install(
                &self.asset_id,
                CancelHints {
                    install_path,
                    folder_name,
                },
            )
            .await;

        self.set_status(LifecycleStatus::Idle, None);
        self.refresh_descriptor().await;
        result.map_err(|err| LifecycleError::subsystem("cancel_install", &self.asset_id, err))
    }

    async fn run_uninstall(&self) -> Result<(), LifecycleError> {
        let _ticket = self.begin(Action::Uninstall)?;

        if !self
            .services
            .prompter
            .confirm(ConfirmRequest::Uninstall)
            .await
        {
            return Err(LifecycleError::UserDeclined(Action::Uninstall));
        }

        self.set_status(LifecycleStatus::Uninstalling, None);
        info!(asset = %self.asset_id, "lifecycle: uninstalling");
        let result = self.services.installer.uninstall(&self.asset_id).await;
        self.settle().await;
        result.map_err(|err| LifecycleError::subsystem("uninstall", &self.asset_id, err))
    }

    async fn run_update(&self) -> Result<(), LifecycleError> {
        let _ticket = self.begin(Action::Update)?;
        self.set_status(LifecycleStatus::Updating, None);
        info!(asset = %self.asset_id, "lifecycle: updating");
        let result = self.services.installer.update(&self.asset_id).await;
        self.settle().await;
        result.map_err(|err| LifecycleError::subsystem("update", &self.asset_id, err))
    }

    async fn run_repair(&self) -> Result<(), LifecycleError> {
        let _ticket = self.begin(Action::Repair)?;
        self.set_status(LifecycleStatus::Repairing, None);
        info!(asset = %self.asset_id, "lifecycle: repairing");
        let result = self.services.installer.repair(&self.asset_id).await;
        self.settle().await;
        result.map_err(|err| LifecycleError::subsystem("repair", &self.asset_id, err))
    }

    async fn run_move(&self) -> Result<(), LifecycleError> {
        let _ticket = self.begin(Action::Move)?;
        let destination = self
            .select_directory(Action::Move, DirectoryRequest::MoveDestination)
            .await?;

        self.set_status(LifecycleStatus::Moving, None);
        info!(asset = %self.asset_id, destination = %destination.display(), "lifecycle: moving");
        let result = self
            .services
            .installer
            .move_install(&self.asset_id, &destination)
            .await;
        self.settle().await;
        result.map_err(|err| LifecycleError::subsystem("move_install", &self.asset_id, err))
    }

    async fn run_stop(&self) -> Result<(), LifecycleError> {
        self.check(Action::Stop)?;
        info!(asset = %self.asset_id, status = %self.status(), "lifecycle: stop requested");
        self.settle_status();
        let result = self.services.launcher.stop(&self.asset_id).await;
        self.refresh_descriptor().await;
        result.map_err(|err| LifecycleError::subsystem("stop", &self.asset_id, err))
    }

    async fn run_play(&self) -> Result<(), LifecycleError> {
        let _ticket = self.begin(Action::Play)?;

        self.sync_saves_if_enabled().await;

        self.set_status(LifecycleStatus::Playing, None);
        info!(asset = %self.asset_id, "lifecycle: launching");
        let mut result = Ok(());
        if let Some(message) = self.launch(LaunchOptions::default()).await {
            if message.contains(&self.config.version_mismatch_sentinel) {
                result = self.resolve_version_conflict().await;
            } else {
                warn!(asset = %self.asset_id, error = %message, "lifecycle: run ended with failure");
            }
        }

        self.sync_saves_if_enabled().await;
        self.settle().await;
        result
    }

    /// The installed version is outdated: update now, or run anyway without the version check.
    async fn resolve_version_conflict(&self) -> Result<(), LifecycleError> {
        let update_now = self
            .services
            .prompter
            .confirm(ConfirmRequest::UpdateOutdated)
            .await;

        if !update_now {
            info!(asset = %self.asset_id, "lifecycle: relaunching without version check");
            self.set_status(LifecycleStatus::Playing, None);
            if let Some(message) = self
                .launch(LaunchOptions {
                    skip_version_check: true,
                })
                .await
            {
                warn!(asset = %self.asset_id, error = %message, "lifecycle: run ended with failure");
            }
            return Ok(());
        }

        self.settle_status();
        self.set_status(LifecycleStatus::Updating, None);
        info!(asset = %self.asset_id, "lifecycle: updating outdated install");
        let result = self.services.installer.update(&self.asset_id).await;
        self.settle_status();
        self.refresh_descriptor().await;
        result.map_err(|err| LifecycleError::subsystem("update", &self.asset_id, err))
    }

    /// Runs the asset to completion. Returns the failure message, if any.
    async fn launch(&self, options: LaunchOptions) -> Option<String> {
        match self.services.launcher.launch(&self.asset_id, options).await {
            Ok(LaunchOutcome::Exited) => None,
            Ok(outcome) => outcome.failure_message().map(str::to_owned),
            Err(err) => Some(err.to_string()),
        }
    }

    async fn sync_saves_if_enabled(&self) {
        let save_path = {
            let mut state = lock(&self.state);
            if !state.saves.auto_sync_enabled {
                return;
            }
            let install_path = state.install_path();
            state
                .saves
                .reapply_install_dir(&self.config.install_dir_token, install_path.as_deref());
            state.saves.sync_in_flight = true;
            state.saves.resolved_save_path.clone()
        };

        info!(asset = %self.asset_id, path = %save_path, "lifecycle: syncing saves");
        let result = self
            .services
            .save_sync
            .sync_saves(&save_path, &self.asset_id)
            .await;
        lock(&self.state).saves.sync_in_flight = false;

        if let Err(err) = result {
            let err = LifecycleError::subsystem("sync_saves", &self.asset_id, err);
            warn!(asset = %self.asset_id, error = %err, "lifecycle: save sync failed");
        }
    }

    async fn select_directory(
        &self,
        action: Action,
        request: DirectoryRequest,
    ) -> Result<PathBuf, LifecycleError> {
        self.services
            .prompter
            .select_directory(request)
            .await
            .ok_or(LifecycleError::UserDeclined(action))
    }

    async fn load_default_install_path(&self) {
        match self
            .services
            .settings
            .fetch_settings(&SettingsScope::Default)
            .await
        {
            Ok(settings) => lock(&self.state).default_install_path = settings.default_install_path,
            Err(err) => {
                debug!(asset = %self.asset_id, error = %err, "lifecycle: no default install path")
            }
        }
    }

    async fn refresh_descriptor(&self) {
        let descriptor = match self
            .services
            .installer
            .fetch_descriptor(&self.asset_id)
            .await
        {
            Ok(descriptor) => descriptor,
            Err(err) => {
                warn!(asset = %self.asset_id, error = %err, "lifecycle: descriptor fetch failed");
                return;
            }
        };

        let settings = if descriptor.cloud_save_enabled {
            match self
                .services
                .settings
                .fetch_settings(&SettingsScope::Asset(self.asset_id.clone()))
                .await
            {
                Ok(settings) => Some(settings),
                Err(err) => {
                    warn!(asset = %self.asset_id, error = %err, "lifecycle: settings fetch failed");
                    None
                }
            }
        } else {
            None
        };

        let token = &self.config.install_dir_token;
        let mut state = lock(&self.state);
        let sync_in_flight = state.saves.sync_in_flight;
        match settings {
            Some(settings) => {
                state.saves = SaveSyncState {
                    auto_sync_enabled: settings.auto_sync_saves,
                    resolved_save_path: resolve_save_path(&descriptor, &settings, token),
                    sync_in_flight,
                };
            }
            None if descriptor.cloud_save_enabled => {
                state
                    .saves
                    .reapply_install_dir(token, descriptor.install_path.as_deref());
            }
            None => {
                state.saves = SaveSyncState {
                    sync_in_flight,
                    ..SaveSyncState::default()
                };
            }
        }
        state.descriptor = Some(descriptor);
    }

    fn check(&self, action: Action) -> Result<(), LifecycleError> {
        let status = self.status();
        let state = lock(&self.state);
        transitions::check(action, status, state.installed(), state.in_flight)
            .map_err(LifecycleError::TransitionRejected)
    }

    /// Guard and mark in flight in one step, so two callers cannot both pass the guard.
    fn begin(&self, action: Action) -> Result<OperationTicket<'_>, LifecycleError> {
        let status = self.status();
        let mut state = lock(&self.state);
        transitions::check(action, status, state.installed(), state.in_flight)
            .map_err(LifecycleError::TransitionRejected)?;
        state.in_flight = Some(action);
        Ok(OperationTicket { state: &self.state })
    }

    fn begin_install(&self, target: Option<PathBuf>) {
        {
            let mut state = lock(&self.state);
            state.install_target = target;
            state.install_cancelled = false;
        }
        self.set_status(LifecycleStatus::Installing, None);
    }

    fn take_install_cancelled(&self) -> bool {
        let mut state = lock(&self.state);
        state.install_target = None;
        std::mem::take(&mut state.install_cancelled)
    }

    fn set_status(&self, status: LifecycleStatus, progress: Option<f64>) {
        let previous = self.writer.current();
        if status.polls_progress() && !previous.polls_progress() {
            *lock(&self.progress) = ProgressSnapshot::default();
        }
        self.writer.set_status(status, progress);
        self.poller.sync(status);
    }

    /// `done` never stays in the registry: it is reconciled to `idle` right away.
    fn settle_status(&self) {
        self.set_status(LifecycleStatus::Done, None);
        self.set_status(LifecycleStatus::Idle, None);
    }

    async fn settle(&self) {
        self.settle_status();
        self.refresh_descriptor().await;
    }

    fn finish(&self, action: Action, result: Result<(), LifecycleError>) -> ActionOutcome {
        let err = match result {
            Ok(()) => return ActionOutcome::Settled,
            Err(err) => err,
        };
        if !err.is_silent() {
            error!(asset = %self.asset_id, %action, error = %err, "lifecycle: operation failed");
            return ActionOutcome::Settled;
        }

        match err {
            LifecycleError::TransitionRejected(rejection) => {
                debug!(
                    asset = %self.asset_id,
                    %action,
                    status = %rejection.status,
                    installed = rejection.installed,
                    in_flight = ?rejection.in_flight,
                    "lifecycle: action not allowed"
                );
                ActionOutcome::Rejected(rejection)
            }
            _ => {
                debug!(asset = %self.asset_id, %action, "lifecycle: declined by user");
                ActionOutcome::Declined
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
