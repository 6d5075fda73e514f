//! Transition guards. Pure functions over the current status; no state of their own.

use shared::{
    domain::{Action, LifecycleStatus},
    error::Rejection,
};

/// Whether `action` may start given the current status, installed flag and any mutating action
/// already running for the asset.
pub fn check(
    action: Action,
    status: LifecycleStatus,
    installed: bool,
    in_flight: Option<Action>,
) -> Result<(), Rejection> {
    let idle = status == LifecycleStatus::Idle && in_flight.is_none();
    let allowed = match action {
        Action::Install => idle && !installed,
        Action::CancelInstall => status.is_installing(),
        Action::Uninstall | Action::Play | Action::Update | Action::Repair | Action::Move => {
            idle && installed
        }
        Action::Stop => installed && (status.is_playing() || status.is_updating()),
    };

    if allowed {
        Ok(())
    } else {
        Err(Rejection {
            action,
            status,
            installed,
            in_flight,
        })
    }
}

/// `play` doubles as stop while a run or an update is in progress.
pub fn play_means_stop(status: LifecycleStatus) -> bool {
    status.is_playing() || status.is_updating()
}

/// `install` doubles as cancel while an install is in progress.
pub fn install_means_cancel(status: LifecycleStatus) -> bool {
    status.is_installing()
}
