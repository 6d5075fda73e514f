use thiserror::Error;

use crate::domain::{Action, AssetId, LifecycleStatus};

/// Why a lifecycle action was not allowed in the current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub action: Action,
    pub status: LifecycleStatus,
    pub installed: bool,
    /// Mutating action already in flight for the same asset, if any.
    pub in_flight: Option<Action>,
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("user declined {0}")]
    UserDeclined(Action),
    #[error("{} rejected while {} (installed={}, in_flight={:?})", .0.action, .0.status, .0.installed, .0.in_flight)]
    TransitionRejected(Rejection),
    #[error("{operation} failed for asset {asset}: {source}")]
    SubsystemFailure {
        operation: &'static str,
        asset: AssetId,
        source: anyhow::Error,
    },
    #[error("no progress snapshot available for asset {0}")]
    StaleProgress(AssetId),
}

impl LifecycleError {
    pub fn subsystem(
        operation: &'static str,
        asset: &AssetId,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::SubsystemFailure {
            operation,
            asset: asset.clone(),
            source: source.into(),
        }
    }

    /// Declines and rejections are expected outcomes, not diagnostics.
    pub fn is_silent(&self) -> bool {
        matches!(
            self,
            LifecycleError::UserDeclined(_) | LifecycleError::TransitionRejected(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    #[test]
    fn declines_and_rejections_are_silent() {
        assert!(LifecycleError::UserDeclined(Action::Uninstall).is_silent());
        assert!(LifecycleError::TransitionRejected(Rejection {
            action: Action::Play,
            status: LifecycleStatus::Moving,
            installed: true,
            in_flight: None,
        })
        .is_silent());
        assert!(!LifecycleError::subsystem("install", &AssetId::from("AppX"), anyhow!("disk full"))
            .is_silent());
    }

    #[test]
    fn subsystem_failure_message_names_operation_and_asset() {
        let err = LifecycleError::subsystem("uninstall", &AssetId::from("AppX"), anyhow!("busy"));
        assert_eq!(err.to_string(), "uninstall failed for asset AppX: busy");
    }
}
