use serde::{Deserialize, Serialize};

/// Camera setup lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetupStatus {
    NotStarted,
    Loading,
    Success,
    Failed,
    AccessDenied,
    AccessRestricted,
}

/// Classifier setup lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelStatus {
    NotStarted,
    Loading,
    Success,
    Failed,
}

/// Hardware run state of the capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Stopped,
    Loading,
    Running,
}

/// Single status shown to the user, derived from both subsystems and the run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompositeStatus {
    AccessDenied,
    Failed,
    Loading,
    Stopped,
    Running,
    NotStarted,
}

impl CompositeStatus {
    /// Resolve the composite status. Arms are evaluated top to bottom and
    /// the first match wins: access problems and hard failures take
    /// precedence over transient loading states.
    pub fn derive(camera: SetupStatus, model: ModelStatus, run: RunStatus) -> Self {
        use ModelStatus as M;
        use RunStatus as R;
        use SetupStatus as S;

        match (camera, model, run) {
            (S::AccessDenied, _, _) => CompositeStatus::AccessDenied,
            (S::Failed, _, _) | (_, M::Failed, _) | (S::AccessRestricted, _, _) => {
                CompositeStatus::Failed
            }
            (S::Loading, _, _) | (_, M::Loading, _) | (_, _, R::Loading) => CompositeStatus::Loading,
            (S::Success, M::Success, R::Stopped) => CompositeStatus::Stopped,
            (S::Success, M::Success, R::Running) => CompositeStatus::Running,
            (S::NotStarted, _, _) | (_, M::NotStarted, _) => CompositeStatus::NotStarted,
        }
    }

    /// Whether the status badge should be shown
    pub fn shows_badge(&self) -> bool {
        !matches!(
            self,
            CompositeStatus::Stopped | CompositeStatus::Running | CompositeStatus::NotStarted
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_denied_beats_failed_classifier() {
        let status =
            CompositeStatus::derive(SetupStatus::AccessDenied, ModelStatus::Failed, RunStatus::Stopped);
        assert_eq!(status, CompositeStatus::AccessDenied);
    }

    #[test]
    fn test_failure_beats_loading() {
        assert_eq!(
            CompositeStatus::derive(SetupStatus::Success, ModelStatus::Failed, RunStatus::Loading),
            CompositeStatus::Failed
        );
        assert_eq!(
            CompositeStatus::derive(SetupStatus::AccessRestricted, ModelStatus::Loading, RunStatus::Stopped),
            CompositeStatus::Failed
        );
    }

    #[test]
    fn test_loading_from_any_source() {
        for (camera, model, run) in [
            (SetupStatus::Loading, ModelStatus::NotStarted, RunStatus::Stopped),
            (SetupStatus::Success, ModelStatus::Loading, RunStatus::Stopped),
            (SetupStatus::Success, ModelStatus::Success, RunStatus::Loading),
        ] {
            assert_eq!(CompositeStatus::derive(camera, model, run), CompositeStatus::Loading);
        }
    }

    #[test]
    fn test_ready_states() {
        assert_eq!(
            CompositeStatus::derive(SetupStatus::Success, ModelStatus::Success, RunStatus::Stopped),
            CompositeStatus::Stopped
        );
        assert_eq!(
            CompositeStatus::derive(SetupStatus::Success, ModelStatus::Success, RunStatus::Running),
            CompositeStatus::Running
        );
    }

    #[test]
    fn test_not_started() {
        assert_eq!(
            CompositeStatus::derive(SetupStatus::NotStarted, ModelStatus::NotStarted, RunStatus::Stopped),
            CompositeStatus::NotStarted
        );
        assert_eq!(
            CompositeStatus::derive(SetupStatus::Success, ModelStatus::NotStarted, RunStatus::Stopped),
            CompositeStatus::NotStarted
        );
    }

    #[test]
    fn test_badge_visibility() {
        assert!(CompositeStatus::Loading.shows_badge());
        assert!(CompositeStatus::AccessDenied.shows_badge());
        assert!(!CompositeStatus::Running.shows_badge());
    }
}
