//! Error taxonomy for machine operations.

use crate::actions::ActionError;
use crate::builder::BuildError;
use crate::hooks::{HookError, Phase};
use serde_json::Value;
use thiserror::Error;

/// Errors returned by [`StateMachine`](crate::StateMachine) operations.
///
/// Errors are `Clone` so the same failure can be returned to the caller,
/// attached to transition events and handed to ERROR's `done` hooks.
#[derive(Debug, Clone, Error)]
pub enum MachineError {
    #[error("state machine is not running")]
    NotRunning,

    #[error("invalid state reference: {0}")]
    InvalidState(String),

    #[error("state '{0}' is final; reset the machine to leave it")]
    FinalState(String),

    #[error("a transition is already in progress")]
    TransitionInProgress,

    #[error("transition from '{from}' to '{to}' is not allowed")]
    TransitionRejected { from: String, to: String },

    #[error("{phase} hook of state '{state}' failed: {source}")]
    HookFailed {
        phase: Phase,
        state: String,
        #[source]
        source: HookError,
    },

    #[error("transition from '{from}' to '{to}' was cancelled")]
    Cancelled { from: String, to: String },

    #[error("unrecoverable side effect in {phase} hook of state '{state}': {message}")]
    SideEffect {
        phase: Phase,
        state: String,
        message: String,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("action '{0}' is not registered")]
    ActionNotFound(String),

    #[error("action '{action}' cannot run in state '{current}' (allowed: {allowed:?})")]
    GuardViolation {
        action: String,
        current: String,
        allowed: Vec<String>,
    },

    #[error("action '{action}' is misconfigured: {}", .violations.join("; "))]
    InvalidAction {
        action: String,
        violations: Vec<String>,
    },

    #[error("method name '{0}' is already occupied on the context")]
    MethodConflict(String),

    #[error("action '{action}' failed: {source}")]
    Action {
        action: String,
        #[source]
        source: ActionError,
    },

    #[error("action '{action}' ran but could not move to '{target}': {source}")]
    OutcomeTransition {
        action: String,
        target: String,
        result: Option<Value>,
        #[source]
        source: Box<MachineError>,
    },

    #[error("deferred action '{action}' could not be joined: {reason}")]
    Scheduling { action: String, reason: String },
}

impl MachineError {
    /// Map a hook failure observed while running `phase` of `state`.
    pub(crate) fn from_hook(phase: Phase, state: &str, from: &str, to: &str, err: HookError) -> Self {
        match err {
            HookError::Cancelled => MachineError::Cancelled {
                from: from.to_string(),
                to: to.to_string(),
            },
            HookError::SideEffect(message) => MachineError::SideEffect {
                phase,
                state: state.to_string(),
                message,
            },
            source => MachineError::HookFailed {
                phase,
                state: state.to_string(),
                source,
            },
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, MachineError::Cancelled { .. })
    }

    /// True for failures that force the machine into ERROR instead of
    /// attempting recovery.
    pub fn is_side_effect(&self) -> bool {
        matches!(self, MachineError::SideEffect { .. })
    }

    /// The user work error, when this failure came from an action's work.
    pub fn action_error(&self) -> Option<&ActionError> {
        match self {
            MachineError::Action { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_hook_maps_to_cancelled() {
        let err = MachineError::from_hook(Phase::Enter, "B", "A", "B", HookError::Cancelled);
        assert!(err.is_cancelled());
        assert_eq!(err.to_string(), "transition from 'A' to 'B' was cancelled");
    }

    #[test]
    fn side_effect_hook_maps_to_side_effect() {
        let err = MachineError::from_hook(
            Phase::Leave,
            "A",
            "A",
            "B",
            HookError::side_effect("socket half closed"),
        );
        assert!(err.is_side_effect());
        assert!(err.to_string().contains("leave hook of state 'A'"));
    }

    #[test]
    fn ordinary_hook_failure_keeps_source() {
        let err = MachineError::from_hook(Phase::Enter, "B", "A", "B", HookError::failed("boom"));
        match err {
            MachineError::HookFailed { phase, state, source } => {
                assert_eq!(phase, Phase::Enter);
                assert_eq!(state, "B");
                assert_eq!(source, HookError::failed("boom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn invalid_action_lists_every_violation() {
        let err = MachineError::InvalidAction {
            action: "connect".to_string(),
            violations: vec!["first".to_string(), "second".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "action 'connect' is misconfigured: first; second"
        );
    }
}
