//! Build errors for state, action and machine builders.

use thiserror::Error;

/// Errors that can occur when building states, actions and machines.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("State name not specified. Pass a non-empty name to StateBuilder::new")]
    MissingStateName,

    #[error("State name '{0}' is reserved by the engine")]
    ReservedStateName(String),

    #[error("State '{0}' is declared more than once")]
    DuplicateState(String),

    #[error("States '{0}' and '{1}' share the numeric value {2}")]
    DuplicateStateValue(String, String, i64),

    #[error("States '{0}' and '{1}' both answer to '{2}'")]
    DuplicateStateAlias(String, String, String),

    #[error("No states declared. Add at least one state with .state(...)")]
    NoStates,

    #[error("Initial states '{0}' and '{1}' conflict. Mark exactly one state with .initial()")]
    MultipleInitialStates(String, String),

    #[error("Action name not specified. Pass a non-empty name to ActionBuilder::new")]
    MissingActionName,

    #[error("Action '{0}' has no work. Call .execute(...) before registering it")]
    MissingActionWork(String),
}
