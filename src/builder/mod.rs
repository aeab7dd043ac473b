//! Builder API for ergonomic state machine construction.
//!
//! States, actions and whole machines are declared with fluent builders.
//! Malformed declarations surface as [`BuildError`]s when the machine is
//! built.

mod action;
mod error;
mod machine;
mod state;

pub use action::ActionBuilder;
pub use error::BuildError;
pub use machine::StateMachineBuilder;
pub use state::StateBuilder;
