//! Actions: guarded units of work coupled to state transitions.
//!
//! An action names the states it may start from (`when`), a state to hold
//! while the work runs (`pending`) and the states to move to afterwards
//! (`resolved`, `rejected`, `finally`). Registration validates literal
//! parameters with [`stillwater::validation::Validation`] so every problem
//! is reported at once.

mod descriptor;
mod executor;
mod method;
mod validation;

pub use descriptor::{
    ActionCall, ActionDescriptor, ActionError, ActionPolicy, ActionResult, ActionTarget, Outcome,
    TargetFn, When, WhenFn,
};
pub use method::{ActionMethod, PendingAction};
pub use validation::ActionViolation;

pub(crate) use descriptor::ActionFn;
pub(crate) use method::MethodTable;
