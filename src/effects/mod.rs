//! The async side of the engine.
//!
//! This module provides the [`StateMachine`] handle and everything that
//! awaits on its behalf:
//!
//! - **Lifecycle**: start, stop, reset and cancellation
//! - **Transitions**: guard check, leave/enter/done hooks and failure recovery
//! - **Events**: observers and a broadcast channel of [`MachineEvent`]s
//! - **Scopes**: nested machines tied to the lifetime of a parent state

mod events;
mod machine;
mod scope;
mod transition;

pub use events::{MachineEvent, Observer, TransitionEvent, TransitionEventKind};
pub use machine::{Context, StateMachine};

pub(crate) use machine::ParentLink;
