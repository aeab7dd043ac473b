//! Core state machine types.
//!
//! This module contains the synchronous parts of the engine:
//! - State definitions and references
//! - The state registry
//! - The transition guard
//! - Bounded history tracking
//!
//! Nothing here performs I/O or awaits; the async machinery lives in
//! [`crate::effects`] and [`crate::hooks`].

mod guard;
mod history;
mod registry;
mod state;

pub use guard::TransitionGuard;
pub use history::{HistoryBuffer, HistoryEntry};
pub use registry::StateRegistry;
pub use state::{
    Next, NextFn, StateDefinition, StateFn, StateRef, ANY_STATE, ERROR_STATE, ERROR_VALUE,
    NULL_STATE,
};
