//! Lifecycle hooks.
//!
//! Hooks are async callbacks bound to `<state>/<phase>` on the machine's
//! hook bus. Every invocation goes through the wrapper, which applies the
//! per-hook timeout, honours retry verdicts and aborts when the machine's
//! cancellation token fires.

mod bus;
mod hook;
mod wrapper;

pub use bus::SubscriptionId;
pub use hook::{Hook, HookArgs, HookError, HookResult, Phase, Verdict};

pub(crate) use bus::HookBus;
pub(crate) use wrapper::run_phase;
