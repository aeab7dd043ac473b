//! Statehook: an async finite state machine engine driven by lifecycle hooks
//!
//! A machine is declared as a set of named states, each with a numeric value
//! and an optional list of allowed successors. Moving between states runs
//! async hooks bound to the states involved, and every hook can veto, fail,
//! retry or time out. Failures the engine cannot recover from push the
//! machine into the reserved `ERROR` state.
//!
//! # Core Concepts
//!
//! - **States**: declared with [`StateBuilder`], looked up by name, alias or value
//! - **Hooks**: async callbacks on `enter`, `leave`, `done` and `resume`
//! - **Actions**: guarded units of work that move through `pending` into
//!   `resolved`, `rejected` or `finally`
//! - **Scopes**: nested machines that live while a parent state is current
//! - **Events**: synchronous observers plus a broadcast channel
//!
//! # Example
//!
//! ```rust
//! use statehook::{ActionBuilder, Hook, StateBuilder, StateMachine, Verdict};
//! use serde_json::{json, Value};
//!
//! # let rt = tokio::runtime::Runtime::new().unwrap();
//! # rt.block_on(async {
//! let machine = StateMachine::builder()
//!     .name("connection")
//!     .autostart(false)
//!     .history(16)
//!     .state(StateBuilder::new("Disconnected", 0).initial())
//!     .state(StateBuilder::new("Connecting", 1))
//!     .state(
//!         StateBuilder::new("Connected", 2)
//!             .on_enter(Hook::from_fn(|args| {
//!                 assert_eq!(args.from(), "Connecting");
//!                 Ok(Verdict::Continue)
//!             })),
//!     )
//!     .action(
//!         ActionBuilder::new("connect")
//!             .when(["Disconnected"])
//!             .pending("Connecting")
//!             .resolved("Connected")
//!             .rejected("Disconnected")
//!             .execute(|call| async move { Ok(json!({ "host": call.arg(0).cloned() })) }),
//!     )
//!     .build()
//!     .unwrap();
//!
//! machine.start().await.unwrap();
//! let result = machine
//!     .execute("connect", vec![Value::from("example.org")])
//!     .await
//!     .unwrap();
//!
//! assert_eq!(result["host"], "example.org");
//! assert!(machine.is_current("Connected"));
//! assert_eq!(
//!     machine.history().path(),
//!     vec!["Disconnected", "Connecting", "Connected"]
//! );
//! # });
//! ```

pub mod actions;
pub mod builder;
pub mod core;
pub mod effects;
pub mod hooks;

mod error;
mod options;

// Re-export commonly used types
pub use actions::{
    ActionCall, ActionError, ActionMethod, ActionPolicy, ActionResult, ActionTarget, Outcome,
    PendingAction, When,
};
pub use builder::{ActionBuilder, BuildError, StateBuilder, StateMachineBuilder};
pub use core::{
    HistoryBuffer, HistoryEntry, StateDefinition, StateRef, ANY_STATE, ERROR_STATE, ERROR_VALUE,
    NULL_STATE,
};
pub use effects::{Context, MachineEvent, StateMachine, TransitionEvent, TransitionEventKind};
pub use error::MachineError;
pub use hooks::{Hook, HookArgs, HookError, HookResult, Phase, SubscriptionId, Verdict};
pub use options::{MachineOptions, DEFAULT_MACHINE_NAME};
