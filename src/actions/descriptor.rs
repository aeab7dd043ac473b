//! Action descriptors: named units of work coupled to state transitions.

use crate::effects::{Context, StateMachine};
use crate::error::MachineError;
use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Failure reported by an action's work.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ActionError {
    message: String,
}

impl ActionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub(crate) fn timed_out(timeout: Duration) -> Self {
        Self::new(format!("timed out after {timeout:?}"))
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<MachineError> for ActionError {
    fn from(err: MachineError) -> Self {
        Self::new(err.to_string())
    }
}

impl From<serde_json::Error> for ActionError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string())
    }
}

impl From<std::io::Error> for ActionError {
    fn from(err: std::io::Error) -> Self {
        Self::new(err.to_string())
    }
}

pub type ActionResult = Result<Value, ActionError>;

pub(crate) type ActionFn = Arc<dyn Fn(ActionCall) -> BoxFuture<'static, ActionResult> + Send + Sync>;

/// Arguments handed to an action's work.
#[derive(Clone)]
pub struct ActionCall {
    pub(crate) machine: StateMachine,
    pub(crate) args: Vec<Value>,
    pub(crate) attempt: u32,
}

impl ActionCall {
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    /// Zero on the first run, incremented on every policy retry.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn machine(&self) -> &StateMachine {
        &self.machine
    }

    pub fn context<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.machine.context::<T>()
    }

    pub fn raw_context(&self) -> Option<Context> {
        self.machine.raw_context()
    }
}

impl fmt::Debug for ActionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionCall")
            .field("machine", &self.machine.name())
            .field("args", &self.args)
            .field("attempt", &self.attempt)
            .finish()
    }
}

/// What a derived target sees when it is evaluated.
#[derive(Debug, Clone, Copy)]
pub enum Outcome<'a> {
    /// Before the work runs, for `pending`.
    Pending,
    Resolved(&'a Value),
    Rejected(&'a ActionError),
}

pub type TargetFn = Arc<dyn Fn(Outcome<'_>) -> Option<String> + Send + Sync>;

/// A state an action moves to, fixed or computed from the outcome.
#[derive(Clone)]
pub enum ActionTarget {
    State(String),
    Derived(TargetFn),
}

impl ActionTarget {
    pub fn derived<F>(f: F) -> Self
    where
        F: Fn(Outcome<'_>) -> Option<String> + Send + Sync + 'static,
    {
        ActionTarget::Derived(Arc::new(f))
    }

    /// The fixed state name; `None` for derived targets.
    pub fn literal(&self) -> Option<&str> {
        match self {
            ActionTarget::State(name) => Some(name),
            ActionTarget::Derived(_) => None,
        }
    }

    pub fn resolve(&self, outcome: Outcome<'_>) -> Option<String> {
        match self {
            ActionTarget::State(name) => Some(name.clone()),
            ActionTarget::Derived(f) => f(outcome),
        }
    }
}

impl fmt::Debug for ActionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionTarget::State(name) => f.debug_tuple("State").field(name).finish(),
            ActionTarget::Derived(_) => f.write_str("Derived(<fn>)"),
        }
    }
}

impl From<&str> for ActionTarget {
    fn from(name: &str) -> Self {
        ActionTarget::State(name.to_string())
    }
}

impl From<String> for ActionTarget {
    fn from(name: String) -> Self {
        ActionTarget::State(name)
    }
}

pub type WhenFn = Arc<dyn Fn(&str) -> Vec<String> + Send + Sync>;

/// The states an action may start from.
#[derive(Clone)]
pub enum When {
    /// Fixed list; empty means unrestricted.
    States(Vec<String>),
    /// Computed from the current state's name.
    Derived(WhenFn),
}

impl Default for When {
    fn default() -> Self {
        When::States(Vec::new())
    }
}

impl When {
    pub fn literal(&self) -> Option<&[String]> {
        match self {
            When::States(states) => Some(states),
            When::Derived(_) => None,
        }
    }

    pub fn allowed(&self, current: &str) -> Vec<String> {
        match self {
            When::States(states) => states.clone(),
            When::Derived(f) => f(current),
        }
    }
}

impl fmt::Debug for When {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            When::States(states) => f.debug_tuple("States").field(states).finish(),
            When::Derived(_) => f.write_str("Derived(<fn>)"),
        }
    }
}

/// Timeout and retry policy for an action's work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionPolicy {
    /// Bound on a single run; `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Total runs before the failure is reported.
    pub max_attempts: u32,
    /// Pause between runs.
    pub retry_interval: Duration,
}

impl Default for ActionPolicy {
    fn default() -> Self {
        Self {
            timeout: None,
            max_attempts: 1,
            retry_interval: Duration::ZERO,
        }
    }
}

/// A registered action.
#[derive(Clone)]
pub struct ActionDescriptor {
    pub(crate) name: String,
    pub(crate) alias: Option<String>,
    pub(crate) inject_method: bool,
    pub(crate) when: When,
    pub(crate) pending: Option<ActionTarget>,
    pub(crate) resolved: Option<ActionTarget>,
    pub(crate) rejected: Option<ActionTarget>,
    pub(crate) finally: Option<ActionTarget>,
    pub(crate) policy: ActionPolicy,
    pub(crate) execute: ActionFn,
}

impl ActionDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name the action is exposed under as a method.
    pub fn method_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn injects_method(&self) -> bool {
        self.inject_method
    }

    pub fn when(&self) -> &When {
        &self.when
    }

    pub fn pending(&self) -> Option<&ActionTarget> {
        self.pending.as_ref()
    }

    pub fn resolved(&self) -> Option<&ActionTarget> {
        self.resolved.as_ref()
    }

    pub fn rejected(&self) -> Option<&ActionTarget> {
        self.rejected.as_ref()
    }

    pub fn finally(&self) -> Option<&ActionTarget> {
        self.finally.as_ref()
    }

    pub fn policy(&self) -> &ActionPolicy {
        &self.policy
    }
}

impl fmt::Debug for ActionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionDescriptor")
            .field("name", &self.name)
            .field("alias", &self.alias)
            .field("when", &self.when)
            .field("pending", &self.pending)
            .field("resolved", &self.resolved)
            .field("rejected", &self.rejected)
            .field("finally", &self.finally)
            .field("policy", &self.policy)
            .finish()
    }
}
