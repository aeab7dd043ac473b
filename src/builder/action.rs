//! Builder for declaring actions.

use crate::actions::{
    ActionCall, ActionDescriptor, ActionFn, ActionPolicy, ActionResult, ActionTarget, When,
};
use crate::builder::error::BuildError;
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Builder for an action declaration.
///
/// # Example
///
/// ```rust
/// use statehook::ActionBuilder;
/// use serde_json::json;
/// use std::time::Duration;
///
/// let connect = ActionBuilder::new("connect")
///     .when(["Disconnected"])
///     .pending("Connecting")
///     .resolved("Connected")
///     .rejected("Disconnected")
///     .timeout(Duration::from_secs(5))
///     .execute(|call| async move { Ok(json!({ "host": call.arg(0).cloned() })) });
/// # let _ = connect;
/// ```
#[derive(Clone, Default)]
pub struct ActionBuilder {
    name: String,
    alias: Option<String>,
    suppress_method: bool,
    when: When,
    pending: Option<ActionTarget>,
    resolved: Option<ActionTarget>,
    rejected: Option<ActionTarget>,
    finally: Option<ActionTarget>,
    policy: ActionPolicy,
    execute: Option<ActionFn>,
}

impl ActionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Expose the action under a different method name.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Do not expose this action as a method.
    pub fn without_method(mut self) -> Self {
        self.suppress_method = true;
        self
    }

    /// States the action may start from. Empty means any.
    pub fn when<I, S>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.when = When::States(states.into_iter().map(Into::into).collect());
        self
    }

    /// Compute allowed start states from the current state's name.
    pub fn when_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> Vec<String> + Send + Sync + 'static,
    {
        self.when = When::Derived(Arc::new(f));
        self
    }

    /// State held while the work runs.
    pub fn pending(mut self, target: impl Into<ActionTarget>) -> Self {
        self.pending = Some(target.into());
        self
    }

    /// State entered when the work succeeds.
    pub fn resolved(mut self, target: impl Into<ActionTarget>) -> Self {
        self.resolved = Some(target.into());
        self
    }

    /// State entered when the work fails.
    pub fn rejected(mut self, target: impl Into<ActionTarget>) -> Self {
        self.rejected = Some(target.into());
        self
    }

    /// State entered either way; overrides `resolved` and `rejected`.
    pub fn finally(mut self, target: impl Into<ActionTarget>) -> Self {
        self.finally = Some(target.into());
        self
    }

    /// Bound each run of the work.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.policy.timeout = Some(timeout);
        self
    }

    /// Run the work up to `max_attempts` times, pausing `interval` between
    /// runs.
    pub fn retry(mut self, max_attempts: u32, interval: Duration) -> Self {
        self.policy.max_attempts = max_attempts.max(1);
        self.policy.retry_interval = interval;
        self
    }

    pub fn policy(mut self, policy: ActionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The work itself (required).
    pub fn execute<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ActionCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionResult> + Send + 'static,
    {
        self.execute = Some(Arc::new(move |call: ActionCall| f(call).boxed()));
        self
    }

    pub(crate) fn build(self) -> Result<ActionDescriptor, BuildError> {
        if self.name.is_empty() {
            return Err(BuildError::MissingActionName);
        }
        let execute = self
            .execute
            .ok_or_else(|| BuildError::MissingActionWork(self.name.clone()))?;

        Ok(ActionDescriptor {
            name: self.name,
            alias: self.alias,
            inject_method: !self.suppress_method,
            when: self.when,
            pending: self.pending,
            resolved: self.resolved,
            rejected: self.rejected,
            finally: self.finally,
            policy: self.policy,
            execute,
        })
    }
}
