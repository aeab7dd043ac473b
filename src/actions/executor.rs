//! Action registration and execution.
//!
//! Executing an action:
//! 1. checks the machine is running, not final, and the current state is
//!    allowed by the action's `when`;
//! 2. enters the `pending` state, if any; failure skips the work and moves
//!    to `finally` or `rejected` as a rejected outcome would;
//! 3. runs the work under the action's timeout and retry policy;
//! 4. moves to `finally` if it resolves to a valid state, else to
//!    `resolved` or `rejected` depending on the outcome;
//! 5. if that transition fails the machine is forced into ERROR. Without an
//!    outcome state, a failed work rolls the machine back out of `pending`.

use super::descriptor::{ActionCall, ActionDescriptor, ActionError, ActionResult, Outcome};
use super::validation;
use crate::builder::ActionBuilder;
use crate::core::StateDefinition;
use crate::effects::StateMachine;
use crate::error::MachineError;
use serde_json::Value;
use std::sync::Arc;
use stillwater::validation::Validation;
use tracing::{debug, info, warn};

impl StateMachine {
    /// Validate and register an action.
    ///
    /// Fails on duplicate names, on literal parameters that name unknown or
    /// unreachable states, and when the exposed method name is taken.
    pub fn register(&self, action: ActionBuilder) -> Result<(), MachineError> {
        let descriptor = action.build()?;
        let mut core = self.inner.core.lock();

        if core.actions.contains_key(descriptor.name()) {
            return Err(MachineError::Configuration(format!(
                "action '{}' is already registered",
                descriptor.name()
            )));
        }
        if let Validation::Failure(errors) = validation::validate(&descriptor, &core.registry) {
            return Err(MachineError::InvalidAction {
                action: descriptor.name().to_string(),
                violations: errors.iter().map(ToString::to_string).collect(),
            });
        }
        if self.inner.options.inject_action_methods && descriptor.injects_method() {
            core.methods
                .install(descriptor.method_name(), descriptor.name())?;
        }

        debug!(machine = %self.name(), action = %descriptor.name(), "action registered");
        core.actions
            .insert(descriptor.name().to_string(), Arc::new(descriptor));
        Ok(())
    }

    /// Remove an action and its method. Returns false if it was unknown.
    pub fn unregister(&self, name: &str) -> bool {
        let mut core = self.inner.core.lock();
        core.methods.remove_action(name);
        core.actions.remove(name).is_some()
    }

    pub fn action(&self, name: &str) -> Option<Arc<ActionDescriptor>> {
        self.inner.core.lock().actions.get(name).cloned()
    }

    /// Run an action to completion and return its work's value.
    ///
    /// # Errors
    ///
    /// - [`MachineError::NotRunning`] or [`MachineError::FinalState`]
    /// - [`MachineError::ActionNotFound`] for an unregistered name
    /// - [`MachineError::GuardViolation`] if `when` excludes the current state
    /// - the pending transition's failure, unchanged, after moving to the
    ///   `finally` or `rejected` state
    /// - [`MachineError::Action`] when the work fails
    /// - [`MachineError::OutcomeTransition`] when the work succeeded but the
    ///   outcome transition did not; the machine is then in ERROR
    pub async fn execute(&self, name: &str, args: Vec<Value>) -> Result<Value, MachineError> {
        let (action, origin) = {
            let core = self.inner.core.lock();
            if !core.running {
                return Err(MachineError::NotRunning);
            }
            if core.current.is_final() {
                return Err(MachineError::FinalState(core.current.name().to_string()));
            }
            let action = core
                .actions
                .get(name)
                .cloned()
                .ok_or_else(|| MachineError::ActionNotFound(name.to_string()))?;
            (action, core.current.clone())
        };

        let allowed = action.when().allowed(origin.name());
        if !origin.is_null() && !allowed.is_empty() && !allowed.iter().any(|s| s == origin.name()) {
            return Err(MachineError::GuardViolation {
                action: name.to_string(),
                current: origin.name().to_string(),
                allowed,
            });
        }

        let params = Value::Array(args.clone());
        let mut entered_pending = None;
        if let Some(pending) = action.pending().and_then(|t| t.resolve(Outcome::Pending)) {
            if self.is_valid(pending.as_str()) && pending != origin.name() {
                if let Err(failure) = self.transition(pending.as_str(), params).await {
                    self.settle_pending_failure(&action, &failure).await;
                    return Err(failure);
                }
                entered_pending = Some(pending);
            }
        }

        info!(machine = %self.name(), action = %name, "action started");
        let outcome = self.run_work(&action, args).await;

        let settled = match &outcome {
            Ok(value) => Outcome::Resolved(value),
            Err(err) => Outcome::Rejected(err),
        };
        let target = self.outcome_target(&action, settled);

        match target {
            Some(target) => {
                let result_params = match &outcome {
                    Ok(value) => value.clone(),
                    Err(err) => Value::String(err.to_string()),
                };
                if let Err(failure) = self.transition(target.as_str(), result_params.clone()).await {
                    warn!(
                        machine = %self.name(),
                        action = %name,
                        target = %target,
                        error = %failure,
                        "outcome transition failed"
                    );
                    let from = self.current().name().to_string();
                    self.force_error(failure.clone(), &from, &target, result_params)
                        .await;
                    return match outcome {
                        Ok(value) => Err(MachineError::OutcomeTransition {
                            action: name.to_string(),
                            target,
                            result: Some(value),
                            source: Box::new(failure),
                        }),
                        Err(source) => Err(MachineError::Action {
                            action: name.to_string(),
                            source,
                        }),
                    };
                }
            }
            None => {
                if let (Some(pending), Err(_)) = (&entered_pending, &outcome) {
                    self.roll_back(pending, &origin);
                }
            }
        }

        match outcome {
            Ok(value) => {
                info!(machine = %self.name(), action = %name, "action resolved");
                Ok(value)
            }
            Err(source) => {
                info!(machine = %self.name(), action = %name, error = %source, "action rejected");
                Err(MachineError::Action {
                    action: name.to_string(),
                    source,
                })
            }
        }
    }

    /// `finally` if it names a valid state, else `resolved` or `rejected`.
    fn outcome_target(&self, action: &ActionDescriptor, settled: Outcome<'_>) -> Option<String> {
        let by_outcome = match settled {
            Outcome::Resolved(_) => action.resolved(),
            _ => action.rejected(),
        }
        .and_then(|t| t.resolve(settled));
        action
            .finally()
            .and_then(|t| t.resolve(settled))
            .filter(|state| self.is_valid(state.as_str()))
            .or(by_outcome)
            .filter(|state| self.is_valid(state.as_str()))
    }

    /// Treat a failed pending transition as a rejected outcome.
    async fn settle_pending_failure(&self, action: &ActionDescriptor, failure: &MachineError) {
        let current = self.current();
        if !self.is_running() || current.is_final() {
            return;
        }
        let reason = ActionError::new(failure.to_string());
        let Some(target) = self.outcome_target(action, Outcome::Rejected(&reason)) else {
            return;
        };
        if target == current.name() {
            return;
        }

        let params = Value::String(reason.to_string());
        if let Err(err) = self.transition(target.as_str(), params.clone()).await {
            warn!(
                machine = %self.name(),
                action = %action.name(),
                target = %target,
                error = %err,
                "rejected transition after pending failure failed"
            );
            self.force_error(err, current.name(), &target, params).await;
        }
    }

    async fn run_work(&self, action: &ActionDescriptor, args: Vec<Value>) -> ActionResult {
        let policy = action.policy();
        let mut attempt = 0;
        loop {
            let call = ActionCall {
                machine: self.clone(),
                args: args.clone(),
                attempt,
            };
            let work = (action.execute)(call);
            let result = match policy.timeout {
                Some(timeout) if !timeout.is_zero() => tokio::time::timeout(timeout, work)
                    .await
                    .unwrap_or_else(|_| Err(ActionError::timed_out(timeout))),
                _ => work.await,
            };

            match result {
                Err(err) if attempt + 1 < policy.max_attempts => {
                    attempt += 1;
                    debug!(
                        machine = %self.name(),
                        action = %action.name(),
                        attempt,
                        error = %err,
                        "retrying action"
                    );
                    if !policy.retry_interval.is_zero() {
                        tokio::time::sleep(policy.retry_interval).await;
                    }
                }
                result => return result,
            }
        }
    }

    /// Restore the state held before an action's pending transition,
    /// without running hooks. Only applies while still in `pending`.
    fn roll_back(&self, pending: &str, origin: &StateDefinition) {
        let mut core = self.inner.core.lock();
        if !core.running || core.current.name() != pending {
            return;
        }
        if let Some(state) = core.registry.get(origin.name()).cloned() {
            debug!(
                machine = %self.inner.options.name,
                from = %core.current.name(),
                to = %state.name(),
                "rolled back pending state"
            );
            core.current = state;
        }
    }
}
