//! The transition engine.
//!
//! A transition runs in two phases. The synchronous checks (running, not
//! already transitioning, not final, target resolves) happen under the
//! machine lock and set the transitioning flag. Everything that runs user
//! code happens without the lock: the guard, `leave` hooks of the current
//! state, `enter` hooks of the target, and after the commit its `done`
//! hooks.
//!
//! Failure handling:
//! - A rejected guard emits `transition/cancel` and changes nothing.
//! - A failing `leave` or `enter` hook emits `transition/error` and leaves
//!   the current state in place; after an `enter` failure the current
//!   state's `resume` hooks run.
//! - A side-effect failure, or a failing `resume` hook, forces ERROR.

use super::events::{MachineEvent, TransitionEvent, TransitionEventKind};
use super::machine::{Inner, StateMachine};
use crate::core::{StateDefinition, StateRef, TransitionGuard};
use crate::error::MachineError;
use crate::hooks::{run_phase, HookArgs, Phase};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Holds the transitioning flag for the lifetime of one transition.
struct TransitionLease<'a> {
    inner: &'a Inner,
}

impl Drop for TransitionLease<'_> {
    fn drop(&mut self) {
        self.inner.core.lock().transitioning = false;
    }
}

impl StateMachine {
    /// Move to `target`, running the guard and lifecycle hooks.
    ///
    /// Transitioning to the current state is a no-op that runs no hooks.
    ///
    /// # Errors
    ///
    /// - [`MachineError::NotRunning`] if the machine was not started
    /// - [`MachineError::TransitionInProgress`] if another transition is running
    /// - [`MachineError::FinalState`] if the current state is final
    /// - [`MachineError::InvalidState`] if `target` does not resolve
    /// - [`MachineError::TransitionRejected`] if the guard refuses the move
    /// - a hook failure, [`MachineError::Cancelled`] or [`MachineError::SideEffect`]
    pub async fn transition(
        &self,
        target: impl Into<StateRef>,
        params: Value,
    ) -> Result<(), MachineError> {
        let target = target.into().settle();

        let (from, to, initial) = {
            let mut core = self.inner.core.lock();
            if !core.running {
                return Err(MachineError::NotRunning);
            }
            if core.transitioning {
                return Err(MachineError::TransitionInProgress);
            }
            if core.current.is_final() {
                return Err(MachineError::FinalState(core.current.name().to_string()));
            }
            let to = core.registry.resolve(&target)?;
            if to.name() == core.current.name() {
                debug!(machine = %self.name(), state = %to.name(), "already in target state");
                return Ok(());
            }
            core.transitioning = true;
            (
                core.current.clone(),
                to,
                core.registry.initial_name().to_string(),
            )
        };
        let lease = TransitionLease { inner: &self.inner };
        let started = Instant::now();
        let cancel = self.cancellation_token();

        if !TransitionGuard::new(&initial).check(&from, &to) {
            drop(lease);
            debug!(machine = %self.name(), from = %from.name(), to = %to.name(), "transition rejected");
            self.emit_transition(TransitionEventKind::Cancel, &from, &to, &params, None, None);
            return Err(MachineError::TransitionRejected {
                from: from.name().to_string(),
                to: to.name().to_string(),
            });
        }

        self.emit_transition(TransitionEventKind::Begin, &from, &to, &params, None, None);
        let args = HookArgs::new(self.clone(), from.name(), to.name(), params.clone());

        if !from.is_null() {
            if let Err(err) =
                run_phase(&self.inner.hooks, from.name(), Phase::Leave, args.clone(), &cancel).await
            {
                let err = MachineError::from_hook(Phase::Leave, from.name(), from.name(), to.name(), err);
                drop(lease);
                self.emit_transition(TransitionEventKind::Error, &from, &to, &params, Some(&err), None);
                if err.is_side_effect() {
                    self.force_error(err.clone(), from.name(), to.name(), params).await;
                }
                return Err(err);
            }
            self.halt_scope(from.name());
        }

        if let Err(err) =
            run_phase(&self.inner.hooks, to.name(), Phase::Enter, args.clone(), &cancel).await
        {
            let err = MachineError::from_hook(Phase::Enter, to.name(), from.name(), to.name(), err);
            drop(lease);
            self.emit_transition(TransitionEventKind::Error, &from, &to, &params, Some(&err), None);
            if err.is_side_effect() {
                self.force_error(err.clone(), from.name(), to.name(), params).await;
            } else if !err.is_cancelled() {
                self.resume(&from, &to, args.with_error(err.clone())).await;
            }
            return Err(err);
        }

        {
            let mut core = self.inner.core.lock();
            if !core.running {
                // Stopped while hooks were pending; nothing to commit.
                return Err(MachineError::Cancelled {
                    from: from.name().to_string(),
                    to: to.name().to_string(),
                });
            }
            core.current = to.clone();
            core.history.record(to.name());
        }
        drop(lease);
        debug!(machine = %self.name(), from = %from.name(), to = %to.name(), "transition committed");

        self.finish(&to, args).await;

        let elapsed = started.elapsed();
        self.emit_transition(TransitionEventKind::End, &from, &to, &params, None, Some(elapsed));
        if to.is_final() {
            info!(machine = %self.name(), state = %to.name(), "final state reached");
            self.inner.events.emit(MachineEvent::Final {
                state: to.name().to_string(),
            });
        }
        Ok(())
    }

    /// Run `resume` hooks on the state that stays current after a failed
    /// enter. If they fail too the machine is forced into ERROR.
    async fn resume(&self, from: &StateDefinition, to: &StateDefinition, args: HookArgs) {
        if from.is_null() {
            return;
        }
        let cancel = self.cancellation_token();
        if let Err(err) = run_phase(&self.inner.hooks, from.name(), Phase::Resume, args.clone(), &cancel).await
        {
            let err = MachineError::from_hook(Phase::Resume, from.name(), from.name(), to.name(), err);
            warn!(machine = %self.name(), state = %from.name(), error = %err, "resume failed");
            self.force_error(err, from.name(), to.name(), args.params).await;
        }
    }

    /// Run `done` hooks for a state that was just entered. Failures are
    /// logged and do not affect the committed transition.
    async fn finish(&self, state: &StateDefinition, args: HookArgs) {
        let cancel = self.cancellation_token();
        if let Err(err) = run_phase(&self.inner.hooks, state.name(), Phase::Done, args, &cancel).await {
            warn!(machine = %self.name(), state = %state.name(), error = %err, "done hook failed");
        }
        self.inner.events.emit(MachineEvent::Done {
            state: state.name().to_string(),
        });
    }

    /// Put the machine into ERROR outside the normal transition flow.
    ///
    /// ERROR's `done` hooks receive `cause`. Does nothing if the machine
    /// was stopped in the meantime or is already in ERROR.
    pub(crate) async fn force_error(&self, cause: MachineError, from: &str, to: &str, params: Value) {
        let error = {
            let mut core = self.inner.core.lock();
            if !core.running || core.current.is_error() {
                return;
            }
            let error = core.registry.error();
            core.current = error.clone();
            error
        };

        warn!(machine = %self.name(), from = %from, to = %to, error = %cause, "forced into ERROR");
        self.inner.events.emit(MachineEvent::Error {
            error: cause.clone(),
        });
        let args = HookArgs::new(self.clone(), from, to, params).with_error(cause);
        self.finish(&error, args).await;
    }

    pub(crate) fn emit_transition(
        &self,
        kind: TransitionEventKind,
        from: &Arc<StateDefinition>,
        to: &Arc<StateDefinition>,
        params: &Value,
        error: Option<&MachineError>,
        elapsed: Option<Duration>,
    ) {
        self.inner.events.emit(MachineEvent::Transition(TransitionEvent {
            kind,
            from: from.name().to_string(),
            to: to.name().to_string(),
            params: params.clone(),
            error: error.cloned(),
            elapsed,
        }));
    }
}

#[cfg(test)]
mod tests {
    use crate::hooks::{Hook, HookError, Verdict};
    use crate::{MachineError, StateBuilder, StateMachine};
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Hook) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let make = move |label: &str| {
            let sink = sink.clone();
            let label = label.to_string();
            Hook::from_fn(move |_| {
                sink.lock().push(label.clone());
                Ok(Verdict::Continue)
            })
        };
        (log, make)
    }

    #[tokio::test]
    async fn hooks_run_leave_then_enter_then_done() {
        let (log, hook) = recorder();
        let machine = StateMachine::builder()
            .autostart(false)
            .state(
                StateBuilder::new("A", 0)
                    .next(["B"])
                    .on_leave(hook("A/leave"))
                    .on_done(hook("A/done")),
            )
            .state(
                StateBuilder::new("B", 1)
                    .on_enter(hook("B/enter"))
                    .on_done(hook("B/done")),
            )
            .build()
            .unwrap();

        machine.start().await.unwrap();
        machine.transition("B", Value::Null).await.unwrap();

        assert_eq!(*log.lock(), vec!["A/done", "A/leave", "B/enter", "B/done"]);
    }

    #[tokio::test]
    async fn self_transition_runs_no_hooks() {
        let (log, hook) = recorder();
        let machine = StateMachine::builder()
            .autostart(false)
            .state(StateBuilder::new("A", 0).on_leave(hook("A/leave")).on_enter(hook("A/enter")))
            .build()
            .unwrap();

        machine.start().await.unwrap();
        log.lock().clear();
        machine.transition("A", Value::Null).await.unwrap();

        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn hooks_see_params() {
        let seen = Arc::new(Mutex::new(Value::Null));
        let sink = seen.clone();
        let machine = StateMachine::builder()
            .autostart(false)
            .state(StateBuilder::new("A", 0))
            .state(StateBuilder::new("B", 1).on_enter(Hook::from_fn(move |args| {
                *sink.lock() = args.params().clone();
                Ok(Verdict::Continue)
            })))
            .build()
            .unwrap();

        machine.start().await.unwrap();
        machine.transition("B", json!({ "port": 80 })).await.unwrap();

        assert_eq!(*seen.lock(), json!({ "port": 80 }));
    }

    #[tokio::test]
    async fn resume_hook_sees_enter_failure() {
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let machine = StateMachine::builder()
            .autostart(false)
            .state(StateBuilder::new("A", 0).on_resume(Hook::from_fn(move |args| {
                *sink.lock() = args.error().map(|err| err.to_string());
                Ok(Verdict::Continue)
            })))
            .state(
                StateBuilder::new("B", 1)
                    .on_enter(Hook::from_fn(|_| Err(HookError::failed("refused")))),
            )
            .build()
            .unwrap();

        machine.start().await.unwrap();
        let err = machine.transition("B", Value::Null).await.unwrap_err();

        assert!(matches!(err, MachineError::HookFailed { .. }));
        assert!(machine.is_current("A"));
        assert_eq!(
            seen.lock().as_deref(),
            Some("enter hook of state 'B' failed: refused")
        );
    }

    #[tokio::test]
    async fn failing_resume_forces_error() {
        let machine = StateMachine::builder()
            .autostart(false)
            .state(
                StateBuilder::new("A", 0)
                    .on_resume(Hook::from_fn(|_| Err(HookError::failed("cannot resume")))),
            )
            .state(StateBuilder::new("B", 1).on_enter(Hook::from_fn(|_| Ok(Verdict::Veto))))
            .build()
            .unwrap();

        machine.start().await.unwrap();
        let err = machine.transition("B", Value::Null).await.unwrap_err();

        assert!(matches!(
            err,
            MachineError::HookFailed { source: HookError::Vetoed, .. }
        ));
        assert!(machine.is_current("ERROR"));
    }

    #[tokio::test]
    async fn failing_done_hook_keeps_commit() {
        let machine = StateMachine::builder()
            .autostart(false)
            .state(StateBuilder::new("A", 0))
            .state(
                StateBuilder::new("B", 1)
                    .on_done(Hook::from_fn(|_| Err(HookError::failed("ignored")))),
            )
            .build()
            .unwrap();

        machine.start().await.unwrap();
        machine.transition("B", Value::Null).await.unwrap();
        assert!(machine.is_current("B"));
    }

    #[tokio::test]
    async fn flag_is_cleared_before_done_hooks() {
        let observed = Arc::new(Mutex::new(None));
        let sink = observed.clone();
        let machine = StateMachine::builder()
            .autostart(false)
            .state(StateBuilder::new("A", 0).on_done(Hook::from_fn(move |args| {
                *sink.lock() = Some(args.machine().is_transitioning());
                Ok(Verdict::Continue)
            })))
            .build()
            .unwrap();

        machine.start().await.unwrap();
        assert_eq!(*observed.lock(), Some(false));
    }
}
