//! Nested machines bound to the lifetime of a parent state.
//!
//! A scope starts after its parent state's `done` hooks fire. It stops once
//! every `leave` hook of the parent state has passed, or when the parent is
//! forced into ERROR.

use super::machine::{ParentLink, StateMachine};
use crate::builder::StateMachineBuilder;
use crate::core::ERROR_STATE;
use crate::error::MachineError;
use crate::hooks::{Hook, Phase, SubscriptionId, Verdict};
use std::sync::Arc;
use tracing::{debug, warn};

/// A nested machine and the parent subscriptions driving it.
pub(crate) struct ScopeEntry {
    pub(crate) machine: StateMachine,
    pub(crate) subscriptions: Vec<SubscriptionId>,
}

impl StateMachine {
    /// Nest a machine inside `state`.
    ///
    /// The nested machine never autostarts and shares this machine's
    /// context. Each state owns at most one scope.
    pub fn create_scope(
        &self,
        state: &str,
        builder: StateMachineBuilder,
    ) -> Result<StateMachine, MachineError> {
        let mut core = self.inner.core.lock();
        if core.registry.get(state).is_none() {
            return Err(MachineError::InvalidState(state.to_string()));
        }
        if core.scopes.contains_key(state) {
            return Err(MachineError::Configuration(format!(
                "state '{state}' already owns a nested scope"
            )));
        }

        let link = ParentLink {
            machine: Arc::downgrade(&self.inner),
            state: state.to_string(),
        };
        let child = builder.build_nested(link, self.inner.context.clone())?;

        let subscriptions = vec![
            self.inner.hooks.subscribe(Some(state), Phase::Done, start_scope(&child)),
            self.inner
                .hooks
                .subscribe(Some(ERROR_STATE), Phase::Done, stop_scope(&child)),
        ];
        core.scopes.insert(
            state.to_string(),
            ScopeEntry {
                machine: child.clone(),
                subscriptions,
            },
        );
        debug!(machine = %self.name(), state = %state, scope = %child.name(), "scope created");
        Ok(child)
    }

    /// Stop the scope owned by `state` after the parent left it.
    pub(crate) fn halt_scope(&self, state: &str) {
        let child = self.scope(state);
        if let Some(child) = child {
            child.halt(None);
        }
    }

    /// The nested machine owned by `state`, if any.
    pub fn scope(&self, state: &str) -> Option<StateMachine> {
        self.inner
            .core
            .lock()
            .scopes
            .get(state)
            .map(|entry| entry.machine.clone())
    }
}

fn start_scope(child: &StateMachine) -> Hook {
    let child = child.clone();
    Hook::new(move |_| {
        let child = child.clone();
        async move {
            if let Err(err) = child.start().await {
                warn!(scope = %child.name(), error = %err, "nested scope failed to start");
            }
            Ok(Verdict::Continue)
        }
    })
}

fn stop_scope(child: &StateMachine) -> Hook {
    let child = child.clone();
    Hook::from_fn(move |_| {
        child.halt(None);
        Ok(Verdict::Continue)
    })
}
