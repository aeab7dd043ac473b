//! Actions exposed as callable methods.
//!
//! Calling a method defers the action to a spawned task that first yields,
//! so the caller continues before the action starts. The returned
//! [`PendingAction`] resolves to the action's result.

use crate::effects::StateMachine;
use crate::error::MachineError;
use serde_json::Value;
use std::collections::HashMap;
use tokio::task::JoinHandle;
use tracing::warn;

/// Names owned by the machine's own API.
const RESERVED: &[&str] = &[
    "start",
    "stop",
    "reset",
    "cancel",
    "transition",
    "execute",
    "register",
    "unregister",
    "add",
    "remove",
    "current",
    "initial",
    "history",
    "states",
    "actions",
    "get_state",
    "is_valid",
    "is_current",
    "is_final",
    "is_running",
    "is_transitioning",
    "can_transition",
    "can_transition_to",
    "wait_for_state",
    "wait_for_initial",
    "on",
    "off",
    "subscribe",
    "observe",
];

enum Slot {
    Reserved,
    Action(String),
}

/// Method name to action name, with the runtime API pre-reserved.
pub(crate) struct MethodTable {
    slots: HashMap<String, Slot>,
}

impl MethodTable {
    pub(crate) fn with_reserved() -> Self {
        Self {
            slots: RESERVED
                .iter()
                .map(|name| (name.to_string(), Slot::Reserved))
                .collect(),
        }
    }

    pub(crate) fn install(&mut self, method: &str, action: &str) -> Result<(), MachineError> {
        if self.slots.contains_key(method) {
            return Err(MachineError::MethodConflict(method.to_string()));
        }
        self.slots
            .insert(method.to_string(), Slot::Action(action.to_string()));
        Ok(())
    }

    pub(crate) fn remove_action(&mut self, action: &str) {
        self.slots
            .retain(|_, slot| !matches!(slot, Slot::Action(name) if name == action));
    }

    pub(crate) fn resolve(&self, method: &str) -> Option<&str> {
        match self.slots.get(method)? {
            Slot::Action(action) => Some(action),
            Slot::Reserved => None,
        }
    }
}

/// An action bound to its machine, callable without awaiting.
#[derive(Clone)]
pub struct ActionMethod {
    machine: StateMachine,
    method: String,
    action: String,
}

impl ActionMethod {
    pub fn name(&self) -> &str {
        &self.method
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    /// Schedule the action and return immediately.
    ///
    /// Must be called from within a Tokio runtime. Failures are returned by
    /// [`PendingAction::wait`] only when `throw_action_error` is set;
    /// otherwise they are logged and the result is `Value::Null`.
    pub fn call(&self, args: Vec<Value>) -> PendingAction {
        let machine = self.machine.clone();
        let action = self.action.clone();
        let handle = tokio::spawn(async move {
            tokio::task::yield_now().await;
            match machine.execute(&action, args).await {
                Ok(value) => Ok(value),
                Err(err) if machine.options().throw_action_error => Err(err),
                Err(err) => {
                    warn!(machine = %machine.name(), action = %action, error = %err, "deferred action failed");
                    Ok(Value::Null)
                }
            }
        });
        PendingAction {
            action: self.action.clone(),
            handle,
        }
    }
}

/// Handle to a deferred action.
#[must_use = "a pending action reports its result only when awaited"]
pub struct PendingAction {
    action: String,
    handle: JoinHandle<Result<Value, MachineError>>,
}

impl PendingAction {
    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn wait(self) -> Result<Value, MachineError> {
        let PendingAction { action, handle } = self;
        match handle.await {
            Ok(result) => result,
            Err(join) => Err(MachineError::Scheduling {
                action,
                reason: join.to_string(),
            }),
        }
    }
}

impl StateMachine {
    /// The action exposed under `method`, if any.
    pub fn method(&self, method: &str) -> Option<ActionMethod> {
        let core = self.inner.core.lock();
        let action = core.methods.resolve(method)?.to_string();
        Some(ActionMethod {
            machine: self.clone(),
            method: method.to_string(),
            action,
        })
    }

    /// Call the action exposed under `method`.
    pub fn invoke(&self, method: &str, args: Vec<Value>) -> Result<PendingAction, MachineError> {
        self.method(method)
            .map(|bound| bound.call(args))
            .ok_or_else(|| MachineError::ActionNotFound(method.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_names_are_reserved() {
        let mut table = MethodTable::with_reserved();
        assert!(matches!(
            table.install("start", "start"),
            Err(MachineError::MethodConflict(name)) if name == "start"
        ));
        assert_eq!(table.resolve("start"), None);
    }

    #[test]
    fn install_and_remove_action() {
        let mut table = MethodTable::with_reserved();
        table.install("open", "connect").unwrap();
        assert_eq!(table.resolve("open"), Some("connect"));

        assert!(table.install("open", "other").is_err());

        table.remove_action("connect");
        assert_eq!(table.resolve("open"), None);
        table.install("open", "other").unwrap();
    }
}
