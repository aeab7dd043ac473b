//! Registration-time validation of action descriptors.
//!
//! Only literal parameters are checked; derived ones are trusted until they
//! are evaluated at execution time. Every violation is collected rather than
//! stopping at the first.

use super::descriptor::ActionDescriptor;
use crate::core::StateRegistry;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;
use thiserror::Error;

/// A problem found in an action descriptor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActionViolation {
    #[error("{param} names unknown state '{state}'")]
    UnknownState { param: &'static str, state: String },

    #[error("pending state '{pending}' is not reachable from any of {when:?}")]
    PendingUnreachable { pending: String, when: Vec<String> },

    #[error("{param} state '{target}' is not reachable from any of {from:?}")]
    TargetUnreachable {
        param: &'static str,
        target: String,
        from: Vec<String>,
    },
}

type Check = Validation<(), NonEmptyVec<ActionViolation>>;

/// Validate an action's literal parameters against the registry.
pub(crate) fn validate(action: &ActionDescriptor, registry: &StateRegistry) -> Check {
    let mut checks: Vec<Check> = Vec::new();

    let when = action.when().literal().unwrap_or(&[]).to_vec();
    for state in &when {
        checks.push(known(registry, "when", state));
    }

    let literal = |param: &'static str, target: Option<&str>| target.map(|t| (param, t.to_string()));
    let pending = literal("pending", action.pending().and_then(|t| t.literal()));
    let outcomes = [
        literal("resolved", action.resolved().and_then(|t| t.literal())),
        literal("rejected", action.rejected().and_then(|t| t.literal())),
        literal("finally", action.finally().and_then(|t| t.literal())),
    ];

    if let Some((param, state)) = &pending {
        let check = known(registry, *param, state);
        let is_known = check.is_success();
        checks.push(check);
        if is_known && !when.is_empty() && !reachable(registry, &when, state) {
            checks.push(Validation::fail(ActionViolation::PendingUnreachable {
                pending: state.clone(),
                when: when.clone(),
            }));
        }
    }

    // Outcomes start from pending when it is a known literal, else from `when`.
    let origin: Vec<String> = match &pending {
        Some((_, state)) if registry.get(state).is_some() => vec![state.clone()],
        Some(_) => Vec::new(),
        None => when.clone(),
    };

    for (param, target) in outcomes.into_iter().flatten() {
        let check = known(registry, param, &target);
        let is_known = check.is_success();
        checks.push(check);
        if is_known && !origin.is_empty() && !reachable(registry, &origin, &target) {
            checks.push(Validation::fail(ActionViolation::TargetUnreachable {
                param,
                target,
                from: origin.clone(),
            }));
        }
    }

    Validation::all_vec(checks).map(|_| ())
}

fn known(registry: &StateRegistry, param: &'static str, state: &str) -> Check {
    if registry.get(state).is_some() {
        Validation::success(())
    } else {
        Validation::fail(ActionViolation::UnknownState {
            param,
            state: state.to_string(),
        })
    }
}

/// Whether `target` is one of `from` or a declared successor of one.
/// Unknown origins are reported separately and count as reachable here.
fn reachable(registry: &StateRegistry, from: &[String], target: &str) -> bool {
    from.iter().any(|origin| {
        origin == target
            || registry
                .get(origin)
                .map_or(true, |state| state.is_error() || state.next().statically_admits(target))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::descriptor::{ActionCall, ActionError, ActionPolicy, ActionTarget, When};
    use crate::core::{Next, StateDefinition};
    use futures::FutureExt;
    use serde_json::Value;
    use std::sync::Arc;

    fn def(name: &str, value: i64, next: Next) -> StateDefinition {
        StateDefinition {
            name: name.to_string(),
            value: Some(value),
            alias: None,
            title: name.to_string(),
            initial: false,
            is_final: false,
            next,
        }
    }

    fn registry() -> StateRegistry {
        StateRegistry::new(vec![
            def("Disconnected", 0, Next::states(["Connecting"])),
            def("Connecting", 1, Next::states(["Connected", "Disconnected"])),
            def("Connected", 2, Next::states(["Disconnected"])),
        ])
        .unwrap()
    }

    fn action() -> ActionDescriptor {
        ActionDescriptor {
            name: "connect".into(),
            alias: None,
            inject_method: true,
            when: When::default(),
            pending: None,
            resolved: None,
            rejected: None,
            finally: None,
            policy: ActionPolicy::default(),
            execute: Arc::new(|_: ActionCall| async { Ok::<_, ActionError>(Value::Null) }.boxed()),
        }
    }

    #[test]
    fn well_formed_action_passes() {
        let action = ActionDescriptor {
            when: When::States(vec!["Disconnected".into()]),
            pending: Some("Connecting".into()),
            resolved: Some("Connected".into()),
            rejected: Some("Disconnected".into()),
            ..action()
        };
        assert!(validate(&action, &registry()).is_success());
    }

    #[test]
    fn unknown_states_are_all_reported() {
        let action = ActionDescriptor {
            when: When::States(vec!["Nowhere".into()]),
            resolved: Some("Elsewhere".into()),
            ..action()
        };

        match validate(&action, &registry()) {
            Validation::Failure(errors) => {
                assert_eq!(errors.len(), 2);
                assert!(errors.iter().all(|e| matches!(e, ActionViolation::UnknownState { .. })));
            }
            Validation::Success(_) => panic!("Expected failures, got success"),
        }
    }

    #[test]
    fn unreachable_pending_is_rejected() {
        let action = ActionDescriptor {
            when: When::States(vec!["Connected".into()]),
            pending: Some("Connecting".into()),
            ..action()
        };

        match validate(&action, &registry()) {
            Validation::Failure(errors) => {
                assert!(errors
                    .iter()
                    .any(|e| matches!(e, ActionViolation::PendingUnreachable { .. })));
            }
            Validation::Success(_) => panic!("Expected failures, got success"),
        }
    }

    #[test]
    fn outcome_must_be_reachable_from_pending() {
        let action = ActionDescriptor {
            pending: Some("Connected".into()),
            resolved: Some("Connecting".into()),
            ..action()
        };

        match validate(&action, &registry()) {
            Validation::Failure(errors) => {
                assert_eq!(errors.len(), 1);
                assert!(matches!(
                    errors.iter().next(),
                    Some(ActionViolation::TargetUnreachable { param: "resolved", .. })
                ));
            }
            Validation::Success(_) => panic!("Expected failures, got success"),
        }
    }

    #[test]
    fn error_is_always_reachable() {
        let action = ActionDescriptor {
            when: When::States(vec!["Connected".into()]),
            rejected: Some("ERROR".into()),
            ..action()
        };
        assert!(validate(&action, &registry()).is_success());
    }

    #[test]
    fn derived_parameters_are_not_checked() {
        let action = ActionDescriptor {
            when: When::Derived(Arc::new(|_: &str| vec!["Nowhere".into()])),
            resolved: Some(ActionTarget::derived(|_| Some("Elsewhere".into()))),
            ..action()
        };
        assert!(validate(&action, &registry()).is_success());
    }
}
