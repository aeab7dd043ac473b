//! Transition guard: decides whether one state may move to another.
//!
//! The guard is a pure predicate over two definitions. It is evaluated
//! without holding the machine lock because derived `next` lists run user
//! code.

use super::state::StateDefinition;

/// The reachability rule applied before every transition.
///
/// # Example
///
/// ```rust
/// use statehook::core::TransitionGuard;
/// use statehook::{StateBuilder, StateMachine};
///
/// let machine = StateMachine::builder()
///     .autostart(false)
///     .state(StateBuilder::new("Idle", 0).next(["Busy"]))
///     .state(StateBuilder::new("Busy", 1).next(["Idle"]))
///     .state(StateBuilder::new("Done", 2))
///     .build()
///     .unwrap();
///
/// let idle = machine.get_state("Idle").unwrap();
/// let busy = machine.get_state("Busy").unwrap();
/// let done = machine.get_state("Done").unwrap();
///
/// let guard = TransitionGuard::new("Idle");
/// assert!(guard.check(&idle, &busy));
/// assert!(!guard.check(&idle, &done));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TransitionGuard<'a> {
    initial: &'a str,
}

impl<'a> TransitionGuard<'a> {
    /// `initial` is the only state reachable from NULL.
    pub fn new(initial: &'a str) -> Self {
        Self { initial }
    }

    pub fn check(&self, from: &StateDefinition, to: &StateDefinition) -> bool {
        if from.is_null() {
            return to.name() == self.initial;
        }
        if from.is_final() {
            return false;
        }
        if to.is_error() {
            return true;
        }
        from.next().admits(to.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::Next;

    fn def(name: &str, next: Next) -> StateDefinition {
        StateDefinition {
            name: name.to_string(),
            value: Some(0),
            alias: None,
            title: name.to_string(),
            initial: false,
            is_final: false,
            next,
        }
    }

    #[test]
    fn null_only_reaches_initial() {
        let guard = TransitionGuard::new("Idle");
        let null = StateDefinition::null();

        assert!(guard.check(&null, &def("Idle", Next::Any)));
        assert!(!guard.check(&null, &def("Busy", Next::Any)));
        assert!(!guard.check(&null, &StateDefinition::error()));
    }

    #[test]
    fn final_states_reach_nothing() {
        let guard = TransitionGuard::new("Idle");
        let mut done = def("Done", Next::Any);
        done.is_final = true;

        assert!(!guard.check(&done, &def("Idle", Next::Any)));
        assert!(!guard.check(&StateDefinition::error(), &def("Idle", Next::Any)));
    }

    #[test]
    fn error_is_reachable_from_any_live_state() {
        let guard = TransitionGuard::new("Idle");
        let locked = def("Locked", Next::states(Vec::<String>::new()));

        assert!(guard.check(&locked, &StateDefinition::error()));
        assert!(!guard.check(&locked, &def("Idle", Next::Any)));
    }

    #[test]
    fn declared_next_is_respected() {
        let guard = TransitionGuard::new("Idle");
        let idle = def("Idle", Next::states(["Busy"]));

        assert!(guard.check(&idle, &def("Busy", Next::Any)));
        assert!(!guard.check(&idle, &def("Done", Next::Any)));
    }

    #[test]
    fn guard_is_deterministic() {
        let guard = TransitionGuard::new("Idle");
        let idle = def("Idle", Next::states(["Busy"]));
        let busy = def("Busy", Next::Any);

        assert_eq!(guard.check(&idle, &busy), guard.check(&idle, &busy));
    }
}
