//! Builder for declaring states.

use crate::builder::error::BuildError;
use crate::builder::machine::StateMachineBuilder;
use crate::core::{Next, StateDefinition, ANY_STATE, ERROR_STATE, NULL_STATE};
use crate::hooks::{Hook, Phase};

/// A declared state split into what each part of the machine needs.
pub(crate) struct StateParts {
    pub(crate) definition: StateDefinition,
    pub(crate) hooks: Vec<(Phase, Hook)>,
    pub(crate) scope: Option<StateMachineBuilder>,
}

/// Builder for a single state declaration.
///
/// # Example
///
/// ```rust
/// use statehook::{Hook, StateBuilder, Verdict};
///
/// let connecting = StateBuilder::new("Connecting", 1)
///     .title("Connecting to server")
///     .next(["Connected", "Disconnected"])
///     .on_enter(Hook::from_fn(|_| Ok(Verdict::Continue)));
/// # let _ = connecting;
/// ```
#[derive(Clone, Default)]
pub struct StateBuilder {
    name: String,
    value: i64,
    alias: Option<String>,
    title: Option<String>,
    initial: bool,
    is_final: bool,
    next: Option<Next>,
    hooks: Vec<(Phase, Hook)>,
    scope: Option<StateMachineBuilder>,
}

impl StateBuilder {
    /// Declare a state with its unique name and numeric value.
    pub fn new(name: impl Into<String>, value: i64) -> Self {
        Self {
            name: name.into(),
            value,
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Alternative name the state resolves under.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Enter this state when the machine starts.
    pub fn initial(mut self) -> Self {
        self.initial = true;
        self
    }

    /// Refuse every outgoing transition until reset.
    pub fn final_state(mut self) -> Self {
        self.is_final = true;
        self
    }

    /// Allowed successors. `"*"` allows any state; an empty list allows
    /// only ERROR. Without a call the state is unrestricted.
    pub fn next<I, S>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.next = Some(Next::states(states));
        self
    }

    /// Compute allowed successors whenever a transition is attempted.
    pub fn next_with<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Vec<String> + Send + Sync + 'static,
    {
        self.next = Some(Next::derived(f));
        self
    }

    pub fn on(mut self, phase: Phase, hook: Hook) -> Self {
        self.hooks.push((phase, hook));
        self
    }

    pub fn on_enter(self, hook: Hook) -> Self {
        self.on(Phase::Enter, hook)
    }

    pub fn on_leave(self, hook: Hook) -> Self {
        self.on(Phase::Leave, hook)
    }

    pub fn on_done(self, hook: Hook) -> Self {
        self.on(Phase::Done, hook)
    }

    pub fn on_resume(self, hook: Hook) -> Self {
        self.on(Phase::Resume, hook)
    }

    /// Nest a machine that lives while this state is current.
    pub fn scope(mut self, machine: StateMachineBuilder) -> Self {
        self.scope = Some(machine);
        self
    }

    pub(crate) fn into_parts(self) -> Result<StateParts, BuildError> {
        if self.name.is_empty() {
            return Err(BuildError::MissingStateName);
        }
        if [NULL_STATE, ERROR_STATE, ANY_STATE].contains(&self.name.as_str()) {
            return Err(BuildError::ReservedStateName(self.name));
        }

        let definition = StateDefinition {
            title: self.title.unwrap_or_else(|| self.name.clone()),
            name: self.name,
            value: Some(self.value),
            alias: self.alias,
            initial: self.initial,
            is_final: self.is_final,
            next: self.next.unwrap_or_default(),
        };
        Ok(StateParts {
            definition,
            hooks: self.hooks,
            scope: self.scope,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::Verdict;

    #[test]
    fn defaults_are_filled_in() {
        let parts = StateBuilder::new("Idle", 0).into_parts().unwrap();
        let state = parts.definition;

        assert_eq!(state.name(), "Idle");
        assert_eq!(state.title(), "Idle");
        assert_eq!(state.value(), Some(0));
        assert!(!state.is_initial());
        assert!(!state.is_final());
        assert!(state.next().admits("Anything"));
    }

    #[test]
    fn empty_name_is_rejected() {
        assert!(matches!(
            StateBuilder::new("", 0).into_parts(),
            Err(BuildError::MissingStateName)
        ));
    }

    #[test]
    fn reserved_names_are_rejected() {
        for name in ["NULL", "ERROR", "*"] {
            assert!(matches!(
                StateBuilder::new(name, 0).into_parts(),
                Err(BuildError::ReservedStateName(n)) if n == name
            ));
        }
    }

    #[test]
    fn hooks_keep_declaration_order() {
        let ok = || Hook::from_fn(|_| Ok(Verdict::Continue));
        let parts = StateBuilder::new("Idle", 0)
            .on_done(ok())
            .on_enter(ok())
            .on_leave(ok())
            .into_parts()
            .unwrap();

        let phases: Vec<Phase> = parts.hooks.iter().map(|(phase, _)| *phase).collect();
        assert_eq!(phases, vec![Phase::Done, Phase::Enter, Phase::Leave]);
    }
}
