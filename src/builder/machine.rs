//! Builder for constructing state machines.

use crate::builder::action::ActionBuilder;
use crate::builder::state::StateBuilder;
use crate::core::StateRegistry;
use crate::effects::{
    Context, MachineEvent, Observer, ParentLink, StateMachine, TransitionEventKind,
};
use crate::error::MachineError;
use crate::options::MachineOptions;
use std::sync::Arc;
use tracing::warn;

/// Builder for constructing state machines with a fluent API.
///
/// Declaring a state or action whose name was already declared replaces
/// the earlier declaration.
#[derive(Clone, Default)]
pub struct StateMachineBuilder {
    options: MachineOptions,
    states: Vec<StateBuilder>,
    actions: Vec<ActionBuilder>,
    context: Option<Context>,
    observers: Vec<Observer>,
}

impl StateMachineBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all options at once.
    pub fn options(mut self, options: MachineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.options.name = name.into();
        self
    }

    /// Start as soon as the machine is built (default). Requires a Tokio
    /// runtime; without one the machine stays stopped.
    pub fn autostart(mut self, autostart: bool) -> Self {
        self.options.autostart = autostart;
        self
    }

    /// Keep the last `capacity` entered states.
    pub fn history(mut self, capacity: usize) -> Self {
        self.options.history = capacity;
        self
    }

    pub fn inject_action_methods(mut self, inject: bool) -> Self {
        self.options.inject_action_methods = inject;
        self
    }

    pub fn throw_action_error(mut self, throw: bool) -> Self {
        self.options.throw_action_error = throw;
        self
    }

    pub fn inject_state_values(mut self, inject: bool) -> Self {
        self.options.inject_state_values = inject;
        self
    }

    /// Add a state.
    pub fn state(mut self, state: StateBuilder) -> Self {
        self.states.retain(|existing| existing.name() != state.name());
        self.states.push(state);
        self
    }

    /// Add multiple states at once.
    pub fn states(self, states: impl IntoIterator<Item = StateBuilder>) -> Self {
        states.into_iter().fold(self, Self::state)
    }

    /// Add an action.
    pub fn action(mut self, action: ActionBuilder) -> Self {
        self.actions.retain(|existing| existing.name() != action.name());
        self.actions.push(action);
        self
    }

    /// Add multiple actions at once.
    pub fn actions(self, actions: impl IntoIterator<Item = ActionBuilder>) -> Self {
        actions.into_iter().fold(self, Self::action)
    }

    /// Shared context handed to hooks and actions.
    pub fn context<T: Send + Sync + 'static>(mut self, context: Arc<T>) -> Self {
        self.context = Some(context as Context);
        self
    }

    /// Observe every machine event.
    pub fn observe<F>(mut self, observer: F) -> Self
    where
        F: Fn(&MachineEvent) + Send + Sync + 'static,
    {
        self.observers.push(Arc::new(observer));
        self
    }

    /// Observe every transition event.
    pub fn on_transition<F>(self, f: F) -> Self
    where
        F: Fn(&crate::effects::TransitionEvent) + Send + Sync + 'static,
    {
        self.observe(move |event| {
            if let Some(transition) = event.as_transition() {
                f(transition);
            }
        })
    }

    pub fn on_transition_begin<F>(self, f: F) -> Self
    where
        F: Fn(&crate::effects::TransitionEvent) + Send + Sync + 'static,
    {
        self.on_transition_kind(TransitionEventKind::Begin, f)
    }

    pub fn on_transition_end<F>(self, f: F) -> Self
    where
        F: Fn(&crate::effects::TransitionEvent) + Send + Sync + 'static,
    {
        self.on_transition_kind(TransitionEventKind::End, f)
    }

    pub fn on_transition_cancel<F>(self, f: F) -> Self
    where
        F: Fn(&crate::effects::TransitionEvent) + Send + Sync + 'static,
    {
        self.on_transition_kind(TransitionEventKind::Cancel, f)
    }

    pub fn on_transition_error<F>(self, f: F) -> Self
    where
        F: Fn(&crate::effects::TransitionEvent) + Send + Sync + 'static,
    {
        self.on_transition_kind(TransitionEventKind::Error, f)
    }

    fn on_transition_kind<F>(self, kind: TransitionEventKind, f: F) -> Self
    where
        F: Fn(&crate::effects::TransitionEvent) + Send + Sync + 'static,
    {
        self.on_transition(move |transition| {
            if transition.kind == kind {
                f(transition);
            }
        })
    }

    /// Build the state machine.
    ///
    /// Returns an error if a state or action is malformed. With autostart
    /// enabled the machine is started on the current Tokio runtime; await
    /// [`StateMachine::wait_for_initial`] to know when it got there.
    pub fn build(self) -> Result<StateMachine, MachineError> {
        let autostart = self.options.autostart;
        let machine = self.assemble(None, None)?;

        if autostart {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let starting = machine.clone();
                    runtime.spawn(async move {
                        if let Err(err) = starting.start().await {
                            warn!(machine = %starting.name(), error = %err, "autostart failed");
                        }
                    });
                }
                Err(_) => {
                    warn!(machine = %machine.name(), "autostart requested outside a Tokio runtime");
                }
            }
        }
        Ok(machine)
    }

    /// Build a machine nested in a parent state. Never autostarts.
    pub(crate) fn build_nested(
        mut self,
        parent: ParentLink,
        context: Option<Context>,
    ) -> Result<StateMachine, MachineError> {
        self.options.autostart = false;
        self.assemble(context, Some(parent))
    }

    fn assemble(
        self,
        inherited: Option<Context>,
        parent: Option<ParentLink>,
    ) -> Result<StateMachine, MachineError> {
        let mut definitions = Vec::with_capacity(self.states.len());
        let mut bindings = Vec::new();
        let mut scopes = Vec::new();

        for state in self.states {
            let parts = state.into_parts()?;
            let name = parts.definition.name().to_string();
            if let Some(scope) = parts.scope {
                scopes.push((name.clone(), scope));
            }
            bindings.push((name, parts.hooks));
            definitions.push(parts.definition);
        }

        let registry = StateRegistry::new(definitions)?;
        let context = inherited.or(self.context);
        let machine = StateMachine::assemble(self.options, registry, context, parent);

        for (name, hooks) in bindings {
            for (phase, hook) in hooks {
                machine.on(&name, phase, hook);
            }
        }
        for observer in self.observers {
            machine.inner.events.observe(observer);
        }
        for (name, scope) in scopes {
            machine.create_scope(&name, scope)?;
        }
        for action in self.actions {
            machine.register(action)?;
        }
        Ok(machine)
    }
}
