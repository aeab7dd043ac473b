//! The state machine handle and its lifecycle.

use super::events::{EventHub, MachineEvent, Observer};
use super::scope::ScopeEntry;
use crate::actions::{ActionDescriptor, MethodTable};
use crate::builder::{StateBuilder, StateMachineBuilder};
use crate::core::{
    HistoryBuffer, StateDefinition, StateRef, StateRegistry, TransitionGuard, ERROR_STATE,
};
use crate::error::MachineError;
use crate::hooks::{Hook, HookBus, Phase, SubscriptionId};
use crate::options::MachineOptions;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

/// Shared execution context handed to hooks and actions.
pub type Context = Arc<dyn Any + Send + Sync>;

/// Link from a nested machine back to the state that owns it.
pub(crate) struct ParentLink {
    pub(crate) machine: Weak<Inner>,
    pub(crate) state: String,
}

/// Mutable machine state. Guarded by a sync mutex that is never held
/// across an await.
pub(crate) struct Core {
    pub(crate) registry: StateRegistry,
    pub(crate) current: Arc<StateDefinition>,
    pub(crate) running: bool,
    pub(crate) transitioning: bool,
    pub(crate) history: HistoryBuffer,
    pub(crate) actions: HashMap<String, Arc<ActionDescriptor>>,
    pub(crate) methods: MethodTable,
    pub(crate) scopes: HashMap<String, ScopeEntry>,
}

pub(crate) struct Inner {
    pub(crate) id: Uuid,
    pub(crate) options: MachineOptions,
    pub(crate) core: Mutex<Core>,
    pub(crate) hooks: HookBus,
    pub(crate) events: EventHub,
    cancel: Mutex<CancellationToken>,
    pub(crate) context: Option<Context>,
    pub(crate) parent: Option<ParentLink>,
}

/// A running (or stoppable) finite state machine.
///
/// `StateMachine` is a cheap handle; clones share the same machine. Async
/// operations (`start`, `transition`, `execute`) may be awaited from any
/// task, while queries are synchronous snapshots.
///
/// # Example
///
/// ```rust
/// use statehook::{StateBuilder, StateMachine};
/// use serde_json::Value;
///
/// # let rt = tokio::runtime::Runtime::new().unwrap();
/// # rt.block_on(async {
/// let machine = StateMachine::builder()
///     .name("door")
///     .autostart(false)
///     .state(StateBuilder::new("Closed", 0).next(["Open"]))
///     .state(StateBuilder::new("Open", 1).next(["Closed"]))
///     .build()
///     .unwrap();
///
/// machine.start().await.unwrap();
/// assert!(machine.is_current("Closed"));
///
/// machine.transition("Open", Value::Null).await.unwrap();
/// assert_eq!(machine.current().name(), "Open");
/// # });
/// ```
#[derive(Clone)]
pub struct StateMachine {
    pub(crate) inner: Arc<Inner>,
}

impl StateMachine {
    pub fn builder() -> StateMachineBuilder {
        StateMachineBuilder::new()
    }

    pub(crate) fn assemble(
        options: MachineOptions,
        registry: StateRegistry,
        context: Option<Context>,
        parent: Option<ParentLink>,
    ) -> Self {
        let events = EventHub::new(options.event_capacity);
        let history = HistoryBuffer::new(options.history);
        let core = Core {
            registry,
            current: Arc::new(StateDefinition::null()),
            running: false,
            transitioning: false,
            history,
            actions: HashMap::new(),
            methods: MethodTable::with_reserved(),
            scopes: HashMap::new(),
        };
        Self {
            inner: Arc::new(Inner {
                id: Uuid::new_v4(),
                options,
                core: Mutex::new(core),
                hooks: HookBus::default(),
                events,
                cancel: Mutex::new(CancellationToken::new()),
                context,
                parent,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.options.name
    }

    pub fn options(&self) -> &MachineOptions {
        &self.inner.options
    }

    // Lifecycle

    /// Start the machine and enter the initial state.
    ///
    /// Starting a running machine is a no-op. If entering the initial state
    /// fails the machine is stopped again, the failure is attached to the
    /// STOP event and returned.
    pub async fn start(&self) -> Result<(), MachineError> {
        let initial = {
            let mut core = self.inner.core.lock();
            if core.running {
                return Ok(());
            }
            core.running = true;
            core.registry.initial_name().to_string()
        };

        info!(machine = %self.name(), id = %self.inner.id, "state machine started");
        self.inner.events.emit(MachineEvent::Start);

        if let Err(err) = self.transition(initial.as_str(), serde_json::Value::Null).await {
            self.halt(Some(err.clone()));
            return Err(err);
        }
        Ok(())
    }

    /// Stop the machine, cancelling any in-flight transition.
    pub fn stop(&self) -> Result<(), MachineError> {
        if self.halt(None) {
            Ok(())
        } else {
            Err(MachineError::NotRunning)
        }
    }

    /// Stop, then start again from the initial state.
    pub async fn reset(&self) -> Result<(), MachineError> {
        self.stop()?;
        self.start().await
    }

    /// Raise the cancellation signal observed by waiting hooks.
    ///
    /// Machine state is left alone; a transition whose hook was interrupted
    /// fails with [`MachineError::Cancelled`]. Later transitions use a fresh
    /// token.
    pub fn cancel(&self) {
        let mut token = self.inner.cancel.lock();
        token.cancel();
        *token = CancellationToken::new();
    }

    pub(crate) fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancel.lock().clone()
    }

    /// Stop a running machine. Returns false if it was not running.
    pub(crate) fn halt(&self, cause: Option<MachineError>) -> bool {
        let (was_transitioning, scopes) = {
            let mut core = self.inner.core.lock();
            if !core.running {
                return false;
            }
            core.running = false;
            core.current = Arc::new(StateDefinition::null());
            let scopes: Vec<StateMachine> =
                core.scopes.values().map(|scope| scope.machine.clone()).collect();
            (core.transitioning, scopes)
        };

        if was_transitioning {
            self.cancel();
        }
        for scope in scopes {
            scope.halt(None);
        }

        match &cause {
            Some(err) => info!(machine = %self.name(), error = %err, "state machine stopped"),
            None => info!(machine = %self.name(), "state machine stopped"),
        }
        self.inner.events.emit(MachineEvent::Stop { error: cause });
        true
    }

    // Queries

    pub fn current(&self) -> Arc<StateDefinition> {
        self.inner.core.lock().current.clone()
    }

    pub fn current_value(&self) -> Option<i64> {
        self.inner.core.lock().current.value()
    }

    pub fn initial(&self) -> Arc<StateDefinition> {
        let core = self.inner.core.lock();
        core.registry
            .initial()
            .cloned()
            .unwrap_or_else(|| Arc::new(StateDefinition::null()))
    }

    pub fn is_running(&self) -> bool {
        self.inner.core.lock().running
    }

    pub fn is_transitioning(&self) -> bool {
        self.inner.core.lock().transitioning
    }

    /// Whether the current state is final.
    pub fn is_final(&self) -> bool {
        self.inner.core.lock().current.is_final()
    }

    /// Resolve any reference to its registered definition.
    pub fn get_state(&self, reference: impl Into<StateRef>) -> Result<Arc<StateDefinition>, MachineError> {
        let reference = reference.into().settle();
        self.inner.core.lock().registry.resolve(&reference)
    }

    pub fn is_valid(&self, reference: impl Into<StateRef>) -> bool {
        self.get_state(reference).is_ok()
    }

    pub fn is_current(&self, reference: impl Into<StateRef>) -> bool {
        let reference = reference.into().settle();
        self.current().matches(&reference)
    }

    /// Run `f` with the current state if it matches `reference`.
    pub fn when_current<F, R>(&self, reference: impl Into<StateRef>, f: F) -> Option<R>
    where
        F: FnOnce(&StateDefinition) -> R,
    {
        let reference = reference.into().settle();
        let current = self.current();
        current.matches(&reference).then(|| f(&current))
    }

    /// Whether the guard would accept a transition from the current state.
    pub fn can_transition_to(&self, to: impl Into<StateRef>) -> bool {
        let to = to.into().settle();
        let (from, to, initial) = {
            let core = self.inner.core.lock();
            match core.registry.resolve(&to) {
                Ok(to) => (
                    core.current.clone(),
                    to,
                    core.registry.initial_name().to_string(),
                ),
                Err(_) => return false,
            }
        };
        TransitionGuard::new(&initial).check(&from, &to)
    }

    /// Whether the guard would accept a transition between two states.
    pub fn can_transition(
        &self,
        from: impl Into<StateRef>,
        to: impl Into<StateRef>,
    ) -> Result<bool, MachineError> {
        let from = self.get_state(from)?;
        let to = self.get_state(to)?;
        let initial = self.initial();
        Ok(TransitionGuard::new(initial.name()).check(&from, &to))
    }

    /// Snapshot of the history buffer.
    pub fn history(&self) -> HistoryBuffer {
        self.inner.core.lock().history.clone()
    }

    /// Registered state names, `ERROR` last.
    pub fn states(&self) -> Vec<String> {
        self.inner.core.lock().registry.names()
    }

    /// Registered action names, sorted.
    pub fn actions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.core.lock().actions.keys().cloned().collect();
        names.sort();
        names
    }

    /// Value of the state whose upper-cased name is `key`.
    ///
    /// Returns `None` when state value constants are disabled.
    pub fn constant(&self, key: &str) -> Option<i64> {
        if !self.inner.options.inject_state_values {
            return None;
        }
        self.inner.core.lock().registry.constant(key)
    }

    pub fn context<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.inner.context.clone()?.downcast::<T>().ok()
    }

    pub fn raw_context(&self) -> Option<Context> {
        self.inner.context.clone()
    }

    /// The machine owning this one, for nested scopes.
    pub fn parent(&self) -> Option<StateMachine> {
        let link = self.inner.parent.as_ref()?;
        link.machine.upgrade().map(|inner| StateMachine { inner })
    }

    /// The parent state this machine is nested in.
    pub fn parent_state(&self) -> Option<&str> {
        self.inner.parent.as_ref().map(|link| link.state.as_str())
    }

    // Subscriptions

    /// Bind a hook to `phase` of `state`.
    pub fn on(&self, state: &str, phase: Phase, hook: Hook) -> SubscriptionId {
        self.inner.hooks.subscribe(Some(state), phase, hook)
    }

    /// Bind a hook to `phase` of every state.
    pub fn on_any(&self, phase: Phase, hook: Hook) -> SubscriptionId {
        self.inner.hooks.subscribe(None, phase, hook)
    }

    pub fn off(&self, id: SubscriptionId) -> bool {
        self.inner.hooks.unsubscribe(id)
    }

    /// Register a synchronous observer for every machine event.
    pub fn observe<F>(&self, observer: F)
    where
        F: Fn(&MachineEvent) + Send + Sync + 'static,
    {
        self.inner.events.observe(Arc::new(observer) as Observer);
    }

    /// Receive machine events over a broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<MachineEvent> {
        self.inner.events.subscribe()
    }

    /// Resolve once `state` has been entered and its done hooks ran.
    ///
    /// Resolves immediately if the machine is already there.
    pub async fn wait_for_state(&self, state: impl Into<StateRef>) -> Result<(), MachineError> {
        let target = self.get_state(state)?;
        let mut events = self.subscribe();
        if self.current().name() == target.name() {
            return Ok(());
        }
        loop {
            match events.recv().await {
                Ok(MachineEvent::Done { state }) if state == target.name() => return Ok(()),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    debug!(machine = %self.name(), skipped, "event receiver lagged");
                    if self.current().name() == target.name() {
                        return Ok(());
                    }
                }
                Err(RecvError::Closed) => return Err(MachineError::NotRunning),
            }
        }
    }

    pub async fn wait_for_initial(&self) -> Result<(), MachineError> {
        let initial = self.initial().name().to_string();
        self.wait_for_state(initial).await
    }

    // Live registry changes

    /// Register a state on a built machine and bind its hooks.
    pub fn add(&self, state: StateBuilder) -> Result<Arc<StateDefinition>, MachineError> {
        let parts = state.into_parts()?;
        let definition = self.inner.core.lock().registry.insert(parts.definition)?;
        for (phase, hook) in parts.hooks {
            self.inner.hooks.subscribe(Some(definition.name()), phase, hook);
        }
        if let Some(scope) = parts.scope {
            self.create_scope(definition.name(), scope)?;
        }
        debug!(machine = %self.name(), state = %definition.name(), "state added");
        Ok(definition)
    }

    /// Remove a state, its hook bindings and its nested scope.
    ///
    /// ERROR, the initial state and the current state cannot be removed.
    pub fn remove(&self, name: &str) -> Result<Arc<StateDefinition>, MachineError> {
        let (removed, scope) = {
            let mut core = self.inner.core.lock();
            if name == ERROR_STATE
                || name == core.registry.initial_name()
                || name == core.current.name()
            {
                return Err(MachineError::Configuration(format!(
                    "state '{name}' cannot be removed while it is built in, initial or current"
                )));
            }
            let removed = core
                .registry
                .remove(name)
                .ok_or_else(|| MachineError::InvalidState(name.to_string()))?;
            (removed, core.scopes.remove(name))
        };

        self.inner.hooks.unsubscribe_state(name);
        if let Some(scope) = scope {
            for id in scope.subscriptions {
                self.inner.hooks.unsubscribe(id);
            }
            scope.machine.halt(None);
        }
        debug!(machine = %self.name(), state = %name, "state removed");
        Ok(removed)
    }
}

impl fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.inner.core.lock();
        f.debug_struct("StateMachine")
            .field("id", &self.inner.id)
            .field("name", &self.inner.options.name)
            .field("current", &core.current.name())
            .field("running", &core.running)
            .field("transitioning", &core.transitioning)
            .finish()
    }
}
