//! State definitions and references.
//!
//! A machine's states are plain data: a name, an optional numeric value and
//! the set of states it may move to next. Two states are always present in a
//! running machine: `NULL`, the pseudo-state of a stopped machine, and
//! `ERROR`, the final state every other state may fall into.

use std::fmt;
use std::sync::Arc;

/// Name of the pseudo-state held while the machine is stopped.
pub const NULL_STATE: &str = "NULL";

/// Name of the built-in error state.
pub const ERROR_STATE: &str = "ERROR";

/// Wildcard accepted wherever a list of state names is expected.
pub const ANY_STATE: &str = "*";

/// Numeric value of the built-in error state.
pub const ERROR_VALUE: i64 = i64::MAX;

/// Computes the allowed next states at transition time.
pub type NextFn = Arc<dyn Fn() -> Vec<String> + Send + Sync>;

/// Computes a state reference at call time.
pub type StateFn = Arc<dyn Fn() -> StateRef + Send + Sync>;

/// The set of states a state may transition to.
#[derive(Clone, Default)]
pub enum Next {
    /// No restriction; any registered state is reachable.
    #[default]
    Any,
    /// Only the listed states (plus `ERROR`) are reachable.
    States(Vec<String>),
    /// The list is computed each time a transition is attempted.
    Derived(NextFn),
}

impl Next {
    /// Build a fixed list, collapsing to [`Next::Any`] when it contains `*`.
    ///
    /// `ERROR` is appended if missing so every state can fail.
    ///
    /// # Example
    ///
    /// ```rust
    /// use statehook::core::Next;
    ///
    /// let next = Next::states(["Connected", "Disconnected"]);
    /// assert!(next.admits("Connected"));
    /// assert!(next.admits("ERROR"));
    /// assert!(!next.admits("Connecting"));
    ///
    /// assert!(Next::states(["*"]).admits("Anything"));
    /// ```
    pub fn states<I, S>(states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = states.into_iter().map(Into::into).collect();
        if names.iter().any(|name| name == ANY_STATE) {
            return Next::Any;
        }
        if !names.iter().any(|name| name == ERROR_STATE) {
            names.push(ERROR_STATE.to_string());
        }
        Next::States(names)
    }

    pub fn derived<F>(f: F) -> Self
    where
        F: Fn() -> Vec<String> + Send + Sync + 'static,
    {
        Next::Derived(Arc::new(f))
    }

    /// Whether `state` is reachable. Derived lists are evaluated now.
    pub fn admits(&self, state: &str) -> bool {
        match self {
            Next::Any => true,
            Next::States(names) => names.iter().any(|name| name == state),
            Next::Derived(f) => {
                state == ERROR_STATE
                    || f().iter().any(|name| name == ANY_STATE || name == state)
            }
        }
    }

    /// Like [`admits`](Self::admits) but without evaluating derived lists,
    /// which are assumed to admit anything.
    pub fn statically_admits(&self, state: &str) -> bool {
        match self {
            Next::Derived(_) => true,
            other => other.admits(state),
        }
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Next::Any => f.write_str("Any"),
            Next::States(names) => f.debug_tuple("States").field(names).finish(),
            Next::Derived(_) => f.write_str("Derived(<fn>)"),
        }
    }
}

/// A registered state.
///
/// Definitions are immutable once registered and shared behind `Arc`, so
/// queries hand them out without holding the machine lock.
#[derive(Clone, Debug)]
pub struct StateDefinition {
    pub(crate) name: String,
    pub(crate) value: Option<i64>,
    pub(crate) alias: Option<String>,
    pub(crate) title: String,
    pub(crate) initial: bool,
    pub(crate) is_final: bool,
    pub(crate) next: Next,
}

impl StateDefinition {
    pub(crate) fn null() -> Self {
        Self {
            name: NULL_STATE.to_string(),
            value: None,
            alias: None,
            title: NULL_STATE.to_string(),
            initial: false,
            is_final: false,
            next: Next::Any,
        }
    }

    pub(crate) fn error() -> Self {
        Self {
            name: ERROR_STATE.to_string(),
            value: Some(ERROR_VALUE),
            alias: None,
            title: ERROR_STATE.to_string(),
            initial: false,
            is_final: true,
            next: Next::Any,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> Option<i64> {
        self.value
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// Human readable title; defaults to the name.
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn is_initial(&self) -> bool {
        self.initial
    }

    /// Final states refuse every outgoing transition until reset.
    pub fn is_final(&self) -> bool {
        self.is_final
    }

    pub fn next(&self) -> &Next {
        &self.next
    }

    pub fn is_null(&self) -> bool {
        self.name == NULL_STATE
    }

    pub fn is_error(&self) -> bool {
        self.name == ERROR_STATE
    }

    /// Whether a reference names this state by name, alias or value.
    pub fn matches(&self, reference: &StateRef) -> bool {
        match reference {
            StateRef::Name(name) => {
                self.name == *name || self.alias.as_deref() == Some(name.as_str())
            }
            StateRef::Value(value) => self.value == Some(*value),
            StateRef::Derived(_) => self.matches(&reference.settle()),
        }
    }
}

/// Anything that identifies a state.
///
/// References are resolved against the registry: by name (or alias), by
/// numeric value, or through a closure evaluated at call time.
///
/// # Example
///
/// ```rust
/// use statehook::core::StateRef;
///
/// let by_name: StateRef = "Connected".into();
/// let by_value: StateRef = 3.into();
/// let derived = StateRef::derived(|| "Connected".into());
///
/// assert!(matches!(derived.settle(), StateRef::Name(ref n) if n == "Connected"));
/// # let _ = (by_name, by_value);
/// ```
#[derive(Clone)]
pub enum StateRef {
    Name(String),
    Value(i64),
    Derived(StateFn),
}

/// Derived references may return further derived references; evaluation
/// stops after this many hops.
const MAX_DERIVATION_DEPTH: usize = 8;

impl StateRef {
    pub fn derived<F>(f: F) -> Self
    where
        F: Fn() -> StateRef + Send + Sync + 'static,
    {
        StateRef::Derived(Arc::new(f))
    }

    /// Evaluate derived references down to a name or value.
    ///
    /// Runs user code, so callers must not hold the machine lock.
    pub fn settle(&self) -> StateRef {
        let mut current = self.clone();
        for _ in 0..MAX_DERIVATION_DEPTH {
            match current {
                StateRef::Derived(f) => current = f(),
                settled => return settled,
            }
        }
        match current {
            StateRef::Derived(_) => StateRef::Name(String::new()),
            settled => settled,
        }
    }
}

impl fmt::Debug for StateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateRef::Name(name) => f.debug_tuple("Name").field(name).finish(),
            StateRef::Value(value) => f.debug_tuple("Value").field(value).finish(),
            StateRef::Derived(_) => f.write_str("Derived(<fn>)"),
        }
    }
}

impl fmt::Display for StateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateRef::Name(name) => write!(f, "{name}"),
            StateRef::Value(value) => write!(f, "#{value}"),
            StateRef::Derived(_) => f.write_str("<derived>"),
        }
    }
}

impl From<&str> for StateRef {
    fn from(name: &str) -> Self {
        StateRef::Name(name.to_string())
    }
}

impl From<String> for StateRef {
    fn from(name: String) -> Self {
        StateRef::Name(name)
    }
}

impl From<&String> for StateRef {
    fn from(name: &String) -> Self {
        StateRef::Name(name.clone())
    }
}

impl From<i64> for StateRef {
    fn from(value: i64) -> Self {
        StateRef::Value(value)
    }
}

impl From<i32> for StateRef {
    fn from(value: i32) -> Self {
        StateRef::Value(i64::from(value))
    }
}

impl From<&StateDefinition> for StateRef {
    fn from(state: &StateDefinition) -> Self {
        StateRef::Name(state.name.clone())
    }
}

impl From<&Arc<StateDefinition>> for StateRef {
    fn from(state: &Arc<StateDefinition>) -> Self {
        StateRef::Name(state.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(name: &str, value: i64) -> StateDefinition {
        StateDefinition {
            name: name.to_string(),
            value: Some(value),
            alias: Some(name.to_lowercase()),
            title: name.to_string(),
            initial: false,
            is_final: false,
            next: Next::Any,
        }
    }

    #[test]
    fn fixed_next_always_admits_error() {
        let next = Next::states(["Connected"]);
        assert!(next.admits("Connected"));
        assert!(next.admits(ERROR_STATE));
        assert!(!next.admits("Disconnected"));
    }

    #[test]
    fn empty_next_only_admits_error() {
        let next = Next::states(Vec::<String>::new());
        assert!(next.admits(ERROR_STATE));
        assert!(!next.admits("Connected"));
    }

    #[test]
    fn wildcard_collapses_to_any() {
        assert!(matches!(Next::states(["A", "*"]), Next::Any));
    }

    #[test]
    fn derived_next_is_evaluated_on_every_check() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let open = Arc::new(AtomicBool::new(false));
        let flag = open.clone();
        let next = Next::derived(move || {
            if flag.load(Ordering::SeqCst) {
                vec!["Open".to_string()]
            } else {
                vec![]
            }
        });

        assert!(!next.admits("Open"));
        assert!(next.statically_admits("Open"));
        open.store(true, Ordering::SeqCst);
        assert!(next.admits("Open"));
    }

    #[test]
    fn builtin_states_have_expected_shape() {
        let error = StateDefinition::error();
        assert!(error.is_final());
        assert!(error.is_error());
        assert_eq!(error.value(), Some(ERROR_VALUE));

        let null = StateDefinition::null();
        assert!(null.is_null());
        assert_eq!(null.value(), None);
        assert!(!null.is_final());
    }

    #[test]
    fn definition_matches_name_alias_and_value() {
        let connected = state("Connected", 2);
        assert!(connected.matches(&"Connected".into()));
        assert!(connected.matches(&"connected".into()));
        assert!(connected.matches(&2.into()));
        assert!(!connected.matches(&3.into()));
        assert!(connected.matches(&StateRef::derived(|| 2.into())));
    }

    #[test]
    fn nested_derived_references_settle() {
        let reference = StateRef::derived(|| StateRef::derived(|| "Deep".into()));
        assert!(matches!(reference.settle(), StateRef::Name(name) if name == "Deep"));
    }

    #[test]
    fn runaway_derivation_settles_to_unknown_name() {
        fn forever() -> StateRef {
            StateRef::derived(forever)
        }
        assert!(matches!(forever().settle(), StateRef::Name(name) if name.is_empty()));
    }
}
