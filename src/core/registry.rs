//! The state registry: the canonical store of state definitions.

use super::state::{StateDefinition, StateRef, ERROR_STATE, ERROR_VALUE};
use crate::builder::BuildError;
use crate::error::MachineError;
use std::sync::Arc;

/// Ordered collection of state definitions.
///
/// Declaration order is kept so the first declared state can act as the
/// default initial state. `ERROR` is always registered last.
#[derive(Debug, Clone)]
pub struct StateRegistry {
    states: Vec<Arc<StateDefinition>>,
    initial: String,
}

impl StateRegistry {
    /// Build a registry from declared states.
    ///
    /// Rejects duplicates and multiple initial states. When no state is
    /// marked initial the first declared one becomes initial.
    pub(crate) fn new(definitions: Vec<StateDefinition>) -> Result<Self, BuildError> {
        if definitions.is_empty() {
            return Err(BuildError::NoStates);
        }

        let mut registry = Self {
            states: Vec::with_capacity(definitions.len() + 1),
            initial: String::new(),
        };
        let mut initial: Option<String> = None;

        for definition in definitions {
            if definition.initial {
                if let Some(existing) = &initial {
                    return Err(BuildError::MultipleInitialStates(
                        existing.clone(),
                        definition.name.clone(),
                    ));
                }
                initial = Some(definition.name.clone());
            }
            registry.check_unique(&definition)?;
            registry.states.push(Arc::new(definition));
        }

        let initial = match initial {
            Some(name) => name,
            None => {
                // Mark the first state so queries agree with the registry.
                let first = &mut registry.states[0];
                let mut promoted = (**first).clone();
                promoted.initial = true;
                *first = Arc::new(promoted);
                first.name.clone()
            }
        };
        registry.initial = initial;
        registry.states.push(Arc::new(StateDefinition::error()));
        Ok(registry)
    }

    /// Names, aliases and values must not collide with any other state,
    /// ERROR included.
    fn check_unique(&self, definition: &StateDefinition) -> Result<(), BuildError> {
        if definition.value == Some(ERROR_VALUE) {
            return Err(BuildError::DuplicateStateValue(
                ERROR_STATE.to_string(),
                definition.name.clone(),
                ERROR_VALUE,
            ));
        }
        if definition.alias.as_deref() == Some(ERROR_STATE) {
            return Err(BuildError::DuplicateStateAlias(
                ERROR_STATE.to_string(),
                definition.name.clone(),
                ERROR_STATE.to_string(),
            ));
        }
        for existing in &self.states {
            let clash = [
                (definition.alias.as_deref(), Some(existing.name.as_str())),
                (Some(definition.name.as_str()), existing.alias.as_deref()),
                (definition.alias.as_deref(), existing.alias.as_deref()),
            ]
            .into_iter()
            .find_map(|(a, b)| match (a, b) {
                (Some(a), Some(b)) if a == b => Some(a),
                _ => None,
            });
            if let Some(key) = clash {
                return Err(BuildError::DuplicateStateAlias(
                    existing.name.clone(),
                    definition.name.clone(),
                    key.to_string(),
                ));
            }
            if existing.name == definition.name {
                return Err(BuildError::DuplicateState(definition.name.clone()));
            }
            if let (Some(a), Some(b)) = (existing.value, definition.value) {
                if a == b {
                    return Err(BuildError::DuplicateStateValue(
                        existing.name.clone(),
                        definition.name.clone(),
                        a,
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<StateDefinition>> {
        self.states.iter().find(|state| state.name == name)
    }

    /// Resolve a settled reference to its canonical definition.
    ///
    /// Names are matched before aliases. Derived references are evaluated
    /// here, so prefer settling them before taking any lock.
    pub fn resolve(&self, reference: &StateRef) -> Result<Arc<StateDefinition>, MachineError> {
        let reference = match reference {
            StateRef::Derived(_) => reference.settle(),
            other => other.clone(),
        };
        let found = match &reference {
            StateRef::Name(name) => self.get(name).or_else(|| {
                self.states
                    .iter()
                    .find(|state| state.alias.as_deref() == Some(name.as_str()))
            }),
            StateRef::Value(value) => self.states.iter().find(|state| state.value == Some(*value)),
            StateRef::Derived(_) => None,
        };
        found
            .cloned()
            .ok_or_else(|| MachineError::InvalidState(reference.to_string()))
    }

    pub fn contains(&self, reference: &StateRef) -> bool {
        self.resolve(reference).is_ok()
    }

    /// Name of the initial state.
    pub fn initial_name(&self) -> &str {
        &self.initial
    }

    pub fn initial(&self) -> Option<&Arc<StateDefinition>> {
        self.get(&self.initial)
    }

    pub fn error(&self) -> Arc<StateDefinition> {
        self.get(ERROR_STATE)
            .cloned()
            .unwrap_or_else(|| Arc::new(StateDefinition::error()))
    }

    /// Add a state to a live registry, keeping `ERROR` last.
    pub(crate) fn insert(
        &mut self,
        definition: StateDefinition,
    ) -> Result<Arc<StateDefinition>, MachineError> {
        self.check_unique(&definition)?;
        if definition.initial {
            return Err(MachineError::Configuration(format!(
                "state '{}' cannot become initial after construction",
                definition.name
            )));
        }
        let definition = Arc::new(definition);
        let at = self.states.len().saturating_sub(1);
        self.states.insert(at, definition.clone());
        Ok(definition)
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<Arc<StateDefinition>> {
        let index = self.states.iter().position(|state| state.name == name)?;
        Some(self.states.remove(index))
    }

    /// Names in declaration order, `ERROR` last.
    pub fn names(&self) -> Vec<String> {
        self.states.iter().map(|state| state.name.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<StateDefinition>> {
        self.states.iter()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Look up a state value by its upper-cased name, e.g. `CONNECTED`.
    pub fn constant(&self, key: &str) -> Option<i64> {
        self.states
            .iter()
            .find(|state| state.name.to_uppercase() == key)
            .and_then(|state| state.value)
    }
}
