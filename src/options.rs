//! Machine construction options.

use serde::{Deserialize, Serialize};

/// Name used when none is configured.
pub const DEFAULT_MACHINE_NAME: &str = "StateMachine";

/// Recognised construction options.
///
/// Every field has a default, so partial JSON documents deserialize.
///
/// # Example
///
/// ```rust
/// use statehook::MachineOptions;
///
/// let options = MachineOptions::from_json(r#"{ "name": "tcp", "history": 16 }"#).unwrap();
/// assert_eq!(options.name, "tcp");
/// assert_eq!(options.history, 16);
/// assert!(options.autostart);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineOptions {
    /// Appears in logs and events.
    pub name: String,
    /// Start the machine as soon as it is built.
    pub autostart: bool,
    /// History capacity; zero disables history.
    pub history: usize,
    /// Expose each action as a callable method on the machine.
    pub inject_action_methods: bool,
    /// Whether deferred action calls return failures or swallow them.
    pub throw_action_error: bool,
    /// Expose state values as upper-cased constants.
    pub inject_state_values: bool,
    /// Buffer size of the broadcast channel returned by `subscribe`,
    /// clamped to `1..=65536`.
    pub event_capacity: usize,
}

impl Default for MachineOptions {
    fn default() -> Self {
        Self {
            name: DEFAULT_MACHINE_NAME.to_string(),
            autostart: true,
            history: 0,
            inject_action_methods: true,
            throw_action_error: false,
            inject_state_values: true,
            event_capacity: 64,
        }
    }
}

impl MachineOptions {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
