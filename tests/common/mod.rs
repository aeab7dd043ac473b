//! Shared helpers for integration tests.

#![allow(dead_code)]

use parking_lot::Mutex;
use statehook::{MachineEvent, StateBuilder, StateMachine, StateMachineBuilder};
use std::sync::Arc;
use tracing::Level;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Disconnected -> Connecting -> Connected, with Closed as a final state.
pub fn connection() -> StateMachineBuilder {
    init_tracing();
    StateMachine::builder()
        .name("connection")
        .autostart(false)
        .history(16)
        .state(
            StateBuilder::new("Disconnected", 0)
                .initial()
                .next(["Connecting", "Closed"]),
        )
        .state(StateBuilder::new("Connecting", 1).next(["Connected", "Disconnected"]))
        .state(StateBuilder::new("Connected", 2).next(["Disconnected", "Closed"]))
        .state(StateBuilder::new("Closed", 3).final_state())
}

/// Records the name of every event the machine emits.
pub fn record_events(machine: &StateMachine) -> Arc<Mutex<Vec<String>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    machine.observe(move |event: &MachineEvent| sink.lock().push(event.name()));
    events
}
