//! Machine events: what observers and broadcast subscribers see.

use crate::error::MachineError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Stage of a transition reported to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionEventKind {
    /// The guard accepted the transition; hooks are about to run.
    Begin,
    /// The transition committed and its done hooks ran.
    End,
    /// The guard rejected the transition.
    Cancel,
    /// A leave or enter hook failed.
    Error,
}

impl TransitionEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionEventKind::Begin => "begin",
            TransitionEventKind::End => "end",
            TransitionEventKind::Cancel => "cancel",
            TransitionEventKind::Error => "error",
        }
    }
}

/// A transition lifecycle notification.
#[derive(Debug, Clone)]
pub struct TransitionEvent {
    pub kind: TransitionEventKind,
    pub from: String,
    pub to: String,
    pub params: Value,
    pub error: Option<MachineError>,
    /// Set on `End`: time from the guard check to the end of done hooks.
    pub elapsed: Option<Duration>,
}

/// Everything the machine announces.
#[derive(Debug, Clone)]
pub enum MachineEvent {
    Start,
    /// The machine stopped; `error` is set when a failed start caused it.
    Stop { error: Option<MachineError> },
    /// A final state was entered through a committed transition.
    Final { state: String },
    /// The machine was forced into ERROR.
    Error { error: MachineError },
    Transition(TransitionEvent),
    /// A state's done hooks finished.
    Done { state: String },
}

impl MachineEvent {
    /// Canonical event name, e.g. `transition/begin` or `Connected/done`.
    pub fn name(&self) -> String {
        match self {
            MachineEvent::Start => "start".to_string(),
            MachineEvent::Stop { .. } => "stop".to_string(),
            MachineEvent::Final { .. } => "final".to_string(),
            MachineEvent::Error { .. } => "error".to_string(),
            MachineEvent::Transition(event) => format!("transition/{}", event.kind.as_str()),
            MachineEvent::Done { state } => format!("{state}/done"),
        }
    }

    pub fn as_transition(&self) -> Option<&TransitionEvent> {
        match self {
            MachineEvent::Transition(event) => Some(event),
            _ => None,
        }
    }
}

impl fmt::Display for MachineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Synchronous callback invoked for every machine event.
pub type Observer = Arc<dyn Fn(&MachineEvent) + Send + Sync>;

/// Largest broadcast buffer the hub will allocate.
pub(crate) const MAX_EVENT_CAPACITY: usize = 1 << 16;

/// Fan-out point for machine events.
///
/// Observers are called inline in registration order; broadcast
/// subscribers receive a clone and may lag.
pub(crate) struct EventHub {
    observers: Mutex<Vec<Observer>>,
    sender: broadcast::Sender<MachineEvent>,
}

impl EventHub {
    pub(crate) fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.clamp(1, MAX_EVENT_CAPACITY));
        Self {
            observers: Mutex::new(Vec::new()),
            sender,
        }
    }

    pub(crate) fn observe(&self, observer: Observer) {
        self.observers.lock().push(observer);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<MachineEvent> {
        self.sender.subscribe()
    }

    pub(crate) fn emit(&self, event: MachineEvent) {
        let observers = self.observers.lock().clone();
        for observer in &observers {
            observer(&event);
        }
        // No receivers is not an error.
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transition(kind: TransitionEventKind) -> MachineEvent {
        MachineEvent::Transition(TransitionEvent {
            kind,
            from: "A".into(),
            to: "B".into(),
            params: Value::Null,
            error: None,
            elapsed: None,
        })
    }

    #[test]
    fn event_names_follow_bus_convention() {
        assert_eq!(MachineEvent::Start.name(), "start");
        assert_eq!(MachineEvent::Stop { error: None }.name(), "stop");
        assert_eq!(transition(TransitionEventKind::Begin).name(), "transition/begin");
        assert_eq!(transition(TransitionEventKind::Cancel).name(), "transition/cancel");
        assert_eq!(
            MachineEvent::Done {
                state: "Connected".into()
            }
            .name(),
            "Connected/done"
        );
    }

    #[tokio::test]
    async fn hub_reaches_observers_and_subscribers() {
        let hub = EventHub::new(8);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        hub.observe(Arc::new(move |event: &MachineEvent| {
            log.lock().push(event.name())
        }));
        let mut receiver = hub.subscribe();

        hub.emit(MachineEvent::Start);
        hub.emit(transition(TransitionEventKind::End));

        assert_eq!(*seen.lock(), vec!["start", "transition/end"]);
        assert_eq!(receiver.recv().await.unwrap().name(), "start");
        assert_eq!(receiver.recv().await.unwrap().name(), "transition/end");
    }

    #[test]
    fn emit_without_subscribers_is_fine() {
        let hub = EventHub::new(1);
        hub.emit(MachineEvent::Start);
    }
}
