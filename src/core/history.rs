//! State history tracking.
//!
//! A bounded ring buffer of the states a machine has entered, oldest first.
//! A capacity of zero disables recording.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Record of a single committed transition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// When the transition committed
    pub timestamp: DateTime<Utc>,
    /// The state that was entered
    pub state: String,
}

/// Bounded, ordered history of entered states.
///
/// # Example
///
/// ```rust
/// use statehook::core::HistoryBuffer;
///
/// let mut history = HistoryBuffer::new(2);
/// history.record("Idle");
/// history.record("Connecting");
/// history.record("Connected");
///
/// // Oldest entry was evicted.
/// assert_eq!(history.path(), vec!["Connecting", "Connected"]);
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct HistoryBuffer {
    capacity: usize,
    entries: VecDeque<HistoryEntry>,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::new(),
        }
    }

    /// Record entry into `state`, evicting the oldest entry when full.
    pub fn record(&mut self, state: impl Into<String>) {
        self.record_at(state, Utc::now());
    }

    pub fn record_at(&mut self, state: impl Into<String>, timestamp: DateTime<Utc>) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(HistoryEntry {
            timestamp,
            state: state.into(),
        });
    }

    /// State names in the order they were entered.
    pub fn path(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.state.as_str()).collect()
    }

    /// Time between the oldest and newest retained entries.
    ///
    /// Returns `None` when the buffer is empty.
    pub fn duration(&self) -> Option<Duration> {
        if let (Some(first), Some(last)) = (self.entries.front(), self.entries.back()) {
            let duration = last.timestamp.signed_duration_since(first.timestamp);
            duration.to_std().ok()
        } else {
            None
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
