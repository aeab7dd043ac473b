//! Ordered hook subscriptions keyed by state and phase.

use super::hook::{Hook, Phase};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Handle returned by a subscription, used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    /// `None` matches every state.
    state: Option<String>,
    phase: Phase,
    hook: Hook,
}

/// The event bus hooks are bound to.
///
/// Subscribers for `<state>/<phase>` and for the wildcard `*/<phase>` are
/// interleaved in subscription order.
#[derive(Default)]
pub(crate) struct HookBus {
    subscriptions: Mutex<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl HookBus {
    pub(crate) fn subscribe(&self, state: Option<&str>, phase: Phase, hook: Hook) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions.lock().push(Subscription {
            id,
            state: state.map(str::to_string),
            phase,
            hook,
        });
        id
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.lock();
        let before = subscriptions.len();
        subscriptions.retain(|subscription| subscription.id != id);
        subscriptions.len() != before
    }

    /// Remove every subscription bound to `state`. Wildcards are kept.
    pub(crate) fn unsubscribe_state(&self, state: &str) -> usize {
        let mut subscriptions = self.subscriptions.lock();
        let before = subscriptions.len();
        subscriptions.retain(|subscription| subscription.state.as_deref() != Some(state));
        before - subscriptions.len()
    }

    /// Snapshot of the hooks to run, so the lock is never held across an
    /// await.
    pub(crate) fn hooks_for(&self, state: &str, phase: Phase) -> Vec<Hook> {
        self.subscriptions
            .lock()
            .iter()
            .filter(|subscription| subscription.phase == phase)
            .filter(|subscription| match &subscription.state {
                Some(bound) => bound == state,
                None => true,
            })
            .map(|subscription| subscription.hook.clone())
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.subscriptions.lock().len()
    }
}
