//! Publish/subscribe registry
//!
//! Listeners are kept per topic in subscription order. Publishing snapshots
//! the listener list first, so a listener may subscribe, unsubscribe or fire
//! new transitions without deadlocking the registry.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::machine::Topic;

pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Handle returned by `subscribe`; pass it back to `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    pub topic: Topic,
    id: u64,
}

pub struct EventBus<T> {
    next_id: AtomicU64,
    listeners: DashMap<Topic, Vec<(u64, Listener<T>)>>,
}

impl<T> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventBus<T> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: DashMap::new(),
        }
    }

    pub fn subscribe(&self, topic: Topic, listener: Listener<T>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.entry(topic).or_default().push((id, listener));
        Subscription { topic, id }
    }

    /// Remove one listener. Returns false if it was already gone.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let Some(mut entry) = self.listeners.get_mut(&subscription.topic) else {
            return false;
        };
        let before = entry.len();
        entry.retain(|(id, _)| *id != subscription.id);
        before != entry.len()
    }

    /// Remove every listener for `topic`.
    pub fn clear(&self, topic: Topic) -> usize {
        self.listeners
            .remove(&topic)
            .map(|(_, listeners)| listeners.len())
            .unwrap_or(0)
    }

    pub fn listener_count(&self, topic: Topic) -> usize {
        self.listeners.get(&topic).map(|l| l.len()).unwrap_or(0)
    }

    /// Deliver `payload` to every listener of `topic`. A panicking listener is
    /// logged and skipped. Returns how many listeners were called.
    pub fn publish(&self, topic: Topic, payload: &T) -> usize {
        let listeners: Vec<Listener<T>> = match self.listeners.get(&topic) {
            Some(entry) => entry.iter().map(|(_, l)| Arc::clone(l)).collect(),
            None => return 0,
        };

        for listener in &listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(payload))).is_err() {
                tracing::error!(topic = %topic, "Listener panicked");
            }
        }
        listeners.len()
    }
}
