//! Named-event observer registry.
//!
//! The transport publishes every received event here; consumers attach
//! callbacks per event name and detach by dropping their [`Subscription`].
//! Callbacks run synchronously on the publishing task, outside the registry
//! lock, so a callback may itself subscribe or unsubscribe.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::trace;

type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Default)]
struct HubInner {
    listeners: Mutex<HashMap<String, Vec<(u64, Listener)>>>,
    next_id: AtomicU64,
}

/// Cloneable handle to one event registry.
#[derive(Clone, Default)]
pub struct EventHub {
    inner: Arc<HubInner>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `listener` to `event` until the returned subscription drops.
    pub fn subscribe(
        &self,
        event: impl Into<String>,
        listener: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Subscription {
        let event = event.into();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .lock()
            .entry(event.clone())
            .or_default()
            .push((id, Arc::new(listener)));
        trace!(%event, id, "listener attached");
        Subscription { hub: Arc::downgrade(&self.inner), event, id }
    }

    /// Deliver `payload` to every listener of `event`; returns how many ran.
    pub fn publish(&self, event: &str, payload: &Value) -> usize {
        let listeners: Vec<Listener> = match self.inner.listeners.lock().get(event) {
            Some(list) => list.iter().map(|(_, l)| Arc::clone(l)).collect(),
            None => return 0,
        };
        for listener in &listeners {
            listener(payload);
        }
        listeners.len()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.inner.listeners.lock().get(event).map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listeners = self.inner.listeners.lock();
        let counts: HashMap<&str, usize> =
            listeners.iter().map(|(k, v)| (k.as_str(), v.len())).collect();
        f.debug_struct("EventHub").field("listeners", &counts).finish()
    }
}

/// A live listener registration. Dropping it detaches the listener.
#[must_use = "dropping a Subscription detaches the listener immediately"]
pub struct Subscription {
    hub: Weak<HubInner>,
    event: String,
    id: u64,
}

impl Subscription {
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Detach now. Same as dropping.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(hub) = self.hub.upgrade() else { return };
        let mut listeners = hub.listeners.lock();
        if let Some(list) = listeners.get_mut(&self.event) {
            list.retain(|(id, _)| *id != self.id);
            if list.is_empty() {
                listeners.remove(&self.event);
            }
        }
        trace!(event = %self.event, id = self.id, "listener detached");
    }
}
