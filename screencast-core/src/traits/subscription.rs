use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Handle returned by every `on_*` / `subscribe` registration.
///
/// Unsubscribing is explicit: dropping a `Subscription` leaves the listener
/// registered, mirroring host event APIs where removal is a separate call.
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// A subscription with nothing to undo.
    pub fn detached() -> Self {
        Self { unsubscribe: None }
    }

    pub fn unsubscribe(mut self) {
        if let Some(f) = self.unsubscribe.take() {
            f();
        }
    }

    /// Convert into a disposer suitable for the resource lifecycle.
    pub fn into_disposer(self) -> impl FnOnce() + Send + 'static {
        move || self.unsubscribe()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

/// Listener registry shared by track implementations.
///
/// Listeners are invoked outside the registry lock, so a listener may
/// unsubscribe itself (or others) while being notified.
pub struct ListenerSet<F: ?Sized> {
    entries: Arc<Mutex<Vec<(u64, Arc<F>)>>>,
    next_id: Arc<AtomicU64>,
}

impl<F: ?Sized + Send + Sync + 'static> ListenerSet<F> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn add(&self, listener: Arc<F>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().push((id, listener));

        let entries = Arc::clone(&self.entries);
        Subscription::new(move || {
            entries.lock().retain(|(entry_id, _)| *entry_id != id);
        })
    }

    /// Snapshot of the current listeners, in registration order.
    pub fn snapshot(&self) -> Vec<Arc<F>> {
        self.entries.lock().iter().map(|(_, f)| Arc::clone(f)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl<F: ?Sized + Send + Sync + 'static> Default for ListenerSet<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ?Sized> Clone for ListenerSet<F> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            next_id: Arc::clone(&self.next_id),
        }
    }
}
