use parking_lot::Mutex;

/// Handle for a registered disposer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DisposerId(u64);

struct Disposer {
    id: DisposerId,
    label: String,
    run: Box<dyn FnOnce() + Send>,
}

#[derive(Default)]
struct Registry {
    disposers: Vec<Disposer>,
    next_id: u64,
}

/// Teardown registry for everything a session acquires.
///
/// `cleanup` runs each registered disposer exactly once, most recent
/// first. Disposers run outside the registry lock, so they may register
/// or unregister others.
#[derive(Default)]
pub struct ResourceLifecycle {
    registry: Mutex<Registry>,
}

impl ResourceLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, label: impl Into<String>, disposer: impl FnOnce() + Send + 'static) -> DisposerId {
        let mut registry = self.registry.lock();
        let id = DisposerId(registry.next_id);
        registry.next_id += 1;
        registry.disposers.push(Disposer {
            id,
            label: label.into(),
            run: Box::new(disposer),
        });
        id
    }

    /// Forget a disposer without running it. Returns whether it was registered.
    pub fn unregister(&self, id: DisposerId) -> bool {
        let mut registry = self.registry.lock();
        let before = registry.disposers.len();
        registry.disposers.retain(|d| d.id != id);
        registry.disposers.len() != before
    }

    /// Run a single disposer now.
    pub fn dispose(&self, id: DisposerId) -> bool {
        let disposer = {
            let mut registry = self.registry.lock();
            let index = registry.disposers.iter().position(|d| d.id == id);
            index.map(|i| registry.disposers.remove(i))
        };
        match disposer {
            Some(d) => {
                (d.run)();
                true
            }
            None => false,
        }
    }

    /// Run every registered disposer, most recent first. Returns how many ran.
    pub fn cleanup(&self) -> usize {
        let disposers = std::mem::take(&mut self.registry.lock().disposers);
        let count = disposers.len();
        for disposer in disposers.into_iter().rev() {
            log::debug!("dispose: {}", disposer.label);
            (disposer.run)();
        }
        count
    }

    pub fn len(&self) -> usize {
        self.registry.lock().disposers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> impl FnOnce() + Send + 'static {
        let log = Arc::clone(log);
        move || log.lock().push(name)
    }

    #[test]
    fn cleanup_runs_each_disposer_once_in_reverse() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let lifecycle = ResourceLifecycle::new();
        lifecycle.register("clone", recorder(&log, "clone"));
        lifecycle.register("ended", recorder(&log, "ended"));
        lifecycle.register("graph", recorder(&log, "graph"));

        assert_eq!(lifecycle.cleanup(), 3);
        assert_eq!(lifecycle.cleanup(), 0);
        assert_eq!(*log.lock(), vec!["graph", "ended", "clone"]);
        assert!(lifecycle.is_empty());
    }

    #[test]
    fn unregistered_disposer_never_runs() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let lifecycle = ResourceLifecycle::new();
        let id = lifecycle.register("a", recorder(&log, "a"));
        lifecycle.register("b", recorder(&log, "b"));

        assert!(lifecycle.unregister(id));
        assert!(!lifecycle.unregister(id));
        lifecycle.cleanup();
        assert_eq!(*log.lock(), vec!["b"]);
    }

    #[test]
    fn dispose_runs_one_early() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let lifecycle = ResourceLifecycle::new();
        let id = lifecycle.register("a", recorder(&log, "a"));
        lifecycle.register("b", recorder(&log, "b"));

        assert!(lifecycle.dispose(id));
        assert!(!lifecycle.dispose(id));
        lifecycle.cleanup();
        assert_eq!(*log.lock(), vec!["a", "b"]);
    }

    #[test]
    fn disposer_may_register_during_cleanup() {
        let lifecycle = Arc::new(ResourceLifecycle::new());
        let inner = Arc::clone(&lifecycle);
        lifecycle.register("outer", move || {
            inner.register("late", || {});
        });

        assert_eq!(lifecycle.cleanup(), 1);
        assert_eq!(lifecycle.len(), 1);
        assert_eq!(lifecycle.cleanup(), 1);
    }
}
