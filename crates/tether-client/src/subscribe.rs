//! Subscriber registries — ordered callback sets with unsubscribe handles

use std::sync::{Arc, Mutex, Weak};

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    next_id: u64,
    handlers: Vec<(u64, Handler<T>)>,
}

/// An ordered set of callbacks for one event class.
///
/// Delivery is insertion order. Dispatch snapshots the handler list first, so
/// a handler may unsubscribe itself (or any other) mid-dispatch without
/// corrupting iteration.
pub struct HandlerSet<T> {
    inner: Arc<Mutex<Registry<T>>>,
}

impl<T> HandlerSet<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry {
                next_id: 0,
                handlers: Vec::new(),
            })),
        }
    }

    /// Register a callback; the returned [`Subscription`] removes it again.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
        T: 'static,
    {
        let id = {
            let mut registry = self.inner.lock().expect("handler registry poisoned");
            let id = registry.next_id;
            registry.next_id += 1;
            registry.handlers.push((id, Arc::new(handler)));
            id
        };
        let weak: Weak<Mutex<Registry<T>>> = Arc::downgrade(&self.inner);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    if let Ok(mut registry) = inner.lock() {
                        registry.handlers.retain(|(hid, _)| *hid != id);
                    }
                }
            })),
        }
    }

    /// Invoke every registered handler, in insertion order.
    pub fn emit(&self, value: &T) {
        let snapshot: Vec<Handler<T>> = {
            let registry = self.inner.lock().expect("handler registry poisoned");
            registry.handlers.iter().map(|(_, h)| Arc::clone(h)).collect()
        };
        for handler in snapshot {
            handler(value);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("handler registry poisoned").handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for HandlerSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// De-registration capability for one subscribed handler.
///
/// Dropping the handle without calling [`unsubscribe`](Self::unsubscribe)
/// leaves the handler registered for the lifetime of the client.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Remove the handler from its registry.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_emit_reaches_all_handlers() {
        let set: HandlerSet<u32> = HandlerSet::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c1 = Arc::clone(&count);
        let _s1 = set.subscribe(move |v| {
            c1.fetch_add(*v as usize, Ordering::SeqCst);
        });
        let c2 = Arc::clone(&count);
        let _s2 = set.subscribe(move |v| {
            c2.fetch_add(*v as usize, Ordering::SeqCst);
        });

        set.emit(&3);
        assert_eq!(count.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_insertion_order_delivery() {
        let set: HandlerSet<()> = HandlerSet::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let _subs: Vec<_> = ["first", "second", "third"]
            .into_iter()
            .map(|tag| {
                let order = Arc::clone(&order);
                set.subscribe(move |()| order.lock().unwrap().push(tag))
            })
            .collect();

        set.emit(&());
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_unsubscribe_removes_handler() {
        let set: HandlerSet<u32> = HandlerSet::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&count);
        let sub = set.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        set.emit(&1);
        assert_eq!(set.len(), 1);

        sub.unsubscribe();
        set.emit(&1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(set.is_empty());
    }

    #[test]
    fn test_unsubscribe_during_dispatch() {
        let set: Arc<HandlerSet<()>> = Arc::new(HandlerSet::new());
        let count = Arc::new(AtomicUsize::new(0));

        // First handler unsubscribes the second while the snapshot is live.
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let slot_clone = Arc::clone(&slot);
        let _s1 = set.subscribe(move |()| {
            if let Some(sub) = slot_clone.lock().unwrap().take() {
                sub.unsubscribe();
            }
        });
        let c = Arc::clone(&count);
        let s2 = set.subscribe(move |()| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        *slot.lock().unwrap() = Some(s2);

        // Snapshot dispatch: the second handler still runs this round.
        set.emit(&());
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // But it is gone for the next one.
        set.emit(&());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(set.len(), 1);
    }
}
