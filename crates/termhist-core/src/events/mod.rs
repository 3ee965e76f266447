//! Synchronous event emitter with drop-to-unsubscribe registrations
//!
//! Storage and settings layers use this to notify listeners of writes.
//! Everything fires synchronously on the caller's thread; there is no
//! queue and no async machinery.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

type Listener<E> = dyn Fn(&E) + Send + Sync;

struct EmitterInner<E> {
    listeners: RwLock<HashMap<u64, Arc<Listener<E>>>>,
    next_id: AtomicU64,
}

/// Synchronous listener registry for events of type `E`
pub struct EventEmitter<E> {
    inner: Arc<EmitterInner<E>>,
}

impl<E: 'static> EventEmitter<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EmitterInner {
                listeners: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Register a listener. It stays registered until the returned
    /// [`Subscription`] is dropped.
    pub fn listen(&self, listener: Box<Listener<E>>) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.write().insert(id, Arc::from(listener));

        let weak: Weak<EmitterInner<E>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.listeners.write().remove(&id);
            }
        })
    }

    /// Invoke every registered listener with `event`.
    ///
    /// The listener list is snapshotted before any callback runs, so a
    /// listener may register or drop subscriptions without deadlocking.
    pub fn fire(&self, event: &E) {
        let snapshot: Vec<Arc<Listener<E>>> =
            self.inner.listeners.read().values().cloned().collect();
        for listener in snapshot {
            listener(event);
        }
    }

    /// Number of currently registered listeners
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.read().len()
    }
}

impl<E: 'static> Default for EventEmitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for a registered listener; dropping it deregisters the listener.
///
/// Type-erased so handles from emitters of different event types can be
/// stored together. Outliving the emitter is safe: deregistration against
/// a dropped emitter is a no-op.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Deregister explicitly (equivalent to dropping the handle)
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_listener_receives_fired_event() {
        let emitter: EventEmitter<String> = EventEmitter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = seen.clone();
        let _sub = emitter.listen(Box::new(move |event: &String| {
            seen_clone.lock().unwrap().push(event.clone());
        }));

        emitter.fire(&"hello".to_string());
        emitter.fire(&"world".to_string());

        assert_eq!(*seen.lock().unwrap(), vec!["hello", "world"]);
    }

    #[test]
    fn test_drop_deregisters_listener() {
        let emitter: EventEmitter<u32> = EventEmitter::new();
        let count = Arc::new(AtomicU64::new(0));

        let count_clone = count.clone();
        let sub = emitter.listen(Box::new(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(emitter.listener_count(), 1);

        emitter.fire(&1);
        drop(sub);
        assert_eq!(emitter.listener_count(), 0);

        emitter.fire(&2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listen_from_inside_listener_does_not_deadlock() {
        let emitter: Arc<EventEmitter<u32>> = Arc::new(EventEmitter::new());
        let late_subs = Arc::new(Mutex::new(Vec::new()));

        let emitter_clone = emitter.clone();
        let late_clone = late_subs.clone();
        let _sub = emitter.listen(Box::new(move |_| {
            let sub = emitter_clone.listen(Box::new(|_| {}));
            late_clone.lock().unwrap().push(sub);
        }));

        emitter.fire(&1);
        assert_eq!(emitter.listener_count(), 2);
    }

    #[test]
    fn test_unsubscribe_is_equivalent_to_drop() {
        let emitter: EventEmitter<u32> = EventEmitter::new();
        let sub = emitter.listen(Box::new(|_| {}));
        assert_eq!(emitter.listener_count(), 1);

        sub.unsubscribe();
        assert_eq!(emitter.listener_count(), 0);
    }

    #[test]
    fn test_subscription_outliving_emitter_is_safe() {
        let emitter: EventEmitter<u32> = EventEmitter::new();
        let sub = emitter.listen(Box::new(|_| {}));
        drop(emitter);
        drop(sub);
    }

    #[test]
    fn test_multiple_listeners_all_fire() {
        let emitter: EventEmitter<u32> = EventEmitter::new();
        let count = Arc::new(AtomicU64::new(0));

        let subs: Vec<_> = (0..3)
            .map(|_| {
                let count_clone = count.clone();
                emitter.listen(Box::new(move |value: &u32| {
                    count_clone.fetch_add(u64::from(*value), Ordering::SeqCst);
                }))
            })
            .collect();

        emitter.fire(&5);
        assert_eq!(count.load(Ordering::SeqCst), 15);
        drop(subs);
    }
}
