//! # Versioned Slot
//!
//! A single value that is swapped as a whole.
//!
//! ```text
//! reader A: load() ──> Arc<v1> ─────────────────────> still v1
//! writer:          replace(v2) ─┬─ store Arc<v2>
//!                               ├─ version 1 -> 2
//!                               └─ notify subscribers(2, &v2)
//! reader B:                         load() ──> Arc<v2>
//! ```
//!
//! Readers never observe a half-written value: the new value is fully built
//! before the pointer swap, and the old `Arc` stays valid for whoever holds it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

type Listener<T> = Arc<dyn Fn(u64, &Arc<T>) + Send + Sync>;

/// Identifies a subscription so it can be removed later.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A value with a monotonically increasing version and change listeners.
pub struct VersionedSlot<T> {
    current: RwLock<Arc<T>>,
    version: AtomicU64,
    listeners: Mutex<Vec<(SubscriptionId, Listener<T>)>>,
    next_subscription: AtomicU64,
}

impl<T> VersionedSlot<T> {
    /// Creates a slot holding `value` at version 1.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            current: RwLock::new(Arc::new(value)),
            version: AtomicU64::new(1),
            listeners: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(0),
        }
    }

    /// Returns a snapshot of the current value.
    #[inline]
    #[must_use]
    pub fn load(&self) -> Arc<T> {
        Arc::clone(&self.current.read())
    }

    /// Current version. Starts at 1 and grows by one per replacement.
    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Returns the snapshot together with the version it belongs to.
    #[must_use]
    pub fn load_versioned(&self) -> (u64, Arc<T>) {
        let guard = self.current.read();
        (self.version.load(Ordering::Acquire), Arc::clone(&guard))
    }

    /// Replaces the value, then notifies subscribers. Returns the new version.
    pub fn replace(&self, value: T) -> u64 {
        self.replace_arc(Arc::new(value))
    }

    /// Same as [`VersionedSlot::replace`] for an already shared value.
    pub fn replace_arc(&self, value: Arc<T>) -> u64 {
        let version = {
            let mut guard = self.current.write();
            *guard = Arc::clone(&value);
            self.version.fetch_add(1, Ordering::AcqRel) + 1
        };

        // Called with no lock held, so listeners may load, subscribe or
        // unsubscribe.
        let listeners: Vec<Listener<T>> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(version, &value);
        }
        version
    }

    /// Registers a listener invoked after every replacement.
    ///
    /// A listener added or removed during a notification takes effect from
    /// the next replacement.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(u64, &Arc<T>) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Removes a listener. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        listeners.len() != before
    }
}

impl<T: Default> Default for VersionedSlot<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_replace_bumps_version() {
        let slot = VersionedSlot::new("origin".to_string());
        assert_eq!(slot.version(), 1);

        let v = slot.replace("rock".to_string());
        assert_eq!(v, 2);
        assert_eq!(slot.version(), 2);
        assert_eq!(slot.load().as_str(), "rock");
    }

    #[test]
    fn test_old_snapshot_survives_swap() {
        let slot = VersionedSlot::new(vec![1, 2, 3]);
        let old = slot.load();

        slot.replace(vec![9]);

        assert_eq!(*old, vec![1, 2, 3]);
        assert_eq!(*slot.load(), vec![9]);
    }

    #[test]
    fn test_listeners_see_new_value() {
        let slot = VersionedSlot::new(0u32);
        let seen = Arc::new(AtomicUsize::new(0));

        let seen_in_listener = Arc::clone(&seen);
        let id = slot.subscribe(move |version, value| {
            assert_eq!(version, u64::from(**value) + 1);
            seen_in_listener.fetch_add(1, Ordering::SeqCst);
        });

        slot.replace(1);
        slot.replace(2);
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        assert!(slot.unsubscribe(id));
        slot.replace(3);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert!(!slot.unsubscribe(id));
    }

    #[test]
    fn test_listener_may_unsubscribe_itself() {
        let slot = Arc::new(VersionedSlot::new(0u32));
        let calls = Arc::new(AtomicUsize::new(0));
        let own_id = Arc::new(parking_lot::Mutex::new(None));

        let id = {
            let slot_in_listener = Arc::downgrade(&slot);
            let calls = Arc::clone(&calls);
            let own_id = Arc::clone(&own_id);
            slot.subscribe(move |_, _| {
                calls.fetch_add(1, Ordering::SeqCst);
                if let (Some(slot), Some(id)) = (slot_in_listener.upgrade(), *own_id.lock()) {
                    assert!(slot.unsubscribe(id));
                }
            })
        };
        *own_id.lock() = Some(id);

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let writer = {
            let slot = Arc::clone(&slot);
            std::thread::spawn(move || {
                slot.replace(1);
                slot.replace(2);
                let _ = done_tx.send(());
            })
        };
        assert!(
            done_rx.recv_timeout(std::time::Duration::from_secs(5)).is_ok(),
            "replace blocked inside a listener"
        );
        writer.join().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_may_subscribe_another() {
        let slot = Arc::new(VersionedSlot::new(0u32));
        let late_calls = Arc::new(AtomicUsize::new(0));

        let weak = Arc::downgrade(&slot);
        let late = Arc::clone(&late_calls);
        slot.subscribe(move |version, _| {
            if version == 2 {
                if let Some(slot) = weak.upgrade() {
                    let late = Arc::clone(&late);
                    slot.subscribe(move |_, _| {
                        late.fetch_add(1, Ordering::SeqCst);
                    });
                }
            }
        });

        slot.replace(1);
        slot.replace(2);
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);
        slot.replace(3);
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_readers_never_see_torn_values() {
        let slot = Arc::new(VersionedSlot::new((0u64, 0u64)));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let slot = Arc::clone(&slot);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        let pair = slot.load();
                        assert_eq!(pair.0, pair.1);
                    }
                })
            })
            .collect();

        for i in 1..=500u64 {
            slot.replace((i, i));
        }
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
