//! Per-entity identity cache.
//!
//! # Responsibility
//! - Map a row key to the single live in-memory instance for that row.
//! - Hold instances weakly so the cache never keeps an object alive.
//!
//! # Invariants
//! - At most one live instance per key; registering a second one while the
//!   first is alive is a logic error and panics.
//! - Dead entries are dropped lazily on lookup and by a periodic sweep.

use crate::model::EntityKey;
use log::{debug, error};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

/// Registrations between two sweeps of dead entries.
const SWEEP_INTERVAL: usize = 4096;

pub struct IdentityCache<T> {
    kind: &'static str,
    entries: RefCell<HashMap<EntityKey, Weak<T>>>,
    since_sweep: Cell<usize>,
}

impl<T> IdentityCache<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: RefCell::new(HashMap::new()),
            since_sweep: Cell::new(0),
        }
    }

    /// Returns the live instance for `key`, dropping the entry if the
    /// instance is gone.
    pub fn try_get(&self, key: EntityKey) -> Option<Rc<T>> {
        let mut entries = self.entries.borrow_mut();
        let live = entries.get(&key)?.upgrade();
        if live.is_none() {
            entries.remove(&key);
        }
        live
    }

    /// Registers `instance` under `key`.
    ///
    /// # Panics
    /// Panics when a different live instance is already registered for
    /// `key`. Materialization must check [`IdentityCache::try_get`] first.
    pub fn register(&self, key: EntityKey, instance: &Rc<T>) {
        self.maybe_sweep();

        let mut entries = self.entries.borrow_mut();
        if let Some(existing) = entries.get(&key).and_then(Weak::upgrade) {
            if Rc::ptr_eq(&existing, instance) {
                return;
            }
            error!(
                "event=cache_register module=cache status=error kind={} id={} error_code=duplicate_identity",
                self.kind, key
            );
            panic!(
                "identity cache consistency violation: {} id {} already has a live instance",
                self.kind, key
            );
        }
        entries.insert(key, Rc::downgrade(instance));
    }

    /// Forgets `key`. Returns whether an entry existed.
    pub fn release(&self, key: EntityKey) -> bool {
        self.entries.borrow_mut().remove(&key).is_some()
    }

    /// Forgets every entry whose live instance satisfies `belongs` and hands
    /// those instances back. Dead entries are dropped on the way.
    pub fn release_matching(&self, mut belongs: impl FnMut(&T) -> bool) -> Vec<Rc<T>> {
        let mut released = Vec::new();
        self.entries.borrow_mut().retain(|_, weak| match weak.upgrade() {
            Some(instance) if belongs(&instance) => {
                released.push(instance);
                false
            }
            Some(_) => true,
            None => false,
        });
        released
    }

    /// Live instances currently registered, in no particular order.
    pub fn live(&self) -> Vec<Rc<T>> {
        self.entries
            .borrow()
            .values()
            .filter_map(Weak::upgrade)
            .collect()
    }

    /// Empties the cache and hands back every instance that was still alive.
    pub fn drain(&self) -> Vec<Rc<T>> {
        self.entries
            .borrow_mut()
            .drain()
            .filter_map(|(_, weak)| weak.upgrade())
            .collect()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    /// Number of entries, dead ones included until they are swept.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn live_count(&self) -> usize {
        self.entries
            .borrow()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Removes entries whose instance has been dropped. Returns how many
    /// were removed.
    pub fn sweep(&self) -> usize {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|_, weak| weak.strong_count() > 0);
        let removed = before - entries.len();
        self.since_sweep.set(0);
        if removed > 0 {
            debug!(
                "event=cache_sweep module=cache status=ok kind={} removed={}",
                self.kind, removed
            );
        }
        removed
    }

    fn maybe_sweep(&self) {
        let count = self.since_sweep.get() + 1;
        if count >= SWEEP_INTERVAL {
            self.sweep();
        } else {
            self.since_sweep.set(count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::IdentityCache;
    use std::rc::Rc;

    #[test]
    fn try_get_returns_the_registered_instance() {
        let cache = IdentityCache::new("test");
        let value = Rc::new("row".to_string());
        cache.register(1, &value);

        let hit = cache.try_get(1).unwrap();
        assert!(Rc::ptr_eq(&hit, &value));
        assert!(cache.try_get(2).is_none());
    }

    #[test]
    fn dropped_instances_disappear() {
        let cache = IdentityCache::new("test");
        let value = Rc::new(5);
        cache.register(7, &value);
        drop(value);

        assert!(cache.try_get(7).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn dead_entry_can_be_replaced() {
        let cache = IdentityCache::new("test");
        cache.register(3, &Rc::new(1));
        let replacement = Rc::new(2);
        cache.register(3, &replacement);
        assert_eq!(*cache.try_get(3).unwrap(), 2);
    }

    #[test]
    #[should_panic(expected = "identity cache consistency violation")]
    fn duplicate_live_registration_panics() {
        let cache = IdentityCache::new("test");
        let first = Rc::new(1);
        let second = Rc::new(1);
        cache.register(9, &first);
        cache.register(9, &second);
    }

    #[test]
    fn sweep_and_drain() {
        let cache = IdentityCache::new("test");
        let kept = Rc::new(1);
        cache.register(1, &kept);
        cache.register(2, &Rc::new(2));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.live_count(), 1);
        assert_eq!(cache.sweep(), 1);

        let drained = cache.drain();
        assert_eq!(drained.len(), 1);
        assert!(Rc::ptr_eq(&drained[0], &kept));
        assert!(cache.is_empty());
        assert!(!cache.release(1));
    }

    #[test]
    fn release_matching_keeps_the_rest() {
        let cache = IdentityCache::new("test");
        let even = Rc::new(2);
        let odd = Rc::new(3);
        cache.register(1, &even);
        cache.register(2, &odd);
        cache.register(3, &Rc::new(4));

        let released = cache.release_matching(|value| value % 2 == 0);
        assert_eq!(released.len(), 1);
        assert!(Rc::ptr_eq(&released[0], &even));
        assert_eq!(cache.len(), 1);
        assert!(Rc::ptr_eq(&cache.live()[0], &odd));
        assert!(cache.try_get(1).is_none());
    }
}
