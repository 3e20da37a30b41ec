// ── Generic reactive entity collection ──
//
// Lock-free concurrent storage with O(1) lookups and push-based change
// notification via `watch` channels. Entries remember the position they
// were given so snapshots come out in backend order.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;

struct Slot<T> {
    position: u64,
    value: Arc<T>,
}

/// A lock-free, reactive collection for a single entity type.
///
/// Uses `DashMap` for O(1) concurrent lookups and `watch` channels
/// for push-based change notification. Every mutation bumps a version
/// counter and rebuilds the snapshot that subscribers receive.
pub(crate) struct EntityCollection<T: Clone + Send + Sync + 'static> {
    /// Primary storage: normalized key -> entity.
    by_key: DashMap<String, Slot<T>>,

    /// Next position handed to a newly inserted key.
    next_position: AtomicU64,

    /// Version counter, bumped on every mutation.
    version: watch::Sender<u64>,

    /// Full snapshot in position order, rebuilt on mutation.
    snapshot: watch::Sender<Arc<Vec<Arc<T>>>>,
}

impl<T: Clone + Send + Sync + 'static> EntityCollection<T> {
    pub(crate) fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            by_key: DashMap::new(),
            next_position: AtomicU64::new(0),
            version,
            snapshot,
        }
    }

    /// Insert or update an entity. Returns `true` if the key was new.
    /// An existing key keeps its position.
    pub(crate) fn upsert(&self, key: String, entity: T) -> bool {
        let is_new = match self.by_key.entry(key) {
            Entry::Occupied(mut occupied) => {
                occupied.get_mut().value = Arc::new(entity);
                false
            }
            Entry::Vacant(vacant) => {
                vacant.insert(self.new_slot(entity));
                true
            }
        };

        self.rebuild_snapshot();
        self.bump_version();

        is_new
    }

    /// Mutate an existing entity in place. Returns the new value, or
    /// `None` if the key is absent. `f` reports whether it changed
    /// anything; unchanged entities do not notify subscribers.
    pub(crate) fn update<F>(&self, key: &str, f: F) -> Option<(Arc<T>, bool)>
    where
        F: FnOnce(&mut T) -> bool,
    {
        let result = {
            let mut slot = self.by_key.get_mut(key)?;
            let changed = f(Arc::make_mut(&mut slot.value));
            (Arc::clone(&slot.value), changed)
        };

        if result.1 {
            self.rebuild_snapshot();
            self.bump_version();
        }
        Some(result)
    }

    /// Mutate the entity at `key`, inserting `init()` first if absent.
    /// Returns the new value and whether the key was new.
    pub(crate) fn upsert_with<I, F>(&self, key: String, init: I, f: F) -> (Arc<T>, bool)
    where
        I: FnOnce() -> T,
        F: FnOnce(&mut T) -> bool,
    {
        let (value, is_new, changed) = {
            let mut is_new = false;
            let mut slot = self.by_key.entry(key).or_insert_with(|| {
                is_new = true;
                self.new_slot(init())
            });
            let changed = f(Arc::make_mut(&mut slot.value));
            (Arc::clone(&slot.value), is_new, changed)
        };

        if is_new || changed {
            self.rebuild_snapshot();
            self.bump_version();
        }
        (value, is_new)
    }

    /// Replace the whole collection with `entries`, in order. Later
    /// duplicates of a key overwrite the value but keep the first position.
    pub(crate) fn replace_all(&self, entries: Vec<(String, T)>) {
        self.by_key.clear();
        self.next_position.store(0, Ordering::Relaxed);

        for (key, entity) in entries {
            match self.by_key.entry(key) {
                Entry::Occupied(mut occupied) => occupied.get_mut().value = Arc::new(entity),
                Entry::Vacant(vacant) => {
                    vacant.insert(self.new_slot(entity));
                }
            }
        }

        self.rebuild_snapshot();
        self.bump_version();
    }

    /// Remove an entity by key. Returns the removed entity if it existed.
    pub(crate) fn remove(&self, key: &str) -> Option<Arc<T>> {
        let removed = self.by_key.remove(key).map(|(_, slot)| slot.value);
        if removed.is_some() {
            self.rebuild_snapshot();
            self.bump_version();
        }
        removed
    }

    /// Look up an entity by its primary key string.
    pub(crate) fn get_by_key(&self, key: &str) -> Option<Arc<T>> {
        self.by_key.get(key).map(|r| Arc::clone(&r.value))
    }

    pub(crate) fn contains_key(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    /// Get the current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot changes via a `watch::Receiver`.
    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<T>>>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Return all current primary keys in position order.
    pub(crate) fn keys(&self) -> Vec<String> {
        let mut keyed: Vec<(u64, String)> = self
            .by_key
            .iter()
            .map(|r| (r.value().position, r.key().clone()))
            .collect();
        keyed.sort_unstable_by_key(|(pos, _)| *pos);
        keyed.into_iter().map(|(_, key)| key).collect()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn new_slot(&self, entity: T) -> Slot<T> {
        Slot {
            position: self.next_position.fetch_add(1, Ordering::Relaxed),
            value: Arc::new(entity),
        }
    }

    /// Collect all values in position order and broadcast to subscribers.
    fn rebuild_snapshot(&self) {
        let mut slots: Vec<(u64, Arc<T>)> = self
            .by_key
            .iter()
            .map(|r| (r.value().position, Arc::clone(&r.value().value)))
            .collect();
        slots.sort_unstable_by_key(|(pos, _)| *pos);
        let values: Vec<Arc<T>> = slots.into_iter().map(|(_, v)| v).collect();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }

    /// Increment the version counter.
    fn bump_version(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}
