//! Generic keyed in-memory store with change notification.

use std::{
    collections::HashMap,
    fmt::Display,
    hash::Hash,
    sync::{
        Arc, RwLock, RwLockReadGuard, RwLockWriteGuard,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::sync::broadcast;

use crate::error::{CollectionError, Result};

const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Extracts the unique key of an item.
pub type KeyFn<K, T> = Arc<dyn Fn(&T) -> K + Send + Sync>;

/// What happened to a collection. Carries keys, not items; read the
/// current value with [`LocalCollection::get`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionChange<K> {
    Inserted(K),
    Updated(K),
    Deleted(K),
    Cleared,
}

/// Outcome of [`LocalCollection::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    Inserted,
    Updated,
}

struct Store<K, T> {
    next_seq: u64,
    items: HashMap<K, (u64, T)>,
}

/// An in-memory collection keyed by `key_of(item)`. Nothing is persisted.
///
/// Clones share the same contents.
pub struct LocalCollection<K, T> {
    id: Arc<str>,
    key_of: KeyFn<K, T>,
    store: Arc<RwLock<Store<K, T>>>,
    tx: broadcast::Sender<CollectionChange<K>>,
    version: Arc<AtomicU64>,
}

impl<K, T> Clone for LocalCollection<K, T> {
    fn clone(&self) -> Self {
        Self {
            id: Arc::clone(&self.id),
            key_of: Arc::clone(&self.key_of),
            store: Arc::clone(&self.store),
            tx: self.tx.clone(),
            version: Arc::clone(&self.version),
        }
    }
}

impl<K, T> LocalCollection<K, T>
where
    K: Eq + Hash + Clone + Display,
    T: Clone,
{
    pub fn new(id: impl Into<String>, key_of: impl Fn(&T) -> K + Send + Sync + 'static) -> Self {
        let (tx, _) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Self {
            id: Arc::from(id.into()),
            key_of: Arc::new(key_of),
            store: Arc::new(RwLock::new(Store {
                next_seq: 0,
                items: HashMap::new(),
            })),
            tx,
            version: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn key_of(&self, item: &T) -> K {
        (self.key_of)(item)
    }

    fn read(&self) -> RwLockReadGuard<'_, Store<K, T>> {
        match self.store.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Store<K, T>> {
        match self.store.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn notify(&self, change: CollectionChange<K>) {
        self.version.fetch_add(1, Ordering::AcqRel);
        // No subscribers is fine.
        let _ = self.tx.send(change);
    }

    fn duplicate(&self, key: &K) -> CollectionError {
        CollectionError::DuplicateKey {
            collection: self.id.to_string(),
            key: key.to_string(),
        }
    }

    fn not_found(&self, key: &K) -> CollectionError {
        CollectionError::NotFound {
            collection: self.id.to_string(),
            key: key.to_string(),
        }
    }

    /// Add a new item. Fails if its key is already present.
    pub fn insert(&self, item: T) -> Result<K> {
        let key = self.key_of(&item);
        {
            let mut store = self.write();
            if store.items.contains_key(&key) {
                return Err(self.duplicate(&key));
            }
            let seq = store.next_seq;
            store.next_seq += 1;
            store.items.insert(key.clone(), (seq, item));
        }
        self.notify(CollectionChange::Inserted(key.clone()));
        Ok(key)
    }

    /// Insert unless the key exists. Returns whether the item was stored.
    pub fn insert_if_absent(&self, item: T) -> bool {
        self.insert(item).is_ok()
    }

    /// Replace the stored item with the same key, keeping its position, or
    /// insert it.
    pub fn upsert(&self, item: T) -> Upserted {
        let key = self.key_of(&item);
        let outcome = {
            let mut store = self.write();
            if let Some((_, existing)) = store.items.get_mut(&key) {
                *existing = item;
                Upserted::Updated
            } else {
                let seq = store.next_seq;
                store.next_seq += 1;
                store.items.insert(key.clone(), (seq, item));
                Upserted::Inserted
            }
        };
        self.notify(match outcome {
            Upserted::Inserted => CollectionChange::Inserted(key),
            Upserted::Updated => CollectionChange::Updated(key),
        });
        outcome
    }

    /// Like [`upsert`](Self::upsert), but an existing item is combined with
    /// `item` by `merge` instead of being replaced. Lookup, merge and insert
    /// happen under one write lock.
    ///
    /// A merge that changes the key is discarded with
    /// [`CollectionError::KeyChanged`].
    pub fn upsert_with<F>(&self, item: T, merge: F) -> Result<Upserted>
    where
        F: FnOnce(&mut T, T),
    {
        let key = self.key_of(&item);
        let outcome = {
            let mut store = self.write();
            if let Some((_, existing)) = store.items.get_mut(&key) {
                let mut next = existing.clone();
                merge(&mut next, item);
                let next_key = self.key_of(&next);
                if next_key != key {
                    return Err(CollectionError::KeyChanged {
                        collection: self.id.to_string(),
                        from: key.to_string(),
                        to: next_key.to_string(),
                    });
                }
                *existing = next;
                Upserted::Updated
            } else {
                let seq = store.next_seq;
                store.next_seq += 1;
                store.items.insert(key.clone(), (seq, item));
                Upserted::Inserted
            }
        };
        self.notify(match outcome {
            Upserted::Inserted => CollectionChange::Inserted(key),
            Upserted::Updated => CollectionChange::Updated(key),
        });
        Ok(outcome)
    }

    /// Mutate the item stored under `key` in place.
    ///
    /// The mutator must not change the item's key; if it does, the update
    /// is discarded and [`CollectionError::KeyChanged`] returned.
    pub fn update<F>(&self, key: &K, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut T),
    {
        {
            let mut store = self.write();
            let Some((_, existing)) = store.items.get_mut(key) else {
                return Err(self.not_found(key));
            };
            let mut next = existing.clone();
            mutate(&mut next);
            let next_key = self.key_of(&next);
            if next_key != *key {
                return Err(CollectionError::KeyChanged {
                    collection: self.id.to_string(),
                    from: key.to_string(),
                    to: next_key.to_string(),
                });
            }
            *existing = next;
        }
        self.notify(CollectionChange::Updated(key.clone()));
        Ok(())
    }

    /// Remove and return the item stored under `key`.
    pub fn delete(&self, key: &K) -> Result<T> {
        let removed = self.write().items.remove(key);
        let Some((_, item)) = removed else {
            return Err(self.not_found(key));
        };
        self.notify(CollectionChange::Deleted(key.clone()));
        Ok(item)
    }

    /// Remove every item matching `predicate`. Returns the removed keys.
    pub fn delete_where(&self, predicate: impl Fn(&T) -> bool) -> Vec<K> {
        let removed: Vec<K> = {
            let mut store = self.write();
            let keys: Vec<K> = store
                .items
                .iter()
                .filter(|(_, (_, item))| predicate(item))
                .map(|(key, _)| key.clone())
                .collect();
            for key in &keys {
                store.items.remove(key);
            }
            keys
        };
        for key in &removed {
            self.notify(CollectionChange::Deleted(key.clone()));
        }
        removed
    }

    /// Remove everything. Returns how many items were dropped.
    pub fn clear(&self) -> usize {
        let removed = {
            let mut store = self.write();
            let n = store.items.len();
            store.items.clear();
            n
        };
        if removed > 0 {
            self.notify(CollectionChange::Cleared);
        }
        removed
    }

    pub fn get(&self, key: &K) -> Option<T> {
        self.read().items.get(key).map(|(_, item)| item.clone())
    }

    pub fn contains(&self, key: &K) -> bool {
        self.read().items.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().items.is_empty()
    }

    /// All items in insertion order.
    pub fn snapshot(&self) -> Vec<T> {
        let store = self.read();
        let mut entries: Vec<&(u64, T)> = store.items.values().collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, item)| item.clone()).collect()
    }

    /// Change notifications for this collection.
    pub fn subscribe(&self) -> broadcast::Receiver<CollectionChange<K>> {
        self.tx.subscribe()
    }

    /// Incremented once per applied change.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}

impl<K, T> std::fmt::Debug for LocalCollection<K, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCollection")
            .field("id", &self.id)
            .field("version", &self.version.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
