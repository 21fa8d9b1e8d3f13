//! Identity cache: one live instance per (entity type, key) within a session.
//!
//! Two reads of the same key return handles to the same object, so changes
//! made through one handle are visible through the other.
//!
//! # Design
//!
//! The cache is two-level. The top-level map from entity type to per-type
//! submap is write-locked only to create a missing submap (check, then
//! create under the lock); finding an existing submap takes a shared read
//! lock. Each submap has its own lock for get/put/remove, so traffic for
//! different entity types never contends.
//!
//! Entries are held as [`Weak`] references. The cache never keeps an object
//! alive by itself: once the last caller handle is dropped the entry is dead,
//! and the next read of that key goes back to storage and reinserts.
//!
//! # Example
//!
//! ```ignore
//! let cache = IdentityCache::new();
//! let hero = Arc::new(RwLock::new(hero));
//! cache.put::<Hero>(1, &hero);
//!
//! let again = cache.get::<Hero>(&1).unwrap();
//! assert!(Arc::ptr_eq(&hero, &again));
//!
//! drop((hero, again));
//! assert!(cache.get::<Hero>(&1).is_none());
//! ```

use sorm_core::Entity;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak,
};

/// Shared handle to a cached entity.
pub type EntityRef<E> = Arc<RwLock<E>>;

type Submap<E> = Mutex<HashMap<<E as Entity>::Key, Weak<RwLock<E>>>>;
type Erased = Arc<dyn Any + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Entries stay consistent even if a holder panicked mid-operation.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type TypeMap = HashMap<TypeId, Erased>;

fn read_types(types: &RwLock<TypeMap>) -> RwLockReadGuard<'_, TypeMap> {
    types.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_types(types: &RwLock<TypeMap>) -> RwLockWriteGuard<'_, TypeMap> {
    types.write().unwrap_or_else(PoisonError::into_inner)
}

/// Per-session identity cache keyed by entity type and primary key.
#[derive(Default)]
pub struct IdentityCache {
    types: RwLock<TypeMap>,
}

impl IdentityCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the submap for `E`, creating it on first use.
    fn submap<E: Entity>(&self) -> Arc<Submap<E>> {
        if let Some(map) = self.existing::<E>() {
            return map;
        }
        let mut types = write_types(&self.types);
        let slot = types
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Arc::new(Submap::<E>::default()) as Erased);
        if let Ok(map) = Arc::clone(slot).downcast::<Submap<E>>() {
            return map;
        }
        let map = Arc::new(Submap::<E>::default());
        *slot = Arc::clone(&map) as Erased;
        map
    }

    /// Look up an existing submap without creating one.
    fn existing<E: Entity>(&self) -> Option<Arc<Submap<E>>> {
        let types = read_types(&self.types);
        let slot = types.get(&TypeId::of::<E>())?;
        Arc::clone(slot).downcast::<Submap<E>>().ok()
    }

    /// Cache a handle under `key`, replacing any previous entry.
    pub fn put<E: Entity>(&self, key: E::Key, value: &EntityRef<E>) {
        let map = self.submap::<E>();
        lock(&map).insert(key, Arc::downgrade(value));
    }

    /// Wrap a fresh object in a handle and cache it.
    ///
    /// If a live object is already cached under `key`, that handle is
    /// returned and `value` is discarded.
    pub fn insert<E: Entity>(&self, key: E::Key, value: E) -> EntityRef<E> {
        let map = self.submap::<E>();
        let mut entries = lock(&map);
        if let Some(existing) = entries.get(&key).and_then(Weak::upgrade) {
            return existing;
        }
        let handle = Arc::new(RwLock::new(value));
        entries.insert(key, Arc::downgrade(&handle));
        handle
    }

    /// The live handle cached under `key`, if any.
    ///
    /// A dead entry found on the way is removed.
    pub fn get<E: Entity>(&self, key: &E::Key) -> Option<EntityRef<E>> {
        let map = self.existing::<E>()?;
        let mut entries = lock(&map);
        let weak = entries.get(key)?;
        match weak.upgrade() {
            Some(handle) => Some(handle),
            None => {
                entries.remove(key);
                None
            }
        }
    }

    /// Evict `key`. Returns whether a live entry was removed.
    pub fn remove<E: Entity>(&self, key: &E::Key) -> bool {
        self.existing::<E>()
            .and_then(|map| lock(&map).remove(key))
            .is_some_and(|weak| weak.strong_count() > 0)
    }

    /// Number of live entries for `E`.
    pub fn len<E: Entity>(&self) -> usize {
        self.existing::<E>().map_or(0, |map| {
            lock(&map).values().filter(|w| w.strong_count() > 0).count()
        })
    }

    pub fn is_empty<E: Entity>(&self) -> bool {
        self.len::<E>() == 0
    }

    /// Drop dead entries of `E`.
    pub fn prune<E: Entity>(&self) {
        if let Some(map) = self.existing::<E>() {
            lock(&map).retain(|_, w| w.strong_count() > 0);
        }
    }

    /// Forget everything.
    pub fn clear(&self) {
        write_types(&self.types).clear();
    }
}

impl std::fmt::Debug for IdentityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityCache")
            .field("types", &read_types(&self.types).len())
            .finish()
    }
}
