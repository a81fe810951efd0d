//! cache
//!
//! Shared-object cache with atomically swapped snapshots.
//!
//! # Design
//!
//! The cache holds decoded shared objects keyed by `(kind, name)`. The
//! live data is an immutable [`SharedObjectSet`] behind an `Arc`; writers
//! build a replacement set and swap the reference, so a concurrent reader
//! holds either the fully-old or fully-new set and never a mix.
//!
//! Coordination between writers (the read-modify-write cycle around a
//! remote save) is the lock manager's cache lock, not this type: callers
//! of [`SharedObjectCache::insert`] and [`SharedObjectCache::remove`]
//! must hold it. Reads take no lock beyond the brief snapshot-pointer
//! access.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::config::CacheInvalidation;
use crate::core::artifacts::SharedObject;
use crate::core::types::SharedKind;
use crate::error::RepositoryError;

/// An immutable snapshot of all cached shared objects.
///
/// No two entries share `(kind, name)`.
#[derive(Debug, Default, Clone)]
pub struct SharedObjectSet {
    entries: HashMap<(SharedKind, String), SharedObject>,
}

impl SharedObjectSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object while building a set. Last write wins; collision
    /// policy belongs to [`SharedObjectCache::insert`], not bulk loading.
    pub fn add(&mut self, object: SharedObject) {
        self.entries
            .insert((object.kind(), object.name().to_string()), object);
    }

    /// Look up one object.
    pub fn get(&self, kind: SharedKind, name: &str) -> Option<&SharedObject> {
        self.entries.get(&(kind, name.to_string()))
    }

    /// All objects of one kind, sorted by name.
    pub fn of_kind(&self, kind: SharedKind) -> Vec<&SharedObject> {
        let mut objects: Vec<&SharedObject> = self
            .entries
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, object)| object)
            .collect();
        objects.sort_by(|a, b| a.name().cmp(b.name()));
        objects
    }

    /// Total number of cached objects.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set holds nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Connection-scoped cache of shared objects.
///
/// Created at connect, discarded at disconnect. See the module docs for
/// the snapshot-swap coherence model.
#[derive(Debug, Default)]
pub struct SharedObjectCache {
    snapshot: RwLock<Arc<SharedObjectSet>>,
    invalidation: CacheInvalidation,
}

impl SharedObjectCache {
    /// An empty cache with the given invalidation granularity.
    pub fn new(invalidation: CacheInvalidation) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(SharedObjectSet::new())),
            invalidation,
        }
    }

    /// The current snapshot. Readers hold it as long as they like; it
    /// never mutates underneath them.
    pub fn current(&self) -> Arc<SharedObjectSet> {
        match self.snapshot.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Look up one object in the current snapshot.
    pub fn get(&self, kind: SharedKind, name: &str) -> Option<SharedObject> {
        self.current().get(kind, name).cloned()
    }

    /// Swap in a freshly loaded set. Callers hold the cache lock.
    pub fn replace(&self, set: SharedObjectSet) {
        self.store(Arc::new(set));
    }

    /// Copy-on-write insert of one entry after its paired remote save
    /// succeeded. Callers hold the cache lock.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::DuplicateName`] if the name is already
    /// taken by a different id within the kind.
    pub fn insert(&self, object: SharedObject) -> Result<(), RepositoryError> {
        let current = self.current();
        if let Some(existing) = current.get(object.kind(), object.name()) {
            if existing.id() != object.id() {
                return Err(RepositoryError::DuplicateName {
                    kind: object.kind().to_string(),
                    name: object.name().to_string(),
                });
            }
        }
        let mut next = (*current).clone();
        next.add(object);
        self.store(Arc::new(next));
        Ok(())
    }

    /// Copy-on-write removal of one entry after its paired remote delete
    /// succeeded. Callers hold the cache lock.
    pub fn remove(&self, kind: SharedKind, name: &str) {
        let current = self.current();
        if current.get(kind, name).is_none() {
            return;
        }
        let mut next = (*current).clone();
        next.entries.remove(&(kind, name.to_string()));
        self.store(Arc::new(next));
    }

    /// Force the next access of an entry to miss, per the configured
    /// granularity. Callers hold the cache lock.
    pub fn invalidate(&self, kind: SharedKind, name: &str) {
        match self.invalidation {
            CacheInvalidation::Entry => self.remove(kind, name),
            CacheInvalidation::Full => self.clear(),
        }
    }

    /// Drop everything. Called at disconnect.
    pub fn clear(&self) {
        self.store(Arc::new(SharedObjectSet::new()));
    }

    fn store(&self, set: Arc<SharedObjectSet>) {
        match self.snapshot.write() {
            Ok(mut guard) => *guard = set,
            Err(poisoned) => *poisoned.into_inner() = set,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::artifacts::{PartitionSchema, SlaveServer};
    use crate::core::types::ObjectId;

    fn slave(name: &str, id: &str) -> SharedObject {
        SharedObject::SlaveServer(SlaveServer {
            id: Some(ObjectId::new(id).unwrap()),
            name: name.to_string(),
            hostname: format!("{name}.internal"),
            port: 8080,
            username: "cluster".to_string(),
            password: String::new(),
            master: false,
        })
    }

    fn partition(name: &str, id: &str) -> SharedObject {
        SharedObject::PartitionSchema(PartitionSchema {
            id: Some(ObjectId::new(id).unwrap()),
            name: name.to_string(),
            partition_ids: vec![],
        })
    }

    #[test]
    fn get_from_snapshot() {
        let cache = SharedObjectCache::new(CacheInvalidation::Entry);
        let mut set = SharedObjectSet::new();
        set.add(slave("w1", "id1"));
        cache.replace(set);

        assert!(cache.get(SharedKind::SlaveServer, "w1").is_some());
        assert!(cache.get(SharedKind::SlaveServer, "w2").is_none());
        // Same name, different kind: distinct entries
        assert!(cache.get(SharedKind::ClusterSchema, "w1").is_none());
    }

    #[test]
    fn replace_swaps_whole_set() {
        let cache = SharedObjectCache::new(CacheInvalidation::Entry);
        let mut set = SharedObjectSet::new();
        set.add(slave("old", "id1"));
        cache.replace(set);

        let held = cache.current();

        let mut next = SharedObjectSet::new();
        next.add(slave("new", "id2"));
        cache.replace(next);

        // The held snapshot still shows the old world, fully intact.
        assert!(held.get(SharedKind::SlaveServer, "old").is_some());
        assert!(held.get(SharedKind::SlaveServer, "new").is_none());
        // Fresh reads see only the new world.
        assert!(cache.get(SharedKind::SlaveServer, "old").is_none());
        assert!(cache.get(SharedKind::SlaveServer, "new").is_some());
    }

    #[test]
    fn insert_same_id_updates() {
        let cache = SharedObjectCache::new(CacheInvalidation::Entry);
        cache.insert(slave("w1", "id1")).unwrap();
        cache.insert(slave("w1", "id1")).unwrap();
        assert_eq!(cache.current().len(), 1);
    }

    #[test]
    fn insert_colliding_name_rejected() {
        let cache = SharedObjectCache::new(CacheInvalidation::Entry);
        cache.insert(slave("w1", "id1")).unwrap();
        let err = cache.insert(slave("w1", "id2")).unwrap_err();
        assert!(matches!(err, RepositoryError::DuplicateName { .. }));
        // Different kinds never collide
        cache.insert(partition("w1", "id3")).unwrap();
    }

    #[test]
    fn remove_and_invalidate_entry() {
        let cache = SharedObjectCache::new(CacheInvalidation::Entry);
        cache.insert(slave("w1", "id1")).unwrap();
        cache.insert(slave("w2", "id2")).unwrap();

        cache.invalidate(SharedKind::SlaveServer, "w1");
        assert!(cache.get(SharedKind::SlaveServer, "w1").is_none());
        assert!(cache.get(SharedKind::SlaveServer, "w2").is_some());
    }

    #[test]
    fn invalidate_full_clears_everything() {
        let cache = SharedObjectCache::new(CacheInvalidation::Full);
        cache.insert(slave("w1", "id1")).unwrap();
        cache.insert(slave("w2", "id2")).unwrap();

        cache.invalidate(SharedKind::SlaveServer, "w1");
        assert!(cache.current().is_empty());
    }

    #[test]
    fn of_kind_sorted() {
        let mut set = SharedObjectSet::new();
        set.add(slave("zeta", "id1"));
        set.add(slave("alpha", "id2"));
        set.add(partition("mid", "id3"));

        let slaves = set.of_kind(SharedKind::SlaveServer);
        let names: Vec<&str> = slaves.iter().map(|o| o.name()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
