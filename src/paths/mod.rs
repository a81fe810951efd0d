//! paths
//!
//! Resolution of well-known logical roots to store folder ids.
//!
//! The store addresses folders by id; callers think in terms of a handful
//! of fixed locations (`/etc/pipeline`, the shared-object folders beneath
//! it, and the per-user home). [`PathResolver`] resolves each of these
//! once per connection, creating the folder chain when it does not exist
//! yet, and caches the id for the rest of the session.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::core::types::{ObjectId, SharedKind};
use crate::error::{RepositoryError, Result};
use crate::store::RemoteStore;

/// Fixed locations every connection relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WellKnownRoot {
    /// `/etc/pipeline`, the parent of all shared-object folders.
    Etc,
    /// `/etc/pipeline/databases`
    Databases,
    /// `/etc/pipeline/slaves`
    Slaves,
    /// `/etc/pipeline/clusters`
    Clusters,
    /// `/etc/pipeline/partitions`
    Partitions,
    /// `/home/<login>` for the connected user.
    Home,
}

impl WellKnownRoot {
    /// The root that holds shared objects of the given kind.
    pub fn for_kind(kind: SharedKind) -> Self {
        match kind {
            SharedKind::DatabaseConnection => WellKnownRoot::Databases,
            SharedKind::SlaveServer => WellKnownRoot::Slaves,
            SharedKind::ClusterSchema => WellKnownRoot::Clusters,
            SharedKind::PartitionSchema => WellKnownRoot::Partitions,
        }
    }

    fn segments(self, login: &str) -> Vec<String> {
        let base = || vec!["etc".to_string(), "pipeline".to_string()];
        match self {
            WellKnownRoot::Etc => base(),
            WellKnownRoot::Databases => {
                let mut s = base();
                s.push("databases".to_string());
                s
            }
            WellKnownRoot::Slaves => {
                let mut s = base();
                s.push("slaves".to_string());
                s
            }
            WellKnownRoot::Clusters => {
                let mut s = base();
                s.push("clusters".to_string());
                s
            }
            WellKnownRoot::Partitions => {
                let mut s = base();
                s.push("partitions".to_string());
                s
            }
            WellKnownRoot::Home => vec!["home".to_string(), login.to_string()],
        }
    }

    /// The absolute path of this root for the given user.
    pub fn path(self, login: &str) -> String {
        format!("/{}", self.segments(login).join("/"))
    }
}

/// Per-connection resolver and cache for well-known roots.
#[derive(Debug)]
pub struct PathResolver {
    login: String,
    resolved: Mutex<HashMap<WellKnownRoot, ObjectId>>,
}

impl PathResolver {
    /// A fresh resolver for the given user's session.
    pub fn new(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            resolved: Mutex::new(HashMap::new()),
        }
    }

    /// The folder id for a well-known root, creating the folder chain on
    /// first use and caching the result for the connection lifetime.
    pub fn resolve(&self, store: &dyn RemoteStore, root: WellKnownRoot) -> Result<ObjectId> {
        let mut resolved = crate::locks::recover(self.resolved.lock());
        if let Some(id) = resolved.get(&root) {
            return Ok(id.clone());
        }
        let id = self.ensure_segments(store, &root.segments(&self.login))?;
        resolved.insert(root, id.clone());
        Ok(id)
    }

    /// The folder id holding shared objects of the given kind.
    pub fn root_for_kind(&self, store: &dyn RemoteStore, kind: SharedKind) -> Result<ObjectId> {
        self.resolve(store, WellKnownRoot::for_kind(kind))
    }

    /// The absolute path of a well-known root for this session's user.
    pub fn path_of(&self, root: WellKnownRoot) -> String {
        root.path(&self.login)
    }

    /// Drop everything resolved so far.
    pub fn invalidate(&self) {
        crate::locks::recover(self.resolved.lock()).clear();
    }

    fn ensure_segments(&self, store: &dyn RemoteStore, segments: &[String]) -> Result<ObjectId> {
        let root = store
            .get_file("/")?
            .ok_or_else(|| RepositoryError::InvalidState("store has no root folder".into()))?;
        let mut current = root.id;
        let mut path = String::new();
        for segment in segments {
            path.push('/');
            path.push_str(segment);
            current = match store.get_file(&path)? {
                Some(node) => node.id,
                None => store.create_folder(&current, segment)?.id,
            };
        }
        Ok(current)
    }
}
