//! store::memory
//!
//! In-memory remote store for deterministic testing.
//!
//! # Design
//!
//! `InMemoryStore` implements the full [`RemoteStore`] contract under one
//! internal mutex, which gives it the atomic per-call semantics the real
//! backing service guarantees: every method fully applies or fully
//! rejects, and concurrent calls never interleave partially. It enforces
//! the structural invariants the store owns — child-name uniqueness and
//! move-cycle rejection — inside that same critical section.
//!
//! Failure scenarios are configurable per method via [`FailOn`], so tests
//! can exercise every error path of the client without a network.
//!
//! # Example
//!
//! ```
//! use strata::store::{InMemoryStore, RemoteStore, NodeData};
//!
//! let store = InMemoryStore::new();
//! let root = store.get_file("/").unwrap().unwrap();
//! let folder = store.create_folder(&root.id, "etc").unwrap();
//! assert_eq!(folder.path, "/etc");
//!
//! // Duplicate names are rejected atomically
//! assert!(store.create_folder(&root.id, "etc").is_err());
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::core::types::{ObjectId, UserInfo, UtcTimestamp, VersionSummary};

use super::traits::{ConnectResult, Connector, Node, NodeData, RemoteStore, StoreError};

/// Configuration for which store method should fail.
#[derive(Debug, Clone)]
pub enum FailOn {
    /// Fail `get_file` with the given error.
    GetFile(StoreError),
    /// Fail `get_children` with the given error.
    GetChildren(StoreError),
    /// Fail `create_folder` with the given error.
    CreateFolder(StoreError),
    /// Fail `create_file` with the given error.
    CreateFile(StoreError),
    /// Fail `update_file` with the given error.
    UpdateFile(StoreError),
    /// Fail `delete_file` with the given error.
    DeleteFile(StoreError),
    /// Fail `undelete_file` with the given error.
    UndeleteFile(StoreError),
    /// Fail `move_file` with the given error.
    MoveFile(StoreError),
}

/// One committed revision of a file entry.
#[derive(Debug, Clone)]
struct Revision {
    label: String,
    data: NodeData,
    summary: VersionSummary,
}

/// Internal node record.
#[derive(Debug, Clone)]
struct Entry {
    id: ObjectId,
    name: String,
    folder: bool,
    deleted: bool,
    parent: Option<ObjectId>,
    /// Parent at the moment of soft deletion, for undelete.
    original_parent: Option<ObjectId>,
    children: Vec<ObjectId>,
    revisions: Vec<Revision>,
}

/// Internal mutable state.
#[derive(Debug)]
struct StoreInner {
    entries: HashMap<ObjectId, Entry>,
    root: ObjectId,
    fail_on: Option<FailOn>,
}

/// In-memory store for testing.
///
/// Thread-safe via one internal mutex; cheap to clone through [`Arc`].
#[derive(Debug)]
pub struct InMemoryStore {
    inner: Mutex<StoreInner>,
}

impl InMemoryStore {
    /// Create a store holding only the root folder `/`.
    pub fn new() -> Self {
        let root = ObjectId::generate();
        let mut entries = HashMap::new();
        entries.insert(
            root.clone(),
            Entry {
                id: root.clone(),
                name: "/".to_string(),
                folder: true,
                deleted: false,
                parent: None,
                original_parent: None,
                children: Vec::new(),
                revisions: Vec::new(),
            },
        );
        Self {
            inner: Mutex::new(StoreInner {
                entries,
                root,
                fail_on: None,
            }),
        }
    }

    /// Configure one method to fail until cleared.
    pub fn set_fail_on(&self, fail_on: Option<FailOn>) {
        self.inner.lock().unwrap().fail_on = fail_on;
    }

    /// Total number of live (non-deleted) entries, root included.
    pub fn live_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.entries.values().filter(|e| !e.deleted).count()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreInner {
    fn entry(&self, id: &ObjectId) -> Result<&Entry, StoreError> {
        self.entries
            .get(id)
            .ok_or_else(|| StoreError::InvalidTarget(format!("unknown node: {id}")))
    }

    fn entry_mut(&mut self, id: &ObjectId) -> Result<&mut Entry, StoreError> {
        self.entries
            .get_mut(id)
            .ok_or_else(|| StoreError::InvalidTarget(format!("unknown node: {id}")))
    }

    /// Full path of an entry, walking the parent chain. Soft-deleted
    /// entries keep reporting their pre-deletion path.
    fn path_of(&self, id: &ObjectId) -> String {
        let mut segments = Vec::new();
        let mut cursor = Some(id.clone());
        while let Some(current) = cursor {
            let Some(entry) = self.entries.get(&current) else {
                break;
            };
            if entry.parent.is_none() && entry.original_parent.is_none() {
                break; // root contributes no segment
            }
            segments.push(entry.name.clone());
            cursor = entry.parent.clone().or_else(|| entry.original_parent.clone());
        }
        segments.reverse();
        format!("/{}", segments.join("/"))
    }

    fn node_view(&self, entry: &Entry, version: Option<String>) -> Node {
        Node {
            id: entry.id.clone(),
            name: entry.name.clone(),
            path: self.path_of(&entry.id),
            folder: entry.folder,
            deleted: entry.deleted,
            version,
        }
    }

    /// Resolve a path to a live entry id, descending only through
    /// non-deleted children.
    fn resolve_path(&self, path: &str) -> Option<ObjectId> {
        let mut current = self.root.clone();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let entry = self.entries.get(&current)?;
            let next = entry.children.iter().find(|child_id| {
                self.entries
                    .get(child_id)
                    .is_some_and(|c| !c.deleted && c.name == segment)
            })?;
            current = next.clone();
        }
        Some(current)
    }

    fn has_live_child_named(&self, parent: &Entry, name: &str) -> bool {
        parent.children.iter().any(|child_id| {
            self.entries
                .get(child_id)
                .is_some_and(|c| !c.deleted && c.name == name)
        })
    }

    fn revision<'a>(
        &self,
        entry: &'a Entry,
        version: Option<&str>,
    ) -> Result<Option<&'a Revision>, StoreError> {
        match version {
            None => Ok(entry.revisions.last()),
            Some(label) => entry
                .revisions
                .iter()
                .find(|r| r.label == label)
                .map(Some)
                .ok_or_else(|| StoreError::VersionNotFound(label.to_string())),
        }
    }

    /// Whether `candidate` is `ancestor` itself or sits beneath it.
    fn is_self_or_descendant(&self, candidate: &ObjectId, ancestor: &ObjectId) -> bool {
        let mut cursor = Some(candidate.clone());
        while let Some(current) = cursor {
            if &current == ancestor {
                return true;
            }
            cursor = self.entries.get(&current).and_then(|e| e.parent.clone());
        }
        false
    }

    fn failure_for(
        &self,
        matcher: impl Fn(&FailOn) -> Option<&StoreError>,
    ) -> Option<StoreError> {
        self.fail_on.as_ref().and_then(matcher).cloned()
    }
}

impl RemoteStore for InMemoryStore {
    fn get_file(&self, path: &str) -> Result<Option<Node>, StoreError> {
        let inner = self.inner.lock().unwrap();
        if let Some(FailOn::GetFile(e)) = &inner.fail_on {
            return Err(e.clone());
        }
        Ok(inner
            .resolve_path(path)
            .and_then(|id| inner.entries.get(&id))
            .map(|entry| inner.node_view(entry, None)))
    }

    fn get_file_by_id(&self, id: &ObjectId) -> Result<Option<Node>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.entries.get(id).map(|entry| inner.node_view(entry, None)))
    }

    fn get_file_at_version(&self, path: &str, version: &str) -> Result<Option<Node>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let Some(id) = inner.resolve_path(path) else {
            return Ok(None);
        };
        let entry = inner.entry(&id)?;
        inner.revision(entry, Some(version))?;
        Ok(Some(inner.node_view(entry, Some(version.to_string()))))
    }

    fn get_children(
        &self,
        parent: &ObjectId,
        filter: Option<&str>,
    ) -> Result<Vec<Node>, StoreError> {
        let inner = self.inner.lock().unwrap();
        if let Some(FailOn::GetChildren(e)) = &inner.fail_on {
            return Err(e.clone());
        }
        let Some(entry) = inner.entries.get(parent) else {
            return Ok(Vec::new());
        };
        let mut nodes: Vec<Node> = entry
            .children
            .iter()
            .filter_map(|child_id| inner.entries.get(child_id))
            .filter(|c| !c.deleted)
            .filter(|c| filter.is_none_or(|suffix| c.name.ends_with(suffix)))
            .map(|c| inner.node_view(c, None))
            .collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(nodes)
    }

    fn create_folder(&self, parent: &ObjectId, name: &str) -> Result<Node, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(err) = inner.failure_for(|f| match f {
            FailOn::CreateFolder(e) => Some(e),
            _ => None,
        }) {
            return Err(err);
        }
        let parent_entry = inner.entry(parent)?;
        if !parent_entry.folder || parent_entry.deleted {
            return Err(StoreError::InvalidTarget(format!(
                "parent is not a live folder: {parent}"
            )));
        }
        if inner.has_live_child_named(parent_entry, name) {
            return Err(StoreError::InvalidTarget(format!(
                "child name already exists: {name}"
            )));
        }
        let id = ObjectId::generate();
        let entry = Entry {
            id: id.clone(),
            name: name.to_string(),
            folder: true,
            deleted: false,
            parent: Some(parent.clone()),
            original_parent: None,
            children: Vec::new(),
            revisions: Vec::new(),
        };
        inner.entries.insert(id.clone(), entry);
        inner.entry_mut(parent)?.children.push(id.clone());
        let entry = inner.entry(&id)?.clone();
        Ok(inner.node_view(&entry, None))
    }

    fn create_file(
        &self,
        parent: &ObjectId,
        name: &str,
        data: NodeData,
        comment: &str,
    ) -> Result<Node, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(err) = inner.failure_for(|f| match f {
            FailOn::CreateFile(e) => Some(e),
            _ => None,
        }) {
            return Err(err);
        }
        let parent_entry = inner.entry(parent)?;
        if !parent_entry.folder || parent_entry.deleted {
            return Err(StoreError::InvalidTarget(format!(
                "parent is not a live folder: {parent}"
            )));
        }
        if inner.has_live_child_named(parent_entry, name) {
            return Err(StoreError::InvalidTarget(format!(
                "child name already exists: {name}"
            )));
        }
        let id = ObjectId::generate();
        let revision = Revision {
            label: "v1".to_string(),
            data,
            summary: VersionSummary {
                id: "v1".to_string(),
                author: "system".to_string(),
                date: UtcTimestamp::now(),
                message: comment.to_string(),
            },
        };
        let entry = Entry {
            id: id.clone(),
            name: name.to_string(),
            folder: false,
            deleted: false,
            parent: Some(parent.clone()),
            original_parent: None,
            children: Vec::new(),
            revisions: vec![revision],
        };
        inner.entries.insert(id.clone(), entry);
        inner.entry_mut(parent)?.children.push(id.clone());
        let entry = inner.entry(&id)?.clone();
        Ok(inner.node_view(&entry, Some("v1".to_string())))
    }

    fn update_file(&self, node: &Node, data: NodeData, comment: &str) -> Result<Node, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(err) = inner.failure_for(|f| match f {
            FailOn::UpdateFile(e) => Some(e),
            _ => None,
        }) {
            return Err(err);
        }
        let entry = inner.entry_mut(&node.id)?;
        if entry.folder {
            return Err(StoreError::InvalidTarget(format!(
                "cannot write data to a folder: {}",
                node.id
            )));
        }
        let label = format!("v{}", entry.revisions.len() + 1);
        entry.revisions.push(Revision {
            label: label.clone(),
            data,
            summary: VersionSummary {
                id: label.clone(),
                author: "system".to_string(),
                date: UtcTimestamp::now(),
                message: comment.to_string(),
            },
        });
        let entry = inner.entry(&node.id)?.clone();
        Ok(inner.node_view(&entry, Some(label)))
    }

    fn get_data_at_version(
        &self,
        path: &str,
        version: Option<&str>,
    ) -> Result<Option<NodeData>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let Some(id) = inner.resolve_path(path) else {
            return Ok(None);
        };
        let entry = inner.entry(&id)?;
        Ok(inner.revision(entry, version)?.map(|r| r.data.clone()))
    }

    fn get_version_summary(
        &self,
        path: &str,
        version: Option<&str>,
    ) -> Result<Option<VersionSummary>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let Some(id) = inner.resolve_path(path) else {
            return Ok(None);
        };
        let entry = inner.entry(&id)?;
        Ok(inner.revision(entry, version)?.map(|r| r.summary.clone()))
    }

    fn get_version_summaries(&self, path: &str) -> Result<Vec<VersionSummary>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let Some(id) = inner.resolve_path(path) else {
            return Ok(Vec::new());
        };
        let entry = inner.entry(&id)?;
        Ok(entry.revisions.iter().map(|r| r.summary.clone()).collect())
    }

    fn delete_file(&self, id: &ObjectId, permanent: bool) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(err) = inner.failure_for(|f| match f {
            FailOn::DeleteFile(e) => Some(e),
            _ => None,
        }) {
            return Err(err);
        }
        if id == &inner.root {
            return Err(StoreError::InvalidTarget("cannot delete the root".into()));
        }
        let entry = inner.entry(id)?.clone();
        if let Some(parent) = &entry.parent {
            let parent_entry = inner.entry_mut(parent)?;
            parent_entry.children.retain(|c| c != id);
        }
        if permanent {
            // Remove the whole subtree from the map.
            let mut stack = vec![id.clone()];
            while let Some(current) = stack.pop() {
                if let Some(removed) = inner.entries.remove(&current) {
                    stack.extend(removed.children);
                }
            }
        } else {
            let entry = inner.entry_mut(id)?;
            entry.original_parent = entry.parent.take();
            entry.deleted = true;
        }
        Ok(())
    }

    fn undelete_file(&self, id: &ObjectId) -> Result<Node, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(err) = inner.failure_for(|f| match f {
            FailOn::UndeleteFile(e) => Some(e),
            _ => None,
        }) {
            return Err(err);
        }
        let entry = inner.entry(id)?.clone();
        if !entry.deleted {
            return Err(StoreError::InvalidTarget(format!(
                "node is not in the trash: {id}"
            )));
        }
        let Some(parent_id) = entry.original_parent.clone() else {
            return Err(StoreError::InvalidTarget(format!(
                "trash entry has no original parent: {id}"
            )));
        };
        let parent_entry = inner.entry(&parent_id)?;
        if parent_entry.deleted {
            return Err(StoreError::InvalidTarget(
                "original parent is itself deleted".into(),
            ));
        }
        if inner.has_live_child_named(parent_entry, &entry.name) {
            return Err(StoreError::InvalidTarget(format!(
                "restore target name already exists: {}",
                entry.name
            )));
        }
        inner.entry_mut(&parent_id)?.children.push(id.clone());
        {
            let entry = inner.entry_mut(id)?;
            entry.deleted = false;
            entry.parent = entry.original_parent.take();
        }
        let entry = inner.entry(id)?.clone();
        Ok(inner.node_view(&entry, None))
    }

    fn move_file(
        &self,
        id: &ObjectId,
        new_parent: &ObjectId,
        new_name: &str,
    ) -> Result<Node, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(err) = inner.failure_for(|f| match f {
            FailOn::MoveFile(e) => Some(e),
            _ => None,
        }) {
            return Err(err);
        }
        if id == &inner.root {
            return Err(StoreError::InvalidTarget("cannot move the root".into()));
        }
        let entry = inner.entry(id)?.clone();
        if entry.deleted {
            return Err(StoreError::InvalidTarget(format!(
                "cannot move a trashed node: {id}"
            )));
        }
        let parent_entry = inner.entry(new_parent)?;
        if !parent_entry.folder || parent_entry.deleted {
            return Err(StoreError::InvalidTarget(format!(
                "destination is not a live folder: {new_parent}"
            )));
        }
        // Rejecting cycles here, atomically, is the store's contract; the
        // client maps this rejection to its InvalidState.
        if entry.folder && inner.is_self_or_descendant(new_parent, id) {
            return Err(StoreError::InvalidTarget(
                "move would place a folder under itself".into(),
            ));
        }
        let same_parent = entry.parent.as_ref() == Some(new_parent);
        let colliding = inner.entries.get(new_parent).is_some_and(|p| {
            p.children.iter().any(|child_id| {
                child_id != id
                    && inner
                        .entries
                        .get(child_id)
                        .is_some_and(|c| !c.deleted && c.name == new_name)
            })
        });
        if colliding {
            return Err(StoreError::InvalidTarget(format!(
                "destination name already exists: {new_name}"
            )));
        }
        if !same_parent {
            if let Some(old_parent) = entry.parent.clone() {
                inner.entry_mut(&old_parent)?.children.retain(|c| c != id);
            }
            inner.entry_mut(new_parent)?.children.push(id.clone());
        }
        {
            let entry = inner.entry_mut(id)?;
            entry.parent = Some(new_parent.clone());
            entry.name = new_name.to_string();
        }
        let entry = inner.entry(id)?.clone();
        Ok(inner.node_view(&entry, None))
    }

    fn get_trash(&self, parent: &ObjectId) -> Result<Vec<Node>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut nodes: Vec<Node> = inner
            .entries
            .values()
            .filter(|e| e.deleted && e.original_parent.as_ref() == Some(parent))
            .map(|e| inner.node_view(e, None))
            .collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(nodes)
    }
}

/// Connector over an [`InMemoryStore`].
///
/// Accepts any non-empty credentials unless restricted with
/// [`with_credentials`](InMemoryConnector::with_credentials).
pub struct InMemoryConnector {
    store: Arc<InMemoryStore>,
    required: Option<(String, String)>,
}

impl InMemoryConnector {
    /// A connector accepting any non-empty user and password.
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self {
            store,
            required: None,
        }
    }

    /// A connector accepting exactly one credential pair.
    pub fn with_credentials(
        store: Arc<InMemoryStore>,
        user: impl Into<String>,
        pass: impl Into<String>,
    ) -> Self {
        Self {
            store,
            required: Some((user.into(), pass.into())),
        }
    }
}

impl Connector for InMemoryConnector {
    fn connect(&self, user: &str, pass: &str) -> Result<ConnectResult, StoreError> {
        if user.is_empty() || pass.is_empty() {
            return Err(StoreError::AuthFailed("empty credentials".into()));
        }
        if let Some((required_user, required_pass)) = &self.required {
            if user != required_user || pass != required_pass {
                return Err(StoreError::AuthFailed("bad credentials".into()));
            }
        }
        Ok(ConnectResult {
            store: self.store.clone(),
            user: UserInfo {
                login: user.to_string(),
            },
        })
    }
}
