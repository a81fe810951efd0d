//! store::traits
//!
//! Remote store trait definition.
//!
//! # Design
//!
//! The `RemoteStore` trait abstracts the backing versioned hierarchical
//! service. Calls are synchronous and block the calling thread for their
//! duration; cancellation never interrupts an in-flight call. The store
//! guarantees atomic per-call semantics: each method either fully applies
//! or fully rejects, and two concurrent calls never interleave partially.
//!
//! The store is the authority for structural invariants it can check in
//! one call (child-name uniqueness, move-cycle rejection); the client owns
//! everything that spans multiple calls, via its lock manager.
//!
//! # Example
//!
//! ```ignore
//! use strata::store::{RemoteStore, StoreError};
//!
//! fn child_count(store: &dyn RemoteStore, path: &str) -> Result<usize, StoreError> {
//!     match store.get_file(path)? {
//!         Some(node) => Ok(store.get_children(&node.id, None)?.len()),
//!         None => Ok(0),
//!     }
//! }
//! ```

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::types::{ObjectId, UserInfo, VersionSummary};

/// Errors from remote store operations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Authentication failed at connect time.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The call targets something structurally impossible: a duplicate
    /// child name, a move that would create a cycle, a folder where a
    /// file is required.
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    /// The requested version label does not exist for the target.
    #[error("version not found: {0}")]
    VersionNotFound(String),

    /// Transport or internal backing-store fault.
    #[error("store fault: {0}")]
    Backend(String),

    /// A payload could not be decoded into the requested shape.
    #[error("malformed payload: {0}")]
    MalformedData(String),
}

/// One node (folder or file) in the hierarchical store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Store-assigned id.
    pub id: ObjectId,
    /// Leaf name, extension included for files.
    pub name: String,
    /// Full path from the root.
    pub path: String,
    /// Whether the node is a folder.
    pub folder: bool,
    /// Whether the node currently sits in the trash.
    pub deleted: bool,
    /// Version label this node view corresponds to; `None` means latest.
    pub version: Option<String>,
}

/// Opaque payload attached to a file node.
///
/// Artifact definitions round-trip through this via serde; the concrete
/// wire format belongs to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeData(serde_json::Value);

impl NodeData {
    /// Encode a serializable artifact into a payload.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::MalformedData` if the value cannot be
    /// represented (non-string map keys and similar).
    pub fn encode<T: Serialize>(value: &T) -> Result<Self, StoreError> {
        serde_json::to_value(value)
            .map(Self)
            .map_err(|e| StoreError::MalformedData(e.to_string()))
    }

    /// Decode the payload into a concrete artifact shape.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::MalformedData` if the payload does not match.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_value(self.0.clone())
            .map_err(|e| StoreError::MalformedData(e.to_string()))
    }
}

/// The remote store surface this layer consumes.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; many worker threads call into
/// one store concurrently.
pub trait RemoteStore: Send + Sync {
    /// Look up a node by path. `Ok(None)` when absent.
    fn get_file(&self, path: &str) -> Result<Option<Node>, StoreError>;

    /// Look up a node by id. `Ok(None)` when absent.
    fn get_file_by_id(&self, id: &ObjectId) -> Result<Option<Node>, StoreError>;

    /// Look up a node as of a committed version. `Ok(None)` when the path
    /// is absent.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::VersionNotFound` for an unknown version label.
    fn get_file_at_version(&self, path: &str, version: &str) -> Result<Option<Node>, StoreError>;

    /// Children of a folder, ordered by name. An optional filter matches a
    /// name suffix (e.g., `".pln"`). Unknown parent yields an empty list.
    fn get_children(&self, parent: &ObjectId, filter: Option<&str>)
        -> Result<Vec<Node>, StoreError>;

    /// Create a folder under `parent`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidTarget` if a child of that name already
    /// exists or `parent` is not a folder.
    fn create_folder(&self, parent: &ObjectId, name: &str) -> Result<Node, StoreError>;

    /// Create a file under `parent` with an initial committed version.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidTarget` if a child of that name already
    /// exists or `parent` is not a folder.
    fn create_file(
        &self,
        parent: &ObjectId,
        name: &str,
        data: NodeData,
        comment: &str,
    ) -> Result<Node, StoreError>;

    /// Commit a new version of an existing file.
    fn update_file(&self, node: &Node, data: NodeData, comment: &str) -> Result<Node, StoreError>;

    /// Read a file's payload at a version (`None` = latest). `Ok(None)`
    /// when the path is absent.
    fn get_data_at_version(
        &self,
        path: &str,
        version: Option<&str>,
    ) -> Result<Option<NodeData>, StoreError>;

    /// Metadata for one committed version (`None` = latest). `Ok(None)`
    /// when the path is absent.
    fn get_version_summary(
        &self,
        path: &str,
        version: Option<&str>,
    ) -> Result<Option<VersionSummary>, StoreError>;

    /// All committed version summaries for a path, oldest first.
    fn get_version_summaries(&self, path: &str) -> Result<Vec<VersionSummary>, StoreError>;

    /// Delete a node. Soft (recoverable) unless `permanent`. Deleting a
    /// folder deletes its subtree.
    fn delete_file(&self, id: &ObjectId, permanent: bool) -> Result<(), StoreError>;

    /// Restore a soft-deleted node to its original parent.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidTarget` if the node is not in the trash
    /// or its original parent now has a child of the same name.
    fn undelete_file(&self, id: &ObjectId) -> Result<Node, StoreError>;

    /// Move and/or rename a node in one atomic call.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidTarget` for duplicate names at the
    /// destination and for moves that would place a folder under itself
    /// or one of its descendants.
    fn move_file(
        &self,
        id: &ObjectId,
        new_parent: &ObjectId,
        new_name: &str,
    ) -> Result<Node, StoreError>;

    /// Deleted entries whose original parent is `parent`.
    fn get_trash(&self, parent: &ObjectId) -> Result<Vec<Node>, StoreError>;
}

/// The result of a successful connection.
pub struct ConnectResult {
    /// The live store handle.
    pub store: Arc<dyn RemoteStore>,
    /// The authenticated user.
    pub user: UserInfo,
}

/// Authenticates and yields a live store handle.
pub trait Connector: Send + Sync {
    /// Authenticate against the backing service.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AuthFailed` for bad credentials.
    fn connect(&self, user: &str, pass: &str) -> Result<ConnectResult, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Payload {
        name: String,
        ports: Vec<u16>,
    }

    #[test]
    fn node_data_roundtrip() {
        let payload = Payload {
            name: "example".to_string(),
            ports: vec![80, 443],
        };
        let data = NodeData::encode(&payload).unwrap();
        let decoded: Payload = data.decode().unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn node_data_shape_mismatch() {
        let data = NodeData::encode(&42u32).unwrap();
        let result: Result<Payload, _> = data.decode();
        assert!(matches!(result, Err(StoreError::MalformedData(_))));
    }

    #[test]
    fn store_error_display() {
        assert_eq!(
            StoreError::InvalidTarget("duplicate child".into()).to_string(),
            "invalid target: duplicate child"
        );
        assert_eq!(
            StoreError::VersionNotFound("v9".into()).to_string(),
            "version not found: v9"
        );
        assert_eq!(
            StoreError::Backend("connection reset".into()).to_string(),
            "store fault: connection reset"
        );
    }
}
