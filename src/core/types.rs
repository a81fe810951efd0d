//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`ObjectId`] - Opaque identifier for a stored entity
//! - [`ObjectType`] - The kind of a stored node
//! - [`SharedKind`] - The four reusable shared-object kinds
//! - [`Directory`] - A folder in the hierarchical store
//! - [`ObjectInfo`] - Browse/trash metadata for a stored entity
//! - [`VersionSummary`] - One committed revision of a stored entity
//! - [`UtcTimestamp`] - RFC3339 timestamp
//!
//! # Validation
//!
//! Identifiers enforce validity at construction time: an empty id cannot
//! be represented, preventing a class of "lost lookup" bugs where a blank
//! key silently matches nothing.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid object id: {0}")]
    InvalidObjectId(String),

    #[error("invalid name: {0}")]
    InvalidName(String),
}

/// An opaque unique identifier for a stored entity.
///
/// Ids are assigned by the store on create (UUID v4 in the in-memory
/// simulation); any non-empty string received from a store is accepted.
///
/// # Example
///
/// ```
/// use strata::core::types::ObjectId;
///
/// let id = ObjectId::new("a1b2c3").unwrap();
/// assert_eq!(id.as_str(), "a1b2c3");
/// assert!(ObjectId::new("").is_err());
///
/// // Freshly generated ids are unique
/// assert_ne!(ObjectId::generate(), ObjectId::generate());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

impl ObjectId {
    /// Create a new validated object id.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidObjectId` if the id is empty.
    pub fn new(id: impl Into<String>) -> Result<Self, TypeError> {
        let id = id.into();
        if id.is_empty() {
            return Err(TypeError::InvalidObjectId(
                "object id cannot be empty".into(),
            ));
        }
        Ok(Self(id))
    }

    /// Generate a fresh unique id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ObjectId {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of a stored node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    /// A folder node.
    Folder,
    /// A pipeline definition.
    Pipeline,
    /// A job definition.
    Job,
    /// A database connection definition.
    DatabaseConnection,
    /// A slave server definition.
    SlaveServer,
    /// A cluster schema definition.
    ClusterSchema,
    /// A partition schema definition.
    PartitionSchema,
}

impl ObjectType {
    /// File extension used when storing this kind, empty for folders.
    pub fn extension(&self) -> &'static str {
        match self {
            ObjectType::Folder => "",
            ObjectType::Pipeline => ".pln",
            ObjectType::Job => ".job",
            ObjectType::DatabaseConnection => ".dbc",
            ObjectType::SlaveServer => ".slv",
            ObjectType::ClusterSchema => ".cls",
            ObjectType::PartitionSchema => ".pts",
        }
    }

    /// Reconstruct the kind from a stored file name, if recognizable.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let dot = name.rfind('.')?;
        match &name[dot..] {
            ".pln" => Some(ObjectType::Pipeline),
            ".job" => Some(ObjectType::Job),
            ".dbc" => Some(ObjectType::DatabaseConnection),
            ".slv" => Some(ObjectType::SlaveServer),
            ".cls" => Some(ObjectType::ClusterSchema),
            ".pts" => Some(ObjectType::PartitionSchema),
            _ => None,
        }
    }

    /// The bare object name for a stored file name of this kind.
    pub fn strip_extension<'a>(&self, file_name: &'a str) -> &'a str {
        file_name.strip_suffix(self.extension()).unwrap_or(file_name)
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ObjectType::Folder => "folder",
            ObjectType::Pipeline => "pipeline",
            ObjectType::Job => "job",
            ObjectType::DatabaseConnection => "database connection",
            ObjectType::SlaveServer => "slave server",
            ObjectType::ClusterSchema => "cluster schema",
            ObjectType::PartitionSchema => "partition schema",
        };
        write!(f, "{text}")
    }
}

/// The four reusable shared-object kinds.
///
/// Shared objects are named definitions referenced by many pipelines and
/// jobs, loaded once at connect time and cached for repeated fast access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharedKind {
    DatabaseConnection,
    SlaveServer,
    ClusterSchema,
    PartitionSchema,
}

impl SharedKind {
    /// All shared kinds, in load order.
    pub const ALL: [SharedKind; 4] = [
        SharedKind::DatabaseConnection,
        SharedKind::SlaveServer,
        SharedKind::ClusterSchema,
        SharedKind::PartitionSchema,
    ];

    /// The stored-node kind corresponding to this shared kind.
    pub fn object_type(&self) -> ObjectType {
        match self {
            SharedKind::DatabaseConnection => ObjectType::DatabaseConnection,
            SharedKind::SlaveServer => ObjectType::SlaveServer,
            SharedKind::ClusterSchema => ObjectType::ClusterSchema,
            SharedKind::PartitionSchema => ObjectType::PartitionSchema,
        }
    }
}

impl std::fmt::Display for SharedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.object_type())
    }
}

/// A folder in the hierarchical store.
///
/// Holds a back-reference to its parent by id only; children are the
/// store's authority and are never cached here. Children are unique by
/// name within their parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    /// Store-assigned id; `None` until the directory is saved.
    pub id: Option<ObjectId>,
    /// Id of the parent directory; `None` only for the root.
    pub parent_id: Option<ObjectId>,
    /// Leaf name of the directory.
    pub name: String,
    /// Full path from the root, `/` separated.
    pub path: String,
}

impl Directory {
    /// A directory that has not been saved yet.
    pub fn new_child(parent_id: ObjectId, parent_path: &str, name: impl Into<String>) -> Self {
        let name = name.into();
        let path = if parent_path == "/" {
            format!("/{name}")
        } else {
            format!("{parent_path}/{name}")
        };
        Self {
            id: None,
            parent_id: Some(parent_id),
            name,
            path,
        }
    }

    /// Whether this directory is the repository root.
    pub fn is_root(&self) -> bool {
        self.path == "/"
    }
}

/// Browse/trash metadata for a stored entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// Id of the entity.
    pub id: ObjectId,
    /// Bare object name (extension stripped).
    pub name: String,
    /// Kind of the entity.
    pub object_type: ObjectType,
    /// Full path of the entity at the time of listing.
    pub path: String,
    /// Id of the directory the entity belongs (or belonged) to.
    pub parent_id: Option<ObjectId>,
    /// Whether the entity currently sits in the trash.
    pub deleted: bool,
}

/// One committed revision of a stored entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSummary {
    /// Store-assigned version label ("v1", "v2", ...).
    pub id: String,
    /// Login of the committing user.
    pub author: String,
    /// Commit time.
    pub date: UtcTimestamp,
    /// Commit comment.
    pub message: String,
}

/// The authenticated user of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// Login name; also names the user's home directory.
    pub login: String,
}

/// A UTC timestamp in RFC3339 format.
///
/// # Example
///
/// ```
/// use strata::core::types::UtcTimestamp;
///
/// let now = UtcTimestamp::now();
/// assert!(now.to_string().contains('T'));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtcTimestamp(chrono::DateTime<chrono::Utc>);

impl UtcTimestamp {
    /// Create a timestamp for the current moment.
    pub fn now() -> Self {
        Self(chrono::Utc::now())
    }

    /// Create a timestamp from a chrono DateTime.
    pub fn from_datetime(dt: chrono::DateTime<chrono::Utc>) -> Self {
        Self(dt)
    }

    /// Get the underlying datetime.
    pub fn as_datetime(&self) -> &chrono::DateTime<chrono::Utc> {
        &self.0
    }
}

impl std::fmt::Display for UtcTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod object_id {
        use super::*;

        #[test]
        fn valid_ids() {
            assert!(ObjectId::new("a").is_ok());
            assert!(ObjectId::new("folder/with/slashes").is_ok());
            assert!(ObjectId::new("6a1b").is_ok());
        }

        #[test]
        fn empty_rejected() {
            assert!(ObjectId::new("").is_err());
        }

        #[test]
        fn generated_ids_are_unique() {
            let a = ObjectId::generate();
            let b = ObjectId::generate();
            assert_ne!(a, b);
        }

        #[test]
        fn ordering_is_lexicographic() {
            let a = ObjectId::new("aaa").unwrap();
            let b = ObjectId::new("bbb").unwrap();
            assert!(a < b);
        }

        #[test]
        fn serde_roundtrip() {
            let id = ObjectId::new("abc-123").unwrap();
            let json = serde_json::to_string(&id).unwrap();
            let parsed: ObjectId = serde_json::from_str(&json).unwrap();
            assert_eq!(id, parsed);
        }

        #[test]
        fn serde_rejects_empty() {
            let result: Result<ObjectId, _> = serde_json::from_str(r#""""#);
            assert!(result.is_err());
        }
    }

    mod object_type {
        use super::*;

        #[test]
        fn extension_roundtrip() {
            for ty in [
                ObjectType::Pipeline,
                ObjectType::Job,
                ObjectType::DatabaseConnection,
                ObjectType::SlaveServer,
                ObjectType::ClusterSchema,
                ObjectType::PartitionSchema,
            ] {
                let file_name = format!("example{}", ty.extension());
                assert_eq!(ObjectType::from_file_name(&file_name), Some(ty));
                assert_eq!(ty.strip_extension(&file_name), "example");
            }
        }

        #[test]
        fn unknown_extension() {
            assert_eq!(ObjectType::from_file_name("readme.txt"), None);
            assert_eq!(ObjectType::from_file_name("no-extension"), None);
        }

        #[test]
        fn folder_has_no_extension() {
            assert_eq!(ObjectType::Folder.extension(), "");
        }
    }

    mod directory {
        use super::*;

        #[test]
        fn child_of_root() {
            let root_id = ObjectId::new("root").unwrap();
            let dir = Directory::new_child(root_id.clone(), "/", "etc");
            assert_eq!(dir.path, "/etc");
            assert_eq!(dir.parent_id, Some(root_id));
            assert!(dir.id.is_none());
            assert!(!dir.is_root());
        }

        #[test]
        fn nested_child_path() {
            let parent_id = ObjectId::new("p1").unwrap();
            let dir = Directory::new_child(parent_id, "/etc", "pipeline");
            assert_eq!(dir.path, "/etc/pipeline");
        }
    }

    mod display {
        use super::*;

        #[test]
        fn shared_kind_names() {
            assert_eq!(
                SharedKind::DatabaseConnection.to_string(),
                "database connection"
            );
            assert_eq!(SharedKind::SlaveServer.to_string(), "slave server");
            assert_eq!(SharedKind::ClusterSchema.to_string(), "cluster schema");
            assert_eq!(SharedKind::PartitionSchema.to_string(), "partition schema");
        }
    }
}
