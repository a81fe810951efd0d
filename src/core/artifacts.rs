//! core::artifacts
//!
//! Artifact definitions stored in the repository.
//!
//! # Kinds
//!
//! - [`SharedObject`] - the four reusable, cache-resident definitions
//!   (database connections, slave servers, cluster schemas, partition
//!   schemas)
//! - [`PipelineDef`] / [`JobDef`] - pipeline and job definitions, which
//!   reference shared objects by name
//!
//! Payloads round-trip through [`NodeData`](crate::store::NodeData) via
//! serde; the wire format beneath that belongs to the remote store.

use serde::{Deserialize, Serialize};

use crate::core::types::{ObjectId, SharedKind};

/// A reusable database connection definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConnection {
    /// Store-assigned id; `None` until first save.
    pub id: Option<ObjectId>,
    /// Unique name within the kind.
    pub name: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    /// Stored through the injected password codec, never in the clear.
    pub password: String,
}

/// A reusable slave server definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaveServer {
    /// Store-assigned id; `None` until first save.
    pub id: Option<ObjectId>,
    /// Unique name within the kind.
    pub name: String,
    pub hostname: String,
    pub port: u16,
    pub username: String,
    /// Stored through the injected password codec, never in the clear.
    pub password: String,
    /// Whether this slave coordinates the others in its cluster.
    pub master: bool,
}

/// A reusable cluster schema definition.
///
/// References slave servers by name; the references resolve through the
/// shared-object cache at load time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSchema {
    /// Store-assigned id; `None` until first save.
    pub id: Option<ObjectId>,
    /// Unique name within the kind.
    pub name: String,
    pub base_port: u16,
    /// Names of the participating slave servers.
    pub slave_names: Vec<String>,
}

/// A reusable partition schema definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSchema {
    /// Store-assigned id; `None` until first save.
    pub id: Option<ObjectId>,
    /// Unique name within the kind.
    pub name: String,
    pub partition_ids: Vec<String>,
}

/// One of the four reusable shared-object definitions.
///
/// # Example
///
/// ```
/// use strata::core::artifacts::{PartitionSchema, SharedObject};
/// use strata::core::types::SharedKind;
///
/// let schema = SharedObject::PartitionSchema(PartitionSchema {
///     id: None,
///     name: "by-region".to_string(),
///     partition_ids: vec!["eu".to_string(), "us".to_string()],
/// });
/// assert_eq!(schema.kind(), SharedKind::PartitionSchema);
/// assert_eq!(schema.name(), "by-region");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SharedObject {
    DatabaseConnection(DatabaseConnection),
    SlaveServer(SlaveServer),
    ClusterSchema(ClusterSchema),
    PartitionSchema(PartitionSchema),
}

impl SharedObject {
    /// The kind of this shared object.
    pub fn kind(&self) -> SharedKind {
        match self {
            SharedObject::DatabaseConnection(_) => SharedKind::DatabaseConnection,
            SharedObject::SlaveServer(_) => SharedKind::SlaveServer,
            SharedObject::ClusterSchema(_) => SharedKind::ClusterSchema,
            SharedObject::PartitionSchema(_) => SharedKind::PartitionSchema,
        }
    }

    /// The name of this shared object, unique within its kind.
    pub fn name(&self) -> &str {
        match self {
            SharedObject::DatabaseConnection(o) => &o.name,
            SharedObject::SlaveServer(o) => &o.name,
            SharedObject::ClusterSchema(o) => &o.name,
            SharedObject::PartitionSchema(o) => &o.name,
        }
    }

    /// The store-assigned id, if the object has been saved.
    pub fn id(&self) -> Option<&ObjectId> {
        match self {
            SharedObject::DatabaseConnection(o) => o.id.as_ref(),
            SharedObject::SlaveServer(o) => o.id.as_ref(),
            SharedObject::ClusterSchema(o) => o.id.as_ref(),
            SharedObject::PartitionSchema(o) => o.id.as_ref(),
        }
    }

    /// Set the store-assigned id.
    pub fn set_id(&mut self, id: ObjectId) {
        match self {
            SharedObject::DatabaseConnection(o) => o.id = Some(id),
            SharedObject::SlaveServer(o) => o.id = Some(id),
            SharedObject::ClusterSchema(o) => o.id = Some(id),
            SharedObject::PartitionSchema(o) => o.id = Some(id),
        }
    }

    /// The password field, for kinds that carry one.
    pub fn password(&self) -> Option<&str> {
        match self {
            SharedObject::DatabaseConnection(o) => Some(&o.password),
            SharedObject::SlaveServer(o) => Some(&o.password),
            _ => None,
        }
    }

    /// Replace the password field, for kinds that carry one.
    pub fn set_password(&mut self, password: String) {
        match self {
            SharedObject::DatabaseConnection(o) => o.password = password,
            SharedObject::SlaveServer(o) => o.password = password,
            _ => {}
        }
    }

    /// File name under the kind's well-known folder.
    pub fn file_name(&self) -> String {
        format!("{}{}", self.name(), self.kind().object_type().extension())
    }
}

/// A pipeline definition.
///
/// References database connections by name. `resolved_shared` is populated
/// at load time from the shared-object cache and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDef {
    /// Store-assigned id; `None` until first save.
    pub id: Option<ObjectId>,
    pub name: String,
    pub description: String,
    /// Names of database connections the pipeline reads or writes.
    pub databases: Vec<String>,
    /// Shared objects resolved at load time; not persisted.
    #[serde(skip)]
    pub resolved_shared: Vec<SharedObject>,
}

impl PipelineDef {
    /// A pipeline definition with no references.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: String::new(),
            databases: Vec::new(),
            resolved_shared: Vec::new(),
        }
    }
}

/// A job definition.
///
/// Same referencing model as [`PipelineDef`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDef {
    /// Store-assigned id; `None` until first save.
    pub id: Option<ObjectId>,
    pub name: String,
    pub description: String,
    /// Names of database connections the job uses.
    pub databases: Vec<String>,
    /// Shared objects resolved at load time; not persisted.
    #[serde(skip)]
    pub resolved_shared: Vec<SharedObject>,
}

impl JobDef {
    /// A job definition with no references.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: String::new(),
            databases: Vec::new(),
            resolved_shared: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_slave() -> SharedObject {
        SharedObject::SlaveServer(SlaveServer {
            id: None,
            name: "worker-1".to_string(),
            hostname: "worker-1.internal".to_string(),
            port: 8080,
            username: "cluster".to_string(),
            password: "secret".to_string(),
            master: false,
        })
    }

    #[test]
    fn kind_and_name_accessors() {
        let slave = sample_slave();
        assert_eq!(slave.kind(), SharedKind::SlaveServer);
        assert_eq!(slave.name(), "worker-1");
        assert_eq!(slave.file_name(), "worker-1.slv");
    }

    #[test]
    fn id_assignment() {
        let mut slave = sample_slave();
        assert!(slave.id().is_none());
        let id = ObjectId::generate();
        slave.set_id(id.clone());
        assert_eq!(slave.id(), Some(&id));
    }

    #[test]
    fn password_accessors() {
        let mut slave = sample_slave();
        assert_eq!(slave.password(), Some("secret"));
        slave.set_password("encoded".to_string());
        assert_eq!(slave.password(), Some("encoded"));

        let mut schema = SharedObject::PartitionSchema(PartitionSchema {
            id: None,
            name: "p".to_string(),
            partition_ids: vec![],
        });
        assert_eq!(schema.password(), None);
        schema.set_password("ignored".to_string());
        assert_eq!(schema.password(), None);
    }

    #[test]
    fn shared_object_serde_roundtrip() {
        let slave = sample_slave();
        let json = serde_json::to_string(&slave).unwrap();
        assert!(json.contains(r#""kind":"slave_server""#));
        let parsed: SharedObject = serde_json::from_str(&json).unwrap();
        assert_eq!(slave, parsed);
    }

    #[test]
    fn pipeline_resolved_shared_not_persisted() {
        let mut pipeline = PipelineDef::new("ingest");
        pipeline.databases.push("warehouse".to_string());
        pipeline.resolved_shared.push(sample_slave());

        let json = serde_json::to_string(&pipeline).unwrap();
        let parsed: PipelineDef = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.databases, vec!["warehouse".to_string()]);
        assert!(parsed.resolved_shared.is_empty());
    }
}
