//! client
//!
//! The repository client: the public operation surface over one shared
//! store connection.
//!
//! # Architecture
//!
//! A [`RepositoryClient`] is cheap state around an optional session. The
//! session, created by [`RepositoryClient::connect`], owns everything
//! scoped to the connection: the store handle, the lock manager, the
//! shared-object cache and the path resolver. Disconnecting drops the
//! session; every operation called without one fails with
//! [`RepositoryError::NotConnected`].
//!
//! # Invariants
//!
//! - Locks are taken in the global order (directory, object, cache;
//!   ascending id within a category) before any remote call of the
//!   operation runs.
//! - The cache is written only after the paired remote mutation
//!   succeeded, inside the same critical section. A failure anywhere
//!   leaves the cache at the pre-operation snapshot.
//! - Absence is not failure: lookups return `Ok(None)` or an empty list
//!   for things that do not exist.

use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::{SharedObjectCache, SharedObjectSet};
use crate::config::RepositoryConfig;
use crate::core::artifacts::{
    ClusterSchema, DatabaseConnection, JobDef, PartitionSchema, PipelineDef, SharedObject,
    SlaveServer,
};
use crate::core::progress::ProgressListener;
use crate::core::types::{Directory, ObjectId, ObjectInfo, ObjectType, SharedKind, UserInfo};
use crate::error::{RepositoryError, Result};
use crate::locks::{LockKey, LockManager, LockMode};
use crate::paths::{PathResolver, WellKnownRoot};
use crate::secrets::{PasswordCodec, PlainCodec};
use crate::store::{Connector, Node, NodeData, RemoteStore, StoreError};

/// Connection-scoped state. Built at connect, dropped at disconnect.
struct Session {
    store: Arc<dyn RemoteStore>,
    user: UserInfo,
    locks: LockManager,
    cache: SharedObjectCache,
    paths: PathResolver,
    root_id: ObjectId,
}

impl Session {
    fn lock(&self, key: LockKey, mode: LockMode) -> Result<crate::locks::LockGuard> {
        Ok(self.locks.acquire(key, mode)?)
    }
}

/// Client-side concurrency control and caching over one shared store
/// connection.
///
/// The client itself is `Send + Sync`; many threads drive one instance
/// concurrently. Operations on disjoint resources interleave freely,
/// conflicting ones are serialized by per-resource locks.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use strata::client::RepositoryClient;
/// use strata::config::RepositoryConfig;
/// use strata::store::{InMemoryConnector, InMemoryStore};
///
/// let connector = InMemoryConnector::new(Arc::new(InMemoryStore::new()));
/// let client = RepositoryClient::new(RepositoryConfig::default(), Arc::new(connector));
/// client.connect("amy", "secret").unwrap();
/// assert!(client.read_databases().unwrap().is_empty());
/// client.disconnect();
/// ```
pub struct RepositoryClient {
    config: RepositoryConfig,
    connector: Arc<dyn Connector>,
    codec: Arc<dyn PasswordCodec>,
    session: RwLock<Option<Arc<Session>>>,
}

impl RepositoryClient {
    /// A disconnected client. Passwords are stored as-is until a codec is
    /// injected via [`with_codec`](Self::with_codec).
    pub fn new(config: RepositoryConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            codec: Arc::new(PlainCodec),
            session: RwLock::new(None),
        }
    }

    /// Replace the password codec used for shared-object payloads.
    pub fn with_codec(mut self, codec: Arc<dyn PasswordCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Authenticate and establish the session: resolves the root and the
    /// user's home, ensures the well-known shared-object folders exist,
    /// then performs the initial shared-object load. A client that is
    /// already connected reconnects, dropping the previous session.
    pub fn connect(&self, user: &str, pass: &str) -> Result<UserInfo> {
        let connected = self.connector.connect(user, pass)?;
        let paths = PathResolver::new(connected.user.login.clone());
        let root = connected
            .store
            .get_file("/")?
            .ok_or_else(|| RepositoryError::InvalidState("store has no root folder".into()))?;
        paths.resolve(connected.store.as_ref(), WellKnownRoot::Home)?;
        for kind in SharedKind::ALL {
            paths.root_for_kind(connected.store.as_ref(), kind)?;
        }

        let session = Arc::new(Session {
            store: connected.store,
            user: connected.user,
            locks: LockManager::new(self.config.lock_timeout()),
            cache: SharedObjectCache::new(self.config.cache_invalidation),
            paths,
            root_id: root.id,
        });
        self.install(Some(session.clone()));

        if let Err(err) = self.load_shared(&session, true) {
            self.install(None);
            return Err(err);
        }
        debug!(user = %session.user.login, repository = %self.config.name, "connected");
        Ok(session.user.clone())
    }

    /// Drop the session. The cache and resolved paths are discarded;
    /// callers holding old cache snapshots keep reading them unharmed.
    pub fn disconnect(&self) {
        if let Some(session) = self.install(None) {
            session.cache.clear();
            session.paths.invalidate();
            debug!(user = %session.user.login, "disconnected");
        }
    }

    /// Whether a session is currently established.
    pub fn is_connected(&self) -> bool {
        self.read_session().is_some()
    }

    /// The authenticated user of the current session.
    pub fn user(&self) -> Result<UserInfo> {
        Ok(self.session()?.user.clone())
    }

    /// Reload every shared object from the store and swap the cache to
    /// the fresh snapshot. With `include_all_versions` the full revision
    /// history of each object is touched as well.
    pub fn load_and_cache_shared_objects(&self, include_all_versions: bool) -> Result<()> {
        let session = self.session()?;
        self.load_shared(&session, include_all_versions)
    }

    /// All cached database connections, sorted by name.
    pub fn read_databases(&self) -> Result<Vec<DatabaseConnection>> {
        let session = self.session()?;
        let snapshot = session.cache.current();
        Ok(snapshot
            .of_kind(SharedKind::DatabaseConnection)
            .into_iter()
            .filter_map(|object| match object {
                SharedObject::DatabaseConnection(db) => Some(db.clone()),
                _ => None,
            })
            .collect())
    }

    /// The repository root as a directory value.
    pub fn root_directory(&self) -> Result<Directory> {
        let session = self.session()?;
        Ok(Directory {
            id: Some(session.root_id.clone()),
            parent_id: None,
            name: String::new(),
            path: "/".to_string(),
        })
    }

    /// The connected user's home directory.
    pub fn home_directory(&self) -> Result<Directory> {
        let session = self.session()?;
        let path = session.paths.path_of(WellKnownRoot::Home);
        self.find_directory(&path)?
            .ok_or_else(|| RepositoryError::InvalidState(format!("home directory {path} missing")))
    }

    /// Look up a directory by path. `Ok(None)` when absent or not a
    /// folder.
    pub fn find_directory(&self, path: &str) -> Result<Option<Directory>> {
        let session = self.session()?;
        let Some(node) = session.store.get_file(path)? else {
            return Ok(None);
        };
        if !node.folder {
            return Ok(None);
        }
        let parent_id = if node.path == "/" {
            None
        } else {
            session
                .store
                .get_file(parent_path(&node.path))?
                .map(|parent| parent.id)
        };
        Ok(Some(Directory {
            id: Some(node.id),
            parent_id,
            name: node.name,
            path: node.path,
        }))
    }

    /// Create the directory in the store and assign its id. Saving a
    /// directory that already has an id is a no-op.
    pub fn save_directory(&self, dir: &mut Directory) -> Result<()> {
        let session = self.session()?;
        if dir.id.is_some() {
            return Ok(());
        }
        let parent = dir
            .parent_id
            .clone()
            .ok_or_else(|| RepositoryError::InvalidState("directory has no parent".into()))?;

        let _dir_guard = session.lock(LockKey::directory(parent.as_str()), LockMode::Exclusive)?;
        let node = session
            .store
            .create_folder(&parent, &dir.name)
            .map_err(|err| match err {
                StoreError::InvalidTarget(_) => RepositoryError::DuplicateName {
                    kind: "directory".to_string(),
                    name: dir.name.clone(),
                },
                other => other.into(),
            })?;
        dir.id = Some(node.id);
        dir.path = node.path;
        debug!(path = %dir.path, "directory created");
        Ok(())
    }

    /// Delete a directory. Soft (recoverable) unless `permanent`. An
    /// unknown id is a no-op.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::InvalidState`] when the directory is non-empty
    /// and `recursive` is false, or when the target is the root, `/home`,
    /// or a user's home directory.
    pub fn delete_directory(&self, id: &ObjectId, permanent: bool, recursive: bool) -> Result<()> {
        let session = self.session()?;
        let Some(node) = session.store.get_file_by_id(id)? else {
            return Ok(());
        };
        if !node.folder {
            return Err(RepositoryError::InvalidState(format!(
                "{} is not a directory",
                node.path
            )));
        }
        if let Some(reason) = protected_directory(&node.path) {
            return Err(RepositoryError::InvalidState(reason));
        }
        let parent = parent_node(&session, &node)?;

        let _guards = session.locks.acquire_many(vec![
            (LockKey::directory(parent.id.as_str()), LockMode::Exclusive),
            // The target's own directory lock keeps the emptiness check
            // valid through the delete: child creation takes it too.
            (LockKey::directory(id.as_str()), LockMode::Exclusive),
            (LockKey::from(id), LockMode::Exclusive),
        ])?;
        if !recursive && !session.store.get_children(id, None)?.is_empty() {
            return Err(RepositoryError::InvalidState(format!(
                "directory {} is not empty",
                node.path
            )));
        }
        session.store.delete_file(id, permanent).map_err(mutation)?;
        debug!(path = %node.path, permanent, "directory deleted");
        Ok(())
    }

    /// Move and/or rename a directory. `new_parent = None` keeps the
    /// current parent.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::InvalidState`] when the target is the root or
    /// the move would place the directory under itself or a descendant;
    /// [`RepositoryError::DuplicateName`] never arises here because the
    /// store reports destination collisions as part of its atomic move,
    /// surfaced as `InvalidState`.
    pub fn rename_directory(
        &self,
        id: &ObjectId,
        new_parent: Option<&ObjectId>,
        new_name: &str,
    ) -> Result<()> {
        let session = self.session()?;
        let Some(node) = session.store.get_file_by_id(id)? else {
            return Err(RepositoryError::InvalidState(format!(
                "unknown directory: {id}"
            )));
        };
        if let Some(reason) = protected_directory(&node.path) {
            return Err(RepositoryError::InvalidState(reason));
        }
        let old_parent = parent_node(&session, &node)?;
        let target_parent = new_parent.cloned().unwrap_or_else(|| old_parent.id.clone());

        let _guards = session.locks.acquire_many(vec![
            (
                LockKey::directory(old_parent.id.as_str()),
                LockMode::Exclusive,
            ),
            (
                LockKey::directory(target_parent.as_str()),
                LockMode::Exclusive,
            ),
            (LockKey::from(id), LockMode::Exclusive),
        ])?;
        session
            .store
            .move_file(id, &target_parent, new_name)
            .map_err(mutation)?;
        debug!(from = %node.path, to = %new_name, "directory moved");
        Ok(())
    }

    /// Names of a directory's children, sorted. An unknown id yields an
    /// empty list.
    pub fn list_directory_names(&self, id: &ObjectId) -> Result<Vec<String>> {
        let session = self.session()?;
        let _guard = session.lock(LockKey::directory(id.as_str()), LockMode::Shared)?;
        Ok(session
            .store
            .get_children(id, None)?
            .into_iter()
            .map(|node| node.name)
            .collect())
    }

    /// Browse a directory by path. The optional filter matches a file
    /// name suffix (e.g. `".pln"`). An unknown path yields an empty list.
    pub fn get_children(&self, path: &str, filter: Option<&str>) -> Result<Vec<ObjectInfo>> {
        let session = self.session()?;
        let Some(node) = session.store.get_file(path)? else {
            return Ok(Vec::new());
        };
        if !node.folder {
            return Ok(Vec::new());
        }
        let _guard = session.lock(LockKey::directory(node.id.as_str()), LockMode::Shared)?;
        let children = session.store.get_children(&node.id, filter)?;
        Ok(children
            .iter()
            .filter_map(|child| object_info(child, Some(node.id.clone())))
            .collect())
    }

    /// Whether an object of the given name and type sits directly in the
    /// directory. Advisory: the answer can be stale the moment it
    /// returns.
    pub fn exists(&self, name: &str, dir: &ObjectId, object_type: ObjectType) -> Result<bool> {
        let session = self.session()?;
        let _guard = session.lock(LockKey::directory(dir.as_str()), LockMode::Shared)?;
        let file_name = format!("{name}{}", object_type.extension());
        let children = session
            .store
            .get_children(dir, Some(object_type.extension()))?;
        Ok(children
            .iter()
            .any(|node| node.name == file_name && node.folder == (object_type == ObjectType::Folder)))
    }

    /// Save a shared object: write-through to the store, then update the
    /// cache, all inside one critical section. Assigns the store id on
    /// first save.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::DuplicateName`] when the name is taken by a
    /// different object of the kind and `overwrite` is false.
    pub fn save_shared_object(
        &self,
        object: &mut SharedObject,
        comment: &str,
        progress: &dyn ProgressListener,
        overwrite: bool,
    ) -> Result<()> {
        let session = self.session()?;
        let _done = DoneOnDrop(progress);
        let kind = object.kind();
        let root = session.paths.root_for_kind(session.store.as_ref(), kind)?;
        let path = format!(
            "{}/{}",
            session.paths.path_of(WellKnownRoot::for_kind(kind)),
            object.file_name()
        );
        progress.subtask(&format!("saving {kind} {}", object.name()));

        let _dir_guard = session.lock(LockKey::directory(root.as_str()), LockMode::Exclusive)?;
        let existing = session.store.get_file(&path)?;
        if let Some(node) = &existing {
            let same = object.id().is_some_and(|id| *id == node.id);
            if !overwrite && !same {
                return Err(RepositoryError::DuplicateName {
                    kind: kind.to_string(),
                    name: object.name().to_string(),
                });
            }
        }

        let mut requests = vec![(LockKey::cache(), LockMode::Exclusive)];
        if let Some(node) = &existing {
            requests.push((LockKey::from(&node.id), LockMode::Exclusive));
        } else if let Some(id) = object.id() {
            requests.push((LockKey::from(id), LockMode::Exclusive));
        }
        let _guards = session.locks.acquire_many(requests)?;

        let mut stored = object.clone();
        if let Some(clear) = stored.password() {
            let encoded = self.codec.encode(clear);
            stored.set_password(encoded);
        }
        let data = NodeData::encode(&stored)?;
        let node = match existing {
            Some(node) => session
                .store
                .update_file(&node, data, comment)
                .map_err(mutation)?,
            None => session
                .store
                .create_file(&root, &object.file_name(), data, comment)
                .map_err(mutation)?,
        };
        object.set_id(node.id);

        session.cache.insert(object.clone())?;
        debug!(kind = %kind, name = %object.name(), "shared object saved");
        Ok(())
    }

    /// Delete a shared object by name: store delete, then cache removal,
    /// inside one critical section. An unknown name is a no-op beyond
    /// dropping any stale cache entry.
    pub fn delete_shared_object(&self, kind: SharedKind, name: &str) -> Result<()> {
        let session = self.session()?;
        let root = session.paths.root_for_kind(session.store.as_ref(), kind)?;
        let path = format!(
            "{}/{}{}",
            session.paths.path_of(WellKnownRoot::for_kind(kind)),
            name,
            kind.object_type().extension()
        );

        let _dir_guard = session.lock(LockKey::directory(root.as_str()), LockMode::Exclusive)?;
        let existing = session.store.get_file(&path)?;
        let mut requests = vec![(LockKey::cache(), LockMode::Exclusive)];
        if let Some(node) = &existing {
            requests.push((LockKey::from(&node.id), LockMode::Exclusive));
        }
        let _guards = session.locks.acquire_many(requests)?;

        if let Some(node) = existing {
            session.store.delete_file(&node.id, false).map_err(mutation)?;
        }
        session.cache.remove(kind, name);
        debug!(kind = %kind, name = %name, "shared object deleted");
        Ok(())
    }

    /// Load a slave server at a version (`None` = latest). `Ok(None)`
    /// when the id is unknown.
    pub fn load_slave_server(
        &self,
        id: &ObjectId,
        version: Option<&str>,
    ) -> Result<Option<SlaveServer>> {
        match self.load_shared_object(id, version)? {
            Some(SharedObject::SlaveServer(server)) => Ok(Some(server)),
            Some(other) => Err(kind_mismatch(id, other.kind(), SharedKind::SlaveServer)),
            None => Ok(None),
        }
    }

    /// Load a partition schema at a version (`None` = latest). `Ok(None)`
    /// when the id is unknown.
    pub fn load_partition_schema(
        &self,
        id: &ObjectId,
        version: Option<&str>,
    ) -> Result<Option<PartitionSchema>> {
        match self.load_shared_object(id, version)? {
            Some(SharedObject::PartitionSchema(schema)) => Ok(Some(schema)),
            Some(other) => Err(kind_mismatch(id, other.kind(), SharedKind::PartitionSchema)),
            None => Ok(None),
        }
    }

    /// Load a cluster schema at a version (`None` = latest). Slave
    /// references are checked against the cache snapshot; dangling names
    /// are logged, not fatal. `Ok(None)` when the id is unknown.
    pub fn load_cluster_schema(
        &self,
        id: &ObjectId,
        version: Option<&str>,
    ) -> Result<Option<ClusterSchema>> {
        let session = self.session()?;
        match self.load_shared_object(id, version)? {
            Some(SharedObject::ClusterSchema(schema)) => {
                let snapshot = session.cache.current();
                for name in &schema.slave_names {
                    if snapshot.get(SharedKind::SlaveServer, name).is_none() {
                        warn!(slave = %name, cluster = %schema.name, "cluster references unknown slave server");
                    }
                }
                Ok(Some(schema))
            }
            Some(other) => Err(kind_mismatch(id, other.kind(), SharedKind::ClusterSchema)),
            None => Ok(None),
        }
    }

    /// Load a pipeline by name from a directory. `Ok(None)` when absent.
    pub fn load_pipeline(
        &self,
        name: &str,
        dir: &ObjectId,
        progress: &dyn ProgressListener,
        version: Option<&str>,
    ) -> Result<Option<PipelineDef>> {
        self.load_def(name, dir, progress, version)
    }

    /// Load a pipeline by id. `Ok(None)` when the id is unknown.
    pub fn load_pipeline_by_id(
        &self,
        id: &ObjectId,
        version: Option<&str>,
    ) -> Result<Option<PipelineDef>> {
        self.load_def_by_id(id, version)
    }

    /// Load a job by name from a directory. `Ok(None)` when absent.
    pub fn load_job(
        &self,
        name: &str,
        dir: &ObjectId,
        progress: &dyn ProgressListener,
        version: Option<&str>,
    ) -> Result<Option<JobDef>> {
        self.load_def(name, dir, progress, version)
    }

    /// Load a job by id. `Ok(None)` when the id is unknown.
    pub fn load_job_by_id(&self, id: &ObjectId, version: Option<&str>) -> Result<Option<JobDef>> {
        self.load_def_by_id(id, version)
    }

    /// Save a pipeline into a directory, committing a new version if it
    /// already exists. Assigns the store id on first save.
    pub fn save_pipeline(
        &self,
        def: &mut PipelineDef,
        dir: &ObjectId,
        comment: &str,
        progress: &dyn ProgressListener,
    ) -> Result<()> {
        self.save_def(def, dir, comment, progress)
    }

    /// Save a job into a directory, committing a new version if it
    /// already exists. Assigns the store id on first save.
    pub fn save_job(
        &self,
        def: &mut JobDef,
        dir: &ObjectId,
        comment: &str,
        progress: &dyn ProgressListener,
    ) -> Result<()> {
        self.save_def(def, dir, comment, progress)
    }

    /// Move and/or rename a pipeline. `None` keeps the current parent or
    /// name respectively.
    pub fn rename_pipeline(
        &self,
        id: &ObjectId,
        new_parent: Option<&ObjectId>,
        new_name: Option<&str>,
    ) -> Result<()> {
        self.rename_artifact(id, new_parent, new_name, ObjectType::Pipeline)
    }

    /// Move and/or rename a job. `None` keeps the current parent or name
    /// respectively.
    pub fn rename_job(
        &self,
        id: &ObjectId,
        new_parent: Option<&ObjectId>,
        new_name: Option<&str>,
    ) -> Result<()> {
        self.rename_artifact(id, new_parent, new_name, ObjectType::Job)
    }

    /// Delete a stored artifact by id. Soft (recoverable) unless
    /// `permanent`. An unknown id is a no-op.
    pub fn delete_artifact(&self, id: &ObjectId, permanent: bool) -> Result<()> {
        let session = self.session()?;
        let Some(node) = session.store.get_file_by_id(id)? else {
            return Ok(());
        };
        if node.folder {
            return Err(RepositoryError::InvalidState(format!(
                "{} is a directory",
                node.path
            )));
        }
        let parent = parent_node(&session, &node)?;
        let _guards = session.locks.acquire_many(vec![
            (LockKey::directory(parent.id.as_str()), LockMode::Exclusive),
            (LockKey::from(id), LockMode::Exclusive),
        ])?;
        session.store.delete_file(id, permanent).map_err(mutation)?;
        debug!(path = %node.path, permanent, "artifact deleted");
        Ok(())
    }

    /// Restore a soft-deleted entity to its original parent.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::InvalidState`] when the entity is not in the
    /// trash or its old name is taken again.
    pub fn undelete_object(&self, info: &ObjectInfo) -> Result<()> {
        let session = self.session()?;
        let parent = info
            .parent_id
            .clone()
            .ok_or_else(|| RepositoryError::InvalidState("trash entry has no parent".into()))?;
        let _guards = session.locks.acquire_many(vec![
            (LockKey::directory(parent.as_str()), LockMode::Exclusive),
            (LockKey::from(&info.id), LockMode::Exclusive),
        ])?;
        session.store.undelete_file(&info.id).map_err(mutation)?;
        debug!(name = %info.name, "object restored from trash");
        Ok(())
    }

    /// Deleted entries whose original parent is `parent`.
    pub fn get_trash(&self, parent: &ObjectId) -> Result<Vec<ObjectInfo>> {
        let session = self.session()?;
        let nodes = session.store.get_trash(parent)?;
        Ok(nodes
            .iter()
            .filter_map(|node| object_info(node, Some(parent.clone())))
            .collect())
    }

    /// Metadata for a stored entity. `Ok(None)` when the id is unknown or
    /// the entity is not of the given type.
    pub fn get_object_information(
        &self,
        id: &ObjectId,
        object_type: ObjectType,
    ) -> Result<Option<ObjectInfo>> {
        let session = self.session()?;
        let Some(node) = session.store.get_file_by_id(id)? else {
            return Ok(None);
        };
        let parent_id = session
            .store
            .get_file(parent_path(&node.path))?
            .map(|parent| parent.id);
        Ok(object_info(&node, parent_id).filter(|info| info.object_type == object_type))
    }

    /// Paths of every pipeline referencing the database connection,
    /// sorted. Always a list, possibly empty.
    pub fn get_pipelines_using_database(&self, id: &ObjectId) -> Result<Vec<String>> {
        self.artifacts_using_database(id, ObjectType::Pipeline)
    }

    /// Paths of every job referencing the database connection, sorted.
    /// Always a list, possibly empty.
    pub fn get_jobs_using_database(&self, id: &ObjectId) -> Result<Vec<String>> {
        self.artifacts_using_database(id, ObjectType::Job)
    }

    fn session(&self) -> Result<Arc<Session>> {
        self.read_session().ok_or(RepositoryError::NotConnected)
    }

    fn read_session(&self) -> Option<Arc<Session>> {
        match self.session.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn install(&self, session: Option<Arc<Session>>) -> Option<Arc<Session>> {
        let mut guard = match self.session.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, session)
    }

    /// One full shared-object load under the cache lock, ending in an
    /// atomic snapshot swap.
    fn load_shared(&self, session: &Session, include_all_versions: bool) -> Result<()> {
        let _cache_guard = session.lock(LockKey::cache(), LockMode::Exclusive)?;
        let mut set = SharedObjectSet::new();
        for kind in SharedKind::ALL {
            let root = session.paths.root_for_kind(session.store.as_ref(), kind)?;
            let extension = kind.object_type().extension();
            for node in session.store.get_children(&root, Some(extension))? {
                let Some(data) = session.store.get_data_at_version(&node.path, None)? else {
                    continue;
                };
                let mut object: SharedObject = data.decode()?;
                self.decode_password(&mut object)?;
                object.set_id(node.id.clone());
                if include_all_versions {
                    session.store.get_version_summaries(&node.path)?;
                }
                set.add(object);
            }
        }
        debug!(objects = set.len(), "shared objects loaded");
        session.cache.replace(set);
        Ok(())
    }

    fn load_shared_object(
        &self,
        id: &ObjectId,
        version: Option<&str>,
    ) -> Result<Option<SharedObject>> {
        let session = self.session()?;
        let _guard = session.lock(LockKey::from(id), LockMode::Exclusive)?;
        let Some(node) = session.store.get_file_by_id(id)? else {
            return Ok(None);
        };
        let Some(data) = session.store.get_data_at_version(&node.path, version)? else {
            return Ok(None);
        };
        let mut object: SharedObject = data.decode()?;
        self.decode_password(&mut object)?;
        object.set_id(node.id);
        Ok(Some(object))
    }

    fn decode_password(&self, object: &mut SharedObject) -> Result<()> {
        if let Some(stored) = object.password() {
            let clear = self.codec.decode(stored).map_err(|_| {
                RepositoryError::InvalidState(format!(
                    "stored {} password is not decodable",
                    object.kind()
                ))
            })?;
            object.set_password(clear);
        }
        Ok(())
    }

    fn load_def<T: StoredDef>(
        &self,
        name: &str,
        dir: &ObjectId,
        progress: &dyn ProgressListener,
        version: Option<&str>,
    ) -> Result<Option<T>> {
        let session = self.session()?;
        let _done = DoneOnDrop(progress);
        progress.subtask(&format!("locating {} {name}", T::TYPE));
        let file_name = format!("{name}{}", T::TYPE.extension());
        let node = {
            let _dir_guard = session.lock(LockKey::directory(dir.as_str()), LockMode::Shared)?;
            session
                .store
                .get_children(dir, Some(T::TYPE.extension()))?
                .into_iter()
                .find(|node| node.name == file_name)
        };
        let Some(node) = node else {
            return Ok(None);
        };
        self.read_def(&session, &node, progress, version)
    }

    fn load_def_by_id<T: StoredDef>(
        &self,
        id: &ObjectId,
        version: Option<&str>,
    ) -> Result<Option<T>> {
        let session = self.session()?;
        let Some(node) = session.store.get_file_by_id(id)? else {
            return Ok(None);
        };
        self.read_def(&session, &node, &crate::core::progress::NoopProgress, version)
    }

    fn read_def<T: StoredDef>(
        &self,
        session: &Session,
        node: &Node,
        progress: &dyn ProgressListener,
        version: Option<&str>,
    ) -> Result<Option<T>> {
        let _guard = session.lock(LockKey::from(&node.id), LockMode::Exclusive)?;
        progress.subtask(&format!("reading {}", node.path));
        let Some(data) = session.store.get_data_at_version(&node.path, version)? else {
            return Ok(None);
        };
        let mut def: T = data.decode()?;
        def.set_id(node.id.clone());

        let snapshot = session.cache.current();
        let mut resolved = Vec::new();
        for name in def.database_names() {
            match snapshot.get(SharedKind::DatabaseConnection, name) {
                Some(object) => resolved.push(object.clone()),
                None => {
                    warn!(database = %name, path = %node.path, "dangling database reference");
                    progress.subtask(&format!("missing database connection {name}"));
                }
            }
        }
        def.set_resolved(resolved);
        Ok(Some(def))
    }

    fn save_def<T: StoredDef>(
        &self,
        def: &mut T,
        dir: &ObjectId,
        comment: &str,
        progress: &dyn ProgressListener,
    ) -> Result<()> {
        let session = self.session()?;
        let _done = DoneOnDrop(progress);
        progress.subtask(&format!("saving {} {}", T::TYPE, def.name()));
        let file_name = format!("{}{}", def.name(), T::TYPE.extension());

        let _dir_guard = session.lock(LockKey::directory(dir.as_str()), LockMode::Exclusive)?;
        let existing = match def.id() {
            Some(id) => session.store.get_file_by_id(id)?,
            None => None,
        };
        let _obj_guard = match def.id() {
            Some(id) => Some(session.lock(LockKey::from(id), LockMode::Exclusive)?),
            None => None,
        };

        let data = NodeData::encode(def)?;
        let node = match existing {
            Some(node) => session
                .store
                .update_file(&node, data, comment)
                .map_err(mutation)?,
            None => session
                .store
                .create_file(dir, &file_name, data, comment)
                .map_err(|err| match err {
                    StoreError::InvalidTarget(_) => RepositoryError::DuplicateName {
                        kind: T::TYPE.to_string(),
                        name: def.name().to_string(),
                    },
                    other => other.into(),
                })?,
        };
        def.set_id(node.id);
        debug!(name = %def.name(), kind = %T::TYPE, "artifact saved");
        Ok(())
    }

    fn rename_artifact(
        &self,
        id: &ObjectId,
        new_parent: Option<&ObjectId>,
        new_name: Option<&str>,
        object_type: ObjectType,
    ) -> Result<()> {
        let session = self.session()?;
        let Some(node) = session.store.get_file_by_id(id)? else {
            return Err(RepositoryError::InvalidState(format!(
                "unknown {object_type}: {id}"
            )));
        };
        let old_parent = parent_node(&session, &node)?;
        let target_parent = new_parent.cloned().unwrap_or_else(|| old_parent.id.clone());
        let file_name = match new_name {
            Some(name) => format!("{name}{}", object_type.extension()),
            None => node.name.clone(),
        };

        let _guards = session.locks.acquire_many(vec![
            (
                LockKey::directory(old_parent.id.as_str()),
                LockMode::Exclusive,
            ),
            (
                LockKey::directory(target_parent.as_str()),
                LockMode::Exclusive,
            ),
            (LockKey::from(id), LockMode::Exclusive),
        ])?;
        session
            .store
            .move_file(id, &target_parent, &file_name)
            .map_err(mutation)?;
        debug!(from = %node.path, to = %file_name, kind = %object_type, "artifact moved");
        Ok(())
    }

    fn artifacts_using_database(
        &self,
        id: &ObjectId,
        object_type: ObjectType,
    ) -> Result<Vec<String>> {
        let session = self.session()?;
        let Some(db_node) = session.store.get_file_by_id(id)? else {
            return Ok(Vec::new());
        };
        let db_name = ObjectType::DatabaseConnection
            .strip_extension(&db_node.name)
            .to_string();

        let mut hits = Vec::new();
        let mut folders = vec![session.root_id.clone()];
        // One directory lock at a time: children are snapshotted, the
        // guard dropped, then subfolders visited.
        while let Some(folder) = folders.pop() {
            let children = {
                let _guard = session.lock(LockKey::directory(folder.as_str()), LockMode::Shared)?;
                session.store.get_children(&folder, None)?
            };
            for child in children {
                if child.folder {
                    folders.push(child.id);
                    continue;
                }
                if ObjectType::from_file_name(&child.name) != Some(object_type) {
                    continue;
                }
                let Some(data) = session.store.get_data_at_version(&child.path, None)? else {
                    continue;
                };
                let probe: RefProbe = match data.decode() {
                    Ok(probe) => probe,
                    Err(_) => continue,
                };
                if probe.databases.iter().any(|name| name == &db_name) {
                    hits.push(child.path);
                }
            }
        }
        hits.sort();
        Ok(hits)
    }
}

/// Common surface of the two loadable/saveable definition kinds.
trait StoredDef: Serialize + DeserializeOwned {
    const TYPE: ObjectType;

    fn id(&self) -> Option<&ObjectId>;
    fn set_id(&mut self, id: ObjectId);
    fn name(&self) -> &str;
    fn database_names(&self) -> &[String];
    fn set_resolved(&mut self, objects: Vec<SharedObject>);
}

impl StoredDef for PipelineDef {
    const TYPE: ObjectType = ObjectType::Pipeline;

    fn id(&self) -> Option<&ObjectId> {
        self.id.as_ref()
    }

    fn set_id(&mut self, id: ObjectId) {
        self.id = Some(id);
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn database_names(&self) -> &[String] {
        &self.databases
    }

    fn set_resolved(&mut self, objects: Vec<SharedObject>) {
        self.resolved_shared = objects;
    }
}

impl StoredDef for JobDef {
    const TYPE: ObjectType = ObjectType::Job;

    fn id(&self) -> Option<&ObjectId> {
        self.id.as_ref()
    }

    fn set_id(&mut self, id: ObjectId) {
        self.id = Some(id);
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn database_names(&self) -> &[String] {
        &self.databases
    }

    fn set_resolved(&mut self, objects: Vec<SharedObject>) {
        self.resolved_shared = objects;
    }
}

/// Minimal shape for reverse-reference scans over stored definitions.
#[derive(Deserialize)]
struct RefProbe {
    #[serde(default)]
    databases: Vec<String>,
}

/// Notifies the listener when the operation's scope ends, error paths
/// included.
struct DoneOnDrop<'a>(&'a dyn ProgressListener);

impl Drop for DoneOnDrop<'_> {
    fn drop(&mut self) {
        self.0.done();
    }
}

/// Structural store rejections become `InvalidState`; everything else
/// passes through as a store failure.
fn mutation(err: StoreError) -> RepositoryError {
    match err {
        StoreError::InvalidTarget(message) => RepositoryError::InvalidState(message),
        other => RepositoryError::RemoteStore(other),
    }
}

fn kind_mismatch(id: &ObjectId, actual: SharedKind, requested: SharedKind) -> RepositoryError {
    RepositoryError::InvalidState(format!("{id} is a {actual}, not a {requested}"))
}

fn parent_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(index) => &path[..index],
    }
}

fn parent_node(session: &Session, node: &Node) -> Result<Node> {
    session
        .store
        .get_file(parent_path(&node.path))?
        .ok_or_else(|| {
            RepositoryError::InvalidState(format!("parent of {} not found", node.path))
        })
}

/// Directories whose structural mutation is refused outright.
fn protected_directory(path: &str) -> Option<String> {
    if path == "/" {
        return Some("cannot modify the root directory".to_string());
    }
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.first() == Some(&"home") && segments.len() <= 2 {
        return Some(format!("cannot modify home directory {path}"));
    }
    // The /etc/pipeline tree hosts the shared-object kind folders; removing
    // one would orphan every cached entry of that kind.
    if segments.first() == Some(&"etc") && segments.len() <= 3 {
        return Some(format!("cannot modify shared-object directory {path}"));
    }
    None
}

fn object_info(node: &Node, parent_id: Option<ObjectId>) -> Option<ObjectInfo> {
    let object_type = if node.folder {
        ObjectType::Folder
    } else {
        ObjectType::from_file_name(&node.name)?
    };
    Some(ObjectInfo {
        id: node.id.clone(),
        name: object_type.strip_extension(&node.name).to_string(),
        object_type,
        path: node.path.clone(),
        parent_id,
        deleted: node.deleted,
    })
}
