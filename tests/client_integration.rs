//! End-to-end client lifecycle tests.
//!
//! These cover the seams the per-module unit tests cannot: TOML
//! configuration driving session behavior, authentication failures,
//! reconnects, and connect-time store faults.

use std::sync::Arc;

use strata::client::RepositoryClient;
use strata::config::RepositoryConfig;
use strata::core::artifacts::{DatabaseConnection, SharedObject};
use strata::core::progress::NoopProgress;
use strata::core::types::Directory;
use strata::error::RepositoryError;
use strata::secrets::HexCodec;
use strata::store::{FailOn, InMemoryConnector, InMemoryStore, RemoteStore, StoreError};

fn database(name: &str) -> SharedObject {
    SharedObject::DatabaseConnection(DatabaseConnection {
        id: None,
        name: name.to_string(),
        host: "db.internal".to_string(),
        port: 5432,
        database: "warehouse".to_string(),
        username: "etl".to_string(),
        password: "hunter2".to_string(),
    })
}

#[test]
fn config_document_drives_the_session() -> anyhow::Result<()> {
    let config = RepositoryConfig::from_toml(
        r#"
        name = "etl-repo"
        lock_timeout_ms = 250
        cache_invalidation = "full"
        "#,
    )?;
    assert_eq!(config.lock_timeout().as_millis(), 250);

    let store = Arc::new(InMemoryStore::new());
    let connector = InMemoryConnector::new(store);
    let client = RepositoryClient::new(config, Arc::new(connector));
    let user = client.connect("amy", "secret")?;
    assert_eq!(user.login, "amy");
    assert!(client.is_connected());
    Ok(())
}

#[test]
fn bad_credentials_fail_connect() {
    let store = Arc::new(InMemoryStore::new());
    let connector = InMemoryConnector::with_credentials(store, "admin", "s3cret");
    let client = RepositoryClient::new(RepositoryConfig::default(), Arc::new(connector));

    let err = client.connect("admin", "wrong").unwrap_err();
    assert!(matches!(
        err,
        RepositoryError::RemoteStore(StoreError::AuthFailed(_))
    ));
    assert!(!client.is_connected());

    client.connect("admin", "s3cret").unwrap();
    assert!(client.is_connected());
}

#[test]
fn connect_failure_during_initial_load_leaves_client_disconnected() {
    let store = Arc::new(InMemoryStore::new());
    let connector = InMemoryConnector::new(store.clone());
    let client = RepositoryClient::new(RepositoryConfig::default(), Arc::new(connector));

    // Folders resolve, then the initial shared-object load hits a fault.
    store.set_fail_on(Some(FailOn::GetChildren(StoreError::Backend(
        "injected".to_string(),
    ))));
    let err = client.connect("amy", "secret").unwrap_err();
    assert!(matches!(err, RepositoryError::RemoteStore(_)));
    assert!(!client.is_connected());

    store.set_fail_on(None);
    client.connect("amy", "secret").unwrap();
}

#[test]
fn reconnect_replaces_the_session() {
    let store = Arc::new(InMemoryStore::new());
    let connector = InMemoryConnector::new(store.clone());
    let client = RepositoryClient::new(RepositoryConfig::default(), Arc::new(connector));

    client.connect("amy", "secret").unwrap();
    let mut object = database("warehouse");
    client
        .save_shared_object(&mut object, "initial", &NoopProgress, false)
        .unwrap();

    // A second user connects on the same client; their session sees the
    // stored objects and their own home.
    let user = client.connect("bob", "secret").unwrap();
    assert_eq!(user.login, "bob");
    assert_eq!(client.home_directory().unwrap().path, "/home/bob");
    assert_eq!(client.read_databases().unwrap().len(), 1);
    assert!(store.get_file("/home/amy").unwrap().is_some());
}

#[test]
fn shared_objects_persist_across_sessions() {
    let store = Arc::new(InMemoryStore::new());
    let connector = Arc::new(InMemoryConnector::new(store));
    let codec = Arc::new(HexCodec);

    let writer = RepositoryClient::new(RepositoryConfig::default(), connector.clone())
        .with_codec(codec.clone());
    writer.connect("amy", "secret").unwrap();
    let mut object = database("warehouse");
    writer
        .save_shared_object(&mut object, "initial", &NoopProgress, false)
        .unwrap();
    writer.disconnect();

    // A fresh client with the same codec reads the password back clear.
    let reader =
        RepositoryClient::new(RepositoryConfig::default(), connector).with_codec(codec);
    reader.connect("bob", "secret").unwrap();
    let databases = reader.read_databases().unwrap();
    assert_eq!(databases.len(), 1);
    assert_eq!(databases[0].password, "hunter2");
}

#[test]
fn directory_listing_is_idempotent() {
    let store = Arc::new(InMemoryStore::new());
    let connector = InMemoryConnector::new(store);
    let client = RepositoryClient::new(RepositoryConfig::default(), Arc::new(connector));
    client.connect("amy", "secret").unwrap();

    let home = client.home_directory().unwrap();
    let home_id = home.id.unwrap();
    for name in ["reports", "archive", "inbox"] {
        let mut dir = Directory::new_child(home_id.clone(), "/home/amy", name);
        client.save_directory(&mut dir).unwrap();
    }

    // Absent intervening mutation, repeated listings agree exactly.
    let first = client.list_directory_names(&home_id).unwrap();
    let second = client.list_directory_names(&home_id).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, vec!["archive", "inbox", "reports"]);
}

#[test]
fn version_history_survives_overwrites() -> anyhow::Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let connector = InMemoryConnector::new(store.clone());
    let client = RepositoryClient::new(RepositoryConfig::default(), Arc::new(connector));
    client.connect("amy", "secret")?;

    let mut object = database("warehouse");
    client.save_shared_object(&mut object, "first", &NoopProgress, false)?;
    client.save_shared_object(&mut object, "second", &NoopProgress, true)?;

    let summaries = store.get_version_summaries("/etc/pipeline/databases/warehouse.dbc")?;
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].message, "first");
    assert_eq!(summaries[1].message, "second");
    Ok(())
}
