//! Strata - client-side concurrency control and caching for a shared,
//! versioned artifact store
//!
//! Strata sits between many concurrent callers (UI actions, schedulers,
//! automated tooling) and one backing store connection. It serializes
//! conflicting operations with per-resource locks, keeps a coherent local
//! cache of shared objects, and exposes the repository operation surface
//! through [`client::RepositoryClient`].
//!
//! # Architecture
//!
//! - [`client`] - The public operation surface over one connection
//! - [`locks`] - Keyed re-entrant locks with a fixed global ordering
//! - [`cache`] - Atomically swapped shared-object snapshots
//! - [`paths`] - Well-known root resolution, cached per connection
//! - [`store`] - The remote store trait and its in-memory test double
//! - [`core`] - Domain types: artifacts, directories, versions
//! - [`secrets`] - Password codec seam for stored credentials
//! - [`config`] / [`error`] - Configuration and the error taxonomy
//!
//! # Correctness Invariants
//!
//! Strata maintains the following invariants:
//!
//! 1. Locks follow one global order: directory before object before
//!    cache, ascending id within a category
//! 2. The cache is written only after the paired remote mutation
//!    succeeded, inside the same critical section
//! 3. Readers see whole snapshots, never a half-written artifact
//! 4. Every lock acquisition is bounded by the configured timeout

pub mod cache;
pub mod client;
pub mod config;
pub mod core;
pub mod error;
pub mod locks;
pub mod paths;
pub mod secrets;
pub mod store;

pub use client::RepositoryClient;
pub use config::RepositoryConfig;
pub use error::{RepositoryError, Result};
