//! core
//!
//! Core domain types for the repository client.
//!
//! # Modules
//!
//! - [`types`] - Strong types: ObjectId, ObjectType, Directory, etc.
//! - [`artifacts`] - Shared objects and pipeline/job definitions
//! - [`progress`] - Progress reporting seam for long-running operations
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Artifact payloads are serde round-trippable
//! - No module here touches the remote store or any lock

pub mod artifacts;
pub mod progress;
pub mod types;
