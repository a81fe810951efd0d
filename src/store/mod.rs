//! store
//!
//! The remote store seam: trait definitions plus an in-memory simulation.
//!
//! # Modules
//!
//! - [`traits`] - `RemoteStore` and `Connector` traits, node and payload types
//! - [`memory`] - Deterministic in-memory store with failure injection

pub mod memory;
pub mod traits;

pub use memory::{FailOn, InMemoryConnector, InMemoryStore};
pub use traits::{ConnectResult, Connector, Node, NodeData, RemoteStore, StoreError};
