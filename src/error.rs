//! error
//!
//! Crate-wide error taxonomy for repository operations.
//!
//! # Design
//!
//! Every public operation returns either a result or one of the declared
//! failure kinds below. Absence is not failure: pure lookups return
//! `Ok(None)` or an empty collection for "doesn't exist" and never surface
//! an error for it.
//!
//! A failure never leaves the shared-object cache ahead of the remote
//! store's committed state: cache mutation happens only after the paired
//! remote call has already succeeded, under the same critical section.

use thiserror::Error;

use crate::locks::LockError;
use crate::store::StoreError;

/// Errors from repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// An operation was attempted before `connect`.
    #[error("not connected to repository")]
    NotConnected,

    /// A save would collide with a different object of the same name.
    #[error("duplicate {kind} name: {name}")]
    DuplicateName {
        /// What kind of thing collided ("database connection",
        /// "directory", ...).
        kind: String,
        /// The colliding name.
        name: String,
    },

    /// A required lock could not be acquired within the configured timeout.
    #[error(transparent)]
    LockTimeout(#[from] LockError),

    /// The backing store reported a transport or internal fault.
    #[error("remote store failure: {0}")]
    RemoteStore(#[from] StoreError),

    /// The operation is structurally invalid in the current state
    /// (e.g., renaming the root, deleting a non-empty directory
    /// without the recursive flag, moving a directory under itself).
    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl RepositoryError {
    /// Whether a caller may reasonably retry the failed operation as-is.
    ///
    /// Lock timeouts are transient contention and retryable. Validation
    /// failures (`DuplicateName`, `InvalidState`) will fail again until the
    /// caller changes the request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RepositoryError::LockTimeout(_))
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RepositoryError>;
