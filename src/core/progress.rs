//! core::progress
//!
//! Progress reporting seam for long-running repository operations.
//!
//! Loads and saves accept a listener so UIs can surface subtask names
//! without this layer knowing anything about rendering. The listener is
//! purely advisory: implementations must not fail and must be cheap, as
//! they run inside lock critical sections.

/// Receives progress notifications from repository operations.
pub trait ProgressListener: Send + Sync {
    /// A named subtask began.
    fn subtask(&self, name: &str);

    /// The operation completed (successfully or not).
    fn done(&self);
}

/// A listener that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressListener for NoopProgress {
    fn subtask(&self, _name: &str) {}

    fn done(&self) {}
}
