//! locks
//!
//! Per-resource locks with a fixed global ordering.
//!
//! # Architecture
//!
//! The lock manager serializes conflicting repository operations while
//! letting unrelated ones proceed in parallel. Every lock is keyed by
//! `(kind, id)` and scoped to one operation's critical section via an
//! RAII guard.
//!
//! # Invariants
//!
//! - Guards release on drop, including panic unwinds and timeout early
//!   exits.
//! - Acquisition is re-entrant per thread: a nested helper may re-acquire
//!   a key its caller already holds without self-deadlock.
//! - Deadlock freedom comes from one global order, applied identically
//!   everywhere: directory locks before object locks before the cache
//!   lock, and within a category ascending id. [`LockManager::acquire_many`]
//!   sorts into this order before acquiring anything.
//! - Every acquisition is bounded by the configured timeout; on timeout
//!   the caller gets [`LockError::Timeout`] and holds nothing new.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use strata::locks::{LockKey, LockManager, LockMode};
//!
//! let locks = LockManager::new(Duration::from_millis(100));
//! let key = LockKey::object("abc");
//!
//! let outer = locks.acquire(key.clone(), LockMode::Exclusive).unwrap();
//! // Re-entrant: the same thread may take the key again.
//! let inner = locks.acquire(key, LockMode::Exclusive).unwrap();
//! drop(inner);
//! drop(outer);
//! ```

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::core::types::ObjectId;

/// Errors from lock acquisition.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LockError {
    /// The lock could not be acquired within the configured timeout.
    #[error("lock acquisition timed out: {key}")]
    Timeout {
        /// Human-readable key of the contended lock.
        key: String,
    },
}

/// Lock categories, in global acquisition order.
///
/// The derived `Ord` is the canonical order: `Directory < Object < Cache`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockKind {
    /// Guards structural mutation of one directory's child set.
    Directory,
    /// Guards one artifact's save/rename/delete/undelete/load cycle.
    Object,
    /// Guards a shared-object cache read-modify-write cycle.
    Cache,
}

impl std::fmt::Display for LockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockKind::Directory => write!(f, "directory"),
            LockKind::Object => write!(f, "object"),
            LockKind::Cache => write!(f, "cache"),
        }
    }
}

/// Identifies one lockable resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockKey {
    /// Lock category; the major sort key of the global order.
    pub kind: LockKind,
    /// Resource id; the minor sort key of the global order.
    pub id: String,
}

impl LockKey {
    /// Key for a directory's child set.
    pub fn directory(id: impl AsRef<str>) -> Self {
        Self {
            kind: LockKind::Directory,
            id: id.as_ref().to_string(),
        }
    }

    /// Key for one artifact.
    pub fn object(id: impl AsRef<str>) -> Self {
        Self {
            kind: LockKind::Object,
            id: id.as_ref().to_string(),
        }
    }

    /// Key for the shared-object cache. There is exactly one.
    pub fn cache() -> Self {
        Self {
            kind: LockKind::Cache,
            id: "shared-objects".to_string(),
        }
    }
}

impl From<&ObjectId> for LockKey {
    fn from(id: &ObjectId) -> Self {
        LockKey::object(id.as_str())
    }
}

impl std::fmt::Display for LockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// Requested access mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Concurrent readers allowed; excludes exclusive holders.
    Shared,
    /// Sole holder; excludes readers and other writers.
    Exclusive,
}

/// Per-key lock state.
#[derive(Debug, Default)]
struct LockState {
    inner: Mutex<LockInner>,
    cond: Condvar,
}

/// Ownership bookkeeping for one key.
#[derive(Debug, Default)]
struct LockInner {
    /// Thread currently holding exclusive access, if any.
    exclusive_owner: Option<ThreadId>,
    /// Re-entrant exclusive hold count of the owner.
    exclusive_count: u32,
    /// Re-entrant shared hold counts per thread.
    readers: HashMap<ThreadId, u32>,
}

impl LockInner {
    fn other_readers(&self, me: ThreadId) -> bool {
        self.readers.keys().any(|t| *t != me)
    }
}

/// Keyed re-entrant locks with bounded acquisition.
///
/// One manager lives per connection session. Records for keys nothing
/// holds or waits on are pruned on the next acquisition, so the map stays
/// proportional to live contention rather than to every id ever locked.
#[derive(Debug)]
pub struct LockManager {
    states: Mutex<HashMap<LockKey, Arc<LockState>>>,
    timeout: Duration,
}

impl LockManager {
    /// Create a manager whose every acquisition is bounded by `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// The configured acquisition bound.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn state_for(&self, key: &LockKey) -> Arc<LockState> {
        let mut states = recover(self.states.lock());
        // A strong count of one means no guard or waiter references the
        // record; guards and waiters all clone the Arc under this mutex.
        states.retain(|_, state| Arc::strong_count(state) > 1);
        states.entry(key.clone()).or_default().clone()
    }

    /// Acquire one lock, blocking up to the configured timeout.
    ///
    /// Re-entrant: a thread already holding the key (in either mode) is
    /// granted immediately. A shared holder may upgrade to exclusive only
    /// while it is the sole reader; competing upgraders resolve by timeout
    /// rather than deadlock.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Timeout`] if the lock stays contended past the
    /// deadline. No state is held on error.
    pub fn acquire(&self, key: LockKey, mode: LockMode) -> Result<LockGuard, LockError> {
        let state = self.state_for(&key);
        let me = thread::current().id();
        let deadline = Instant::now() + self.timeout;

        let mut inner = recover(state.inner.lock());
        loop {
            let granted = match mode {
                LockMode::Exclusive => {
                    if inner.exclusive_owner == Some(me) {
                        inner.exclusive_count += 1;
                        true
                    } else if inner.exclusive_owner.is_none() && !inner.other_readers(me) {
                        inner.exclusive_owner = Some(me);
                        inner.exclusive_count = 1;
                        true
                    } else {
                        false
                    }
                }
                LockMode::Shared => {
                    if inner.exclusive_owner.is_none() || inner.exclusive_owner == Some(me) {
                        *inner.readers.entry(me).or_insert(0) += 1;
                        true
                    } else {
                        false
                    }
                }
            };

            if granted {
                return Ok(LockGuard {
                    state: state.clone(),
                    key,
                    mode,
                    owner: me,
                    _not_send: PhantomData,
                });
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(LockError::Timeout {
                    key: key.to_string(),
                });
            }
            let (next, _timed_out) = recover_wait(state.cond.wait_timeout(inner, deadline - now));
            inner = next;
        }
    }

    /// Acquire a set of locks in the canonical global order.
    ///
    /// Requests are sorted by `(kind, id)` first, so callers may list them
    /// in whatever order is natural. Duplicate keys are fine: re-entrancy
    /// absorbs them. On timeout every lock acquired so far is released
    /// before the error returns.
    pub fn acquire_many(
        &self,
        mut requests: Vec<(LockKey, LockMode)>,
    ) -> Result<Vec<LockGuard>, LockError> {
        requests.sort_by(|a, b| a.0.cmp(&b.0));
        let mut guards = Vec::with_capacity(requests.len());
        for (key, mode) in requests {
            // Earlier guards drop if this errors out.
            guards.push(self.acquire(key, mode)?);
        }
        Ok(guards)
    }
}

/// An acquired lock, released on drop.
///
/// Not `Send`: a guard must be released by the thread that acquired it,
/// which is what makes per-thread re-entrancy counting sound.
#[derive(Debug)]
pub struct LockGuard {
    state: Arc<LockState>,
    key: LockKey,
    mode: LockMode,
    owner: ThreadId,
    _not_send: PhantomData<*const ()>,
}

impl LockGuard {
    /// The key this guard holds.
    pub fn key(&self) -> &LockKey {
        &self.key
    }

    /// The mode this guard holds.
    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let mut inner = recover(self.state.inner.lock());
        match self.mode {
            LockMode::Exclusive => {
                inner.exclusive_count = inner.exclusive_count.saturating_sub(1);
                if inner.exclusive_count == 0 {
                    inner.exclusive_owner = None;
                }
            }
            LockMode::Shared => {
                if let Some(count) = inner.readers.get_mut(&self.owner) {
                    *count -= 1;
                    if *count == 0 {
                        inner.readers.remove(&self.owner);
                    }
                }
            }
        }
        drop(inner);
        self.state.cond.notify_all();
    }
}

/// Continue through mutex poisoning: the bookkeeping stays consistent
/// because every mutation above is a single arithmetic step.
pub(crate) fn recover<'a, T>(
    result: Result<MutexGuard<'a, T>, PoisonError<MutexGuard<'a, T>>>,
) -> MutexGuard<'a, T> {
    result.unwrap_or_else(PoisonError::into_inner)
}

fn recover_wait<'a, T, U>(
    result: Result<(MutexGuard<'a, T>, U), PoisonError<(MutexGuard<'a, T>, U)>>,
) -> (MutexGuard<'a, T>, U) {
    result.unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    fn manager() -> LockManager {
        LockManager::new(Duration::from_millis(200))
    }

    #[test]
    fn exclusive_reentry_same_thread() {
        let locks = manager();
        let key = LockKey::object("a");
        let g1 = locks.acquire(key.clone(), LockMode::Exclusive).unwrap();
        let g2 = locks.acquire(key.clone(), LockMode::Exclusive).unwrap();
        let g3 = locks.acquire(key, LockMode::Exclusive).unwrap();
        drop(g3);
        drop(g2);
        drop(g1);
    }

    #[test]
    fn shared_readers_coexist() {
        let locks = Arc::new(manager());
        let key = LockKey::directory("d");
        let _reader = locks.acquire(key.clone(), LockMode::Shared).unwrap();

        let locks2 = locks.clone();
        let key2 = key.clone();
        let handle = thread::spawn(move || {
            let guard = locks2.acquire(key2, LockMode::Shared);
            guard.is_ok()
        });
        assert!(handle.join().unwrap());
    }

    #[test]
    fn exclusive_blocks_other_threads() {
        let locks = Arc::new(manager());
        let key = LockKey::object("x");
        let guard = locks.acquire(key.clone(), LockMode::Exclusive).unwrap();

        let locks2 = locks.clone();
        let key2 = key.clone();
        let handle =
            thread::spawn(move || locks2.acquire(key2, LockMode::Exclusive).map(|_| ()));
        let result = handle.join().unwrap();
        assert_eq!(
            result.unwrap_err(),
            LockError::Timeout {
                key: "object/x".to_string()
            }
        );
        drop(guard);
    }

    #[test]
    fn writer_waits_for_reader_release() {
        let locks = Arc::new(LockManager::new(Duration::from_secs(5)));
        let key = LockKey::directory("d");
        let reader = locks.acquire(key.clone(), LockMode::Shared).unwrap();
        let writer_ran = Arc::new(AtomicBool::new(false));

        let locks2 = locks.clone();
        let key2 = key.clone();
        let flag = writer_ran.clone();
        let handle = thread::spawn(move || {
            let _guard = locks2.acquire(key2, LockMode::Exclusive).unwrap();
            flag.store(true, Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!writer_ran.load(Ordering::SeqCst));
        drop(reader);
        handle.join().unwrap();
        assert!(writer_ran.load(Ordering::SeqCst));
    }

    #[test]
    fn shared_under_own_exclusive() {
        let locks = manager();
        let key = LockKey::object("nested");
        let exclusive = locks.acquire(key.clone(), LockMode::Exclusive).unwrap();
        let shared = locks.acquire(key, LockMode::Shared).unwrap();
        drop(shared);
        drop(exclusive);
    }

    #[test]
    fn sole_reader_upgrades() {
        let locks = manager();
        let key = LockKey::directory("up");
        let shared = locks.acquire(key.clone(), LockMode::Shared).unwrap();
        let exclusive = locks.acquire(key, LockMode::Exclusive).unwrap();
        drop(exclusive);
        drop(shared);
    }

    #[test]
    fn upgrade_blocked_by_other_reader() {
        let locks = Arc::new(manager());
        let key = LockKey::directory("contested");
        let _mine = locks.acquire(key.clone(), LockMode::Shared).unwrap();

        let locks2 = locks.clone();
        let key2 = key.clone();
        // Another thread holds shared; our upgrade must time out, not hang.
        let other = thread::spawn(move || {
            let guard = locks2.acquire(key2, LockMode::Shared).unwrap();
            thread::sleep(Duration::from_millis(400));
            drop(guard);
        });
        thread::sleep(Duration::from_millis(50));
        let upgrade = locks.acquire(key, LockMode::Exclusive);
        assert!(upgrade.is_err());
        other.join().unwrap();
    }

    #[test]
    fn acquire_many_sorts_into_canonical_order() {
        let locks = manager();
        let guards = locks
            .acquire_many(vec![
                (LockKey::cache(), LockMode::Exclusive),
                (LockKey::object("b"), LockMode::Exclusive),
                (LockKey::directory("z"), LockMode::Exclusive),
                (LockKey::directory("a"), LockMode::Shared),
            ])
            .unwrap();
        let keys: Vec<String> = guards.iter().map(|g| g.key().to_string()).collect();
        assert_eq!(
            keys,
            vec![
                "directory/a",
                "directory/z",
                "object/b",
                "cache/shared-objects"
            ]
        );
    }

    #[test]
    fn acquire_many_absorbs_duplicates() {
        let locks = manager();
        let guards = locks
            .acquire_many(vec![
                (LockKey::object("same"), LockMode::Exclusive),
                (LockKey::object("same"), LockMode::Exclusive),
            ])
            .unwrap();
        assert_eq!(guards.len(), 2);
    }

    #[test]
    fn timeout_releases_partial_acquisitions() {
        let locks = Arc::new(manager());
        let held = locks
            .acquire(LockKey::object("blocker"), LockMode::Exclusive)
            .unwrap();

        let locks2 = locks.clone();
        let handle = thread::spawn(move || {
            locks2
                .acquire_many(vec![
                    (LockKey::directory("free"), LockMode::Exclusive),
                    (LockKey::object("blocker"), LockMode::Exclusive),
                ])
                .map(|_| ())
        });
        assert!(handle.join().unwrap().is_err());

        // The partially acquired directory lock must be free again.
        let free = locks.acquire(LockKey::directory("free"), LockMode::Exclusive);
        assert!(free.is_ok());
        drop(held);
    }

    #[test]
    fn k_acquisitions_need_k_releases() {
        let locks = Arc::new(LockManager::new(Duration::from_millis(100)));
        let key = LockKey::object("counted");
        let mut guards = Vec::new();
        for _ in 0..5 {
            guards.push(locks.acquire(key.clone(), LockMode::Exclusive).unwrap());
        }

        let assert_contended = |expect_free: bool| {
            let locks = locks.clone();
            let key = key.clone();
            let handle = thread::spawn(move || locks.acquire(key, LockMode::Exclusive).is_ok());
            assert_eq!(handle.join().unwrap(), expect_free);
        };

        // Dropping all but one guard keeps the lock held.
        for _ in 0..4 {
            guards.pop();
        }
        assert_contended(false);
        guards.pop();
        assert_contended(true);
    }

    #[test]
    fn idle_records_are_pruned() {
        let locks = manager();
        for i in 0..64 {
            let guard = locks
                .acquire(LockKey::object(format!("churn-{i}")), LockMode::Exclusive)
                .unwrap();
            drop(guard);
        }

        // Acquiring a fresh key sweeps the released records away.
        let held = locks.acquire(LockKey::object("kept"), LockMode::Exclusive).unwrap();
        let tracked = recover(locks.states.lock()).len();
        assert_eq!(tracked, 1, "stale lock records retained: {tracked}");
        drop(held);
    }

    #[test]
    fn contended_counter_stays_consistent() {
        let locks = Arc::new(LockManager::new(Duration::from_secs(10)));
        let counter = Arc::new(AtomicU32::new(0));
        let key = LockKey::object("counter");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let counter = counter.clone();
            let key = key.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    let _guard = locks.acquire(key.clone(), LockMode::Exclusive).unwrap();
                    let seen = counter.load(Ordering::SeqCst);
                    counter.store(seen + 1, Ordering::SeqCst);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 800);
    }
}
