//! Re-entrant load detection.
//!
//! A [`RecursionGuard`] tracks the keys whose load is currently in flight.
//! Entering a key that is already active yields a [`RecursiveLoad`] signal
//! instead of recursing (or deadlocking) into the same computation again.
//! The returned [`LoadToken`] removes the key when dropped, so cleanup also
//! happens when the load unwinds.
//!
//! The guard is a cloneable handle. A query core enters it around every
//! source load, with no borrow of its window state held, so a nested request
//! for another key proceeds while a nested request for the loading key is
//! signalled. The concurrent query core shares the same guard between its
//! clones.
//!
//! ## Example Usage
//!
//! ```
//! use histkit::guard::RecursionGuard;
//!
//! let guard: RecursionGuard<u64> = RecursionGuard::new(false);
//!
//! let outer = guard.enter(7).unwrap();
//! assert!(guard.is_active(&7));
//!
//! // Re-entering the same key while it loads is rejected
//! assert!(guard.enter(7).is_err());
//! // Other keys are fine
//! assert!(guard.enter(8).is_ok());
//!
//! drop(outer);
//! assert!(!guard.is_active(&7));
//! ```

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use crate::error::RecursiveLoad;

/// Set of keys with a load in flight.
pub struct RecursionGuard<K> {
    active: Arc<Mutex<FxHashSet<K>>>,
    capture_backtrace: bool,
}

impl<K> Clone for RecursionGuard<K> {
    fn clone(&self) -> Self {
        Self {
            active: Arc::clone(&self.active),
            capture_backtrace: self.capture_backtrace,
        }
    }
}

impl<K> RecursionGuard<K>
where
    K: Copy + Eq + Hash + fmt::Debug,
{
    /// Creates a guard. With `capture_backtrace` set, every signal records a
    /// backtrace; leave it off outside of debugging.
    pub fn new(capture_backtrace: bool) -> Self {
        Self {
            active: Arc::new(Mutex::new(FxHashSet::default())),
            capture_backtrace,
        }
    }

    #[inline]
    pub fn captures_backtrace(&self) -> bool {
        self.capture_backtrace
    }

    /// Marks `key` as loading until the returned token is dropped.
    pub fn enter(&self, key: K) -> Result<LoadToken<K>, RecursiveLoad> {
        if !self.active.lock().insert(key) {
            return Err(self.signal(key));
        }
        Ok(LoadToken {
            active: Arc::clone(&self.active),
            key,
        })
    }

    /// Runs `load` with `key` marked as loading.
    pub fn guard<R>(&self, key: K, load: impl FnOnce() -> R) -> Result<R, RecursiveLoad> {
        let _token = self.enter(key)?;
        Ok(load())
    }

    /// Returns `true` while a load for `key` is in flight.
    pub fn is_active(&self, key: &K) -> bool {
        self.active.lock().contains(key)
    }

    /// Number of loads in flight.
    pub fn active_len(&self) -> usize {
        self.active.lock().len()
    }

    /// Builds the signal for `key` using this guard's backtrace setting.
    pub fn signal(&self, key: K) -> RecursiveLoad {
        RecursiveLoad::new(key, self.capture_backtrace)
    }
}

impl<K> Default for RecursionGuard<K>
where
    K: Copy + Eq + Hash + fmt::Debug,
{
    fn default() -> Self {
        Self::new(false)
    }
}

impl<K> fmt::Debug for RecursionGuard<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecursionGuard")
            .field("active", &self.active.lock().len())
            .field("capture_backtrace", &self.capture_backtrace)
            .finish()
    }
}

/// Proof that a key is loading; releases it on drop.
#[must_use = "the key is released as soon as the token is dropped"]
pub struct LoadToken<K>
where
    K: Eq + Hash,
{
    active: Arc<Mutex<FxHashSet<K>>>,
    key: K,
}

impl<K> LoadToken<K>
where
    K: Copy + Eq + Hash,
{
    #[inline]
    pub fn key(&self) -> K {
        self.key
    }
}

impl<K> Drop for LoadToken<K>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        self.active.lock().remove(&self.key);
    }
}

impl<K> fmt::Debug for LoadToken<K>
where
    K: Eq + Hash + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadToken").field("key", &self.key).finish()
    }
}
