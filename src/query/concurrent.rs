//! Thread-safe query core.
//!
//! [`ConcurrentQueryCore`] shares one [`CoreState`] and one source between
//! clones behind a per-instance lock. Every operation, including the whole
//! "read hint → maybe reload → write hint" sequence, runs with the lock held,
//! so other threads never see hints against a half-rebuilt window.
//!
//! The lock is a `parking_lot::ReentrantMutex` around a `RefCell`. Other
//! threads block on the mutex. The cell is borrowed only between source
//! loads, so a source that re-enters the core on the same thread gets the
//! mutex again and finds the state free:
//!
//! ```text
//!   as_of(7) ── lock ── borrow: miss ── release ── guard.enter(7)
//!                                                     │
//!                         source.load_descending_from(7)
//!                                                     │
//!                         ├─ as_of(6): lock (re-entered), load, merge  ✔
//!                         └─ as_of(7): guard.enter(7) ─▶ RecursiveLoad
//!                                                     │
//!                                      borrow: merge, write hint ── unlock
//! ```
//!
//! Only a nested request for a key that is already loading receives a
//! [`RecursiveLoad`](crate::error::RecursiveLoad) signal. A nested call from
//! inside a caller's filter, which runs while the state is borrowed, is
//! signalled the same way.
//!
//! ## Example Usage
//!
//! ```
//! use std::sync::Arc;
//! use std::thread;
//!
//! use histkit::builder::QueryCoreBuilder;
//! use histkit::query::concurrent::ConcurrentQueryCore;
//! use histkit::source::VecSource;
//!
//! let source = Arc::new(VecSource::from_pairs((0..1000u64).map(|k| (k, k))));
//! let core = ConcurrentQueryCore::new(QueryCoreBuilder::new().build(source));
//!
//! let handles: Vec<_> = (0..4u64)
//!     .map(|t| {
//!         let core = core.clone();
//!         thread::spawn(move || core.as_of(t * 200 + 5).unwrap().map(|e| e.key()))
//!     })
//!     .collect();
//!
//! for (t, handle) in handles.into_iter().enumerate() {
//!     assert_eq!(handle.join().unwrap(), Some(t as u64 * 200 + 5));
//! }
//! ```

use std::cell::RefCell;
use std::fmt;
use std::ops::Bound;
use std::sync::Arc;

use parking_lot::ReentrantMutex;

use crate::ds::CoreId;
use crate::entry::Entry;
use crate::error::{HistoryError, InvariantError};
use crate::guard::RecursionGuard;
#[cfg(feature = "metrics")]
use crate::metrics::snapshot::QueryCoreMetricsSnapshot;
#[cfg(feature = "metrics")]
use crate::metrics::traits::MetricsSnapshotProvider;
use crate::query::core::QueryCore;
use crate::query::ops::{self, CoreAccess};
use crate::query::state::CoreState;
use crate::traits::{ConcurrentCore, CoreHandle, EntryFilter, HistorySource, TimeKey};

struct Shared<K, V, S> {
    state: ReentrantMutex<RefCell<CoreState<K, V>>>,
    source: S,
}

/// Query core shared between threads. Clones share the same window.
pub struct ConcurrentQueryCore<K, V, S> {
    inner: Arc<Shared<K, V, S>>,
    guard: RecursionGuard<K>,
    id: CoreId,
}

impl<K, V, S> Clone for ConcurrentQueryCore<K, V, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            guard: self.guard.clone(),
            id: self.id,
        }
    }
}

/// Access for one operation, taken with the core lock held.
struct Locked<'c, K, V, S> {
    cell: &'c RefCell<CoreState<K, V>>,
    source: &'c S,
    guard: &'c RecursionGuard<K>,
    key: K,
}

impl<K, V, S> CoreAccess<K, V> for Locked<'_, K, V, S>
where
    K: TimeKey,
    S: HistorySource<K, V>,
{
    type Source = S;

    fn with_state<R>(
        &mut self,
        op: impl FnOnce(&mut CoreState<K, V>) -> R,
    ) -> Result<R, HistoryError> {
        let Ok(mut state) = self.cell.try_borrow_mut() else {
            return Err(self.guard.signal(self.key).into());
        };
        Ok(op(&mut state))
    }

    #[inline]
    fn source(&self) -> &S {
        self.source
    }

    #[inline]
    fn guard(&self) -> &RecursionGuard<K> {
        self.guard
    }
}

impl<K, V, S> ConcurrentQueryCore<K, V, S>
where
    K: TimeKey,
    V: Clone,
    S: HistorySource<K, V>,
{
    pub fn new(core: QueryCore<K, V, S>) -> Self {
        let guard = core.guard().clone();
        let id = core.id();
        let (state, source) = core.into_parts();
        Self {
            inner: Arc::new(Shared {
                state: ReentrantMutex::new(RefCell::new(state)),
                source,
            }),
            guard,
            id,
        }
    }

    #[inline]
    pub fn id(&self) -> CoreId {
        self.id
    }

    /// Guard shared with the wrapped state.
    pub fn guard(&self) -> &RecursionGuard<K> {
        &self.guard
    }

    pub fn source(&self) -> &S {
        &self.inner.source
    }

    /// Runs `op` under the core lock. `key` names the request in a signal
    /// raised when the state is found borrowed.
    fn locked<R>(
        &self,
        key: K,
        op: impl FnOnce(&mut Locked<'_, K, V, S>) -> Result<R, HistoryError>,
    ) -> Result<R, HistoryError> {
        let lock = self.inner.state.lock();
        let mut access = Locked {
            cell: &*lock,
            source: &self.inner.source,
            guard: &self.guard,
            key,
        };
        op(&mut access)
    }

    /// Runs `op` with shared access to the window state, or returns `None`
    /// when called from inside a caller's filter on this core.
    pub fn inspect<R>(&self, op: impl FnOnce(&CoreState<K, V>) -> R) -> Option<R> {
        let lock = self.inner.state.lock();
        let state = lock.try_borrow().ok()?;
        Some(op(&state))
    }

    pub fn as_of(&self, key: K) -> Result<Option<Entry<K, V>>, HistoryError> {
        self.locked(key, |core| ops::as_of(core, key))
    }

    pub fn previous_matching(
        &self,
        key: K,
        shift: usize,
        filter: &mut EntryFilter<'_, K, V>,
    ) -> Result<Option<Entry<K, V>>, HistoryError> {
        self.locked(key, |core| ops::previous_matching(core, key, shift, filter))
    }

    pub fn next_matching(
        &self,
        key: K,
        shift: usize,
        filter: &mut EntryFilter<'_, K, V>,
    ) -> Result<Option<Entry<K, V>>, HistoryError> {
        self.locked(key, |core| ops::next_matching(core, key, shift, filter))
    }

    pub fn scan(
        &self,
        from: Bound<K>,
        to: K,
        limit: usize,
    ) -> Result<Vec<Entry<K, V>>, HistoryError> {
        self.locked(to, |core| ops::scan(core, from, to, limit))
    }

    pub fn revalidate_null(&self, key: K) -> Result<Option<Entry<K, V>>, HistoryError> {
        self.locked(key, |core| ops::revalidate_null(core, key))
    }

    /// Uncached; takes no lock.
    pub fn compute_previous(
        &self,
        key: K,
        shift: usize,
    ) -> Result<Option<Entry<K, V>>, HistoryError> {
        ops::compute_previous(&self.inner.source, key, shift)
    }

    /// Uncached; takes no lock.
    pub fn compute_next(&self, key: K, shift: usize) -> Result<Option<Entry<K, V>>, HistoryError> {
        ops::compute_next(&self.inner.source, key, shift)
    }

    /// Drops every cached entry. Returns `false` if the state is borrowed by
    /// a running filter on this thread.
    pub fn clear(&self) -> bool {
        let lock = self.inner.state.lock();
        match lock.try_borrow_mut() {
            Ok(mut state) => {
                state.clear();
                true
            },
            Err(_) => false,
        }
    }

    /// See [`QueryCore::refresh_tail`]. Returns `false` if the state is
    /// borrowed by a running filter on this thread.
    pub fn refresh_tail(&self) -> bool {
        let lock = self.inner.state.lock();
        match lock.try_borrow_mut() {
            Ok(mut state) => {
                state.refresh_tail();
                true
            },
            Err(_) => false,
        }
    }

    pub fn modification_count(&self) -> u64 {
        self.inspect(|state| state.modification_count()).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.inspect(|state| state.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        self.inspect(|state| state.check_invariants())
            .unwrap_or(Ok(()))
    }
}

impl<K, V, S> CoreHandle<K, V> for ConcurrentQueryCore<K, V, S>
where
    K: TimeKey,
    V: Clone,
    S: HistorySource<K, V>,
{
    fn core_id(&self) -> CoreId {
        self.id
    }

    fn modification_count(&self) -> u64 {
        ConcurrentQueryCore::modification_count(self)
    }

    fn as_of(&mut self, key: K) -> Result<Option<Entry<K, V>>, HistoryError> {
        ConcurrentQueryCore::as_of(self, key)
    }

    fn previous_matching(
        &mut self,
        key: K,
        shift: usize,
        filter: &mut EntryFilter<'_, K, V>,
    ) -> Result<Option<Entry<K, V>>, HistoryError> {
        ConcurrentQueryCore::previous_matching(self, key, shift, filter)
    }

    fn next_matching(
        &mut self,
        key: K,
        shift: usize,
        filter: &mut EntryFilter<'_, K, V>,
    ) -> Result<Option<Entry<K, V>>, HistoryError> {
        ConcurrentQueryCore::next_matching(self, key, shift, filter)
    }

    fn scan(
        &mut self,
        from: Bound<K>,
        to: K,
        limit: usize,
    ) -> Result<Vec<Entry<K, V>>, HistoryError> {
        ConcurrentQueryCore::scan(self, from, to, limit)
    }

    fn revalidate_null(&mut self, key: K) -> Result<Option<Entry<K, V>>, HistoryError> {
        ConcurrentQueryCore::revalidate_null(self, key)
    }

    fn compute_previous(&self, key: K, shift: usize) -> Result<Option<Entry<K, V>>, HistoryError> {
        ConcurrentQueryCore::compute_previous(self, key, shift)
    }

    fn compute_next(&self, key: K, shift: usize) -> Result<Option<Entry<K, V>>, HistoryError> {
        ConcurrentQueryCore::compute_next(self, key, shift)
    }
}

impl<K, V, S> ConcurrentCore for ConcurrentQueryCore<K, V, S>
where
    K: TimeKey,
    V: Send,
    S: Send + Sync,
{
}

#[cfg(feature = "metrics")]
impl<K, V, S> MetricsSnapshotProvider<QueryCoreMetricsSnapshot> for ConcurrentQueryCore<K, V, S>
where
    K: TimeKey,
{
    fn snapshot(&self) -> QueryCoreMetricsSnapshot {
        let lock = self.inner.state.lock();
        match lock.try_borrow() {
            Ok(state) => state.snapshot(),
            Err(_) => QueryCoreMetricsSnapshot::default(),
        }
    }
}

impl<K, V, S> fmt::Debug for ConcurrentQueryCore<K, V, S>
where
    K: TimeKey,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lock = self.inner.state.lock();
        match lock.try_borrow() {
            Ok(state) => f
                .debug_struct("ConcurrentQueryCore")
                .field("state", &*state)
                .finish_non_exhaustive(),
            Err(_) => f
                .debug_struct("ConcurrentQueryCore")
                .field("id", &self.id)
                .finish_non_exhaustive(),
        }
    }
}
