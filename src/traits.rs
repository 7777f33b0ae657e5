//! # History Trait Hierarchy
//!
//! This module defines the seams of the history subsystem: what a time key is,
//! where entries come from, and the handle the query facade drives.
//!
//! ## Architecture
//!
//! ```text
//!   ┌─────────────────────────────┐        ┌──────────────────────────────────┐
//!   │   TimeKey                   │        │   HistorySource<K, V>            │
//!   │                             │        │                                  │
//!   │   Copy + Ord + Hash + Debug │        │   load_descending_from(K, n)     │
//!   │   (blanket impl)            │        │   load_ascending_from(K, n)      │
//!   └──────────────┬──────────────┘        └────────────────┬─────────────────┘
//!                  │                                        │ on miss
//!                  ▼                                        ▼
//!   ┌────────────────────────────────────────────────────────────────────────┐
//!   │   CoreHandle<K, V>                                                     │
//!   │                                                                        │
//!   │   as_of(K)                       → Option<Entry>   (hint fast path)    │
//!   │   previous_matching(K, n, filter) → Option<Entry>                      │
//!   │   next_matching(K, n, filter)     → Option<Entry>                      │
//!   │   scan(Bound<K>, K, limit)        → Vec<Entry>     (no hints)          │
//!   │   revalidate_null(K)              → Option<Entry>                      │
//!   │   compute_previous / compute_next → Option<Entry>  (source direct)     │
//!   │   query()                         → HistoryQuery   (facade)            │
//!   └───────────────┬─────────────────────────────────────┬──────────────────┘
//!                   │                                     │
//!                   ▼                                     ▼
//!   ┌──────────────────────────────┐      ┌──────────────────────────────────┐
//!   │ QueryCore<K, V, S>           │      │ ConcurrentQueryCore<K, V, S>     │
//!   │ single writer (&mut self)    │      │ one lock per instance (Clone)    │
//!   └──────────────────────────────┘      └──────────────────────────────────┘
//! ```
//!
//! ## Source Contract
//!
//! | Method                 | Returns                                  | Order          |
//! |------------------------|------------------------------------------|----------------|
//! | `load_descending_from` | up to `count` entries with key ≤ `key`   | newest first   |
//! | `load_ascending_from`  | up to `count` entries with key ≥ `key`   | oldest first   |
//!
//! Returning fewer than `count` entries means the series is exhausted in that
//! direction (as of the call). Keys must be unique and strictly ordered; the
//! core rejects output that breaks the contract with
//! [`HistoryError::DataConsistency`].
//!
//! ## Thread Safety
//!
//! - Sources are called with `&self`; use interior mutability for counters
//! - `QueryCore` is single-threaded; `ConcurrentQueryCore` is `Send + Sync`
//!   when `K` and `V` are `Send` and `S` is `Send + Sync`

use std::fmt::Debug;
use std::hash::Hash;
use std::ops::Bound;
use std::sync::Arc;

use crate::ds::CoreId;
use crate::entry::Entry;
use crate::error::HistoryError;
use crate::query::facade::HistoryQuery;

/// Opaque, totally ordered instant.
///
/// Any `Copy + Ord + Hash + Debug` type qualifies: integers,
/// `std::time::SystemTime` wrappers, `chrono::DateTime<Utc>`...
pub trait TimeKey: Copy + Ord + Hash + Debug + Send + Sync + 'static {}

impl<T> TimeKey for T where T: Copy + Ord + Hash + Debug + Send + Sync + 'static {}

/// Ordered value source for one series, consulted on cache misses.
///
/// # Example
///
/// ```
/// use histkit::entry::Entry;
/// use histkit::traits::HistorySource;
///
/// struct Squares;
///
/// impl HistorySource<u64, u64> for Squares {
///     fn load_descending_from(&self, key: u64, count: usize) -> Vec<Entry<u64, u64>> {
///         (0..=key).rev().take(count).map(|k| Entry::new(k, k * k)).collect()
///     }
///
///     fn load_ascending_from(&self, key: u64, count: usize) -> Vec<Entry<u64, u64>> {
///         (key..100).take(count).map(|k| Entry::new(k, k * k)).collect()
///     }
/// }
///
/// let back = Squares.load_descending_from(3, 2);
/// assert_eq!(back.iter().map(|e| e.key()).collect::<Vec<_>>(), vec![3, 2]);
/// ```
pub trait HistorySource<K, V> {
    /// Up to `count` entries with key ≤ `key`, newest first.
    fn load_descending_from(&self, key: K, count: usize) -> Vec<Entry<K, V>>;

    /// Up to `count` entries with key ≥ `key`, oldest first.
    fn load_ascending_from(&self, key: K, count: usize) -> Vec<Entry<K, V>>;
}

impl<K, V, S> HistorySource<K, V> for Arc<S>
where
    S: HistorySource<K, V> + ?Sized,
{
    fn load_descending_from(&self, key: K, count: usize) -> Vec<Entry<K, V>> {
        (**self).load_descending_from(key, count)
    }

    fn load_ascending_from(&self, key: K, count: usize) -> Vec<Entry<K, V>> {
        (**self).load_ascending_from(key, count)
    }
}

impl<K, V, S> HistorySource<K, V> for &S
where
    S: HistorySource<K, V> + ?Sized,
{
    fn load_descending_from(&self, key: K, count: usize) -> Vec<Entry<K, V>> {
        (**self).load_descending_from(key, count)
    }

    fn load_ascending_from(&self, key: K, count: usize) -> Vec<Entry<K, V>> {
        (**self).load_ascending_from(key, count)
    }
}

impl<K, V, S> HistorySource<K, V> for Box<S>
where
    S: HistorySource<K, V> + ?Sized,
{
    fn load_descending_from(&self, key: K, count: usize) -> Vec<Entry<K, V>> {
        (**self).load_descending_from(key, count)
    }

    fn load_ascending_from(&self, key: K, count: usize) -> Vec<Entry<K, V>> {
        (**self).load_ascending_from(key, count)
    }
}

/// Element filter applied while walking a series.
pub type EntryFilter<'f, K, V> = dyn FnMut(&Entry<K, V>) -> bool + 'f;

/// Handle over a query core, driven by [`HistoryQuery`].
///
/// Implemented by [`QueryCore`](crate::query::core::QueryCore) and, with the
/// `concurrency` feature, by
/// [`ConcurrentQueryCore`](crate::query::concurrent::ConcurrentQueryCore).
///
/// # Example
///
/// ```
/// use histkit::builder::QueryCoreBuilder;
/// use histkit::source::VecSource;
/// use histkit::traits::CoreHandle;
///
/// let source = VecSource::from_pairs((1..=10u64).map(|k| (k, k * 100)));
/// let mut core = QueryCoreBuilder::new().build(source);
///
/// let entry = core.as_of(7).unwrap().unwrap();
/// assert_eq!(entry.key(), 7);
///
/// let prev = core.previous_matching(7, 2, &mut |_| true).unwrap().unwrap();
/// assert_eq!(prev.value(), Some(&500));
/// ```
pub trait CoreHandle<K: TimeKey, V: Clone> {
    /// Identity used to tag index hints.
    fn core_id(&self) -> CoreId;

    /// Counter bumped on every structural change of the window.
    fn modification_count(&self) -> u64;

    /// Entry with the greatest key ≤ `key`.
    fn as_of(&mut self, key: K) -> Result<Option<Entry<K, V>>, HistoryError> {
        self.previous_matching(key, 0, &mut |_| true)
    }

    /// The `shift`-th accepted entry at or before the as-of position of `key`
    /// (`shift = 0` is the first accepted entry at or before it).
    fn previous_matching(
        &mut self,
        key: K,
        shift: usize,
        filter: &mut EntryFilter<'_, K, V>,
    ) -> Result<Option<Entry<K, V>>, HistoryError>;

    /// The `shift`-th accepted entry after the as-of position of `key`
    /// (`shift = 0` behaves like `previous_matching(key, 0, filter)`).
    fn next_matching(
        &mut self,
        key: K,
        shift: usize,
        filter: &mut EntryFilter<'_, K, V>,
    ) -> Result<Option<Entry<K, V>>, HistoryError>;

    /// Up to `limit` entries within `(from, to]`, ascending. Index hints are
    /// neither read nor written.
    fn scan(
        &mut self,
        from: Bound<K>,
        to: K,
        limit: usize,
    ) -> Result<Vec<Entry<K, V>>, HistoryError>;

    /// Re-reads the entry at exactly `key` from the source and stores its value
    /// if it is no longer null.
    fn revalidate_null(&mut self, key: K) -> Result<Option<Entry<K, V>>, HistoryError>;

    /// Uncached `as_of(key)`.
    fn compute_as_of(&self, key: K) -> Result<Option<Entry<K, V>>, HistoryError> {
        self.compute_previous(key, 0)
    }

    /// Uncached `previous_matching(key, shift, accept-all)`.
    fn compute_previous(&self, key: K, shift: usize) -> Result<Option<Entry<K, V>>, HistoryError>;

    /// Uncached `next_matching(key, shift, accept-all)`.
    fn compute_next(&self, key: K, shift: usize) -> Result<Option<Entry<K, V>>, HistoryError>;

    /// Starts a facade over this handle.
    fn query<'f>(&mut self) -> HistoryQuery<'_, 'f, Self, K, V>
    where
        Self: Sized,
    {
        HistoryQuery::new(self)
    }
}

/// Marker trait for thread-safe core handles.
pub trait ConcurrentCore: Send + Sync {}
