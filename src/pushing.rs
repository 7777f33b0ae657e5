//! Forward-incremental ("pushing") derived results.
//!
//! A [`PushingChain`] answers "derived value as of key `k`" for a fold over a
//! series (running sum, last-N statistics, state machines...) without
//! refolding from the origin on every call. Results are cached per raw key;
//! a request for `k` finds the cached result at a preceding raw key and
//! *pushes* it forward over the few entries in between.
//!
//! ## Architecture
//!
//! ```text
//!   value(k)
//!     │
//!     ▼
//!   core.as_of(k) ──▶ raw key r  (None: series not started → None)
//!     │
//!     ├─ results[r] cached? ──────────────────────────────────────▶ take
//!     │
//!     ├─ walk back ≤ max_recursion_depth raw keys r-1, r-2, ...
//!     │     results[r-i] cached? ──▶ take, push_to_next(·, r) ────▶ result
//!     │
//!     └─ compute_from_scratch(r): init() then push every entry in [origin, r]
//!
//!   output(result) ──▶ caller        result ──▶ results[r] (bounded FIFO)
//! ```
//!
//! ## Ownership
//!
//! A [`PushingResult`] exclusively owns its accumulator. Pushing consumes the
//! result and returns a new one owning the same (mutated) data, so an old
//! result cannot be read after hand-off. Taking a result out of the cache
//! removes it; the chain puts it back once the output is computed.
//!
//! ## Example Usage
//!
//! ```
//! use histkit::builder::{PushingChainBuilder, QueryCoreBuilder};
//! use histkit::entry::Entry;
//! use histkit::pushing::PushingComputation;
//! use histkit::source::VecSource;
//!
//! struct RunningSum;
//!
//! impl PushingComputation<u64, u64> for RunningSum {
//!     type Data = u64;
//!     type Output = u64;
//!
//!     fn init(&self) -> u64 {
//!         0
//!     }
//!
//!     fn push(&self, data: &mut u64, entry: &Entry<u64, u64>) {
//!         *data += entry.value().copied().unwrap_or(0);
//!     }
//!
//!     fn output(&self, data: &u64) -> u64 {
//!         *data
//!     }
//! }
//!
//! let source = VecSource::from_pairs((1..=100u64).map(|k| (k, k)));
//! let core = QueryCoreBuilder::new().build(source);
//! let mut chain = PushingChainBuilder::new().build(core, RunningSum, 1);
//!
//! assert_eq!(chain.value(10).unwrap(), Some(55));
//! // Pushed forward from the cached result at 10
//! assert_eq!(chain.value(12).unwrap(), Some(78));
//! assert_eq!(chain.value(0).unwrap(), None);
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Bound;

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::entry::Entry;
use crate::error::HistoryError;
use crate::guard::RecursionGuard;
#[cfg(feature = "metrics")]
use crate::metrics::metrics_impl::PushingMetrics;
#[cfg(feature = "metrics")]
use crate::metrics::snapshot::PushingMetricsSnapshot;
#[cfg(feature = "metrics")]
use crate::metrics::traits::{MetricsSnapshotProvider, PushingMetricsRecorder};
use crate::traits::{CoreHandle, TimeKey};

/// Default bound on how many preceding raw keys `maybe_init` inspects.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 10;

/// Default number of cached results.
pub const DEFAULT_RESULT_CAPACITY: usize = 1024;

/// A fold over a series that can be advanced one entry at a time.
pub trait PushingComputation<K, V> {
    /// Accumulator.
    type Data;
    /// Value reported to callers.
    type Output;

    /// Accumulator before any entry was folded in.
    fn init(&self) -> Self::Data;

    /// Folds `entry` into `data`. Entries arrive in ascending key order.
    fn push(&self, data: &mut Self::Data, entry: &Entry<K, V>);

    fn output(&self, data: &Self::Data) -> Self::Output;
}

/// Accumulated data bound to the raw key of the last folded entry.
///
/// Not `Clone`: a result is handed from one push to the next by value.
#[derive(Debug, PartialEq, Eq)]
pub struct PushingResult<K, D> {
    key: K,
    previous_key: Option<K>,
    data: D,
}

impl<K: Copy, D> PushingResult<K, D> {
    pub fn new(key: K, previous_key: Option<K>, data: D) -> Self {
        Self {
            key,
            previous_key,
            data,
        }
    }

    /// Raw key of the last folded entry.
    #[inline]
    pub fn key(&self) -> K {
        self.key
    }

    /// Raw key folded before [`key`](Self::key), if any.
    #[inline]
    pub fn previous_key(&self) -> Option<K> {
        self.previous_key
    }

    #[inline]
    pub fn data(&self) -> &D {
        &self.data
    }

    pub fn into_data(self) -> D {
        self.data
    }

    /// Folds `entry` in place.
    pub fn advance<V, P>(&mut self, computation: &P, entry: &Entry<K, V>)
    where
        P: PushingComputation<K, V, Data = D>,
    {
        computation.push(&mut self.data, entry);
        self.previous_key = Some(self.key);
        self.key = entry.key();
    }

    /// Folds `entry` and hands the accumulator over to a new result.
    pub fn pushed<V, P>(mut self, computation: &P, entry: &Entry<K, V>) -> Self
    where
        P: PushingComputation<K, V, Data = D>,
    {
        computation.push(&mut self.data, entry);
        Self {
            key: entry.key(),
            previous_key: Some(self.key),
            data: self.data,
        }
    }
}

/// Bounded FIFO of results keyed by raw key.
struct ResultCache<K, D> {
    map: FxHashMap<K, (u64, PushingResult<K, D>)>,
    order: VecDeque<(K, u64)>,
    capacity: usize,
    seq: u64,
}

impl<K, D> ResultCache<K, D>
where
    K: TimeKey,
{
    fn new(capacity: usize) -> Self {
        Self {
            map: FxHashMap::default(),
            order: VecDeque::new(),
            capacity,
            seq: 0,
        }
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn take(&mut self, key: K) -> Option<PushingResult<K, D>> {
        self.map.remove(&key).map(|(_, result)| result)
    }

    fn contains(&self, key: K) -> bool {
        self.map.contains_key(&key)
    }

    /// Stores `result`; returns how many results were evicted.
    fn put(&mut self, result: PushingResult<K, D>) -> usize {
        if self.capacity == 0 {
            return 0;
        }
        self.seq += 1;
        let key = result.key;
        self.map.insert(key, (self.seq, result));
        self.order.push_back((key, self.seq));

        let mut evicted = 0;
        while self.map.len() > self.capacity {
            let Some((old, seq)) = self.order.pop_front() else {
                break;
            };
            if self.map.get(&old).is_some_and(|(s, _)| *s == seq) {
                self.map.remove(&old);
                evicted += 1;
            }
        }
        if self.order.len() > self.capacity.saturating_mul(2) {
            let map = &self.map;
            self.order
                .retain(|(k, seq)| map.get(k).is_some_and(|(s, _)| s == seq));
        }
        evicted
    }

    fn clear(&mut self) {
        self.map.clear();
        self.order.clear();
    }
}

/// Incremental derived values over a core handle.
pub struct PushingChain<C, P, K, V>
where
    P: PushingComputation<K, V>,
{
    core: C,
    computation: P,
    origin: K,
    results: ResultCache<K, P::Data>,
    guard: RecursionGuard<K>,
    max_recursion_depth: usize,
    #[cfg(feature = "metrics")]
    metrics: PushingMetrics,
    _marker: PhantomData<fn() -> V>,
}

impl<C, P, K, V> PushingChain<C, P, K, V>
where
    C: CoreHandle<K, V>,
    P: PushingComputation<K, V>,
    K: TimeKey,
    V: Clone,
{
    pub(crate) fn from_parts(
        core: C,
        computation: P,
        origin: K,
        max_recursion_depth: usize,
        result_capacity: usize,
        capture_backtraces: bool,
    ) -> Self {
        Self {
            core,
            computation,
            origin,
            results: ResultCache::new(result_capacity),
            guard: RecursionGuard::new(capture_backtraces),
            max_recursion_depth,
            #[cfg(feature = "metrics")]
            metrics: PushingMetrics::default(),
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn origin(&self) -> K {
        self.origin
    }

    #[inline]
    pub fn max_recursion_depth(&self) -> usize {
        self.max_recursion_depth
    }

    pub fn computation(&self) -> &P {
        &self.computation
    }

    pub fn core(&self) -> &C {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut C {
        &mut self.core
    }

    pub fn guard(&self) -> &RecursionGuard<K> {
        &self.guard
    }

    /// Number of cached results.
    pub fn cached_results(&self) -> usize {
        self.results.len()
    }

    /// Returns `true` if a result for raw key `key` is cached.
    pub fn has_cached_result(&self, key: K) -> bool {
        self.results.contains(key)
    }

    /// Drops every cached result, e.g. after the series was rewritten.
    pub fn clear_results(&mut self) {
        self.results.clear();
    }

    pub fn into_core(self) -> C {
        self.core
    }

    /// Derived output as of `key`, or `None` before the first raw entry.
    ///
    /// A recursive-load signal yields `None` for this call.
    pub fn value(&mut self, key: K) -> Result<Option<P::Output>, HistoryError> {
        #[cfg(feature = "metrics")]
        self.metrics.record_value_call();

        let result = match self.maybe_init(key) {
            Ok(Some(result)) => result,
            Ok(None) | Err(HistoryError::RecursiveLoad(_)) => return Ok(None),
            Err(err) => return Err(err),
        };
        let output = self.computation.output(&result.data);
        self.store(result);
        Ok(Some(output))
    }

    /// Result as of `key`, reusing a cached result at or shortly before the
    /// raw as-of key when one exists. The returned result is owned by the
    /// caller; it is no longer cached.
    pub fn maybe_init(&mut self, key: K) -> Result<Option<PushingResult<K, P::Data>>, HistoryError> {
        let Some(raw) = self.core.as_of(key)? else {
            return Ok(None);
        };
        let target = raw.key();
        let _token = self.guard.enter(target)?;

        if let Some(hit) = self.results.take(target) {
            #[cfg(feature = "metrics")]
            self.metrics.record_exact_hit();
            return Ok(Some(hit));
        }

        let mut probe = target;
        for depth in 1..=self.max_recursion_depth {
            let Some(previous) = self.core.previous_matching(probe, 1, &mut |_| true)? else {
                break;
            };
            if let Some(found) = self.results.take(previous.key()) {
                trace!(from = ?previous.key(), to = ?target, depth, "pushing cached result forward");
                #[cfg(feature = "metrics")]
                self.metrics.record_chain_hit(depth);
                return self.push_to_next(found, target).map(Some);
            }
            probe = previous.key();
        }

        self.compute_from_scratch(target)
    }

    /// Advances `result` over every raw entry in `(result.key(), new_key]`.
    ///
    /// # Errors
    ///
    /// - [`HistoryError::Usage`] if `new_key` precedes `result.key()`.
    /// - [`HistoryError::DataConsistency`] if the core yields an entry that
    ///   does not follow the current key.
    pub fn push_to_next(
        &mut self,
        result: PushingResult<K, P::Data>,
        new_key: K,
    ) -> Result<PushingResult<K, P::Data>, HistoryError> {
        if new_key < result.key {
            return Err(HistoryError::usage(format!(
                "cannot push result at {:?} back to {new_key:?}",
                result.key
            )));
        }

        let mut result = result;
        while result.key < new_key {
            let Some(next) = self.core.next_matching(result.key, 1, &mut |_| true)? else {
                break;
            };
            if next.key() <= result.key {
                return Err(HistoryError::data_consistency(format!(
                    "entry at {:?} does not follow pushed key {:?}",
                    next.key(),
                    result.key
                )));
            }
            if next.key() > new_key {
                break;
            }
            result = result.pushed(&self.computation, &next);
            #[cfg(feature = "metrics")]
            self.metrics.record_push();
        }
        Ok(result)
    }

    /// Folds every raw entry in `[origin, key]`, ignoring cached results.
    pub fn compute_from_scratch(
        &mut self,
        key: K,
    ) -> Result<Option<PushingResult<K, P::Data>>, HistoryError> {
        let entries = self
            .core
            .scan(Bound::Included(self.origin), key, usize::MAX)?;
        #[cfg(feature = "metrics")]
        self.metrics.record_from_scratch(entries.len());

        let mut entries = entries.into_iter();
        let Some(first) = entries.next() else {
            return Ok(None);
        };
        let mut data = self.computation.init();
        self.computation.push(&mut data, &first);
        let mut result = PushingResult::new(first.key(), None, data);
        for entry in entries {
            result.advance(&self.computation, &entry);
        }
        Ok(Some(result))
    }

    fn store(&mut self, result: PushingResult<K, P::Data>) {
        let _evicted = self.results.put(result);
        #[cfg(feature = "metrics")]
        self.metrics.record_results_evicted(_evicted);
    }
}

#[cfg(feature = "metrics")]
impl<C, P, K, V> PushingChain<C, P, K, V>
where
    P: PushingComputation<K, V>,
{
    pub fn metrics(&self) -> &PushingMetrics {
        &self.metrics
    }
}

#[cfg(feature = "metrics")]
impl<C, P, K, V> MetricsSnapshotProvider<PushingMetricsSnapshot> for PushingChain<C, P, K, V>
where
    P: PushingComputation<K, V>,
{
    fn snapshot(&self) -> PushingMetricsSnapshot {
        self.metrics.snapshot(self.results.map.len())
    }
}

impl<C, P, K, V> fmt::Debug for PushingChain<C, P, K, V>
where
    P: PushingComputation<K, V>,
    K: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushingChain")
            .field("origin", &self.origin)
            .field("cached_results", &self.results.map.len())
            .field("result_capacity", &self.results.capacity)
            .field("max_recursion_depth", &self.max_recursion_depth)
            .finish()
    }
}
