//! Single-writer query core.
//!
//! A [`QueryCore`] caches one contiguous, sorted slice of a series (the
//! window) and answers as-of, shifted previous/next and range queries from it,
//! falling back to its [`HistorySource`] only when the window does not cover
//! the requested key.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                             QueryCore<K, V, S>                              │
//! │                                                                             │
//! │   as_of(k)                                                                  │
//! │     │                                                                       │
//! │     ├─ 1. hint: HintTable[k][core_id] ── generation == modifications? ──┐   │
//! │     │                                                          yes: O(1)│   │
//! │     ├─ 2. covered(k)? ── binary search in window ──────────── O(log n) ─┤   │
//! │     │                                                                   │   │
//! │     └─ 3. miss: RecursionGuard.enter(k)                                 │   │
//! │              source.load_descending_from(k, read_back)                  │   │
//! │              source.load_ascending_from(k, read_back)                   │   │
//! │              merge or replace window, evict far end, tune  ─────────────┤   │
//! │                                                                         ▼   │
//! │                                                        write hint, return   │
//! │                                                                             │
//! │   EntryWindow   [ e0  e1  e2  ...  en ]      covered: [e0 | -∞, covered_hi] │
//! │                   ▲                 ▲                                       │
//! │             extend_back()     extend_forward()                              │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Coverage
//!
//! The window is exact over its covered interval: every source entry between
//! the lower bound (the first window key, or the start of the series once the
//! head is complete) and `covered_hi` is in the window. A query inside the
//! interval never touches the source. A segment that overlaps or touches the
//! interval is merged; a disjoint segment replaces the window (a gap).
//!
//! ## Operations
//!
//! | Operation           | Source access                                | Hints      |
//! |---------------------|----------------------------------------------|------------|
//! | `as_of`             | on miss only                                 | read/write |
//! | `previous_matching` | on miss and when walking past the first key  | read/write |
//! | `next_matching`     | on miss and when walking past `covered_hi`   | read/write |
//! | `scan`              | on miss and when walking past `covered_hi`   | none       |
//! | `revalidate_null`   | one descending load                          | none       |
//! | `compute_*`         | always, window untouched                     | none       |
//!
//! Every structural change (new key inserted, eviction, clear) bumps the
//! modification counter once, which invalidates all hints written before.
//!
//! ## Example Usage
//!
//! ```
//! use histkit::builder::QueryCoreBuilder;
//! use histkit::source::VecSource;
//!
//! let source = VecSource::from_pairs((0..100u64).map(|k| (k * 10, k)));
//! let mut core = QueryCoreBuilder::new().read_back(8).max_size(32).build(source);
//!
//! assert_eq!(core.as_of(255).unwrap().map(|e| e.key()), Some(250));
//! assert_eq!(core.as_of(5).unwrap().map(|e| e.key()), Some(0));
//! assert_eq!(core.as_of(250).unwrap().map(|e| e.key()), Some(250));
//!
//! // Walks backward past the window start, loading on demand
//! let prev = core.previous_matching(255, 20, &mut |_| true).unwrap();
//! assert_eq!(prev.map(|e| e.key()), Some(50));
//! ```

use std::fmt;
use std::ops::Bound;

use crate::ds::{CoreId, DuplicateKeyPolicy, HintTable};
use crate::entry::Entry;
use crate::error::{HistoryError, InvariantError};
use crate::guard::RecursionGuard;
#[cfg(feature = "metrics")]
use crate::metrics::metrics_impl::QueryCoreMetrics;
#[cfg(feature = "metrics")]
use crate::metrics::snapshot::QueryCoreMetricsSnapshot;
#[cfg(feature = "metrics")]
use crate::metrics::traits::MetricsSnapshotProvider;
use crate::query::ops::{self, CoreAccess};
use crate::query::state::CoreState;
use crate::traits::{CoreHandle, EntryFilter, HistorySource, TimeKey};
use crate::tuner::{GapMissTuner, TunerLimits};

/// Validated construction parameters, produced by
/// [`QueryCoreBuilder`](crate::builder::QueryCoreBuilder).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CoreParams {
    pub(crate) read_back: usize,
    pub(crate) max_size: usize,
    pub(crate) duplicate_policy: DuplicateKeyPolicy,
    pub(crate) auto_tune: bool,
    pub(crate) limits: TunerLimits,
    pub(crate) capture_backtraces: bool,
}

/// Caching query core over one series.
pub struct QueryCore<K, V, S> {
    state: CoreState<K, V>,
    source: S,
}

impl<K, V, S> QueryCore<K, V, S>
where
    K: TimeKey,
    V: Clone,
    S: HistorySource<K, V>,
{
    pub(crate) fn from_params(source: S, params: CoreParams, hints: HintTable<K>) -> Self {
        Self {
            state: CoreState::new(params, hints),
            source,
        }
    }

    /// Splits the core into its window state and its source.
    pub fn into_parts(self) -> (CoreState<K, V>, S) {
        (self.state, self.source)
    }

    /// Window state: coverage, hints, tuner and guard.
    pub fn state(&self) -> &CoreState<K, V> {
        &self.state
    }

    /// Identity used to tag this core's index hints.
    #[inline]
    pub fn id(&self) -> CoreId {
        self.state.id()
    }

    /// Number of structural changes so far.
    #[inline]
    pub fn modification_count(&self) -> u64 {
        self.state.modification_count()
    }

    /// Number of cached entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.state.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// Current (possibly tuned) read-back.
    #[inline]
    pub fn read_back(&self) -> usize {
        self.state.read_back()
    }

    /// Current (possibly tuned) window capacity.
    #[inline]
    pub fn max_size(&self) -> usize {
        self.state.max_size()
    }

    pub fn first_key(&self) -> Option<K> {
        self.state.first_key()
    }

    pub fn last_key(&self) -> Option<K> {
        self.state.last_key()
    }

    /// Returns `true` once the window is known to start at the series start.
    #[inline]
    pub fn is_head_complete(&self) -> bool {
        self.state.is_head_complete()
    }

    /// Returns `true` if a lookup at `key` is answered without the source.
    pub fn covers(&self, key: K) -> bool {
        self.state.covers(key)
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn hints(&self) -> &HintTable<K> {
        self.state.hints()
    }

    pub fn guard(&self) -> &RecursionGuard<K> {
        self.state.guard()
    }

    pub fn tuner(&self) -> &GapMissTuner<K> {
        self.state.tuner()
    }

    pub fn duplicate_policy(&self) -> DuplicateKeyPolicy {
        self.state.duplicate_policy()
    }

    /// Cached entries, ascending.
    pub fn entries(&self) -> impl Iterator<Item = &Entry<K, V>> {
        self.state.entries()
    }

    /// Entry with the greatest key ≤ `key`.
    pub fn as_of(&mut self, key: K) -> Result<Option<Entry<K, V>>, HistoryError> {
        ops::as_of(self, key)
    }

    /// Walks backward from the as-of position of `key` and returns the
    /// `shift`-th entry accepted by `filter` (`shift = 0` is the first accepted
    /// entry at or before `key`).
    pub fn previous_matching(
        &mut self,
        key: K,
        shift: usize,
        filter: &mut EntryFilter<'_, K, V>,
    ) -> Result<Option<Entry<K, V>>, HistoryError> {
        ops::previous_matching(self, key, shift, filter)
    }

    /// Walks forward from the as-of position of `key` and returns the
    /// `shift`-th accepted entry strictly after it. `shift = 0` is the as-of
    /// entry itself, or the first accepted entry at or before `key`.
    pub fn next_matching(
        &mut self,
        key: K,
        shift: usize,
        filter: &mut EntryFilter<'_, K, V>,
    ) -> Result<Option<Entry<K, V>>, HistoryError> {
        ops::next_matching(self, key, shift, filter)
    }

    /// Up to `limit` entries after `from` and at or before `to`, ascending.
    ///
    /// Range scans never read or write index hints, so they do not pollute
    /// the hint table for point lookups.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Usage`] for an unbounded `from`.
    pub fn scan(
        &mut self,
        from: Bound<K>,
        to: K,
        limit: usize,
    ) -> Result<Vec<Entry<K, V>>, HistoryError> {
        ops::scan(self, from, to, limit)
    }

    /// Re-reads the entry at exactly `key` and stores its value when the
    /// source now knows it. Returns the (possibly updated) entry at `key`.
    ///
    /// Value replacement is not a structural change.
    pub fn revalidate_null(&mut self, key: K) -> Result<Option<Entry<K, V>>, HistoryError> {
        ops::revalidate_null(self, key)
    }

    /// Uncached `as_of`: one single-entry descending load.
    pub fn compute_as_of(&self, key: K) -> Result<Option<Entry<K, V>>, HistoryError> {
        self.compute_previous(key, 0)
    }

    /// Uncached `previous_matching(key, shift, accept-all)`.
    pub fn compute_previous(
        &self,
        key: K,
        shift: usize,
    ) -> Result<Option<Entry<K, V>>, HistoryError> {
        ops::compute_previous(&self.source, key, shift)
    }

    /// Uncached `next_matching(key, shift, accept-all)`.
    pub fn compute_next(&self, key: K, shift: usize) -> Result<Option<Entry<K, V>>, HistoryError> {
        ops::compute_next(&self.source, key, shift)
    }

    /// Drops every cached entry. Bumps the modification counter if anything
    /// was cached.
    pub fn clear(&mut self) {
        self.state.clear();
    }

    /// Forgets that the series was known to end at the window tail, so the
    /// next lookup past the last cached key asks the source again. Use after
    /// appending to a live series. Not a structural change.
    pub fn refresh_tail(&mut self) {
        self.state.refresh_tail();
    }

    /// Checks the window ordering, capacity and coverage bookkeeping.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        self.state.check_invariants()
    }

    /// Panics if an invariant is broken; debug and test builds only.
    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        self.state.debug_validate_invariants();
    }
}

impl<K, V, S> CoreAccess<K, V> for QueryCore<K, V, S>
where
    K: TimeKey,
    V: Clone,
    S: HistorySource<K, V>,
{
    type Source = S;

    #[inline]
    fn with_state<R>(
        &mut self,
        op: impl FnOnce(&mut CoreState<K, V>) -> R,
    ) -> Result<R, HistoryError> {
        Ok(op(&mut self.state))
    }

    #[inline]
    fn source(&self) -> &S {
        &self.source
    }

    #[inline]
    fn guard(&self) -> &RecursionGuard<K> {
        self.state.guard()
    }
}

impl<K, V, S> CoreHandle<K, V> for QueryCore<K, V, S>
where
    K: TimeKey,
    V: Clone,
    S: HistorySource<K, V>,
{
    fn core_id(&self) -> CoreId {
        self.state.id()
    }

    fn modification_count(&self) -> u64 {
        self.state.modification_count()
    }

    fn as_of(&mut self, key: K) -> Result<Option<Entry<K, V>>, HistoryError> {
        QueryCore::as_of(self, key)
    }

    fn previous_matching(
        &mut self,
        key: K,
        shift: usize,
        filter: &mut EntryFilter<'_, K, V>,
    ) -> Result<Option<Entry<K, V>>, HistoryError> {
        QueryCore::previous_matching(self, key, shift, filter)
    }

    fn next_matching(
        &mut self,
        key: K,
        shift: usize,
        filter: &mut EntryFilter<'_, K, V>,
    ) -> Result<Option<Entry<K, V>>, HistoryError> {
        QueryCore::next_matching(self, key, shift, filter)
    }

    fn scan(
        &mut self,
        from: Bound<K>,
        to: K,
        limit: usize,
    ) -> Result<Vec<Entry<K, V>>, HistoryError> {
        QueryCore::scan(self, from, to, limit)
    }

    fn revalidate_null(&mut self, key: K) -> Result<Option<Entry<K, V>>, HistoryError> {
        QueryCore::revalidate_null(self, key)
    }

    fn compute_previous(&self, key: K, shift: usize) -> Result<Option<Entry<K, V>>, HistoryError> {
        QueryCore::compute_previous(self, key, shift)
    }

    fn compute_next(&self, key: K, shift: usize) -> Result<Option<Entry<K, V>>, HistoryError> {
        QueryCore::compute_next(self, key, shift)
    }
}

#[cfg(feature = "metrics")]
impl<K, V, S> QueryCore<K, V, S> {
    pub fn metrics(&self) -> &QueryCoreMetrics {
        self.state.metrics()
    }
}

#[cfg(feature = "metrics")]
impl<K, V, S> MetricsSnapshotProvider<QueryCoreMetricsSnapshot> for QueryCore<K, V, S>
where
    K: TimeKey,
{
    fn snapshot(&self) -> QueryCoreMetricsSnapshot {
        self.state.snapshot()
    }
}

impl<K, V, S> fmt::Debug for QueryCore<K, V, S>
where
    K: TimeKey,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCore")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::QueryCoreBuilder;
    use crate::source::VecSource;
    use std::sync::Arc;

    type Core = QueryCore<u64, u64, Arc<VecSource<u64, u64>>>;

    fn series(keys: impl IntoIterator<Item = u64>) -> Arc<VecSource<u64, u64>> {
        Arc::new(VecSource::from_pairs(keys.into_iter().map(|k| (k, k * 10))))
    }

    fn core(source: &Arc<VecSource<u64, u64>>, read_back: usize, max_size: usize) -> Core {
        QueryCoreBuilder::new()
            .read_back(read_back)
            .max_size(max_size)
            .auto_tune(false)
            .build(Arc::clone(source))
    }

    fn key(entry: Option<Entry<u64, u64>>) -> Option<u64> {
        entry.map(|e| e.key())
    }

    #[test]
    fn as_of_picks_greatest_key_at_or_before() {
        let source = series([10, 20, 30]);
        let mut c = core(&source, 4, 16);
        assert_eq!(key(c.as_of(25).unwrap()), Some(20));
        assert_eq!(key(c.as_of(30).unwrap()), Some(30));
        assert_eq!(key(c.as_of(99).unwrap()), Some(30));
        assert_eq!(key(c.as_of(5).unwrap()), None);
        c.debug_validate_invariants();
    }

    #[test]
    fn covered_lookups_do_not_touch_the_source() {
        let source = series(0..100);
        let mut c = core(&source, 8, 32);
        c.as_of(50).unwrap();
        let calls = source.load_calls();
        for k in 44..=57 {
            assert_eq!(key(c.as_of(k).unwrap()), Some(k));
        }
        assert_eq!(source.load_calls(), calls);
    }

    #[test]
    fn repeated_lookup_uses_valid_hint() {
        let source = series(0..100);
        let mut c = core(&source, 8, 32);
        c.as_of(50).unwrap();
        let hint = c.hints().get(50, c.id()).unwrap();
        assert!(hint.is_valid_for(c.modification_count()));
        assert_eq!(c.state().key_at(hint.position()), Some(50));
        assert_eq!(key(c.as_of(50).unwrap()), Some(50));
    }

    #[test]
    fn structural_change_invalidates_hints() {
        let source = series(0..1000);
        let mut c = core(&source, 4, 8);
        c.as_of(500).unwrap();
        let before = c.modification_count();
        // far away: gap, window replaced
        c.as_of(10).unwrap();
        assert!(c.modification_count() > before);
        let stale = c.hints().get(500, c.id()).unwrap();
        assert!(!stale.is_valid_for(c.modification_count()));
        assert_eq!(key(c.as_of(500).unwrap()), Some(500));
    }

    #[test]
    fn lookups_only_hit_the_source_on_miss() {
        let source = series(0..100);
        let mut c = core(&source, 8, 64);
        c.as_of(50).unwrap();
        let count = c.modification_count();
        c.as_of(51).unwrap();
        assert_eq!(c.modification_count(), count);
    }

    #[test]
    fn empty_series_returns_none_everywhere() {
        let source = series([]);
        let mut c = core(&source, 4, 16);
        assert_eq!(key(c.as_of(10).unwrap()), None);
        assert_eq!(key(c.previous_matching(10, 3, &mut |_| true).unwrap()), None);
        assert_eq!(key(c.next_matching(10, 1, &mut |_| true).unwrap()), None);
        assert!(c.scan(Bound::Included(0), 100, 10).unwrap().is_empty());
        assert!(c.is_empty());
    }

    #[test]
    fn previous_matching_walks_past_window_start() {
        let source = series(0..200);
        let mut c = core(&source, 4, 16);
        assert_eq!(key(c.previous_matching(150, 0, &mut |_| true).unwrap()), Some(150));
        assert_eq!(key(c.previous_matching(150, 37, &mut |_| true).unwrap()), Some(113));
        assert_eq!(key(c.previous_matching(150, 150, &mut |_| true).unwrap()), Some(0));
        assert_eq!(key(c.previous_matching(150, 151, &mut |_| true).unwrap()), None);
        c.debug_validate_invariants();
    }

    #[test]
    fn previous_matching_applies_filter() {
        let source = series(0..50);
        let mut c = core(&source, 4, 16);
        let mut even = |e: &Entry<u64, u64>| e.key() % 2 == 0;
        assert_eq!(key(c.previous_matching(31, 0, &mut even).unwrap()), Some(30));
        assert_eq!(key(c.previous_matching(31, 3, &mut even).unwrap()), Some(24));
        let mut never = |_: &Entry<u64, u64>| false;
        assert_eq!(key(c.previous_matching(31, 0, &mut never).unwrap()), None);
    }

    #[test]
    fn next_matching_walks_past_window_end() {
        let source = series(0..200);
        let mut c = core(&source, 4, 16);
        assert_eq!(key(c.next_matching(10, 0, &mut |_| true).unwrap()), Some(10));
        assert_eq!(key(c.next_matching(10, 1, &mut |_| true).unwrap()), Some(11));
        assert_eq!(key(c.next_matching(10, 100, &mut |_| true).unwrap()), Some(110));
        assert_eq!(key(c.next_matching(10, 189, &mut |_| true).unwrap()), Some(199));
        assert_eq!(key(c.next_matching(10, 190, &mut |_| true).unwrap()), None);
        c.debug_validate_invariants();
    }

    #[test]
    fn next_matching_before_first_key_starts_at_first_entry() {
        let source = series([10, 20, 30]);
        let mut c = core(&source, 2, 8);
        assert_eq!(key(c.next_matching(5, 1, &mut |_| true).unwrap()), Some(10));
        assert_eq!(key(c.next_matching(5, 3, &mut |_| true).unwrap()), Some(30));
        assert_eq!(key(c.next_matching(5, 0, &mut |_| true).unwrap()), None);
    }

    #[test]
    fn scan_respects_bounds_and_limit() {
        let source = series((0..100).map(|k| k * 2));
        let mut c = core(&source, 4, 16);
        let keys = |v: Vec<Entry<u64, u64>>| v.into_iter().map(|e| e.key()).collect::<Vec<_>>();

        assert_eq!(
            keys(c.scan(Bound::Included(10), 20, usize::MAX).unwrap()),
            vec![10, 12, 14, 16, 18, 20]
        );
        assert_eq!(keys(c.scan(Bound::Excluded(10), 15, usize::MAX).unwrap()), vec![12, 14]);
        assert_eq!(keys(c.scan(Bound::Included(100), 198, 3).unwrap()), vec![100, 102, 104]);
        assert_eq!(keys(c.scan(Bound::Included(11), 11, 3).unwrap()), Vec::<u64>::new());
        let long = c.scan(Bound::Included(0), 1000, usize::MAX).unwrap();
        assert_eq!(long.len(), 100);
        assert!(c.len() <= c.max_size());
    }

    #[test]
    fn scan_does_not_write_hints() {
        let source = series(0..100);
        let mut c = core(&source, 4, 16);
        c.scan(Bound::Included(10), 30, usize::MAX).unwrap();
        assert!(c.hints().is_empty());
    }

    #[test]
    fn scan_rejects_unbounded_start() {
        let source = series(0..10);
        let mut c = core(&source, 4, 16);
        let err = c.scan(Bound::Unbounded, 5, 10).unwrap_err();
        assert!(matches!(err, HistoryError::Usage(_)));
    }

    #[test]
    fn window_never_exceeds_max_size() {
        let source = series(0..500);
        let mut c = core(&source, 4, 12);
        for k in (0..500).step_by(7) {
            c.as_of(k).unwrap();
            assert!(c.len() <= 12);
        }
        c.previous_matching(499, 300, &mut |_| true).unwrap();
        assert!(c.len() <= 12);
        c.debug_validate_invariants();
    }

    #[test]
    fn clear_bumps_only_when_non_empty() {
        let source = series(0..10);
        let mut c = core(&source, 4, 16);
        c.clear();
        assert_eq!(c.modification_count(), 0);
        c.as_of(5).unwrap();
        let before = c.modification_count();
        c.clear();
        assert_eq!(c.modification_count(), before + 1);
        assert!(c.is_empty());
        assert!(!c.covers(5));
    }

    #[test]
    fn refresh_tail_sees_appended_entries() {
        let source = series([1, 2, 3]);
        let mut c = core(&source, 4, 16);
        assert_eq!(key(c.as_of(10).unwrap()), Some(3));
        source.append(5, 50).unwrap();
        // still covered: stale until the tail is refreshed
        assert_eq!(key(c.as_of(10).unwrap()), Some(3));
        c.refresh_tail();
        assert_eq!(key(c.as_of(10).unwrap()), Some(5));
    }

    #[test]
    fn revalidate_null_stores_known_value() {
        let source: Arc<VecSource<u64, u64>> =
            Arc::new(VecSource::from_entries([Entry::new(1, 1), Entry::null(2)]));
        let mut c = core(&source, 4, 16);
        assert!(c.as_of(2).unwrap().unwrap().is_null());
        let modifications = c.modification_count();

        source.set_value(2, Some(20));
        let entry = c.revalidate_null(2).unwrap().unwrap();
        assert_eq!(entry.value(), Some(&20));
        assert_eq!(c.as_of(2).unwrap().unwrap().value(), Some(&20));
        assert_eq!(c.modification_count(), modifications);
    }

    #[test]
    fn compute_bypasses_the_window() {
        let source = series(0..100);
        let c = core(&source, 4, 16);
        assert_eq!(key(c.compute_previous(50, 3).unwrap()), Some(47));
        assert_eq!(key(c.compute_next(50, 3).unwrap()), Some(53));
        assert_eq!(key(c.compute_next(50, 0).unwrap()), Some(50));
        assert_eq!(key(c.compute_as_of(50).unwrap()), Some(50));
        assert_eq!(key(c.compute_next(99, 1).unwrap()), None);
        assert!(c.is_empty());
    }

    struct Broken;

    impl HistorySource<u64, u64> for Broken {
        fn load_descending_from(&self, _key: u64, _count: usize) -> Vec<Entry<u64, u64>> {
            vec![Entry::new(1, 1), Entry::new(2, 2)]
        }

        fn load_ascending_from(&self, _key: u64, _count: usize) -> Vec<Entry<u64, u64>> {
            Vec::new()
        }
    }

    #[test]
    fn out_of_order_source_is_a_consistency_error() {
        let mut c: QueryCore<u64, u64, Broken> = QueryCoreBuilder::new().build(Broken);
        let err = c.as_of(5).unwrap_err();
        assert!(matches!(err, HistoryError::DataConsistency(_)));
        assert!(c.is_empty());
    }

    #[test]
    fn duplicate_policy_keep_existing_keeps_first_value() {
        let source = series(0..10);
        let mut c = QueryCoreBuilder::new()
            .read_back(4)
            .max_size(16)
            .duplicate_policy(DuplicateKeyPolicy::KeepExisting)
            .build(Arc::clone(&source));
        c.as_of(5).unwrap();
        assert_eq!(c.duplicate_policy(), DuplicateKeyPolicy::KeepExisting);
        assert_eq!(c.as_of(5).unwrap().unwrap().value(), Some(&50));
    }

    #[test]
    fn backward_scan_grows_read_back_when_tuning() {
        let source = series(0..10_000);
        let mut c = QueryCoreBuilder::new()
            .read_back(4)
            .max_size(8)
            .build(Arc::clone(&source));
        c.previous_matching(9_999, 500, &mut |_| true).unwrap();
        assert!(c.read_back() > 4);
        assert!(c.max_size() >= 2 * 4);
        c.debug_validate_invariants();
    }
}
