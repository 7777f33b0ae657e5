//! Window bookkeeping shared by both query cores.
//!
//! [`CoreState`] owns everything a query core mutates: the window, its
//! coverage bounds, the modification counter, the hint table and the tuner.
//! It never calls the source. A driver in [`ops`](super::ops) asks it for a
//! load plan, runs the load with no borrow of the state held, and hands the
//! loaded segment back to be merged.
//!
//! ```text
//!   driver                      CoreState                     HistorySource
//!     │  cached_at(k) ─────────────▶ │                              │
//!     │ ◀─────────── None (miss) ─── │                              │
//!     │  guard.enter(k)                                             │
//!     │  load_descending_from / load_ascending_from ──────────────▶ │
//!     │ ◀──────────────────────────────────────────────── segment ─ │
//!     │  merge_around(k, segment) ─▶ │ merge or replace, evict, tune│
//!     │  position_of(k) ───────────▶ │ predecessor, write hint      │
//! ```

use std::fmt;
use std::ops::Bound;

use tracing::{debug, trace};

use crate::ds::{CacheIndex, CoreId, DuplicateKeyPolicy, EntryWindow, HintTable};
use crate::entry::Entry;
use crate::error::InvariantError;
use crate::guard::RecursionGuard;
#[cfg(feature = "metrics")]
use crate::metrics::metrics_impl::QueryCoreMetrics;
#[cfg(feature = "metrics")]
use crate::metrics::snapshot::QueryCoreMetricsSnapshot;
#[cfg(feature = "metrics")]
use crate::metrics::traits::{MetricsSnapshotProvider, QueryCoreMetricsRecorder};
use crate::query::core::CoreParams;
use crate::traits::{EntryFilter, TimeKey};
use crate::tuner::GapMissTuner;

/// Result of locating the as-of position of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Located {
    At(usize),
    /// Covered, but no entry at or before the key exists.
    BeforeFirst,
}

/// Outcome of walking the cached window without the source.
#[derive(Debug)]
pub(crate) enum Step<K, V> {
    Found(Entry<K, V>),
    End,
    /// Walked past the first cached key, which is carried.
    NeedBack(K),
    /// Walked past the covered tail.
    NeedForward,
}

/// Which end eviction removes from first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trim {
    /// Keep roughly as many entries on each side of the focus.
    Balanced,
    /// Walking backward: drop newest entries first.
    Back,
    /// Walking forward: drop oldest entries first.
    Front,
}

#[derive(Debug, Clone, Copy, Default)]
struct MergeOutcome {
    inserted: usize,
    dropped: usize,
    evicted: usize,
}

impl MergeOutcome {
    fn is_structural(&self) -> bool {
        self.inserted > 0 || self.dropped > 0 || self.evicted > 0
    }
}

/// Cached window of one series and everything that describes it.
pub struct CoreState<K, V> {
    id: CoreId,
    window: EntryWindow<K, V>,
    head_complete: bool,
    covered_hi: Option<Bound<K>>,
    modifications: u64,
    hints: HintTable<K>,
    tuner: GapMissTuner<K>,
    guard: RecursionGuard<K>,
    duplicate_policy: DuplicateKeyPolicy,
    #[cfg(feature = "metrics")]
    metrics: QueryCoreMetrics,
}

impl<K, V> CoreState<K, V>
where
    K: TimeKey,
    V: Clone,
{
    pub(crate) fn new(params: CoreParams, hints: HintTable<K>) -> Self {
        Self {
            id: CoreId::next(),
            window: EntryWindow::with_capacity(params.max_size.min(1024)),
            head_complete: false,
            covered_hi: None,
            modifications: 0,
            hints,
            tuner: GapMissTuner::new(
                params.read_back,
                params.max_size,
                params.limits,
                params.auto_tune,
            ),
            guard: RecursionGuard::new(params.capture_backtraces),
            duplicate_policy: params.duplicate_policy,
            #[cfg(feature = "metrics")]
            metrics: QueryCoreMetrics::default(),
        }
    }

    /// Identity used to tag this core's index hints.
    #[inline]
    pub fn id(&self) -> CoreId {
        self.id
    }

    /// Number of structural changes so far.
    #[inline]
    pub fn modification_count(&self) -> u64 {
        self.modifications
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.window.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    #[inline]
    pub fn read_back(&self) -> usize {
        self.tuner.read_back()
    }

    #[inline]
    pub fn max_size(&self) -> usize {
        self.tuner.max_size()
    }

    pub fn first_key(&self) -> Option<K> {
        self.window.first_key()
    }

    pub fn last_key(&self) -> Option<K> {
        self.window.last_key()
    }

    #[inline]
    pub fn is_head_complete(&self) -> bool {
        self.head_complete
    }

    /// Returns `true` if a lookup at `key` is answered without the source.
    pub fn covers(&self, key: K) -> bool {
        self.covers_through(key)
            && (self.head_complete || self.window.first_key().is_some_and(|first| first <= key))
    }

    pub fn hints(&self) -> &HintTable<K> {
        &self.hints
    }

    pub fn guard(&self) -> &RecursionGuard<K> {
        &self.guard
    }

    pub fn tuner(&self) -> &GapMissTuner<K> {
        &self.tuner
    }

    pub fn duplicate_policy(&self) -> DuplicateKeyPolicy {
        self.duplicate_policy
    }

    /// Cached entries, ascending.
    pub fn entries(&self) -> impl Iterator<Item = &Entry<K, V>> {
        self.window.iter()
    }

    pub(crate) fn entry_at(&self, position: usize) -> Option<Entry<K, V>> {
        self.window.get(position).cloned()
    }

    pub(crate) fn key_at(&self, position: usize) -> Option<K> {
        self.window.key_at(position)
    }

    pub(crate) fn clear(&mut self) {
        let removed = self.window.clear();
        self.head_complete = false;
        self.covered_hi = None;
        if removed > 0 {
            self.modifications += 1;
        }
        #[cfg(feature = "metrics")]
        self.metrics.record_clear();
    }

    pub(crate) fn refresh_tail(&mut self) {
        match self.window.last_key() {
            Some(last) => self.covered_hi = Some(Bound::Included(last)),
            None => {
                self.head_complete = false;
                self.covered_hi = None;
            },
        }
    }

    /// Checks the window ordering, capacity and coverage bookkeeping.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        if !self.window.is_sorted_strict() {
            return Err(InvariantError::new("window keys are not strictly ascending"));
        }
        if self.window.len() > self.tuner.max_size() {
            return Err(InvariantError::new(format!(
                "window holds {} entries, max_size is {}",
                self.window.len(),
                self.tuner.max_size()
            )));
        }
        if let Some(last) = self.window.last_key() {
            match self.covered_hi {
                Some(Bound::Included(hi)) if hi >= last => {},
                Some(Bound::Excluded(hi)) if hi > last => {},
                other => {
                    return Err(InvariantError::new(format!(
                        "covered bound {other:?} does not reach last key {last:?}"
                    )));
                },
            }
        }
        if self.tuner.read_back() == 0 {
            return Err(InvariantError::new("read_back is zero"));
        }
        Ok(())
    }

    /// Panics if an invariant is broken; debug and test builds only.
    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        if let Err(err) = self.check_invariants() {
            panic!("{}", err);
        }
        self.hints.debug_validate_invariants();
    }

    // -----------------------------------------------------------------------
    // Locate
    // -----------------------------------------------------------------------

    /// Answers from a valid hint or the covered window; `None` on a miss.
    pub(crate) fn cached_at(&mut self, key: K, use_hints: bool) -> Option<Located> {
        #[cfg(feature = "metrics")]
        self.metrics.record_lookup();

        if use_hints && let Some(index) = self.hints.get(key, self.id) {
            if index.is_valid_for(self.modifications) && self.hint_holds(key, index.position()) {
                #[cfg(feature = "metrics")]
                self.metrics.record_hint_hit();
                self.tuner.record_hit();
                return Some(Located::At(index.position()));
            }
            #[cfg(feature = "metrics")]
            self.metrics.record_hint_stale();
        }

        if !self.covers(key) {
            return None;
        }
        #[cfg(feature = "metrics")]
        self.metrics.record_window_hit();
        self.tuner.record_hit();
        Some(self.position_of(key, use_hints))
    }

    /// As-of position in the current window, written back as a hint.
    pub(crate) fn position_of(&mut self, key: K, use_hints: bool) -> Located {
        let located = match self.window.predecessor(key) {
            Some(pos) => Located::At(pos),
            None => Located::BeforeFirst,
        };
        if use_hints && let Located::At(pos) = located {
            self.hints
                .put(key, self.id, CacheIndex::new(self.modifications, pos));
        }
        located
    }

    fn hint_holds(&self, key: K, pos: usize) -> bool {
        let Some(at) = self.window.key_at(pos) else {
            return false;
        };
        at <= key
            && match self.window.key_at(pos + 1) {
                Some(next) => key < next,
                None => self.covers(key),
            }
    }

    fn covers_through(&self, key: K) -> bool {
        match self.covered_hi {
            Some(Bound::Included(hi)) => key <= hi,
            Some(Bound::Excluded(hi)) => key < hi,
            Some(Bound::Unbounded) | None => false,
        }
    }

    // -----------------------------------------------------------------------
    // Walking
    // -----------------------------------------------------------------------

    /// Walks backward from `pos`, counting accepted entries down from
    /// `remaining`.
    pub(crate) fn walk_back(
        &self,
        pos: &mut usize,
        remaining: &mut usize,
        filter: &mut EntryFilter<'_, K, V>,
    ) -> Step<K, V> {
        loop {
            let Some(entry) = self.window.get(*pos) else {
                return Step::End;
            };
            if filter(entry) {
                if *remaining == 0 {
                    return Step::Found(entry.clone());
                }
                *remaining -= 1;
            }
            if *pos == 0 {
                if self.head_complete {
                    return Step::End;
                }
                return Step::NeedBack(entry.key());
            }
            *pos -= 1;
        }
    }

    /// Position just before `current` once older entries were loaded.
    pub(crate) fn resume_before(&self, current: K) -> Option<usize> {
        let pos = self.window.predecessor(current)?;
        if self.window.key_at(pos) == Some(current) {
            pos.checked_sub(1)
        } else {
            Some(pos)
        }
    }

    /// Walks forward from `cursor`, decrementing `remaining` per accepted
    /// entry.
    pub(crate) fn walk_forward(
        &self,
        cursor: &mut Option<K>,
        remaining: &mut usize,
        filter: &mut EntryFilter<'_, K, V>,
    ) -> Step<K, V> {
        loop {
            let idx = match *cursor {
                Some(c) => self.window.first_after(c),
                None => 0,
            };
            let Some(entry) = self.window.get(idx) else {
                return Step::NeedForward;
            };
            if filter(entry) {
                *remaining = remaining.saturating_sub(1);
                if *remaining == 0 {
                    return Step::Found(entry.clone());
                }
            }
            *cursor = Some(entry.key());
        }
    }

    /// Collects scan output from the cached window into `out`.
    pub(crate) fn scan_step(
        &self,
        from: (K, bool),
        to: K,
        limit: usize,
        cursor: &mut Option<K>,
        out: &mut Vec<Entry<K, V>>,
    ) -> Step<K, V> {
        let (start, inclusive) = from;
        loop {
            let idx = match *cursor {
                Some(c) => self.window.first_after(c),
                None if inclusive => self.window.first_at_or_after(start),
                None => self.window.first_after(start),
            };
            let Some(entry) = self.window.get(idx) else {
                if self.covers_through(to) {
                    return Step::End;
                }
                return Step::NeedForward;
            };
            if entry.key() > to {
                return Step::End;
            }
            *cursor = Some(entry.key());
            out.push(entry.clone());
            if out.len() >= limit {
                return Step::End;
            }
        }
    }

    /// Stores a freshly read value at `key`, if `key` is cached.
    pub(crate) fn apply_revalidation(
        &mut self,
        key: K,
        fresh: Option<Entry<K, V>>,
    ) -> Option<Entry<K, V>> {
        let position = self
            .window
            .predecessor(key)
            .filter(|&p| self.window.key_at(p) == Some(key));

        #[cfg(feature = "metrics")]
        self.metrics
            .record_null_revalidation(fresh.as_ref().is_some_and(|e| !e.is_null()));

        match (position, fresh) {
            (Some(pos), Some(fresh)) => {
                if !fresh.is_null() {
                    let (_, value) = fresh.into_parts();
                    self.window.replace_value(pos, value);
                }
                self.window.get(pos).cloned()
            },
            (Some(pos), None) => self.window.get(pos).cloned(),
            (None, fresh) => fresh,
        }
    }

    // -----------------------------------------------------------------------
    // Merging loaded segments
    // -----------------------------------------------------------------------

    /// Merges the result of a miss load around `key`. `back` is descending
    /// from `key`, `forward` ascending from it; both asked for `count`.
    pub(crate) fn merge_around(
        &mut self,
        key: K,
        count: usize,
        back: Vec<Entry<K, V>>,
        forward: Vec<Entry<K, V>>,
    ) {
        let read = back.len() + forward.len();
        let lo = if back.len() < count {
            None
        } else {
            back.last().map(Entry::key)
        };
        let hi = forward.last().map_or(key, Entry::key).max(key);
        trace!(
            core = self.id.as_u64(),
            key = ?key,
            read_back = count,
            loaded = read,
            "window miss"
        );

        let mut segment = back;
        segment.reverse();
        segment.extend(forward);
        self.merge_segment(segment, lo, Bound::Included(hi), key, Trim::Balanced);

        #[cfg(feature = "metrics")]
        self.metrics.record_window_miss(read);
        self.tune(key, read);
    }

    /// First cached key and how many entries to load descending from it.
    pub(crate) fn back_plan(&self) -> Option<(K, usize)> {
        let first = self.window.first_key()?;
        Some((first, self.tuner.read_back().saturating_add(1)))
    }

    /// Merges entries loaded descending from the old first key `first`.
    pub(crate) fn merge_back(&mut self, first: K, count: usize, back: Vec<Entry<K, V>>) {
        let read = back.len();
        let lo = if back.len() < count {
            None
        } else {
            back.last().map(Entry::key)
        };
        trace!(core = self.id.as_u64(), from = ?first, loaded = read, "extend back");

        self.merge_segment(back, lo, Bound::Included(first), first, Trim::Back);

        #[cfg(feature = "metrics")]
        self.metrics.record_extend_back(read);
        self.tune(first, read);
    }

    /// Covered tail, how many entries to load from it, and the current last
    /// key.
    pub(crate) fn forward_plan(&self) -> Option<(K, usize, Option<K>)> {
        let anchor = match self.covered_hi {
            Some(Bound::Included(hi)) | Some(Bound::Excluded(hi)) => hi,
            Some(Bound::Unbounded) | None => return None,
        };
        Some((
            anchor,
            self.tuner.read_back().saturating_add(1),
            self.window.last_key(),
        ))
    }

    /// Merges entries loaded ascending from `anchor`. Returns `true` if the
    /// last cached key moved past `before`.
    pub(crate) fn merge_forward(
        &mut self,
        anchor: K,
        before: Option<K>,
        forward: Vec<Entry<K, V>>,
    ) -> bool {
        let read = forward.len();
        let hi = forward.last().map_or(anchor, Entry::key);
        trace!(core = self.id.as_u64(), from = ?anchor, loaded = read, "extend forward");

        let focus = before.unwrap_or(anchor);
        self.merge_segment(forward, Some(anchor), Bound::Included(hi), focus, Trim::Front);

        #[cfg(feature = "metrics")]
        self.metrics.record_extend_forward(read);
        self.tune(anchor, read);
        self.window.last_key() > before
    }

    fn tune(&mut self, key: K, read: usize) {
        if let Some(growth) = self.tuner.record_miss(key, read) {
            debug!(
                core = self.id.as_u64(),
                read_back = growth.read_back,
                max_size = growth.max_size,
                successive_misses = growth.successive_misses,
                "auto-tuner grew window"
            );
            #[cfg(feature = "metrics")]
            self.metrics.record_tuner_growth();
        }
    }

    /// Merges a freshly loaded segment covering `[lo, hi]` (`lo = None`: from
    /// the series start), then evicts down to capacity around `focus`.
    fn merge_segment(
        &mut self,
        segment: Vec<Entry<K, V>>,
        lo: Option<K>,
        hi: Bound<K>,
        focus: K,
        trim: Trim,
    ) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();

        if self.touches_coverage(lo, hi) {
            self.head_complete |= lo.is_none();
            self.covered_hi = Some(match self.covered_hi {
                Some(current) => max_upper(current, hi),
                None => hi,
            });
        } else {
            outcome.dropped = self.window.clear();
            if outcome.dropped > 0 {
                debug!(
                    core = self.id.as_u64(),
                    key = ?focus,
                    dropped = outcome.dropped,
                    "gap detected, window replaced"
                );
                #[cfg(feature = "metrics")]
                self.metrics.record_gap_reset(outcome.dropped);
            }
            self.head_complete = lo.is_none();
            self.covered_hi = Some(hi);
        }

        for entry in segment {
            if self.window.insert(entry, self.duplicate_policy).is_structural() {
                outcome.inserted += 1;
            }
        }

        outcome.evicted = self.enforce_capacity(focus, trim);
        if outcome.is_structural() {
            self.modifications += 1;
        }
        outcome
    }

    /// Whether `[lo, hi]` intersects or touches the covered interval.
    fn touches_coverage(&self, lo: Option<K>, hi: Bound<K>) -> bool {
        let Some(covered_hi) = self.covered_hi else {
            return false;
        };
        let covered_lo = if self.head_complete {
            None
        } else {
            match self.window.first_key() {
                Some(first) => Some(first),
                None => return false,
            }
        };

        let lo_ok = match (lo, covered_hi) {
            (None, _) => true,
            (Some(l), Bound::Included(h) | Bound::Excluded(h)) => l <= h,
            (Some(_), Bound::Unbounded) => true,
        };
        let hi_ok = match (covered_lo, hi) {
            (None, _) => true,
            (Some(c), Bound::Included(h) | Bound::Excluded(h)) => c <= h,
            (Some(_), Bound::Unbounded) => true,
        };
        lo_ok && hi_ok
    }

    /// Evicts down to `max_size`, never dropping the entry at `focus`.
    fn enforce_capacity(&mut self, focus: K, trim: Trim) -> usize {
        let max = self.tuner.max_size().max(1);
        let len = self.window.len();
        if len <= max {
            return 0;
        }
        let excess = len - max;
        let focus_pos = self.window.predecessor(focus).unwrap_or(0);
        let mut before = focus_pos;
        let mut after = len - 1 - focus_pos;

        let (front, back) = match trim {
            Trim::Back => {
                let back = excess.min(after);
                (excess - back, back)
            },
            Trim::Front => {
                let front = excess.min(before);
                (front, excess - front)
            },
            Trim::Balanced => {
                let (mut front, mut back) = (0, 0);
                for _ in 0..excess {
                    if before >= after {
                        front += 1;
                        before -= 1;
                    } else {
                        back += 1;
                        after -= 1;
                    }
                }
                (front, back)
            },
        };

        if back > 0 {
            let first_evicted = self.window.key_at(len - back);
            self.window.evict_back(back);
            self.covered_hi = first_evicted.map(Bound::Excluded);
        }
        if front > 0 {
            self.window.evict_front(front);
            self.head_complete = false;
        }
        #[cfg(feature = "metrics")]
        self.metrics.record_evicted(front + back);
        front + back
    }
}

fn max_upper<K: Ord>(a: Bound<K>, b: Bound<K>) -> Bound<K> {
    match (a, b) {
        (Bound::Unbounded, _) | (_, Bound::Unbounded) => Bound::Unbounded,
        (Bound::Included(x), Bound::Included(y)) => Bound::Included(x.max(y)),
        (Bound::Excluded(x), Bound::Excluded(y)) => Bound::Excluded(x.max(y)),
        (Bound::Included(x), Bound::Excluded(y)) | (Bound::Excluded(y), Bound::Included(x)) => {
            if x >= y {
                Bound::Included(x)
            } else {
                Bound::Excluded(y)
            }
        },
    }
}

#[cfg(feature = "metrics")]
impl<K, V> CoreState<K, V> {
    pub fn metrics(&self) -> &QueryCoreMetrics {
        &self.metrics
    }
}

#[cfg(feature = "metrics")]
impl<K, V> MetricsSnapshotProvider<QueryCoreMetricsSnapshot> for CoreState<K, V>
where
    K: TimeKey,
{
    fn snapshot(&self) -> QueryCoreMetricsSnapshot {
        self.metrics
            .snapshot(self.window.len(), self.tuner.read_back(), self.tuner.max_size())
    }
}

impl<K, V> fmt::Debug for CoreState<K, V>
where
    K: TimeKey,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreState")
            .field("id", &self.id)
            .field("len", &self.window.len())
            .field("first_key", &self.window.first_key())
            .field("last_key", &self.window.last_key())
            .field("head_complete", &self.head_complete)
            .field("covered_hi", &self.covered_hi)
            .field("modifications", &self.modifications)
            .field("read_back", &self.tuner.read_back())
            .field("max_size", &self.tuner.max_size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::QueryCoreBuilder;

    fn state(read_back: usize, max_size: usize) -> CoreState<u64, u64> {
        let params = QueryCoreBuilder::new()
            .read_back(read_back)
            .max_size(max_size)
            .auto_tune(false)
            .validate()
            .unwrap();
        CoreState::new(params, HintTable::default())
    }

    fn entries(keys: impl IntoIterator<Item = u64>) -> Vec<Entry<u64, u64>> {
        keys.into_iter().map(|k| Entry::new(k, k)).collect()
    }

    #[test]
    fn empty_state_covers_nothing() {
        let s = state(4, 16);
        assert!(!s.covers(0));
        assert!(s.back_plan().is_none());
        assert!(s.forward_plan().is_none());
        s.debug_validate_invariants();
    }

    #[test]
    fn short_back_load_completes_the_head() {
        let mut s = state(4, 16);
        s.merge_around(2, 4, entries([2, 1, 0]), entries([2, 3, 4, 5]));
        assert!(s.is_head_complete());
        assert!(s.covers(0));
        assert!(s.covers(5));
        assert!(!s.covers(6));
        assert_eq!(s.modification_count(), 1);
        s.debug_validate_invariants();
    }

    #[test]
    fn disjoint_segment_replaces_the_window() {
        let mut s = state(2, 8);
        s.merge_around(10, 2, entries([10, 9]), entries([10, 11]));
        s.merge_around(50, 2, entries([50, 49]), entries([50, 51]));
        assert_eq!(s.first_key(), Some(49));
        assert!(!s.covers(10));
        assert_eq!(s.modification_count(), 2);
    }

    #[test]
    fn resume_before_skips_the_current_key() {
        let mut s = state(4, 16);
        s.merge_around(5, 4, entries([5, 4, 3, 2]), entries([5, 6]));
        assert_eq!(s.resume_before(4), Some(1));
        assert_eq!(s.resume_before(2), None);
        // a key no longer cached resumes at its predecessor
        assert_eq!(s.resume_before(10), Some(4));
    }

    #[test]
    fn walk_back_stops_at_an_open_head() {
        let mut s = state(2, 8);
        s.merge_around(5, 2, entries([5, 4]), entries([5, 6]));
        let (mut pos, mut remaining) = (1, 5);
        match s.walk_back(&mut pos, &mut remaining, &mut |_| true) {
            Step::NeedBack(first) => assert_eq!(first, 4),
            other => panic!("unexpected step {other:?}"),
        }
        assert_eq!(remaining, 3);
    }
}
