//! Query operations, written once for both cores.
//!
//! Each operation alternates between short accesses to the [`CoreState`] and
//! source loads that run with no state borrow held. A load entered through
//! the core's [`RecursionGuard`] marks its key as in flight, so only a nested
//! request for that same key is refused with a
//! [`RecursiveLoad`](crate::error::RecursiveLoad) signal. A nested request for
//! any other key runs normally and may change the window; every step after a
//! load therefore re-reads the window by key, never by a position taken
//! before the load.

use std::ops::Bound;

use crate::entry::Entry;
use crate::error::HistoryError;
use crate::guard::RecursionGuard;
use crate::query::state::{CoreState, Located, Step};
use crate::traits::{EntryFilter, HistorySource, TimeKey};

/// What an operation needs from a core.
pub(crate) trait CoreAccess<K, V> {
    type Source: HistorySource<K, V>;

    /// Runs `op` with exclusive access to the state. `op` never calls the
    /// source.
    fn with_state<R>(
        &mut self,
        op: impl FnOnce(&mut CoreState<K, V>) -> R,
    ) -> Result<R, HistoryError>;

    fn source(&self) -> &Self::Source;

    fn guard(&self) -> &RecursionGuard<K>;
}

pub(crate) fn as_of<A, K, V>(core: &mut A, key: K) -> Result<Option<Entry<K, V>>, HistoryError>
where
    A: CoreAccess<K, V>,
    K: TimeKey,
    V: Clone,
{
    match locate(core, key, true)? {
        Located::At(pos) => core.with_state(|s| s.entry_at(pos)),
        Located::BeforeFirst => Ok(None),
    }
}

pub(crate) fn previous_matching<A, K, V>(
    core: &mut A,
    key: K,
    shift: usize,
    filter: &mut EntryFilter<'_, K, V>,
) -> Result<Option<Entry<K, V>>, HistoryError>
where
    A: CoreAccess<K, V>,
    K: TimeKey,
    V: Clone,
{
    let mut pos = match locate(core, key, true)? {
        Located::At(pos) => pos,
        Located::BeforeFirst => return Ok(None),
    };
    let mut remaining = shift;

    loop {
        let step = core.with_state(|s| s.walk_back(&mut pos, &mut remaining, &mut *filter))?;
        match step {
            Step::Found(entry) => return Ok(Some(entry)),
            Step::End | Step::NeedForward => return Ok(None),
            Step::NeedBack(current) => {
                extend_back(core)?;
                pos = match core.with_state(|s| s.resume_before(current))? {
                    Some(p) => p,
                    None => return Ok(None),
                };
            },
        }
    }
}

pub(crate) fn next_matching<A, K, V>(
    core: &mut A,
    key: K,
    shift: usize,
    filter: &mut EntryFilter<'_, K, V>,
) -> Result<Option<Entry<K, V>>, HistoryError>
where
    A: CoreAccess<K, V>,
    K: TimeKey,
    V: Clone,
{
    if shift == 0 {
        return previous_matching(core, key, 0, filter);
    }

    let mut cursor = match locate(core, key, true)? {
        Located::At(pos) => core.with_state(|s| s.key_at(pos))?,
        Located::BeforeFirst => None,
    };
    let mut remaining = shift;

    loop {
        let step = core.with_state(|s| s.walk_forward(&mut cursor, &mut remaining, &mut *filter))?;
        match step {
            Step::Found(entry) => return Ok(Some(entry)),
            Step::End | Step::NeedBack(_) => return Ok(None),
            Step::NeedForward => {
                if !extend_forward(core)? {
                    return Ok(None);
                }
            },
        }
    }
}

pub(crate) fn scan<A, K, V>(
    core: &mut A,
    from: Bound<K>,
    to: K,
    limit: usize,
) -> Result<Vec<Entry<K, V>>, HistoryError>
where
    A: CoreAccess<K, V>,
    K: TimeKey,
    V: Clone,
{
    let (start, inclusive) = match from {
        Bound::Included(k) => (k, true),
        Bound::Excluded(k) => (k, false),
        Bound::Unbounded => {
            return Err(HistoryError::usage("scan requires a bounded start key"));
        },
    };
    if limit == 0 || start > to || (start == to && !inclusive) {
        return Ok(Vec::new());
    }

    locate(core, start, false)?;
    let mut out = Vec::new();
    let mut cursor: Option<K> = None;

    loop {
        let step =
            core.with_state(|s| s.scan_step((start, inclusive), to, limit, &mut cursor, &mut out))?;
        match step {
            Step::NeedForward => {
                if !extend_forward(core)? {
                    break;
                }
            },
            Step::Found(_) | Step::End | Step::NeedBack(_) => break,
        }
    }
    Ok(out)
}

pub(crate) fn revalidate_null<A, K, V>(
    core: &mut A,
    key: K,
) -> Result<Option<Entry<K, V>>, HistoryError>
where
    A: CoreAccess<K, V>,
    K: TimeKey,
    V: Clone,
{
    let fresh = core.source().load_descending_from(key, 1);
    validate_descending(&fresh, key)?;
    let fresh = fresh.into_iter().next().filter(|e| e.key() == key);
    core.with_state(|s| s.apply_revalidation(key, fresh))
}

pub(crate) fn compute_previous<S, K, V>(
    source: &S,
    key: K,
    shift: usize,
) -> Result<Option<Entry<K, V>>, HistoryError>
where
    S: HistorySource<K, V>,
    K: TimeKey,
{
    let count = shift.saturating_add(1);
    let back = source.load_descending_from(key, count);
    validate_descending(&back, key)?;
    Ok(back.into_iter().nth(shift))
}

pub(crate) fn compute_next<S, K, V>(
    source: &S,
    key: K,
    shift: usize,
) -> Result<Option<Entry<K, V>>, HistoryError>
where
    S: HistorySource<K, V>,
    K: TimeKey,
{
    if shift == 0 {
        return compute_previous(source, key, 0);
    }
    let forward = source.load_ascending_from(key, shift.saturating_add(1));
    validate_ascending(&forward, key)?;
    Ok(forward
        .into_iter()
        .filter(|e| e.key() > key)
        .nth(shift - 1))
}

// ---------------------------------------------------------------------------
// Locate and load
// ---------------------------------------------------------------------------

fn locate<A, K, V>(core: &mut A, key: K, use_hints: bool) -> Result<Located, HistoryError>
where
    A: CoreAccess<K, V>,
    K: TimeKey,
    V: Clone,
{
    if let Some(located) = core.with_state(|s| s.cached_at(key, use_hints))? {
        return Ok(located);
    }
    load_around(core, key)?;
    core.with_state(|s| s.position_of(key, use_hints))
}

fn load_around<A, K, V>(core: &mut A, key: K) -> Result<(), HistoryError>
where
    A: CoreAccess<K, V>,
    K: TimeKey,
    V: Clone,
{
    let _token = core.guard().enter(key)?;
    let count = core.with_state(|s| s.read_back())?;

    let back = core.source().load_descending_from(key, count);
    validate_descending(&back, key)?;
    let forward = core.source().load_ascending_from(key, count);
    validate_ascending(&forward, key)?;

    core.with_state(|s| s.merge_around(key, count, back, forward))
}

/// Loads `read_back` entries older than the first cached key.
fn extend_back<A, K, V>(core: &mut A) -> Result<(), HistoryError>
where
    A: CoreAccess<K, V>,
    K: TimeKey,
    V: Clone,
{
    let Some((first, count)) = core.with_state(|s| s.back_plan())? else {
        return Ok(());
    };
    let _token = core.guard().enter(first)?;

    let back = core.source().load_descending_from(first, count);
    validate_descending(&back, first)?;
    core.with_state(|s| s.merge_back(first, count, back))
}

/// Loads `read_back` entries past the covered tail. Returns `true` if the
/// last cached key moved forward.
fn extend_forward<A, K, V>(core: &mut A) -> Result<bool, HistoryError>
where
    A: CoreAccess<K, V>,
    K: TimeKey,
    V: Clone,
{
    let Some((anchor, count, before)) = core.with_state(|s| s.forward_plan())? else {
        return Ok(false);
    };
    let _token = core.guard().enter(anchor)?;

    let forward = core.source().load_ascending_from(anchor, count);
    validate_ascending(&forward, anchor)?;
    core.with_state(|s| s.merge_forward(anchor, before, forward))
}

/// Checks output of `load_descending_from(anchor, _)`.
pub(crate) fn validate_descending<K: TimeKey, V>(
    entries: &[Entry<K, V>],
    anchor: K,
) -> Result<(), HistoryError> {
    if let Some(first) = entries.first()
        && first.key() > anchor
    {
        return Err(HistoryError::data_consistency(format!(
            "descending load from {anchor:?} returned later key {:?}",
            first.key()
        )));
    }
    for pair in entries.windows(2) {
        if pair[1].key() >= pair[0].key() {
            return Err(HistoryError::data_consistency(format!(
                "descending load from {anchor:?} is not strictly descending at {:?}, {:?}",
                pair[0].key(),
                pair[1].key()
            )));
        }
    }
    Ok(())
}

/// Checks output of `load_ascending_from(anchor, _)`.
pub(crate) fn validate_ascending<K: TimeKey, V>(
    entries: &[Entry<K, V>],
    anchor: K,
) -> Result<(), HistoryError> {
    if let Some(first) = entries.first()
        && first.key() < anchor
    {
        return Err(HistoryError::data_consistency(format!(
            "ascending load from {anchor:?} returned earlier key {:?}",
            first.key()
        )));
    }
    for pair in entries.windows(2) {
        if pair[1].key() <= pair[0].key() {
            return Err(HistoryError::data_consistency(format!(
                "ascending load from {anchor:?} is not strictly ascending at {:?}, {:?}",
                pair[0].key(),
                pair[1].key()
            )));
        }
    }
    Ok(())
}
