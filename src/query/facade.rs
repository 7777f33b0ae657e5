//! Query facade.
//!
//! [`HistoryQuery`] borrows a core handle and layers the caller-facing
//! options on top of it: an element filter, future mode, duplicate padding of
//! entry lists and null revalidation. It is cheap to build per call site.
//!
//! ## Modes
//!
//! | Option                        | Default | Effect                                   |
//! |-------------------------------|---------|------------------------------------------|
//! | `with_element_filter`         | none    | rejected entries are skipped by walks    |
//! | `with_future`                 | off     | enables `get_next_*`                     |
//! | `with_future_null`            | off     | like `with_future`; as-of past the last  |
//! |                               |         | entry is "not yet known" (`None`)        |
//! | `with_filter_duplicate_keys`  | `true`  | entry lists are not padded with repeats  |
//! | `with_remember_null_value`    | `false` | `false`: null as-of values are re-read   |
//!
//! A recursive-load signal from the core turns into "no value" for that call
//! only. Usage and data-consistency errors propagate.
//!
//! ## Example Usage
//!
//! ```
//! use histkit::builder::QueryCoreBuilder;
//! use histkit::source::VecSource;
//! use histkit::traits::CoreHandle;
//!
//! let source = VecSource::from_pairs((1..=10u64).map(|k| (k, k * 10)));
//! let mut core = QueryCoreBuilder::new().build(source);
//!
//! let mut query = core.query();
//! assert_eq!(query.get_previous_value(7, 2).unwrap(), Some(50));
//!
//! let values: Vec<u64> = query.get_values(3, 6).map(Result::unwrap).collect();
//! assert_eq!(values, vec![30, 40, 50, 60]);
//!
//! // Next-queries need future mode
//! assert!(query.get_next_value(7, 1).is_err());
//! let mut query = query.with_future().unwrap();
//! assert_eq!(query.get_next_value(7, 1).unwrap(), Some(80));
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Bound;

use crate::entry::Entry;
use crate::error::HistoryError;
use crate::traits::{CoreHandle, EntryFilter, TimeKey};

/// Default number of entries fetched per range chunk.
pub const DEFAULT_RANGE_CHUNK: usize = 64;

/// Whether next-queries are allowed and how the open end is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FutureMode {
    #[default]
    Disabled,
    Enabled,
    /// Enabled; as-of queries past the last entry return `None`.
    Null,
}

impl FutureMode {
    #[inline]
    pub fn allows_next(self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

/// Caller-facing query view over a core handle.
///
/// `'a` borrows the core and `'f` bounds the element filter. They are kept
/// apart so dropping a query never extends the core borrow.
pub struct HistoryQuery<'a, 'f, C, K, V> {
    core: &'a mut C,
    filter: Option<Box<EntryFilter<'f, K, V>>>,
    future: FutureMode,
    filter_duplicate_keys: bool,
    remember_null_value: bool,
    range_chunk: usize,
    _marker: PhantomData<fn() -> (K, V)>,
}

fn absorb<T>(result: Result<Option<T>, HistoryError>) -> Result<Option<T>, HistoryError> {
    match result {
        Err(HistoryError::RecursiveLoad(_)) => Ok(None),
        other => other,
    }
}

impl<'a, 'f, C, K, V> HistoryQuery<'a, 'f, C, K, V>
where
    C: CoreHandle<K, V>,
    K: TimeKey,
    V: Clone,
{
    pub fn new(core: &'a mut C) -> Self {
        Self {
            core,
            filter: None,
            future: FutureMode::Disabled,
            filter_duplicate_keys: true,
            remember_null_value: false,
            range_chunk: DEFAULT_RANGE_CHUNK,
            _marker: PhantomData,
        }
    }

    /// Skips entries rejected by `filter` in every walk and range.
    pub fn with_element_filter(mut self, filter: impl FnMut(&Entry<K, V>) -> bool + 'f) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Enables next-queries.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Usage`] if future-null mode is already on.
    pub fn with_future(mut self) -> Result<Self, HistoryError> {
        if self.future == FutureMode::Null {
            return Err(HistoryError::usage(
                "with_future and with_future_null are mutually exclusive",
            ));
        }
        self.future = FutureMode::Enabled;
        Ok(self)
    }

    /// Enables next-queries and treats keys past the last entry as not yet
    /// known.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Usage`] if plain future mode is already on.
    pub fn with_future_null(mut self) -> Result<Self, HistoryError> {
        if self.future == FutureMode::Enabled {
            return Err(HistoryError::usage(
                "with_future and with_future_null are mutually exclusive",
            ));
        }
        self.future = FutureMode::Null;
        Ok(self)
    }

    pub fn with_filter_duplicate_keys(mut self, filter_duplicate_keys: bool) -> Self {
        self.filter_duplicate_keys = filter_duplicate_keys;
        self
    }

    pub fn with_remember_null_value(mut self, remember_null_value: bool) -> Self {
        self.remember_null_value = remember_null_value;
        self
    }

    /// Number of entries fetched per range chunk (at least one).
    pub fn with_range_chunk(mut self, chunk: usize) -> Self {
        self.range_chunk = chunk.max(1);
        self
    }

    #[inline]
    pub fn future_mode(&self) -> FutureMode {
        self.future
    }

    #[inline]
    pub fn filters_duplicate_keys(&self) -> bool {
        self.filter_duplicate_keys
    }

    #[inline]
    pub fn remembers_null_value(&self) -> bool {
        self.remember_null_value
    }

    // -----------------------------------------------------------------------
    // As-of
    // -----------------------------------------------------------------------

    /// Entry with the greatest key ≤ `key` that the filter accepts.
    pub fn get_entry(&mut self, key: K) -> Result<Option<Entry<K, V>>, HistoryError> {
        let Some(found) = absorb(self.previous_raw(key, 0))? else {
            return Ok(None);
        };
        if self.future == FutureMode::Null
            && found.key() < key
            && absorb(self.core.next_matching(key, 1, &mut |_| true))?.is_none()
        {
            return Ok(None);
        }
        self.resolve_null(found).map(Some)
    }

    pub fn get_value(&mut self, key: K) -> Result<Option<V>, HistoryError> {
        Ok(self.get_entry(key)?.and_then(Entry::into_value))
    }

    pub fn get_key(&mut self, key: K) -> Result<Option<K>, HistoryError> {
        Ok(self.get_entry(key)?.map(|e| e.key()))
    }

    // -----------------------------------------------------------------------
    // Previous
    // -----------------------------------------------------------------------

    /// The `n`-th accepted entry before the as-of entry (`n = 0`: as-of).
    pub fn get_previous_entry(
        &mut self,
        key: K,
        n: usize,
    ) -> Result<Option<Entry<K, V>>, HistoryError> {
        if n == 0 {
            return self.get_entry(key);
        }
        match absorb(self.previous_raw(key, n))? {
            Some(entry) => self.resolve_null(entry).map(Some),
            None => Ok(None),
        }
    }

    pub fn get_previous_value(&mut self, key: K, n: usize) -> Result<Option<V>, HistoryError> {
        Ok(self.get_previous_entry(key, n)?.and_then(Entry::into_value))
    }

    pub fn get_previous_key(&mut self, key: K, n: usize) -> Result<Option<K>, HistoryError> {
        Ok(self.get_previous_entry(key, n)?.map(|e| e.key()))
    }

    /// Up to `n` consecutive accepted entries ending at the as-of entry,
    /// ascending. Padded to `n` with the oldest entry when history runs out
    /// and duplicate filtering is off.
    pub fn get_previous_entries(
        &mut self,
        key: K,
        n: usize,
    ) -> Result<Vec<Entry<K, V>>, HistoryError> {
        let mut out = Vec::with_capacity(n);
        if n == 0 {
            return Ok(out);
        }
        let Some(mut current) = self.get_entry(key)? else {
            return Ok(out);
        };
        out.push(current.clone());
        while out.len() < n {
            match absorb(self.previous_raw(current.key(), 1))? {
                Some(entry) => {
                    current = self.resolve_null(entry)?;
                    out.push(current.clone());
                },
                None => {
                    if !self.filter_duplicate_keys {
                        out.resize(n, current.clone());
                    }
                    break;
                },
            }
        }
        out.reverse();
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Next
    // -----------------------------------------------------------------------

    /// The `n`-th accepted entry after the as-of position (`n = 0`: as-of).
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Usage`] unless future mode is on.
    pub fn get_next_entry(&mut self, key: K, n: usize) -> Result<Option<Entry<K, V>>, HistoryError> {
        self.require_future()?;
        if n == 0 {
            return self.get_entry(key);
        }
        match absorb(self.next_raw(key, n))? {
            Some(entry) => self.resolve_null(entry).map(Some),
            None => Ok(None),
        }
    }

    pub fn get_next_value(&mut self, key: K, n: usize) -> Result<Option<V>, HistoryError> {
        Ok(self.get_next_entry(key, n)?.and_then(Entry::into_value))
    }

    pub fn get_next_key(&mut self, key: K, n: usize) -> Result<Option<K>, HistoryError> {
        Ok(self.get_next_entry(key, n)?.map(|e| e.key()))
    }

    /// Up to `n` consecutive accepted entries after the as-of position,
    /// ascending. Padded to `n` with the newest entry when history runs out
    /// and duplicate filtering is off.
    pub fn get_next_entries(&mut self, key: K, n: usize) -> Result<Vec<Entry<K, V>>, HistoryError> {
        self.require_future()?;
        let mut out = Vec::with_capacity(n);
        if n == 0 {
            return Ok(out);
        }
        let Some(first) = absorb(self.next_raw(key, 1))? else {
            return Ok(out);
        };
        let mut current = self.resolve_null(first)?;
        out.push(current.clone());
        while out.len() < n {
            match absorb(self.next_raw(current.key(), 1))? {
                Some(entry) => {
                    current = self.resolve_null(entry)?;
                    out.push(current.clone());
                },
                None => {
                    if !self.filter_duplicate_keys {
                        out.resize(n, current.clone());
                    }
                    break;
                },
            }
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Ranges
    // -----------------------------------------------------------------------

    /// Accepted entries with `from ≤ key ≤ to`, ascending, fetched lazily.
    pub fn get_entries(&mut self, from: K, to: K) -> HistoryRange<'_, 'a, 'f, C, K, V> {
        HistoryRange {
            next_from: Bound::Included(from),
            to,
            buffer: VecDeque::new(),
            exhausted: false,
            query: self,
        }
    }

    /// Non-null values of [`get_entries`](Self::get_entries).
    pub fn get_values(&mut self, from: K, to: K) -> HistoryValues<'_, 'a, 'f, C, K, V> {
        HistoryValues {
            entries: self.get_entries(from, to),
        }
    }

    // -----------------------------------------------------------------------
    // Uncached
    // -----------------------------------------------------------------------

    /// As-of entry read straight from the source; filters are not applied.
    pub fn compute_entry(&self, key: K) -> Result<Option<Entry<K, V>>, HistoryError> {
        self.core.compute_as_of(key)
    }

    pub fn compute_value(&self, key: K) -> Result<Option<V>, HistoryError> {
        Ok(self.compute_entry(key)?.and_then(Entry::into_value))
    }

    pub fn compute_previous_entry(
        &self,
        key: K,
        n: usize,
    ) -> Result<Option<Entry<K, V>>, HistoryError> {
        self.core.compute_previous(key, n)
    }

    pub fn compute_previous_value(&self, key: K, n: usize) -> Result<Option<V>, HistoryError> {
        Ok(self.compute_previous_entry(key, n)?.and_then(Entry::into_value))
    }

    pub fn compute_next_entry(&self, key: K, n: usize) -> Result<Option<Entry<K, V>>, HistoryError> {
        self.require_future()?;
        self.core.compute_next(key, n)
    }

    pub fn compute_next_value(&self, key: K, n: usize) -> Result<Option<V>, HistoryError> {
        Ok(self.compute_next_entry(key, n)?.and_then(Entry::into_value))
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn require_future(&self) -> Result<(), HistoryError> {
        if self.future.allows_next() {
            Ok(())
        } else {
            Err(HistoryError::usage(
                "next-queries require with_future or with_future_null",
            ))
        }
    }

    fn previous_raw(&mut self, key: K, n: usize) -> Result<Option<Entry<K, V>>, HistoryError> {
        let mut accept_all = |_: &Entry<K, V>| true;
        let filter: &mut EntryFilter<'_, K, V> = match self.filter.as_mut() {
            Some(f) => &mut **f,
            None => &mut accept_all,
        };
        self.core.previous_matching(key, n, filter)
    }

    fn next_raw(&mut self, key: K, n: usize) -> Result<Option<Entry<K, V>>, HistoryError> {
        let mut accept_all = |_: &Entry<K, V>| true;
        let filter: &mut EntryFilter<'_, K, V> = match self.filter.as_mut() {
            Some(f) => &mut **f,
            None => &mut accept_all,
        };
        self.core.next_matching(key, n, filter)
    }

    fn accepts(&mut self, entry: &Entry<K, V>) -> bool {
        match self.filter.as_mut() {
            Some(f) => f(entry),
            None => true,
        }
    }

    /// Re-reads a null entry unless known nulls are remembered.
    fn resolve_null(&mut self, entry: Entry<K, V>) -> Result<Entry<K, V>, HistoryError> {
        if !entry.is_null() || self.remember_null_value {
            return Ok(entry);
        }
        match absorb(self.core.revalidate_null(entry.key()))? {
            Some(fresh) => Ok(fresh),
            None => Ok(entry),
        }
    }
}

impl<C, K, V> fmt::Debug for HistoryQuery<'_, '_, C, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoryQuery")
            .field("filtered", &self.filter.is_some())
            .field("future", &self.future)
            .field("filter_duplicate_keys", &self.filter_duplicate_keys)
            .field("remember_null_value", &self.remember_null_value)
            .finish()
    }
}

/// Lazy ascending range over a [`HistoryQuery`].
///
/// Entries are fetched in chunks; a fetched chunk is a stable snapshot even
/// if the core evicts it afterwards. Dropping the iterator early needs no
/// cleanup. A recursive-load signal ends the range.
pub struct HistoryRange<'q, 'a, 'f, C, K, V> {
    query: &'q mut HistoryQuery<'a, 'f, C, K, V>,
    next_from: Bound<K>,
    to: K,
    buffer: VecDeque<Entry<K, V>>,
    exhausted: bool,
}

impl<C, K, V> Iterator for HistoryRange<'_, '_, '_, C, K, V>
where
    C: CoreHandle<K, V>,
    K: TimeKey,
    V: Clone,
{
    type Item = Result<Entry<K, V>, HistoryError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.buffer.pop_front() {
                if self.query.accepts(&entry) {
                    return Some(Ok(entry));
                }
                continue;
            }
            if self.exhausted {
                return None;
            }

            let chunk = self.query.range_chunk;
            match self.query.core.scan(self.next_from, self.to, chunk) {
                Ok(entries) => {
                    match entries.last() {
                        Some(last) if entries.len() >= chunk => {
                            self.next_from = Bound::Excluded(last.key());
                        },
                        _ => self.exhausted = true,
                    }
                    self.buffer.extend(entries);
                },
                Err(HistoryError::RecursiveLoad(_)) => {
                    self.exhausted = true;
                    return None;
                },
                Err(err) => {
                    self.exhausted = true;
                    return Some(Err(err));
                },
            }
        }
    }
}

/// Non-null values of a [`HistoryRange`].
pub struct HistoryValues<'q, 'a, 'f, C, K, V> {
    entries: HistoryRange<'q, 'a, 'f, C, K, V>,
}

impl<C, K, V> Iterator for HistoryValues<'_, '_, '_, C, K, V>
where
    C: CoreHandle<K, V>,
    K: TimeKey,
    V: Clone,
{
    type Item = Result<V, HistoryError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.entries.next()? {
                Ok(entry) => {
                    if let Some(value) = entry.into_value() {
                        return Some(Ok(value));
                    }
                },
                Err(err) => return Some(Err(err)),
            }
        }
    }
}
