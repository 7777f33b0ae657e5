//! In-memory history source.
//!
//! [`VecSource`] keeps a sorted `Vec` of entries behind a
//! `parking_lot::RwLock` and answers the [`HistorySource`] contract with two
//! binary searches. It is appendable, which makes it the reference
//! collaborator for tests and benches of append-only series, and it counts
//! its loads so callers can observe how often the cache fell through.
//!
//! ## Example Usage
//!
//! ```
//! use histkit::source::VecSource;
//! use histkit::traits::HistorySource;
//!
//! let source = VecSource::from_pairs([(1u64, "a"), (3, "c"), (2, "b")]);
//! source.append(4, "d").unwrap();
//!
//! let keys: Vec<_> = source
//!     .load_descending_from(3, 10)
//!     .iter()
//!     .map(|e| e.key())
//!     .collect();
//! assert_eq!(keys, vec![3, 2, 1]);
//! assert_eq!(source.load_calls(), 1);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::entry::Entry;
use crate::error::HistoryError;
use crate::traits::{HistorySource, TimeKey};

/// Sorted, appendable in-memory series.
pub struct VecSource<K, V> {
    entries: RwLock<Vec<Entry<K, V>>>,
    load_calls: AtomicU64,
    entries_served: AtomicU64,
}

impl<K, V> VecSource<K, V>
where
    K: TimeKey,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            load_calls: AtomicU64::new(0),
            entries_served: AtomicU64::new(0),
        }
    }

    /// Builds a source from entries in any order; later duplicates win.
    pub fn from_entries(entries: impl IntoIterator<Item = Entry<K, V>>) -> Self {
        let mut entries: Vec<_> = entries.into_iter().collect();
        // stable sort keeps insertion order within equal keys
        entries.sort_by_key(Entry::key);
        let mut deduped: Vec<Entry<K, V>> = Vec::with_capacity(entries.len());
        for entry in entries {
            match deduped.last_mut() {
                Some(last) if last.key() == entry.key() => *last = entry,
                _ => deduped.push(entry),
            }
        }
        Self {
            entries: RwLock::new(deduped),
            load_calls: AtomicU64::new(0),
            entries_served: AtomicU64::new(0),
        }
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        Self::from_entries(pairs.into_iter().map(|(k, v)| Entry::new(k, v)))
    }

    /// Appends a value after the current last key.
    pub fn append(&self, key: K, value: V) -> Result<(), HistoryError> {
        self.append_entry(Entry::new(key, value))
    }

    /// Appends an entry after the current last key.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::DataConsistency`] if `entry` does not follow the
    /// last key; the series is append-only.
    pub fn append_entry(&self, entry: Entry<K, V>) -> Result<(), HistoryError> {
        let mut entries = self.entries.write();
        if let Some(last) = entries.last()
            && entry.key() <= last.key()
        {
            return Err(HistoryError::data_consistency(format!(
                "appended key {:?} does not follow last key {:?}",
                entry.key(),
                last.key()
            )));
        }
        entries.push(entry);
        Ok(())
    }

    /// Replaces the value of an existing key (e.g. a null that became known).
    pub fn set_value(&self, key: K, value: Option<V>) -> bool {
        let mut entries = self.entries.write();
        match entries.binary_search_by(|e| e.key().cmp(&key)) {
            Ok(pos) => {
                entries[pos].set_value(value);
                true
            },
            Err(_) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Snapshot of every entry, ascending.
    pub fn to_vec(&self) -> Vec<Entry<K, V>> {
        self.entries.read().clone()
    }

    /// Number of `load_*` calls served so far.
    pub fn load_calls(&self) -> u64 {
        self.load_calls.load(Ordering::Relaxed)
    }

    /// Number of entries returned by `load_*` calls so far.
    pub fn entries_served(&self) -> u64 {
        self.entries_served.load(Ordering::Relaxed)
    }

    pub fn reset_counters(&self) {
        self.load_calls.store(0, Ordering::Relaxed);
        self.entries_served.store(0, Ordering::Relaxed);
    }

    fn account(&self, served: usize) {
        self.load_calls.fetch_add(1, Ordering::Relaxed);
        self.entries_served
            .fetch_add(served as u64, Ordering::Relaxed);
    }
}

impl<K, V> HistorySource<K, V> for VecSource<K, V>
where
    K: TimeKey,
    V: Clone,
{
    fn load_descending_from(&self, key: K, count: usize) -> Vec<Entry<K, V>> {
        let entries = self.entries.read();
        let end = entries.partition_point(|e| e.key() <= key);
        let out: Vec<_> = entries[..end].iter().rev().take(count).cloned().collect();
        drop(entries);
        self.account(out.len());
        out
    }

    fn load_ascending_from(&self, key: K, count: usize) -> Vec<Entry<K, V>> {
        let entries = self.entries.read();
        let start = entries.partition_point(|e| e.key() < key);
        let out: Vec<_> = entries[start..].iter().take(count).cloned().collect();
        drop(entries);
        self.account(out.len());
        out
    }
}

impl<K, V> Default for VecSource<K, V>
where
    K: TimeKey,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for VecSource<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VecSource")
            .field("len", &self.entries.read().len())
            .field("load_calls", &self.load_calls.load(Ordering::Relaxed))
            .finish()
    }
}
