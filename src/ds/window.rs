//! Ordered, position-stable entry window.
//!
//! The window is a contiguous, key-sorted run of a series held in a
//! `VecDeque`, so it can grow and shrink at both ends in O(1). Positions are
//! stable until the next structural change (insertion of a new key or
//! eviction), which is what lets a [`CacheIndex`](super::CacheIndex) stay valid
//! for a whole generation.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                          EntryWindow Layout                                 │
//! │                                                                             │
//! │   evict_front(n)                                           evict_back(n)    │
//! │        ◀──                                                       ──▶        │
//! │   ┌───────┬───────┬───────┬───────┬───────┬───────┐                         │
//! │   │ k=3   │ k=5   │ k=6   │ k=9   │ k=12  │ k=13  │                         │
//! │   └───────┴───────┴───────┴───────┴───────┴───────┘                         │
//! │      0       1       2       3       4       5      ← positions             │
//! │                                                                             │
//! │   predecessor(10) = 3   (rightmost key ≤ 10)                                │
//! │   predecessor(9)  = 3   (exact match wins)                                  │
//! │   predecessor(2)  = None                                                    │
//! │   first_at_or_after(10) = 4                                                 │
//! │                                                                             │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Operations
//!
//! | Operation             | Description                          | Complexity |
//! |-----------------------|--------------------------------------|------------|
//! | [`predecessor`]       | As-of position by binary search      | O(log n)   |
//! | [`first_at_or_after`] | Range start position                 | O(log n)   |
//! | [`insert`]            | Sorted insert with duplicate policy  | O(n) worst |
//! | [`evict_front`]       | Drop oldest keys                     | O(k)       |
//! | [`evict_back`]        | Drop newest keys                     | O(k)       |
//!
//! Inserting at either end, the common case when a window is extended, is
//! O(1).
//!
//! [`predecessor`]: EntryWindow::predecessor
//! [`first_at_or_after`]: EntryWindow::first_at_or_after
//! [`insert`]: EntryWindow::insert
//! [`evict_front`]: EntryWindow::evict_front
//! [`evict_back`]: EntryWindow::evict_back

use std::collections::VecDeque;
use std::collections::vec_deque;

use crate::entry::Entry;

/// How a window treats an incoming entry whose key is already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateKeyPolicy {
    /// Last write wins: the stored value is replaced.
    #[default]
    Replace,
    /// The stored entry is kept and the incoming one is rejected.
    KeepExisting,
}

/// Result of [`EntryWindow::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new key was inserted at this position.
    Inserted(usize),
    /// The key existed; its value was replaced.
    Replaced(usize),
    /// The key existed; the incoming entry was dropped.
    Rejected(usize),
}

impl InsertOutcome {
    /// Returns `true` if the window changed structurally.
    #[inline]
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}

/// Sorted, de-duplicated run of entries.
///
/// # Example
///
/// ```
/// use histkit::ds::{DuplicateKeyPolicy, EntryWindow};
/// use histkit::entry::Entry;
///
/// let mut window = EntryWindow::new();
/// for k in [5u64, 1, 3] {
///     window.insert(Entry::new(k, k * 10), DuplicateKeyPolicy::Replace);
/// }
///
/// assert_eq!(window.first_key(), Some(1));
/// assert_eq!(window.last_key(), Some(5));
/// assert_eq!(window.predecessor(4), Some(1)); // position of key 3
/// assert_eq!(window.predecessor(0), None);
/// ```
#[derive(Debug, Clone)]
pub struct EntryWindow<K, V> {
    entries: VecDeque<Entry<K, V>>,
}

impl<K, V> EntryWindow<K, V>
where
    K: Copy + Ord,
{
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn get(&self, position: usize) -> Option<&Entry<K, V>> {
        self.entries.get(position)
    }

    #[inline]
    pub fn key_at(&self, position: usize) -> Option<K> {
        self.entries.get(position).map(Entry::key)
    }

    #[inline]
    pub fn first_key(&self) -> Option<K> {
        self.entries.front().map(Entry::key)
    }

    #[inline]
    pub fn last_key(&self) -> Option<K> {
        self.entries.back().map(Entry::key)
    }

    /// Position of the greatest key ≤ `key`.
    pub fn predecessor(&self, key: K) -> Option<usize> {
        match self.entries.binary_search_by(|e| e.key().cmp(&key)) {
            Ok(pos) => Some(pos),
            Err(0) => None,
            Err(pos) => Some(pos - 1),
        }
    }

    /// Position of the smallest key ≥ `key` (may equal `len()`).
    pub fn first_at_or_after(&self, key: K) -> usize {
        self.entries.partition_point(|e| e.key() < key)
    }

    /// Position of the smallest key > `key` (may equal `len()`).
    pub fn first_after(&self, key: K) -> usize {
        self.entries.partition_point(|e| e.key() <= key)
    }

    /// Inserts `entry` in key order.
    pub fn insert(&mut self, entry: Entry<K, V>, policy: DuplicateKeyPolicy) -> InsertOutcome {
        let key = entry.key();
        match self.last_key() {
            None => {
                self.entries.push_back(entry);
                return InsertOutcome::Inserted(0);
            },
            Some(last) if key > last => {
                self.entries.push_back(entry);
                return InsertOutcome::Inserted(self.entries.len() - 1);
            },
            _ => {},
        }
        if self.first_key().is_some_and(|first| key < first) {
            self.entries.push_front(entry);
            return InsertOutcome::Inserted(0);
        }
        match self.entries.binary_search_by(|e| e.key().cmp(&key)) {
            Ok(pos) => match policy {
                DuplicateKeyPolicy::Replace => {
                    self.entries[pos] = entry;
                    InsertOutcome::Replaced(pos)
                },
                DuplicateKeyPolicy::KeepExisting => InsertOutcome::Rejected(pos),
            },
            Err(pos) => {
                self.entries.insert(pos, entry);
                InsertOutcome::Inserted(pos)
            },
        }
    }

    /// Replaces the value stored at `position`. Not a structural change.
    pub fn replace_value(&mut self, position: usize, value: Option<V>) -> bool {
        match self.entries.get_mut(position) {
            Some(entry) => {
                entry.set_value(value);
                true
            },
            None => false,
        }
    }

    /// Removes up to `count` entries from the front; returns how many.
    pub fn evict_front(&mut self, count: usize) -> usize {
        let n = count.min(self.entries.len());
        self.entries.drain(..n);
        n
    }

    /// Removes up to `count` entries from the back; returns how many.
    pub fn evict_back(&mut self, count: usize) -> usize {
        let n = count.min(self.entries.len());
        self.entries.truncate(self.entries.len() - n);
        n
    }

    /// Removes everything; returns how many entries were dropped.
    pub fn clear(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        n
    }

    pub fn iter(&self) -> vec_deque::Iter<'_, Entry<K, V>> {
        self.entries.iter()
    }

    /// Returns `true` if keys are strictly increasing.
    pub fn is_sorted_strict(&self) -> bool {
        self.entries
            .iter()
            .zip(self.entries.iter().skip(1))
            .all(|(a, b)| a.key() < b.key())
    }
}

impl<K, V> Default for EntryWindow<K, V>
where
    K: Copy + Ord,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, K, V> IntoIterator for &'a EntryWindow<K, V>
where
    K: Copy + Ord,
{
    type Item = &'a Entry<K, V>;
    type IntoIter = vec_deque::Iter<'a, Entry<K, V>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window_of(keys: &[u64]) -> EntryWindow<u64, u64> {
        let mut w = EntryWindow::new();
        for &k in keys {
            w.insert(Entry::new(k, k), DuplicateKeyPolicy::Replace);
        }
        w
    }

    #[test]
    fn predecessor_prefers_exact_match() {
        let w = window_of(&[3, 5, 6, 9, 12, 13]);
        assert_eq!(w.predecessor(9), Some(3));
        assert_eq!(w.predecessor(10), Some(3));
        assert_eq!(w.predecessor(3), Some(0));
        assert_eq!(w.predecessor(2), None);
        assert_eq!(w.predecessor(100), Some(5));
    }

    #[test]
    fn range_positions() {
        let w = window_of(&[3, 5, 6, 9]);
        assert_eq!(w.first_at_or_after(5), 1);
        assert_eq!(w.first_after(5), 2);
        assert_eq!(w.first_at_or_after(7), 3);
        assert_eq!(w.first_at_or_after(10), 4);
        assert_eq!(w.first_at_or_after(0), 0);
    }

    #[test]
    fn insert_keeps_order_from_any_side() {
        let w = window_of(&[10, 2, 30, 20, 1]);
        let keys: Vec<_> = w.iter().map(Entry::key).collect();
        assert_eq!(keys, vec![1, 2, 10, 20, 30]);
        assert!(w.is_sorted_strict());
    }

    #[test]
    fn duplicate_policy_replace_and_keep() {
        let mut w = window_of(&[1, 2, 3]);
        let out = w.insert(Entry::new(2, 99), DuplicateKeyPolicy::Replace);
        assert_eq!(out, InsertOutcome::Replaced(1));
        assert!(!out.is_structural());
        assert_eq!(w.get(1).and_then(Entry::value), Some(&99));

        let out = w.insert(Entry::new(2, 7), DuplicateKeyPolicy::KeepExisting);
        assert_eq!(out, InsertOutcome::Rejected(1));
        assert_eq!(w.get(1).and_then(Entry::value), Some(&99));
        assert_eq!(w.len(), 3);
    }

    #[test]
    fn duplicate_at_the_tail_is_not_appended() {
        let mut w = window_of(&[1, 2, 3]);
        let out = w.insert(Entry::new(3, 42), DuplicateKeyPolicy::Replace);
        assert_eq!(out, InsertOutcome::Replaced(2));
        assert_eq!(w.len(), 3);
    }

    #[test]
    fn eviction_from_both_ends() {
        let mut w = window_of(&[1, 2, 3, 4, 5]);
        assert_eq!(w.evict_front(2), 2);
        assert_eq!(w.first_key(), Some(3));
        assert_eq!(w.evict_back(1), 1);
        assert_eq!(w.last_key(), Some(4));
        assert_eq!(w.evict_back(10), 2);
        assert!(w.is_empty());
        assert_eq!(w.clear(), 0);
    }

    #[test]
    fn replace_value_out_of_range() {
        let mut w = window_of(&[1]);
        assert!(w.replace_value(0, None));
        assert!(w.get(0).is_some_and(Entry::is_null));
        assert!(!w.replace_value(1, Some(1)));
    }
}
