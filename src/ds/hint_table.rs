//! Identity-keyed side table of index hints.
//!
//! Time keys are plain values, so the per-key [`IndexSlot`] lives here rather
//! than inside the key. The table is a cloneable handle: cores built with the
//! same handle contend for the same two slots per key, exactly like two query
//! cores sharing one key object.
//!
//! The table is bounded by a key capacity. Once full, inserting a hint for a
//! new key evicts the oldest key (insertion order, FIFO). Updating a key that
//! is already present does not change its age.
//!
//! ## Example Usage
//!
//! ```
//! use histkit::ds::{CacheIndex, CoreId, HintTable};
//!
//! let table: HintTable<u64> = HintTable::new(2);
//! let core = CoreId::next();
//!
//! table.put(10, core, CacheIndex::new(0, 4));
//! table.put(20, core, CacheIndex::new(0, 5));
//! assert_eq!(table.get(10, core).map(|i| i.position()), Some(4));
//!
//! // Capacity 2: the oldest key is evicted
//! table.put(30, core, CacheIndex::new(0, 6));
//! assert_eq!(table.get(10, core), None);
//! assert_eq!(table.len(), 2);
//! ```
//!
//! ## Thread Safety
//!
//! All access goes through a `parking_lot::Mutex`; the critical sections are a
//! hash lookup plus at most two slot comparisons.

use std::collections::VecDeque;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::index_slot::{CacheIndex, CoreId, IndexSlot};

/// Default number of keys retained by a [`HintTable`].
pub const DEFAULT_HINT_CAPACITY: usize = 4096;

struct HintTableInner<K> {
    slots: FxHashMap<K, IndexSlot>,
    order: VecDeque<K>,
    capacity: usize,
}

impl<K> HintTableInner<K>
where
    K: Copy + Eq + Hash,
{
    fn evict_oldest(&mut self) {
        if let Some(oldest) = self.order.pop_front() {
            self.slots.remove(&oldest);
        }
    }
}

/// Shared, bounded `key → IndexSlot` map.
pub struct HintTable<K> {
    inner: Arc<Mutex<HintTableInner<K>>>,
}

impl<K> Clone for HintTable<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K> HintTable<K>
where
    K: Copy + Eq + Hash,
{
    /// Creates a table retaining hints for up to `capacity` keys.
    ///
    /// A capacity of 0 disables hint storage; every lookup then falls back to
    /// binary search.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HintTableInner {
                slots: FxHashMap::with_capacity_and_hasher(
                    capacity.min(DEFAULT_HINT_CAPACITY),
                    Default::default(),
                ),
                order: VecDeque::new(),
                capacity,
            })),
        }
    }

    /// Returns the hint stored for `key` by `id`.
    pub fn get(&self, key: K, id: CoreId) -> Option<CacheIndex> {
        self.inner.lock().slots.get(&key)?.get(id)
    }

    /// Stores a hint for `key` on behalf of `id`.
    pub fn put(&self, key: K, id: CoreId, index: CacheIndex) {
        let mut inner = self.inner.lock();
        if inner.capacity == 0 {
            return;
        }
        if let Some(slot) = inner.slots.get_mut(&key) {
            slot.put(id, index);
            return;
        }
        if inner.slots.len() >= inner.capacity {
            inner.evict_oldest();
        }
        let mut slot = IndexSlot::new();
        slot.put(id, index);
        inner.slots.insert(key, slot);
        inner.order.push_back(key);
    }

    /// Number of keys with at least one hint.
    pub fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    /// Drops every hint.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.slots.clear();
        inner.order.clear();
    }

    /// Returns `true` if both handles refer to the same table.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        let inner = self.inner.lock();
        assert_eq!(inner.slots.len(), inner.order.len());
        assert!(inner.capacity == 0 || inner.slots.len() <= inner.capacity);
        for key in &inner.order {
            let slot = inner.slots.get(key);
            assert!(slot.is_some(), "order references a missing key");
            if let Some(slot) = slot {
                slot.debug_validate_invariants();
            }
        }
    }
}

impl<K> Default for HintTable<K>
where
    K: Copy + Eq + Hash,
{
    fn default() -> Self {
        Self::new(DEFAULT_HINT_CAPACITY)
    }
}

impl<K> fmt::Debug for HintTable<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("HintTable")
            .field("len", &inner.slots.len())
            .field("capacity", &inner.capacity)
            .finish()
    }
}
