//! Two-slot round-robin index hint table.
//!
//! Every time key can remember where it was last found by up to two query
//! cores. A hint is a [`CacheIndex`]: the window position of the key's as-of
//! entry, tagged with the core's modification counter at the time it was
//! written. A hint is only trusted while its generation still equals the
//! core's counter, so stale hints are harmless.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                          IndexSlot Layout                                   │
//! │                                                                             │
//! │   slots: [Option<(CoreId, CacheIndex)>; 2]      cursor: next victim slot    │
//! │                                                                             │
//! │   put(A, i1)   put(B, i2)   put(A, i3)   put(C, i4)                         │
//! │                                                                             │
//! │   ┌──────┬──────┐  ┌──────┬──────┐  ┌──────┬──────┐  ┌──────┬──────┐       │
//! │   │ A:i1 │  -   │  │ A:i1 │ B:i2 │  │ A:i3 │ B:i2 │  │ C:i4 │ B:i2 │       │
//! │   └──────┴──────┘  └──────┴──────┘  └──────┴──────┘  └──────┴──────┘       │
//! │     cursor=1          cursor=0        cursor=0         cursor=1            │
//! │                                     (update in place) (round-robin evict)  │
//! │                                                                             │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Operations
//!
//! | Operation | Description                               | Complexity |
//! |-----------|-------------------------------------------|------------|
//! | [`get`]   | Hint for a core identity (≤ 2 compares)   | O(1)       |
//! | [`put`]   | Update existing identity or evict by turn | O(1)       |
//!
//! [`get`]: IndexSlot::get
//! [`put`]: IndexSlot::put
//!
//! ## Thread Safety
//!
//! `IndexSlot` is not synchronized. It lives inside a
//! [`HintTable`](crate::ds::HintTable), which serializes access.
//!
//! ## Implementation Notes
//!
//! - The cursor only advances when a new identity takes a slot, so eviction is
//!   literal round-robin: the most recently validated identity is not protected
//! - No allocation; the slot is `Copy`

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CORE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a query core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoreId(u64);

impl CoreId {
    /// Allocates a fresh identity.
    pub fn next() -> Self {
        Self(NEXT_CORE_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Position hint valid for a single generation of a core.
///
/// # Example
///
/// ```
/// use histkit::ds::CacheIndex;
///
/// let index = CacheIndex::new(3, 17);
/// assert!(index.is_valid_for(3));
/// assert!(!index.is_valid_for(4));
/// assert_eq!(index.position(), 17);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheIndex {
    generation: u64,
    position: usize,
}

impl CacheIndex {
    #[inline]
    pub fn new(generation: u64, position: usize) -> Self {
        Self {
            generation,
            position,
        }
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Returns `true` if the hint was written at `generation`.
    #[inline]
    pub fn is_valid_for(&self, generation: u64) -> bool {
        self.generation == generation
    }
}

/// Fixed two-slot associative array of `CoreId → CacheIndex`.
///
/// # Example
///
/// ```
/// use histkit::ds::{CacheIndex, CoreId, IndexSlot};
///
/// let (a, b, c) = (CoreId::next(), CoreId::next(), CoreId::next());
/// let mut slot = IndexSlot::new();
///
/// slot.put(a, CacheIndex::new(1, 10));
/// slot.put(b, CacheIndex::new(1, 20));
/// assert_eq!(slot.get(a).map(|i| i.position()), Some(10));
///
/// // A third identity evicts the slot whose turn it is (a's)
/// slot.put(c, CacheIndex::new(1, 30));
/// assert_eq!(slot.get(a), None);
/// assert_eq!(slot.get(b).map(|i| i.position()), Some(20));
/// assert_eq!(slot.get(c).map(|i| i.position()), Some(30));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexSlot {
    slots: [Option<(CoreId, CacheIndex)>; 2],
    cursor: u8,
}

impl IndexSlot {
    pub const CAPACITY: usize = 2;

    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the hint stored for `id`, if any.
    #[inline]
    pub fn get(&self, id: CoreId) -> Option<CacheIndex> {
        self.slots
            .iter()
            .flatten()
            .find(|(owner, _)| *owner == id)
            .map(|(_, index)| *index)
    }

    /// Stores a hint for `id`, reusing its slot or evicting round-robin.
    pub fn put(&mut self, id: CoreId, index: CacheIndex) {
        for slot in self.slots.iter_mut().flatten() {
            if slot.0 == id {
                slot.1 = index;
                return;
            }
        }
        let victim = self.cursor as usize;
        self.slots[victim] = Some((id, index));
        self.cursor = ((victim + 1) % Self::CAPACITY) as u8;
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        assert!((self.cursor as usize) < Self::CAPACITY);
        if let [Some((a, _)), Some((b, _))] = &self.slots {
            assert_ne!(a, b, "identity cached twice");
        }
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: at most two identities are cached and the most recently
        /// written identity is always retrievable
        #[cfg_attr(miri, ignore)]
        #[test]
        fn prop_last_put_is_visible(
            ops in prop::collection::vec((0usize..4, any::<u32>()), 1..64)
        ) {
            let ids: Vec<_> = (0..4).map(|_| CoreId::next()).collect();
            let mut slot = IndexSlot::new();

            for (who, pos) in ops {
                let index = CacheIndex::new(0, pos as usize);
                slot.put(ids[who], index);
                prop_assert!(slot.len() <= IndexSlot::CAPACITY);
                prop_assert_eq!(slot.get(ids[who]), Some(index));
                slot.debug_validate_invariants();
            }
        }
    }
}
