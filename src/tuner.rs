//! Gap/miss auto-tuner.
//!
//! Watches the misses of a query core. A run of two or more consecutive misses
//! that move monotonically in one direction (a scan that keeps falling off the
//! window) grows the core's parameters:
//!
//! - read-back = read-back at run start × run length × 2
//! - max size  = entries read across the worst run × 2
//!
//! Each parameter only changes when the proposal is strictly larger, is clamped
//! by [`TunerLimits`], and never decreases. `max_size` is also kept at least
//! twice the read-back, so a fresh load never evicts the entries it was asked
//! for. That floor holds as long as `limits.max_size` is at least twice
//! `limits.max_read_back`, which
//! [`QueryCoreBuilder`](crate::builder::QueryCoreBuilder) enforces. A hit ends
//! the current run.
//!
//! Tuning only affects throughput; disabling it never changes query results.

use std::cmp::Ordering;

/// Upper bounds for tuned parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunerLimits {
    pub max_read_back: usize,
    pub max_size: usize,
}

impl Default for TunerLimits {
    fn default() -> Self {
        Self {
            max_read_back: 4096,
            max_size: 65536,
        }
    }
}

/// Direction of a miss run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Parameters after a growth step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Growth {
    pub read_back: usize,
    pub max_size: usize,
    pub successive_misses: usize,
}

/// Miss-run state plus the current (tuned) parameters.
#[derive(Debug, Clone)]
pub struct GapMissTuner<K> {
    enabled: bool,
    limits: TunerLimits,
    current_read_back: usize,
    current_max_size: usize,

    successive_misses: usize,
    direction: Option<Direction>,
    last_miss: Option<K>,
    window_min_seen: Option<K>,
    window_max_seen: Option<K>,
    run_entries_read: usize,
    run_base_read_back: usize,
}

impl<K> GapMissTuner<K>
where
    K: Copy + Ord,
{
    pub fn new(read_back: usize, max_size: usize, limits: TunerLimits, enabled: bool) -> Self {
        Self {
            enabled,
            limits,
            current_read_back: read_back,
            current_max_size: max_size,
            successive_misses: 0,
            direction: None,
            last_miss: None,
            window_min_seen: None,
            window_max_seen: None,
            run_entries_read: 0,
            run_base_read_back: read_back,
        }
    }

    #[inline]
    pub fn read_back(&self) -> usize {
        self.current_read_back
    }

    #[inline]
    pub fn max_size(&self) -> usize {
        self.current_max_size
    }

    #[inline]
    pub fn successive_misses(&self) -> usize {
        self.successive_misses
    }

    #[inline]
    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    /// Smallest and largest miss keys of the current run.
    pub fn seen_range(&self) -> Option<(K, K)> {
        Some((self.window_min_seen?, self.window_max_seen?))
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// A lookup was served from the window; ends a miss run.
    pub fn record_hit(&mut self) {
        if self.successive_misses > 0 {
            self.reset_run();
        }
    }

    /// A lookup at `key` loaded `entries_read` entries from the source.
    ///
    /// Returns the new parameters when they grew.
    pub fn record_miss(&mut self, key: K, entries_read: usize) -> Option<Growth> {
        let step = self.last_miss.map(|last| key.cmp(&last));
        let continues = match (step, self.direction) {
            (None, _) => false,
            (Some(Ordering::Equal), _) => true,
            (Some(_), None) => true,
            (Some(Ordering::Greater), Some(Direction::Forward)) => true,
            (Some(Ordering::Less), Some(Direction::Backward)) => true,
            _ => false,
        };

        if continues {
            self.successive_misses += 1;
            match step {
                Some(Ordering::Greater) => self.direction = Some(Direction::Forward),
                Some(Ordering::Less) => self.direction = Some(Direction::Backward),
                _ => {},
            }
            self.run_entries_read += entries_read;
            self.window_min_seen = self.window_min_seen.map(|m| m.min(key)).or(Some(key));
            self.window_max_seen = self.window_max_seen.map(|m| m.max(key)).or(Some(key));
        } else {
            self.reset_run();
            self.successive_misses = 1;
            self.run_entries_read = entries_read;
            self.window_min_seen = Some(key);
            self.window_max_seen = Some(key);
        }
        self.last_miss = Some(key);

        if !self.enabled || self.successive_misses < 2 {
            return None;
        }
        self.grow()
    }

    fn grow(&mut self) -> Option<Growth> {
        let mut grew = false;

        let proposed_read_back = self
            .run_base_read_back
            .saturating_mul(self.successive_misses)
            .saturating_mul(2)
            .min(self.limits.max_read_back);
        if proposed_read_back > self.current_read_back {
            self.current_read_back = proposed_read_back;
            grew = true;
        }

        let proposed_max_size = self
            .run_entries_read
            .saturating_mul(2)
            .max(self.current_read_back.saturating_mul(2))
            .min(self.limits.max_size);
        if proposed_max_size > self.current_max_size {
            self.current_max_size = proposed_max_size;
            grew = true;
        }

        grew.then_some(Growth {
            read_back: self.current_read_back,
            max_size: self.current_max_size,
            successive_misses: self.successive_misses,
        })
    }

    fn reset_run(&mut self) {
        self.successive_misses = 0;
        self.direction = None;
        self.last_miss = None;
        self.window_min_seen = None;
        self.window_max_seen = None;
        self.run_entries_read = 0;
        self.run_base_read_back = self.current_read_back;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuner() -> GapMissTuner<u64> {
        GapMissTuner::new(4, 16, TunerLimits::default(), true)
    }

    #[test]
    fn single_miss_does_not_grow() {
        let mut t = tuner();
        assert_eq!(t.record_miss(10, 8), None);
        assert_eq!(t.successive_misses(), 1);
        assert_eq!((t.read_back(), t.max_size()), (4, 16));
    }

    #[test]
    fn forward_run_grows_both_parameters() {
        let mut t = tuner();
        t.record_miss(10, 8);
        let growth = t.record_miss(20, 8).unwrap();
        // 4 * 2 * 2
        assert_eq!(growth.read_back, 16);
        // max(16 * 2, 16 * 2)
        assert_eq!(growth.max_size, 32);
        assert_eq!(t.direction(), Some(Direction::Forward));
        assert_eq!(t.seen_range(), Some((10, 20)));

        let growth = t.record_miss(30, 20).unwrap();
        // base read-back stays at the run start value: 4 * 3 * 2
        assert_eq!(growth.read_back, 24);
        assert_eq!(growth.max_size, 72);
    }

    #[test]
    fn hit_resets_the_run() {
        let mut t = tuner();
        t.record_miss(10, 8);
        t.record_hit();
        assert_eq!(t.successive_misses(), 0);
        assert_eq!(t.record_miss(20, 8), None);
    }

    #[test]
    fn direction_change_starts_a_new_run() {
        let mut t = tuner();
        t.record_miss(10, 8);
        t.record_miss(5, 8);
        assert_eq!(t.direction(), Some(Direction::Backward));
        t.record_miss(7, 8);
        assert_eq!(t.successive_misses(), 1);
        assert_eq!(t.direction(), None);
    }

    #[test]
    fn limits_clamp_growth() {
        let limits = TunerLimits {
            max_read_back: 6,
            max_size: 20,
        };
        let mut t = GapMissTuner::new(4, 16, limits, true);
        t.record_miss(1u64, 100);
        let growth = t.record_miss(2, 100).unwrap();
        assert_eq!(growth.read_back, 6);
        assert_eq!(growth.max_size, 20);
        assert_eq!(t.record_miss(3, 100), None);
    }

    #[test]
    fn disabled_tuner_never_grows() {
        let mut t = GapMissTuner::new(4, 16, TunerLimits::default(), false);
        assert!(!t.is_enabled());
        for k in 0..10u64 {
            assert_eq!(t.record_miss(k, 50), None);
        }
        assert_eq!((t.read_back(), t.max_size()), (4, 16));
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: parameters never decrease and max_size ≥ 2 × read_back
        /// once any growth happened
        #[cfg_attr(miri, ignore)]
        #[test]
        fn prop_parameters_are_monotonic(
            events in prop::collection::vec(
                prop_oneof![
                    Just(None),
                    (0u64..1000, 0usize..200).prop_map(Some),
                ],
                0..100
            )
        ) {
            let mut t: GapMissTuner<u64> = GapMissTuner::new(8, 32, TunerLimits::default(), true);
            let mut prev = (t.read_back(), t.max_size());

            for event in events {
                match event {
                    None => t.record_hit(),
                    Some((key, read)) => {
                        if t.record_miss(key, read).is_some() {
                            prop_assert!(t.max_size() >= t.read_back() * 2
                                || t.max_size() == TunerLimits::default().max_size);
                        }
                    },
                }
                let now = (t.read_back(), t.max_size());
                prop_assert!(now.0 >= prev.0);
                prop_assert!(now.1 >= prev.1);
                prev = now;
            }
        }
    }
}
