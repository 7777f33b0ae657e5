// ==============================================
// QUERY SEMANTICS (integration)
// ==============================================
//
// End-to-end checks of the facade against an uncached reference: as-of,
// previous/next walks, inclusive ranges and index hints shared between
// cores. These span the core, the facade and the hint table.

use std::sync::Arc;

use histkit::builder::QueryCoreBuilder;
use histkit::ds::HintTable;
use histkit::entry::Entry;
use histkit::error::HistoryError;
use histkit::query::QueryCore;
use histkit::source::VecSource;
use histkit::traits::CoreHandle;
use proptest::prelude::*;

type Source = Arc<VecSource<u64, u64>>;
type Core = QueryCore<u64, u64, Source>;

fn small_core(keys: &[u64]) -> (Source, Core) {
    let source = Arc::new(VecSource::from_pairs(keys.iter().map(|&k| (k, k * 10))));
    let core = QueryCoreBuilder::new()
        .read_back(2)
        .max_size(6)
        .tuner_limits(4, 12)
        .build(Arc::clone(&source));
    (source, core)
}

// Reference answers computed directly on the sorted key list.
fn ref_as_of(keys: &[u64], key: u64) -> Option<usize> {
    keys.iter().rposition(|&k| k <= key)
}

fn ref_previous(keys: &[u64], key: u64, n: usize) -> Option<u64> {
    let pos = ref_as_of(keys, key)?;
    pos.checked_sub(n).map(|p| keys[p])
}

fn ref_next(keys: &[u64], key: u64, n: usize) -> Option<u64> {
    match ref_as_of(keys, key) {
        Some(pos) => keys.get(pos + n).copied(),
        None if n == 0 => None,
        None => keys.get(n - 1).copied(),
    }
}

// ==============================================
// Series 1..10
// ==============================================

mod one_to_ten {
    use super::*;

    fn one_to_ten() -> (Source, Core) {
        small_core(&(1..=10).collect::<Vec<_>>())
    }

    #[test]
    fn previous_value_two_back_from_seven() {
        let (_, mut core) = one_to_ten();
        assert_eq!(core.query().get_previous_value(7, 2).unwrap(), Some(50));
    }

    #[test]
    fn values_three_to_six_are_inclusive_and_ascending() {
        let (_, mut core) = one_to_ten();
        let mut q = core.query();
        let values: Vec<u64> = q.get_values(3, 6).collect::<Result<_, _>>().unwrap();
        assert_eq!(values, vec![30, 40, 50, 60]);
    }

    #[test]
    fn next_value_without_future_fails_fast() {
        let (source, mut core) = one_to_ten();
        source.reset_counters();
        let mut q = core.query();
        assert!(matches!(q.get_next_value(7, 1), Err(HistoryError::Usage(_))));
        assert_eq!(source.load_calls(), 0);
    }

    #[test]
    fn before_first_entry_is_none_everywhere() {
        let (_, mut core) = one_to_ten();
        let mut q = core.query().with_future().unwrap();
        assert_eq!(q.get_entry(0).unwrap(), None);
        assert_eq!(q.get_previous_key(0, 1).unwrap(), None);
        assert_eq!(q.get_next_key(0, 1).unwrap(), Some(1));
        assert_eq!(q.get_entries(0, 0).count(), 0);
    }

    #[test]
    fn range_with_from_after_to_is_empty() {
        let (_, mut core) = one_to_ten();
        assert_eq!(core.query().get_entries(6, 3).count(), 0);
    }
}

// ==============================================
// Nulls
// ==============================================

#[test]
fn null_entries_show_in_ranges_and_resolve_once_filled() {
    let source = Arc::new(VecSource::from_entries([
        Entry::new(1u64, 10u64),
        Entry::null(2),
        Entry::new(3, 30),
    ]));
    let mut core = QueryCoreBuilder::new()
        .read_back(2)
        .max_size(8)
        .build(Arc::clone(&source));

    let entries: Vec<Entry<u64, u64>> = core
        .query()
        .get_entries(1, 3)
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(entries.len(), 3);
    assert!(entries[1].is_null());

    let values: Vec<u64> = core.query().get_values(1, 3).collect::<Result<_, _>>().unwrap();
    assert_eq!(values, vec![10, 30]);

    assert!(source.set_value(2, Some(20)));
    assert_eq!(core.query().get_value(2).unwrap(), Some(20));
    // the refreshed value now lives in the window
    assert_eq!(
        core.query().with_remember_null_value(true).get_value(2).unwrap(),
        Some(20)
    );
}

// ==============================================
// Shared index hints
// ==============================================

#[test]
fn cores_sharing_a_hint_table_never_see_each_others_positions() {
    let hints = HintTable::new(64);
    let even = Arc::new(VecSource::from_pairs((0..200u64).step_by(2).map(|k| (k, k))));
    let odd = Arc::new(VecSource::from_pairs((1..200u64).step_by(2).map(|k| (k, k))));

    let mut a = QueryCoreBuilder::new()
        .read_back(4)
        .max_size(16)
        .build_with_hints(Arc::clone(&even), &hints);
    let mut b = QueryCoreBuilder::new()
        .read_back(4)
        .max_size(16)
        .build_with_hints(Arc::clone(&odd), &hints);

    for key in (0..200u64).rev() {
        let ea = a.as_of(key).unwrap().map(|e| e.key());
        let eb = b.as_of(key).unwrap().map(|e| e.key());
        assert_eq!(ea, Some(key - key % 2));
        assert_eq!(eb, if key == 0 { None } else { Some(key - (key + 1) % 2) });
    }
    assert!(!hints.is_empty());
    a.check_invariants().unwrap();
    b.check_invariants().unwrap();
}

#[test]
fn stale_hints_after_clear_are_ignored() {
    let (_, mut core) = small_core(&(1..=40).collect::<Vec<_>>());
    assert_eq!(core.as_of(20).unwrap().map(|e| e.key()), Some(20));
    core.clear();
    assert_eq!(core.as_of(5).unwrap().map(|e| e.key()), Some(5));
    assert_eq!(core.as_of(20).unwrap().map(|e| e.key()), Some(20));
}

// ==============================================
// Live appends
// ==============================================

#[test]
fn refresh_tail_picks_up_appended_entries() {
    let (source, mut core) = small_core(&[1, 2, 3]);
    assert_eq!(core.as_of(10).unwrap().map(|e| e.key()), Some(3));

    source.append(5, 50).unwrap();
    core.refresh_tail();
    assert_eq!(core.as_of(10).unwrap().map(|e| e.key()), Some(5));
    assert_eq!(core.as_of(4).unwrap().map(|e| e.key()), Some(3));
}

// ==============================================
// Property Tests
// ==============================================

fn sorted_keys() -> impl Strategy<Value = Vec<u64>> {
    prop::collection::btree_set(0u64..500, 0..120).prop_map(|s| s.into_iter().collect())
}

#[derive(Debug, Clone)]
enum Op {
    AsOf(u64),
    Previous(u64, usize),
    Next(u64, usize),
    Range(u64, u64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u64..520).prop_map(Op::AsOf),
        (0u64..520, 0usize..12).prop_map(|(k, n)| Op::Previous(k, n)),
        (0u64..520, 0usize..12).prop_map(|(k, n)| Op::Next(k, n)),
        (0u64..520, 0u64..520).prop_map(|(a, b)| Op::Range(a, b)),
    ]
}

proptest! {
    #[cfg_attr(miri, ignore)]
    #[test]
    fn prop_facade_agrees_with_reference(
        keys in sorted_keys(),
        ops in prop::collection::vec(op(), 1..80)
    ) {
        let (_, mut core) = small_core(&keys);
        for op in ops {
            let mut q = core.query().with_future().unwrap();
            match op {
                Op::AsOf(k) => {
                    let got = q.get_key(k).unwrap();
                    prop_assert_eq!(got, ref_as_of(&keys, k).map(|p| keys[p]));
                },
                Op::Previous(k, n) => {
                    prop_assert_eq!(q.get_previous_key(k, n).unwrap(), ref_previous(&keys, k, n));
                },
                Op::Next(k, n) => {
                    let expected = if n == 0 {
                        ref_as_of(&keys, k).map(|p| keys[p])
                    } else {
                        ref_next(&keys, k, n)
                    };
                    prop_assert_eq!(q.get_next_key(k, n).unwrap(), expected);
                },
                Op::Range(a, b) => {
                    let got: Vec<u64> = q
                        .get_entries(a, b)
                        .map(|e| e.map(|e| e.key()))
                        .collect::<Result<_, _>>()
                        .unwrap();
                    let expected: Vec<u64> =
                        keys.iter().copied().filter(|&k| a <= k && k <= b).collect();
                    prop_assert_eq!(got, expected);
                },
            }
            prop_assert!(core.check_invariants().is_ok());
        }
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn prop_window_never_exceeds_tuned_max_size(
        keys in sorted_keys(),
        probes in prop::collection::vec(0u64..520, 1..100)
    ) {
        let (_, mut core) = small_core(&keys);
        for k in probes {
            core.as_of(k).unwrap();
            prop_assert!(core.len() <= core.max_size());
            prop_assert!(core.max_size() <= 12);
        }
    }
}
