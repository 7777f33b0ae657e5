// ==============================================
// PUSHING CHAIN EQUIVALENCE (integration)
// ==============================================
//
// A pushing chain must report exactly what a fold from the origin reports,
// whatever order the keys are requested in and however small its result
// cache is.

use std::sync::Arc;

use histkit::builder::{PushingChainBuilder, QueryCoreBuilder};
use histkit::entry::Entry;
use histkit::pushing::PushingComputation;
use histkit::source::VecSource;
use proptest::prelude::*;

/// Running count and max of non-null values.
struct CountMax;

impl PushingComputation<u64, i64> for CountMax {
    type Data = (usize, Option<i64>);
    type Output = (usize, Option<i64>);

    fn init(&self) -> Self::Data {
        (0, None)
    }

    fn push(&self, data: &mut Self::Data, entry: &Entry<u64, i64>) {
        if let Some(&v) = entry.value() {
            data.0 += 1;
            data.1 = Some(data.1.map_or(v, |m| m.max(v)));
        }
    }

    fn output(&self, data: &Self::Data) -> Self::Output {
        *data
    }
}

fn reference(series: &[(u64, Option<i64>)], origin: u64, key: u64) -> Option<(usize, Option<i64>)> {
    if !series.iter().any(|&(k, _)| k <= key) {
        return None;
    }
    let mut data = (0usize, None::<i64>);
    for &(k, v) in series.iter().filter(|&&(k, _)| origin <= k && k <= key) {
        if let Some(v) = v {
            data.0 += 1;
            data.1 = Some(data.1.map_or(v, |m: i64| m.max(v)));
        }
    }
    Some(data)
}

fn series() -> impl Strategy<Value = Vec<(u64, Option<i64>)>> {
    prop::collection::btree_map(0u64..400, prop::option::weighted(0.9, -1000i64..1000), 1..150)
        .prop_map(|m| m.into_iter().collect())
}

fn source_of(series: &[(u64, Option<i64>)]) -> Arc<VecSource<u64, i64>> {
    Arc::new(VecSource::from_entries(
        series.iter().map(|&(k, v)| Entry::from_parts(k, v)),
    ))
}

#[test]
fn forward_sweep_reuses_previous_results() {
    let data: Vec<(u64, Option<i64>)> = (0..300u64).map(|k| (k, Some(k as i64 % 17))).collect();
    let source = source_of(&data);
    let core = QueryCoreBuilder::new()
        .read_back(8)
        .max_size(64)
        .build(Arc::clone(&source));
    let mut chain = PushingChainBuilder::new()
        .max_recursion_depth(4)
        .build(core, CountMax, 0);

    for key in 0..300u64 {
        assert_eq!(chain.value(key).unwrap(), reference(&data, 0, key));
    }
    // each step pushed the previous result forward instead of folding again
    assert!(chain.cached_results() <= 2);
}

#[test]
fn origin_after_first_entry_excludes_earlier_entries() {
    let data: Vec<(u64, Option<i64>)> = (0..50u64).map(|k| (k, Some(k as i64))).collect();
    let core = QueryCoreBuilder::new().build(source_of(&data));
    let mut chain = PushingChainBuilder::new().build(core, CountMax, 20);
    assert_eq!(chain.value(30).unwrap(), Some((11, Some(30))));
    assert_eq!(chain.value(30).unwrap(), reference(&data, 20, 30));
}

proptest! {
    #[cfg_attr(miri, ignore)]
    #[test]
    fn prop_chain_matches_fold_in_any_order(
        data in series(),
        probes in prop::collection::vec(0u64..450, 1..60),
        capacity in 1usize..8,
        depth in 1usize..6
    ) {
        let core = QueryCoreBuilder::new()
            .read_back(4)
            .max_size(16)
            .build(source_of(&data));
        let mut chain = PushingChainBuilder::new()
            .max_recursion_depth(depth)
            .result_capacity(capacity)
            .build(core, CountMax, 0);

        for key in probes {
            prop_assert_eq!(chain.value(key).unwrap(), reference(&data, 0, key));
            prop_assert!(chain.cached_results() <= capacity);
        }
    }
}
