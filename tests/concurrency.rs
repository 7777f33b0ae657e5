#![cfg(feature = "concurrency")]
// ==============================================
// CONCURRENT CORE STRESS (integration)
// ==============================================
//
// Many threads over one shared window, plus a writer appending to the live
// tail. Every answer is checked against the source and the window
// invariants are checked once the threads join.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use histkit::builder::QueryCoreBuilder;
use histkit::ds::HintTable;
use histkit::entry::Entry;
use histkit::query::ConcurrentQueryCore;
use histkit::source::VecSource;
use histkit::traits::{CoreHandle, HistorySource};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

type Shared = ConcurrentQueryCore<u64, u64, Arc<VecSource<u64, u64>>>;

fn sparse(n: u64, step: u64, hints: &HintTable<u64>) -> (Arc<VecSource<u64, u64>>, Shared) {
    let source = Arc::new(VecSource::from_pairs((0..n).map(|i| (i * step, i))));
    let core = QueryCoreBuilder::new()
        .read_back(8)
        .max_size(64)
        .tuner_limits(32, 256)
        .build_with_hints(Arc::clone(&source), hints);
    (source, ConcurrentQueryCore::new(core))
}

#[test]
fn random_lookups_from_many_threads() {
    let hints = HintTable::new(1024);
    let (_, core) = sparse(10_000, 3, &hints);

    thread::scope(|scope| {
        for seed in 0..8u64 {
            let core = core.clone();
            scope.spawn(move || {
                let mut rng = StdRng::seed_from_u64(seed);
                for _ in 0..2_000 {
                    let key = rng.random_range(0..30_000u64);
                    let entry = core.as_of(key).unwrap().unwrap();
                    assert_eq!(entry.key(), key - key % 3);
                    assert_eq!(entry.value(), Some(&(key / 3)));
                }
            });
        }
    });

    core.check_invariants().unwrap();
    assert!(core.len() <= 256);
}

#[test]
fn two_cores_share_hints_across_threads() {
    let hints = HintTable::new(256);
    let (_, threes) = sparse(2_000, 3, &hints);
    let (_, fives) = sparse(2_000, 5, &hints);

    thread::scope(|scope| {
        for seed in 0..4u64 {
            let threes = threes.clone();
            let fives = fives.clone();
            scope.spawn(move || {
                let mut rng = StdRng::seed_from_u64(seed ^ 0xA5A5);
                for _ in 0..1_000 {
                    let key = rng.random_range(0..6_000u64);
                    let a = threes.as_of(key).unwrap().map(|e| e.key());
                    let b = fives.as_of(key).unwrap().map(|e| e.key());
                    assert_eq!(a, Some(key - key % 3));
                    assert_eq!(b, Some(key - key % 5));
                }
            });
        }
    });

    threes.check_invariants().unwrap();
    fives.check_invariants().unwrap();
}

#[test]
fn readers_see_appends_after_refresh() {
    let hints = HintTable::new(64);
    let (source, core) = sparse(100, 1, &hints);
    let done = AtomicBool::new(false);

    thread::scope(|scope| {
        let writer_core = core.clone();
        let writer_source = Arc::clone(&source);
        let done = &done;
        scope.spawn(move || {
            for key in 100..600u64 {
                writer_source.append(key, key).unwrap();
                writer_core.refresh_tail();
            }
            done.store(true, Ordering::Release);
        });

        for _ in 0..3 {
            let core = core.clone();
            scope.spawn(move || {
                let mut last_seen = 0u64;
                while !done.load(Ordering::Acquire) {
                    let entry = core.as_of(u64::MAX).unwrap().unwrap();
                    assert!(entry.key() >= last_seen);
                    last_seen = entry.key();
                    let mid = core.as_of(last_seen / 2).unwrap().unwrap();
                    assert_eq!(mid.key(), last_seen / 2);
                }
            });
        }
    });

    core.refresh_tail();
    assert_eq!(core.as_of(u64::MAX).unwrap().map(|e| e.key()), Some(599));
    core.check_invariants().unwrap();
}

#[test]
fn facade_over_shared_core_from_threads() {
    let hints = HintTable::new(64);
    let (_, core) = sparse(500, 2, &hints);

    thread::scope(|scope| {
        for t in 0..4u64 {
            let mut core = core.clone();
            scope.spawn(move || {
                let mut q = core.query().with_future().unwrap();
                for i in 0..100u64 {
                    let key = 100 + (i * 7 + t * 13) % 700;
                    let base = key - key % 2;
                    assert_eq!(q.get_previous_key(key, 2).unwrap(), Some(base - 4));
                    assert_eq!(q.get_next_key(key, 1).unwrap(), Some(base + 2));
                }
            });
        }
    });
}

// ==============================================
// RE-ENTRANT SOURCES
// ==============================================

type Derived = ConcurrentQueryCore<u64, u64, Arc<DerivedSource>>;

/// Series whose loads at multiples of 100 first read the entry just before
/// through the same shared core, the way a derived series reads its inputs.
struct DerivedSource {
    base: VecSource<u64, u64>,
    core: Mutex<Option<Derived>>,
    nested: Mutex<Vec<(u64, Option<u64>)>>,
    refused_same_key: Mutex<usize>,
}

impl DerivedSource {
    fn reenter(&self, key: u64) {
        if key == 0 || key % 100 != 0 {
            return;
        }
        let Some(core) = self.core.lock().unwrap().clone() else {
            return;
        };
        if core.as_of(key).unwrap_err().is_recursive_load() {
            *self.refused_same_key.lock().unwrap() += 1;
        }
        let before = core.as_of(key - 1).unwrap().map(|e| e.key());
        self.nested.lock().unwrap().push((key, before));
    }
}

impl HistorySource<u64, u64> for DerivedSource {
    fn load_descending_from(&self, key: u64, count: usize) -> Vec<Entry<u64, u64>> {
        self.reenter(key);
        self.base.load_descending_from(key, count)
    }

    fn load_ascending_from(&self, key: u64, count: usize) -> Vec<Entry<u64, u64>> {
        self.base.load_ascending_from(key, count)
    }
}

fn derived(n: u64) -> (Arc<DerivedSource>, Derived) {
    let source = Arc::new(DerivedSource {
        base: VecSource::from_pairs((0..n).map(|k| (k, k))),
        core: Mutex::new(None),
        nested: Mutex::new(Vec::new()),
        refused_same_key: Mutex::new(0),
    });
    let core = ConcurrentQueryCore::new(
        QueryCoreBuilder::new()
            .read_back(4)
            .max_size(16)
            .auto_tune(false)
            .build(Arc::clone(&source)),
    );
    *source.core.lock().unwrap() = Some(core.clone());
    (source, core)
}

#[test]
fn nested_lookup_of_another_key_is_served() {
    let (source, core) = derived(1_000);

    assert_eq!(core.as_of(300).unwrap().map(|e| e.key()), Some(300));
    assert_eq!(*source.nested.lock().unwrap(), vec![(300, Some(299))]);
    assert_eq!(*source.refused_same_key.lock().unwrap(), 1);
    assert_eq!(core.guard().active_len(), 0);
    core.check_invariants().unwrap();

    source.core.lock().unwrap().take();
}

#[test]
fn nested_lookups_from_many_threads() {
    let (source, core) = derived(2_000);

    thread::scope(|scope| {
        for t in 0..4u64 {
            let core = core.clone();
            scope.spawn(move || {
                for i in 0..5u64 {
                    let key = (t * 5 + i) * 100;
                    assert_eq!(core.as_of(key).unwrap().map(|e| e.key()), Some(key));
                }
            });
        }
    });

    let nested = source.nested.lock().unwrap().clone();
    assert!(!nested.is_empty());
    assert_eq!(*source.refused_same_key.lock().unwrap(), nested.len());
    for (key, before) in nested {
        assert_eq!(before, Some(key - 1));
    }
    assert_eq!(core.guard().active_len(), 0);
    core.check_invariants().unwrap();

    source.core.lock().unwrap().take();
}
