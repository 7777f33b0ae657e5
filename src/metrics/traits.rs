//! # Metrics Trait Hierarchy
//!
//! Recording, snapshotting and export are separate, small traits, so the
//! query code only ever sees a recorder and monitoring only ever sees a
//! snapshot.
//!
//! ## Architecture
//!
//! ```text
//!   ┌──────────────────────────────┐      ┌──────────────────────────────┐
//!   │  QueryCoreMetricsRecorder    │      │  PushingMetricsRecorder      │
//!   │  lookup / hint / miss        │      │  value / exact / chain hit   │
//!   │  extend / gap / evict / tune │      │  push / from scratch / evict │
//!   └──────────────┬───────────────┘      └──────────────┬───────────────┘
//!                  │                                     │
//!                  ▼                                     ▼
//!          QueryCoreMetrics                        PushingMetrics
//!                  │                                     │
//!   Consumption (decoupled from recording):              │
//!   ┌──────────────▼───────────────┐      ┌──────────────▼───────────────┐
//!   │ MetricsSnapshotProvider<S>   │ ───▶ │ MetricsExporter<S>           │
//!   │ (bench/test)                 │      │ (production monitoring)      │
//!   └──────────────────────────────┘      └──────────────────────────────┘
//! ```

/// Counters recorded by a query core.
pub trait QueryCoreMetricsRecorder {
    /// Any as-of position lookup (point lookups and range starts).
    fn record_lookup(&mut self);
    /// A valid index hint answered the lookup.
    fn record_hint_hit(&mut self);
    /// A hint existed for this core but was stale.
    fn record_hint_stale(&mut self);
    /// The window covered the key; answered by binary search.
    fn record_window_hit(&mut self);
    /// The key was not covered; `entries_read` were loaded around it.
    fn record_window_miss(&mut self, entries_read: usize);
    fn record_extend_back(&mut self, entries_read: usize);
    fn record_extend_forward(&mut self, entries_read: usize);
    /// A disjoint segment replaced the window, dropping `dropped` entries.
    fn record_gap_reset(&mut self, dropped: usize);
    fn record_evicted(&mut self, count: usize);
    fn record_tuner_growth(&mut self);
    fn record_null_revalidation(&mut self, resolved: bool);
    fn record_clear(&mut self);
}

/// Counters recorded by a pushing chain.
pub trait PushingMetricsRecorder {
    fn record_value_call(&mut self);
    /// A cached result at exactly the requested raw key was reused.
    fn record_exact_hit(&mut self);
    /// A cached result `depth` raw keys back was pushed forward.
    fn record_chain_hit(&mut self, depth: usize);
    /// One entry folded into a pushed result.
    fn record_push(&mut self);
    /// A result was folded from the origin over `entries` entries.
    fn record_from_scratch(&mut self, entries: usize);
    fn record_results_evicted(&mut self, count: usize);
}

/// Snapshot provider for bench/testing.
pub trait MetricsSnapshotProvider<S> {
    fn snapshot(&self) -> S;
}

/// Reset metrics between tests or benchmark iterations.
pub trait MetricsReset {
    fn reset_metrics(&mut self);
}

/// Export/publish metrics to production monitoring backends.
pub trait MetricsExporter<S> {
    fn export(&self, snapshot: &S);
}
