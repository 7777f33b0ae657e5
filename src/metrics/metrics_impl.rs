//! Counter storage for query cores and pushing chains.
//!
//! Both structures are owned by the structure they describe and mutated
//! through `&mut self`, so plain `u64` fields are enough. A
//! [`ConcurrentQueryCore`](crate::query::ConcurrentQueryCore) records under
//! its lock.

use crate::metrics::snapshot::{PushingMetricsSnapshot, QueryCoreMetricsSnapshot};
use crate::metrics::traits::{MetricsReset, PushingMetricsRecorder, QueryCoreMetricsRecorder};

#[derive(Debug, Default, Clone)]
pub struct QueryCoreMetrics {
    pub lookups: u64,
    pub hint_hits: u64,
    pub hint_stale: u64,
    pub window_hits: u64,
    pub window_misses: u64,
    pub entries_read_on_miss: u64,
    pub extend_back_calls: u64,
    pub entries_read_back: u64,
    pub extend_forward_calls: u64,
    pub entries_read_forward: u64,
    pub gap_resets: u64,
    pub entries_dropped_on_gap: u64,
    pub evicted_entries: u64,
    pub tuner_growths: u64,
    pub null_revalidations: u64,
    pub null_revalidations_resolved: u64,
    pub clears: u64,
}

impl QueryCoreMetrics {
    /// Freezes the counters together with the current window gauges.
    pub fn snapshot(&self, len: usize, read_back: usize, max_size: usize) -> QueryCoreMetricsSnapshot {
        QueryCoreMetricsSnapshot {
            lookups: self.lookups,
            hint_hits: self.hint_hits,
            hint_stale: self.hint_stale,
            window_hits: self.window_hits,
            window_misses: self.window_misses,
            entries_read_on_miss: self.entries_read_on_miss,
            extend_back_calls: self.extend_back_calls,
            entries_read_back: self.entries_read_back,
            extend_forward_calls: self.extend_forward_calls,
            entries_read_forward: self.entries_read_forward,
            gap_resets: self.gap_resets,
            entries_dropped_on_gap: self.entries_dropped_on_gap,
            evicted_entries: self.evicted_entries,
            tuner_growths: self.tuner_growths,
            null_revalidations: self.null_revalidations,
            null_revalidations_resolved: self.null_revalidations_resolved,
            clears: self.clears,
            window_len: len,
            read_back,
            max_size,
        }
    }
}

impl QueryCoreMetricsRecorder for QueryCoreMetrics {
    fn record_lookup(&mut self) {
        self.lookups += 1;
    }

    fn record_hint_hit(&mut self) {
        self.hint_hits += 1;
    }

    fn record_hint_stale(&mut self) {
        self.hint_stale += 1;
    }

    fn record_window_hit(&mut self) {
        self.window_hits += 1;
    }

    fn record_window_miss(&mut self, entries_read: usize) {
        self.window_misses += 1;
        self.entries_read_on_miss += entries_read as u64;
    }

    fn record_extend_back(&mut self, entries_read: usize) {
        self.extend_back_calls += 1;
        self.entries_read_back += entries_read as u64;
    }

    fn record_extend_forward(&mut self, entries_read: usize) {
        self.extend_forward_calls += 1;
        self.entries_read_forward += entries_read as u64;
    }

    fn record_gap_reset(&mut self, dropped: usize) {
        self.gap_resets += 1;
        self.entries_dropped_on_gap += dropped as u64;
    }

    fn record_evicted(&mut self, count: usize) {
        self.evicted_entries += count as u64;
    }

    fn record_tuner_growth(&mut self) {
        self.tuner_growths += 1;
    }

    fn record_null_revalidation(&mut self, resolved: bool) {
        self.null_revalidations += 1;
        if resolved {
            self.null_revalidations_resolved += 1;
        }
    }

    fn record_clear(&mut self) {
        self.clears += 1;
    }
}

impl MetricsReset for QueryCoreMetrics {
    fn reset_metrics(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Default, Clone)]
pub struct PushingMetrics {
    pub value_calls: u64,
    pub exact_hits: u64,
    pub chain_hits: u64,
    pub chain_depth_total: u64,
    pub pushes: u64,
    pub from_scratch: u64,
    pub from_scratch_entries: u64,
    pub results_evicted: u64,
}

impl PushingMetrics {
    pub fn snapshot(&self, cached: usize) -> PushingMetricsSnapshot {
        PushingMetricsSnapshot {
            value_calls: self.value_calls,
            exact_hits: self.exact_hits,
            chain_hits: self.chain_hits,
            chain_depth_total: self.chain_depth_total,
            pushes: self.pushes,
            from_scratch: self.from_scratch,
            from_scratch_entries: self.from_scratch_entries,
            results_evicted: self.results_evicted,
            cached_results: cached,
        }
    }
}

impl PushingMetricsRecorder for PushingMetrics {
    fn record_value_call(&mut self) {
        self.value_calls += 1;
    }

    fn record_exact_hit(&mut self) {
        self.exact_hits += 1;
    }

    fn record_chain_hit(&mut self, depth: usize) {
        self.chain_hits += 1;
        self.chain_depth_total += depth as u64;
    }

    fn record_push(&mut self) {
        self.pushes += 1;
    }

    fn record_from_scratch(&mut self, entries: usize) {
        self.from_scratch += 1;
        self.from_scratch_entries += entries as u64;
    }

    fn record_results_evicted(&mut self, count: usize) {
        self.results_evicted += count as u64;
    }
}

impl MetricsReset for PushingMetrics {
    fn reset_metrics(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_miss_accumulates_entries_read() {
        let mut m = QueryCoreMetrics::default();
        m.record_window_miss(16);
        m.record_window_miss(4);
        let snap = m.snapshot(20, 16, 256);
        assert_eq!(snap.window_misses, 2);
        assert_eq!(snap.entries_read_on_miss, 20);
        assert_eq!(snap.window_len, 20);
    }

    #[test]
    fn null_revalidation_counts_resolved_separately() {
        let mut m = QueryCoreMetrics::default();
        m.record_null_revalidation(true);
        m.record_null_revalidation(false);
        assert_eq!(m.null_revalidations, 2);
        assert_eq!(m.null_revalidations_resolved, 1);
    }

    #[test]
    fn reset_zeroes_counters() {
        let mut m = PushingMetrics::default();
        m.record_value_call();
        m.record_chain_hit(3);
        m.reset_metrics();
        let snap = m.snapshot(0);
        assert_eq!(snap.value_calls, 0);
        assert_eq!(snap.chain_depth_total, 0);
    }
}
