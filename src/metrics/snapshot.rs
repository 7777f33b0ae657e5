//! Point-in-time copies of the counters, plus gauges read at snapshot time.

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QueryCoreMetricsSnapshot {
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

    // gauges
    pub window_len: usize,
    pub read_back: usize,
    pub max_size: usize,
}

impl QueryCoreMetricsSnapshot {
    /// Share of lookups answered without calling the source.
    pub fn hit_rate(&self) -> f64 {
        if self.lookups == 0 {
            return 0.0;
        }
        (self.hint_hits + self.window_hits) as f64 / self.lookups as f64
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PushingMetricsSnapshot {
    pub value_calls: u64,
    pub exact_hits: u64,
    pub chain_hits: u64,
    pub chain_depth_total: u64,
    pub pushes: u64,
    pub from_scratch: u64,
    pub from_scratch_entries: u64,
    pub results_evicted: u64,

    // gauges
    pub cached_results: usize,
}

impl PushingMetricsSnapshot {
    /// Share of `value` calls that reused a cached result.
    pub fn reuse_rate(&self) -> f64 {
        if self.value_calls == 0 {
            return 0.0;
        }
        (self.exact_hits + self.chain_hits) as f64 / self.value_calls as f64
    }
}
