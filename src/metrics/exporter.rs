use std::io::Write;

use parking_lot::Mutex;

use crate::metrics::snapshot::{PushingMetricsSnapshot, QueryCoreMetricsSnapshot};
use crate::metrics::traits::MetricsExporter;

/// Prometheus text exporter for query-core and pushing-chain snapshots.
///
/// Writes the Prometheus text exposition format so the output can be scraped
/// directly or forwarded to an OpenTelemetry collector. Write errors are
/// dropped; exporting never fails the caller.
#[derive(Debug)]
pub struct PrometheusTextExporter<W: Write + Send> {
    prefix: String,
    writer: Mutex<W>,
}

impl<W: Write + Send> PrometheusTextExporter<W> {
    pub fn new(prefix: impl Into<String>, writer: W) -> Self {
        Self {
            prefix: prefix.into(),
            writer: Mutex::new(writer),
        }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn write_counter(&self, suffix: &str, value: u64) {
        let name = self.metric_name(suffix);
        let mut writer = self.writer.lock();
        let _ = writeln!(writer, "# TYPE {} counter", name);
        let _ = writeln!(writer, "{} {}", name, value);
    }

    fn write_gauge(&self, suffix: &str, value: u64) {
        let name = self.metric_name(suffix);
        let mut writer = self.writer.lock();
        let _ = writeln!(writer, "# TYPE {} gauge", name);
        let _ = writeln!(writer, "{} {}", name, value);
    }

    fn metric_name(&self, suffix: &str) -> String {
        if self.prefix.is_empty() {
            suffix.to_string()
        } else {
            format!("{}_{}", self.prefix, suffix)
        }
    }
}

impl<W: Write + Send> MetricsExporter<QueryCoreMetricsSnapshot> for PrometheusTextExporter<W> {
    fn export(&self, snapshot: &QueryCoreMetricsSnapshot) {
        self.write_counter("lookups_total", snapshot.lookups);
        self.write_counter("hint_hits_total", snapshot.hint_hits);
        self.write_counter("hint_stale_total", snapshot.hint_stale);
        self.write_counter("window_hits_total", snapshot.window_hits);
        self.write_counter("window_misses_total", snapshot.window_misses);
        self.write_counter("entries_read_on_miss_total", snapshot.entries_read_on_miss);
        self.write_counter("extend_back_calls_total", snapshot.extend_back_calls);
        self.write_counter("entries_read_back_total", snapshot.entries_read_back);
        self.write_counter("extend_forward_calls_total", snapshot.extend_forward_calls);
        self.write_counter("entries_read_forward_total", snapshot.entries_read_forward);
        self.write_counter("gap_resets_total", snapshot.gap_resets);
        self.write_counter(
            "entries_dropped_on_gap_total",
            snapshot.entries_dropped_on_gap,
        );
        self.write_counter("evicted_entries_total", snapshot.evicted_entries);
        self.write_counter("tuner_growths_total", snapshot.tuner_growths);
        self.write_counter("null_revalidations_total", snapshot.null_revalidations);
        self.write_counter(
            "null_revalidations_resolved_total",
            snapshot.null_revalidations_resolved,
        );
        self.write_counter("clears_total", snapshot.clears);
        self.write_gauge("window_len", snapshot.window_len as u64);
        self.write_gauge("read_back", snapshot.read_back as u64);
        self.write_gauge("max_size", snapshot.max_size as u64);
    }
}

impl<W: Write + Send> MetricsExporter<PushingMetricsSnapshot> for PrometheusTextExporter<W> {
    fn export(&self, snapshot: &PushingMetricsSnapshot) {
        self.write_counter("pushing_value_calls_total", snapshot.value_calls);
        self.write_counter("pushing_exact_hits_total", snapshot.exact_hits);
        self.write_counter("pushing_chain_hits_total", snapshot.chain_hits);
        self.write_counter("pushing_chain_depth_total", snapshot.chain_depth_total);
        self.write_counter("pushing_pushes_total", snapshot.pushes);
        self.write_counter("pushing_from_scratch_total", snapshot.from_scratch);
        self.write_counter(
            "pushing_from_scratch_entries_total",
            snapshot.from_scratch_entries,
        );
        self.write_counter("pushing_results_evicted_total", snapshot.results_evicted);
        self.write_gauge("pushing_cached_results", snapshot.cached_results as u64);
    }
}
