//! Counters, snapshots and exporters for query cores and pushing chains.
//!
//! Enabled by the `metrics` feature. Recording is a plain field increment on
//! the owning structure; reading goes through
//! [`MetricsSnapshotProvider`](traits::MetricsSnapshotProvider).

pub mod exporter;
pub mod metrics_impl;
pub mod snapshot;
pub mod traits;

pub use exporter::PrometheusTextExporter;
pub use metrics_impl::{PushingMetrics, QueryCoreMetrics};
pub use snapshot::{PushingMetricsSnapshot, QueryCoreMetricsSnapshot};
pub use traits::{
    MetricsExporter, MetricsReset, MetricsSnapshotProvider, PushingMetricsRecorder,
    QueryCoreMetricsRecorder,
};
