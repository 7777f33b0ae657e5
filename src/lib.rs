//! histkit: point-in-time cache for as-of, previous/next and range queries
//! over ordered, append-only time series.
//!
//! See `DESIGN.md` for internal architecture and invariants.

pub mod builder;
pub mod ds;
pub mod entry;
pub mod error;
pub mod guard;
pub mod pushing;
pub mod query;
pub mod source;
pub mod traits;
pub mod tuner;

#[cfg(feature = "metrics")]
pub mod metrics;

pub mod prelude;

pub use crate::builder::{PushingChainBuilder, QueryCoreBuilder};
pub use crate::ds::{CacheIndex, CoreId, DuplicateKeyPolicy, HintTable, IndexSlot};
pub use crate::entry::Entry;
pub use crate::error::{ConfigError, HistoryError, InvariantError, RecursiveLoad};
#[cfg(feature = "metrics")]
pub use crate::metrics::snapshot::{PushingMetricsSnapshot, QueryCoreMetricsSnapshot};
pub use crate::pushing::{PushingChain, PushingComputation, PushingResult};
#[cfg(feature = "concurrency")]
pub use crate::query::ConcurrentQueryCore;
pub use crate::query::{FutureMode, HistoryQuery, QueryCore};
pub use crate::source::VecSource;
pub use crate::traits::{CoreHandle, HistorySource, TimeKey};
