//! Query cores and the caller-facing facade.
//!
//! - [`core::QueryCore`]: single-writer cache over one series.
//! - [`state::CoreState`]: the window bookkeeping both cores share.
//! - [`concurrent::ConcurrentQueryCore`]: the same core behind one lock
//!   (`concurrency` feature).
//! - [`facade::HistoryQuery`]: filters, future mode, null handling and lazy
//!   ranges over any [`CoreHandle`](crate::traits::CoreHandle).

#[cfg(feature = "concurrency")]
pub mod concurrent;
pub mod core;
pub mod facade;
mod ops;
pub mod state;

#[cfg(feature = "concurrency")]
pub use concurrent::ConcurrentQueryCore;
pub use core::QueryCore;
pub use facade::{DEFAULT_RANGE_CHUNK, FutureMode, HistoryQuery, HistoryRange, HistoryValues};
pub use state::CoreState;
