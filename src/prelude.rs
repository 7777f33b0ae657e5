pub use crate::builder::{PushingChainBuilder, QueryCoreBuilder};
pub use crate::ds::DuplicateKeyPolicy;
pub use crate::entry::Entry;
pub use crate::error::{ConfigError, HistoryError};
pub use crate::pushing::{PushingChain, PushingComputation, PushingResult};
#[cfg(feature = "concurrency")]
pub use crate::query::ConcurrentQueryCore;
pub use crate::query::{FutureMode, HistoryQuery, QueryCore};
pub use crate::source::VecSource;
#[cfg(feature = "concurrency")]
pub use crate::traits::ConcurrentCore;
pub use crate::traits::{CoreHandle, HistorySource, TimeKey};
