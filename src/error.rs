//! Error types for the histkit library.
//!
//! ## Key Components
//!
//! - [`HistoryError`]: Returned by query, facade and pushing-chain operations.
//!   Usage and data-consistency variants always propagate; the
//!   recursive-load variant is absorbed by the facade into "no value".
//! - [`RecursiveLoad`]: Lightweight signal raised by the
//!   [`RecursionGuard`](crate::guard::RecursionGuard) when a key is re-entered
//!   while it is still loading. Captures a backtrace only when the guard was
//!   built with backtrace capture enabled.
//! - [`ConfigError`]: Returned when builder parameters are invalid
//!   (e.g. zero read-back, window smaller than twice the read-back).
//! - [`InvariantError`]: Returned when internal invariants are violated
//!   (`check_invariants` methods).
//!
//! ## Example Usage
//!
//! ```
//! use histkit::builder::QueryCoreBuilder;
//! use histkit::error::ConfigError;
//! use histkit::source::VecSource;
//!
//! let source: VecSource<u64, u64> = VecSource::new();
//!
//! // Invalid read-back is caught without panicking
//! let bad = QueryCoreBuilder::new().read_back(0).try_build(source);
//! assert!(matches!(bad, Err(ConfigError { .. })));
//! ```

use std::backtrace::Backtrace;
use std::fmt;

use thiserror::Error;

// ---------------------------------------------------------------------------
// HistoryError
// ---------------------------------------------------------------------------

/// Errors surfaced by history queries.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// A key was requested again while its load was still in flight.
    #[error(transparent)]
    RecursiveLoad(#[from] RecursiveLoad),

    /// The API was used in a way its mode does not allow.
    #[error("usage error: {0}")]
    Usage(String),

    /// The source returned data that contradicts the ordering contract.
    #[error("data consistency violation: {0}")]
    DataConsistency(String),
}

impl HistoryError {
    /// Creates a [`HistoryError::Usage`] with the given description.
    #[inline]
    pub fn usage(msg: impl Into<String>) -> Self {
        Self::Usage(msg.into())
    }

    /// Creates a [`HistoryError::DataConsistency`] with the given description.
    #[inline]
    pub fn data_consistency(msg: impl Into<String>) -> Self {
        Self::DataConsistency(msg.into())
    }

    /// Returns `true` for the recursive-load signal.
    #[inline]
    pub fn is_recursive_load(&self) -> bool {
        matches!(self, Self::RecursiveLoad(_))
    }
}

// ---------------------------------------------------------------------------
// RecursiveLoad
// ---------------------------------------------------------------------------

/// Signal raised when the same key is loaded re-entrantly.
///
/// Built on the detection path only, so the hot path never formats keys.
/// The backtrace is `None` unless the raising guard opted in.
pub struct RecursiveLoad {
    key: String,
    trace: Option<Backtrace>,
}

impl RecursiveLoad {
    /// Creates a signal for `key`, capturing a backtrace when asked to.
    pub fn new(key: impl fmt::Debug, capture_backtrace: bool) -> Self {
        Self {
            key: format!("{key:?}"),
            trace: capture_backtrace.then(Backtrace::force_capture),
        }
    }

    /// Returns the debug rendering of the re-entered key.
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the captured backtrace, if capture was enabled.
    #[inline]
    pub fn backtrace(&self) -> Option<&Backtrace> {
        self.trace.as_ref()
    }
}

impl fmt::Display for RecursiveLoad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "recursive load of key {}", self.key)
    }
}

impl fmt::Debug for RecursiveLoad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("RecursiveLoad");
        dbg.field("key", &self.key);
        if let Some(bt) = &self.trace {
            dbg.field("backtrace", &format_args!("{bt}"));
        }
        dbg.finish()
    }
}

impl std::error::Error for RecursiveLoad {}

// ---------------------------------------------------------------------------
// InvariantError
// ---------------------------------------------------------------------------

/// Error returned when internal invariants are violated.
///
/// Produced by `check_invariants` methods such as
/// [`QueryCore::check_invariants`](crate::query::core::QueryCore::check_invariants).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct InvariantError {
    message: String,
}

impl InvariantError {
    /// Creates a new `InvariantError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error returned when configuration parameters are invalid.
///
/// Produced by builder `try_build()` methods.
///
/// # Example
///
/// ```
/// use histkit::builder::QueryCoreBuilder;
/// use histkit::source::VecSource;
///
/// let source: VecSource<u64, u64> = VecSource::new();
/// let err = QueryCoreBuilder::new()
///     .read_back(8)
///     .max_size(10)
///     .try_build(source)
///     .unwrap_err();
/// assert!(err.to_string().contains("max_size"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    /// Creates a new `ConfigError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- HistoryError -----------------------------------------------------

    #[test]
    fn usage_display_is_prefixed() {
        let err = HistoryError::usage("future lookups are disabled");
        assert_eq!(err.to_string(), "usage error: future lookups are disabled");
        assert!(!err.is_recursive_load());
    }

    #[test]
    fn data_consistency_display_is_prefixed() {
        let err = HistoryError::data_consistency("key 3 precedes 5");
        assert_eq!(
            err.to_string(),
            "data consistency violation: key 3 precedes 5"
        );
    }

    #[test]
    fn recursive_load_converts_into_history_error() {
        let err: HistoryError = RecursiveLoad::new(42u64, false).into();
        assert!(err.is_recursive_load());
        assert_eq!(err.to_string(), "recursive load of key 42");
    }

    #[test]
    fn history_error_implements_std_error() {
        fn assert_error<T: std::error::Error + Send + Sync + 'static>() {}
        assert_error::<HistoryError>();
    }

    // -- RecursiveLoad ----------------------------------------------------

    #[test]
    fn recursive_load_skips_backtrace_by_default() {
        let signal = RecursiveLoad::new("k", false);
        assert!(signal.backtrace().is_none());
        assert_eq!(signal.key(), "\"k\"");
    }

    #[test]
    fn recursive_load_captures_backtrace_on_request() {
        let signal = RecursiveLoad::new(7u32, true);
        assert!(signal.backtrace().is_some());
        assert!(format!("{:?}", signal).contains("backtrace"));
    }

    // -- InvariantError ---------------------------------------------------

    #[test]
    fn invariant_display_shows_message() {
        let err = InvariantError::new("window not sorted");
        assert_eq!(err.to_string(), "window not sorted");
        assert_eq!(err.message(), "window not sorted");
    }

    #[test]
    fn invariant_clone_and_eq() {
        let a = InvariantError::new("x");
        let b = a.clone();
        assert_eq!(a, b);
    }

    // -- ConfigError ------------------------------------------------------

    #[test]
    fn config_display_shows_message() {
        let err = ConfigError::new("read_back must be > 0");
        assert_eq!(err.to_string(), "read_back must be > 0");
        assert_eq!(err.message(), "read_back must be > 0");
    }

    #[test]
    fn config_debug_includes_message() {
        let err = ConfigError::new("bad limit");
        assert!(format!("{:?}", err).contains("bad limit"));
    }
}
