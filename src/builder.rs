//! Builders for query cores and pushing chains.
//!
//! Hides the tuner and guard wiring behind a small fluent API. Every builder
//! has a panicking `build` and a [`ConfigError`]-returning `try_build`.
//!
//! ## Example
//!
//! ```rust
//! use histkit::builder::QueryCoreBuilder;
//! use histkit::ds::DuplicateKeyPolicy;
//! use histkit::source::VecSource;
//!
//! let source = VecSource::from_pairs((0..1000u64).map(|k| (k, k)));
//! let mut core = QueryCoreBuilder::new()
//!     .read_back(32)
//!     .max_size(512)
//!     .duplicate_policy(DuplicateKeyPolicy::Replace)
//!     .tuner_limits(1024, 8192)
//!     .build(source);
//!
//! assert_eq!(core.as_of(500).unwrap().map(|e| e.key()), Some(500));
//! assert_eq!(core.read_back(), 32);
//! ```
//!
//! ## Sharing Hints
//!
//! Cores built with [`build_with_hints`](QueryCoreBuilder::build_with_hints)
//! and the same [`HintTable`] share one two-slot hint per key, the way two
//! queries over the same key objects would.
//!
//! ```rust
//! use histkit::builder::QueryCoreBuilder;
//! use histkit::ds::HintTable;
//! use histkit::source::VecSource;
//!
//! let hints: HintTable<u64> = HintTable::new(1024);
//! let a = QueryCoreBuilder::new().build_with_hints(VecSource::from_pairs([(1u64, 1u64)]), &hints);
//! let b = QueryCoreBuilder::new().build_with_hints(VecSource::from_pairs([(1u64, 2u64)]), &hints);
//! assert!(a.hints().ptr_eq(b.hints()));
//! assert_ne!(a.id(), b.id());
//! ```

use crate::ds::{DEFAULT_HINT_CAPACITY, DuplicateKeyPolicy, HintTable};
use crate::error::ConfigError;
use crate::pushing::{
    DEFAULT_MAX_RECURSION_DEPTH, DEFAULT_RESULT_CAPACITY, PushingChain, PushingComputation,
};
use crate::query::core::{CoreParams, QueryCore};
use crate::traits::{CoreHandle, HistorySource, TimeKey};
use crate::tuner::TunerLimits;

/// Default number of entries loaded on each side of a missed key.
pub const DEFAULT_READ_BACK: usize = 16;

/// Default window capacity.
pub const DEFAULT_MAX_SIZE: usize = 256;

/// Builder for [`QueryCore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryCoreBuilder {
    read_back: usize,
    max_size: usize,
    duplicate_policy: DuplicateKeyPolicy,
    auto_tune: bool,
    limits: TunerLimits,
    hint_capacity: usize,
    capture_backtraces: bool,
}

impl QueryCoreBuilder {
    pub fn new() -> Self {
        Self {
            read_back: DEFAULT_READ_BACK,
            max_size: DEFAULT_MAX_SIZE,
            duplicate_policy: DuplicateKeyPolicy::default(),
            auto_tune: true,
            limits: TunerLimits::default(),
            hint_capacity: DEFAULT_HINT_CAPACITY,
            capture_backtraces: false,
        }
    }

    /// Entries loaded on each side of a missed key.
    pub fn read_back(mut self, read_back: usize) -> Self {
        self.read_back = read_back;
        self
    }

    /// Window capacity; must be at least twice the read-back.
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn duplicate_policy(mut self, policy: DuplicateKeyPolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    /// Enables or disables the gap/miss auto-tuner.
    pub fn auto_tune(mut self, enabled: bool) -> Self {
        self.auto_tune = enabled;
        self
    }

    /// Upper bounds the tuner may grow read-back and max size to.
    pub fn tuner_limits(mut self, max_read_back: usize, max_size: usize) -> Self {
        self.limits = TunerLimits {
            max_read_back,
            max_size,
        };
        self
    }

    /// Key capacity of the private hint table created by `build`.
    pub fn hint_capacity(mut self, capacity: usize) -> Self {
        self.hint_capacity = capacity;
        self
    }

    /// Records a backtrace in every recursive-load signal. Debugging only.
    pub fn capture_backtraces(mut self, enabled: bool) -> Self {
        self.capture_backtraces = enabled;
        self
    }

    pub(crate) fn validate(&self) -> Result<CoreParams, ConfigError> {
        if self.read_back == 0 {
            return Err(ConfigError::new("read_back must be greater than zero"));
        }
        if self.max_size < self.read_back.saturating_mul(2) {
            return Err(ConfigError::new(format!(
                "max_size ({}) must be at least twice read_back ({})",
                self.max_size, self.read_back
            )));
        }
        if self.limits.max_read_back < self.read_back {
            return Err(ConfigError::new(format!(
                "tuner max_read_back ({}) is below read_back ({})",
                self.limits.max_read_back, self.read_back
            )));
        }
        if self.limits.max_size < self.max_size {
            return Err(ConfigError::new(format!(
                "tuner max_size ({}) is below max_size ({})",
                self.limits.max_size, self.max_size
            )));
        }
        if self.limits.max_size < self.limits.max_read_back.saturating_mul(2) {
            return Err(ConfigError::new(format!(
                "tuner max_size ({}) must be at least twice tuner max_read_back ({})",
                self.limits.max_size, self.limits.max_read_back
            )));
        }
        Ok(CoreParams {
            read_back: self.read_back,
            max_size: self.max_size,
            duplicate_policy: self.duplicate_policy,
            auto_tune: self.auto_tune,
            limits: self.limits,
            capture_backtraces: self.capture_backtraces,
        })
    }

    /// Builds a core with its own hint table.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid. For a non-panicking
    /// alternative, use [`try_build`](Self::try_build).
    pub fn build<K, V, S>(self, source: S) -> QueryCore<K, V, S>
    where
        K: TimeKey,
        V: Clone,
        S: HistorySource<K, V>,
    {
        match self.try_build(source) {
            Ok(core) => core,
            Err(e) => panic!("{}", e),
        }
    }

    /// Builds a core, returning an error on invalid parameters instead of
    /// panicking.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `read_back` is zero, `max_size` is less than
    /// twice `read_back`, a tuner limit is below its starting value, or the
    /// tuner's `max_size` limit is less than twice its `max_read_back` limit.
    pub fn try_build<K, V, S>(self, source: S) -> Result<QueryCore<K, V, S>, ConfigError>
    where
        K: TimeKey,
        V: Clone,
        S: HistorySource<K, V>,
    {
        let params = self.validate()?;
        Ok(QueryCore::from_params(
            source,
            params,
            HintTable::new(self.hint_capacity),
        ))
    }

    /// Builds a core that writes its hints into a shared table.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid.
    pub fn build_with_hints<K, V, S>(self, source: S, hints: &HintTable<K>) -> QueryCore<K, V, S>
    where
        K: TimeKey,
        V: Clone,
        S: HistorySource<K, V>,
    {
        match self.try_build_with_hints(source, hints) {
            Ok(core) => core,
            Err(e) => panic!("{}", e),
        }
    }

    /// Non-panicking [`build_with_hints`](Self::build_with_hints).
    pub fn try_build_with_hints<K, V, S>(
        self,
        source: S,
        hints: &HintTable<K>,
    ) -> Result<QueryCore<K, V, S>, ConfigError>
    where
        K: TimeKey,
        V: Clone,
        S: HistorySource<K, V>,
    {
        let params = self.validate()?;
        Ok(QueryCore::from_params(source, params, hints.clone()))
    }
}

impl Default for QueryCoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`PushingChain`].
///
/// # Example
///
/// ```
/// use histkit::builder::{PushingChainBuilder, QueryCoreBuilder};
/// use histkit::entry::Entry;
/// use histkit::pushing::PushingComputation;
/// use histkit::source::VecSource;
///
/// struct Count;
///
/// impl PushingComputation<u64, ()> for Count {
///     type Data = usize;
///     type Output = usize;
///
///     fn init(&self) -> usize {
///         0
///     }
///
///     fn push(&self, data: &mut usize, _entry: &Entry<u64, ()>) {
///         *data += 1;
///     }
///
///     fn output(&self, data: &usize) -> usize {
///         *data
///     }
/// }
///
/// let core = QueryCoreBuilder::new().build(VecSource::from_pairs((0..50u64).map(|k| (k, ()))));
/// let mut chain = PushingChainBuilder::new()
///     .max_recursion_depth(4)
///     .result_capacity(64)
///     .build(core, Count, 0);
/// assert_eq!(chain.value(9).unwrap(), Some(10));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushingChainBuilder {
    max_recursion_depth: usize,
    result_capacity: usize,
    capture_backtraces: bool,
}

impl PushingChainBuilder {
    pub fn new() -> Self {
        Self {
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
            result_capacity: DEFAULT_RESULT_CAPACITY,
            capture_backtraces: false,
        }
    }

    /// How many preceding raw keys are probed for a cached result.
    pub fn max_recursion_depth(mut self, depth: usize) -> Self {
        self.max_recursion_depth = depth;
        self
    }

    /// Number of results kept for reuse.
    pub fn result_capacity(mut self, capacity: usize) -> Self {
        self.result_capacity = capacity;
        self
    }

    pub fn capture_backtraces(mut self, enabled: bool) -> Self {
        self.capture_backtraces = enabled;
        self
    }

    /// Builds the chain. `origin` is a key no raw entry precedes.
    ///
    /// # Panics
    ///
    /// Panics if `result_capacity` is zero.
    pub fn build<C, P, K, V>(self, core: C, computation: P, origin: K) -> PushingChain<C, P, K, V>
    where
        C: CoreHandle<K, V>,
        P: PushingComputation<K, V>,
        K: TimeKey,
        V: Clone,
    {
        match self.try_build(core, computation, origin) {
            Ok(chain) => chain,
            Err(e) => panic!("{}", e),
        }
    }

    /// Builds the chain, returning an error on invalid parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `result_capacity` is zero.
    pub fn try_build<C, P, K, V>(
        self,
        core: C,
        computation: P,
        origin: K,
    ) -> Result<PushingChain<C, P, K, V>, ConfigError>
    where
        C: CoreHandle<K, V>,
        P: PushingComputation<K, V>,
        K: TimeKey,
        V: Clone,
    {
        if self.result_capacity == 0 {
            return Err(ConfigError::new("result_capacity must be greater than zero"));
        }
        Ok(PushingChain::from_parts(
            core,
            computation,
            origin,
            self.max_recursion_depth,
            self.result_capacity,
            self.capture_backtraces,
        ))
    }
}

impl Default for PushingChainBuilder {
    fn default() -> Self {
        Self::new()
    }
}
