//! Execution context for the in-memory pipeline.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::expr::HostFunctions;

/// Default maximum rows an operator may buffer (1 million rows).
pub const DEFAULT_MAX_ROWS_IN_MEMORY: usize = 1_000_000;

/// Context shared by every operator of one execution.
pub struct ExecutionContext {
    /// Functions callable from in-memory lambdas.
    functions: Arc<HostFunctions>,
    /// Whether the execution has been cancelled.
    cancelled: AtomicBool,
    /// Execution statistics.
    stats: ExecutionStats,
    /// Configuration options.
    config: ExecutionConfig,
}

impl ExecutionContext {
    /// Creates a context with no host functions.
    #[must_use]
    pub fn new() -> Self {
        Self::with_functions(Arc::new(HostFunctions::new()))
    }

    /// Creates a context over a host function registry.
    #[must_use]
    pub fn with_functions(functions: Arc<HostFunctions>) -> Self {
        Self {
            functions,
            cancelled: AtomicBool::new(false),
            stats: ExecutionStats::new(),
            config: ExecutionConfig::default(),
        }
    }

    /// Sets the execution configuration.
    #[must_use]
    pub fn with_config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the host functions.
    #[inline]
    #[must_use]
    pub fn functions(&self) -> &HostFunctions {
        &self.functions
    }

    /// Returns the host functions as an Arc, for operators that hold on to
    /// them between calls.
    #[inline]
    #[must_use]
    pub fn functions_arc(&self) -> Arc<HostFunctions> {
        Arc::clone(&self.functions)
    }

    /// Cancels the execution.
    #[inline]
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Checks if the execution has been cancelled.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the execution statistics.
    #[inline]
    #[must_use]
    pub fn stats(&self) -> &ExecutionStats {
        &self.stats
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Records that rows were read from a data source.
    #[inline]
    pub fn record_rows_read(&self, count: u64) {
        if self.config.collect_stats {
            self.stats.rows_read.fetch_add(count, Ordering::Relaxed);
        }
    }

    /// Records that values were produced.
    #[inline]
    pub fn record_rows_produced(&self, count: u64) {
        if self.config.collect_stats {
            self.stats.rows_produced.fetch_add(count, Ordering::Relaxed);
        }
    }

    /// Records that values were filtered out.
    #[inline]
    pub fn record_rows_filtered(&self, count: u64) {
        if self.config.collect_stats {
            self.stats.rows_filtered.fetch_add(count, Ordering::Relaxed);
        }
    }

    /// Returns the maximum rows an operator may buffer; 0 disables the
    /// limit.
    #[inline]
    #[must_use]
    pub fn max_rows_in_memory(&self) -> usize {
        self.config.max_rows_in_memory
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("functions", &self.functions)
            .field("cancelled", &self.cancelled)
            .field("stats", &self.stats)
            .field("config", &self.config)
            .finish()
    }
}

/// Execution statistics collected during one execution.
#[derive(Debug)]
pub struct ExecutionStats {
    /// When execution started.
    start_time: Instant,
    /// Number of rows read from data sources.
    rows_read: AtomicU64,
    /// Number of values produced by the pipeline.
    rows_produced: AtomicU64,
    /// Number of values filtered out.
    rows_filtered: AtomicU64,
}

impl ExecutionStats {
    /// Creates new execution statistics.
    #[must_use]
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            rows_read: AtomicU64::new(0),
            rows_produced: AtomicU64::new(0),
            rows_filtered: AtomicU64::new(0),
        }
    }

    /// Returns the number of rows read.
    #[inline]
    #[must_use]
    pub fn rows_read(&self) -> u64 {
        self.rows_read.load(Ordering::Relaxed)
    }

    /// Returns the number of values produced.
    #[inline]
    #[must_use]
    pub fn rows_produced(&self) -> u64 {
        self.rows_produced.load(Ordering::Relaxed)
    }

    /// Returns the number of values filtered out.
    #[inline]
    #[must_use]
    pub fn rows_filtered(&self) -> u64 {
        self.rows_filtered.load(Ordering::Relaxed)
    }

    /// Returns the elapsed execution time.
    #[inline]
    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }
}

impl Default for ExecutionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration options for execution.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Whether to collect statistics.
    pub collect_stats: bool,
    /// Maximum number of values a blocking operator may buffer.
    ///
    /// Sorts, groupings, joins and every other operator that needs the
    /// whole sequence return a `QueryTooLarge` error beyond this limit.
    /// Set to 0 to disable the limit.
    pub max_rows_in_memory: usize,
}

impl ExecutionConfig {
    /// Creates a new configuration with defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self { collect_stats: false, max_rows_in_memory: DEFAULT_MAX_ROWS_IN_MEMORY }
    }

    /// Enables statistics collection.
    #[must_use]
    pub const fn with_stats(mut self) -> Self {
        self.collect_stats = true;
        self
    }

    /// Sets the maximum rows that can be buffered in memory.
    #[must_use]
    pub const fn with_max_rows_in_memory(mut self, limit: usize) -> Self {
        self.max_rows_in_memory = limit;
        self
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self::new()
    }
}
