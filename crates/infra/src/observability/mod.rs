//! Observability infrastructure for metrics
//!
//! Thread-safe counters and timing metrics for the sync workers and
//! schedulers.
//!
//! ## Design Principles
//!
//! 1. **Poison Recovery**: mutex locks recover poisoned data with a warning
//!    instead of panicking.
//! 2. **Future-Proof Returns**: all record methods return `MetricsResult<()>`
//!    for future extensibility (quotas, validation), but currently always
//!    succeed.
//! 3. **Ring Buffers**: VecDeque for O(1) eviction of timing samples.
//! 4. **Memory Ordering**: SeqCst for derived metrics, Relaxed for
//!    independent counters.

pub mod metrics;

/// Metrics error type
///
/// All metrics recording methods return `MetricsResult<()>` for consistency
/// and future extensibility, but **currently always succeed**.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Empty data set - cannot calculate aggregate metric
    #[error("Empty data: cannot calculate {metric}")]
    EmptyData {
        /// Metric name that failed (e.g., "P95", "average")
        metric: &'static str,
    },
}

/// Result alias for metrics operations
pub type MetricsResult<T> = Result<T, MetricsError>;
