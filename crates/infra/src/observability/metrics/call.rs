//! Call-related metrics for tracking worker and scheduler activity
//!
//! Tracks total operation counts and timing samples for percentile
//! reporting.
//!
//! ## Design
//! - **VecDeque ring buffer** for O(1) eviction (not Vec with remove(0))
//! - **Poison-safe locking** with explicit match pattern (no .expect())
//! - **SeqCst ordering** for atomics used in derived metrics
//! - **MetricsResult returns** for future extensibility (currently always Ok)

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::observability::{MetricsError, MetricsResult};

const SAMPLE_CAPACITY: usize = 1000;

/// Metrics for tracking operation counts and timing
///
/// All record methods return `MetricsResult<()>` for future extensibility
/// (cardinality limits, quotas), but currently always succeed.
#[derive(Debug)]
pub struct CallMetrics {
    /// Total number of operations recorded
    pub total_calls: AtomicUsize,
    /// Individual operation times for percentile calculations (ring buffer)
    pub samples_ms: Mutex<VecDeque<u64>>,
}

impl Default for CallMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CallMetrics {
    /// Create new CallMetrics instance
    pub fn new() -> Self {
        Self {
            total_calls: AtomicUsize::new(0),
            samples_ms: Mutex::new(VecDeque::with_capacity(SAMPLE_CAPACITY)),
        }
    }

    /// Record an operation
    pub fn record_call(&self) -> MetricsResult<()> {
        // SeqCst for consistency with derived rates
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Store an operation duration for percentile calculations
    ///
    /// Maintains a ring buffer of the last 1000 samples.
    pub fn record_duration(&self, duration: Duration) -> MetricsResult<()> {
        let ms = duration.as_millis() as u64;

        // Poison-safe locking: explicit match, no .expect()
        let mut samples = match self.samples_ms.lock() {
            Ok(guard) => guard,
            Err(poison_err) => {
                tracing::warn!(
                    metric = "CallMetrics::samples_ms",
                    "Mutex poisoned during duration recording, recovering data"
                );
                poison_err.into_inner()
            }
        };

        samples.push_back(ms);
        if samples.len() > SAMPLE_CAPACITY {
            samples.pop_front();
        }

        Ok(())
    }

    /// Total operations recorded so far
    pub fn get_total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }

    /// P95 operation time in milliseconds
    pub fn get_p95_ms(&self) -> MetricsResult<u64> {
        self.percentile(0.95)
    }

    /// Median operation time in milliseconds
    pub fn get_p50_ms(&self) -> MetricsResult<u64> {
        self.percentile(0.50)
    }

    fn percentile(&self, fraction: f64) -> MetricsResult<u64> {
        let samples = match self.samples_ms.lock() {
            Ok(guard) => guard,
            Err(poison_err) => poison_err.into_inner(),
        };
        if samples.is_empty() {
            return Err(MetricsError::EmptyData { metric: "percentile" });
        }
        let mut sorted: Vec<u64> = samples.iter().copied().collect();
        sorted.sort_unstable();
        let rank = ((sorted.len() as f64 - 1.0) * fraction).round() as usize;
        Ok(sorted[rank.min(sorted.len() - 1)])
    }
}
