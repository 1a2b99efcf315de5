//! Fetch-related metrics for tracking provider retrieval performance
//!
//! Tracks timing, errors, and timeouts for outbound page fetches.
//!
//! ## Design
//! - **SeqCst ordering** for atomics used in derived metrics (avg fetch time)
//! - **No locking needed** - simple atomic counters
//! - **MetricsResult returns** for future extensibility (currently always Ok)
//! - **Microsecond storage** - stores raw durations in µs, reporting helpers
//!   convert to ms

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crate::observability::MetricsResult;

/// Metrics for tracking data fetch performance
///
/// All record methods return `MetricsResult<()>` for future extensibility
/// (quotas, validation), but currently always succeed.
#[derive(Debug, Default)]
pub struct FetchMetrics {
    /// Total time spent fetching data in microseconds
    pub total_fetch_time_micros: AtomicU64,
    /// Last fetch time in microseconds
    pub last_fetch_time_micros: AtomicU64,
    /// Number of fetch operations recorded
    pub fetch_count: AtomicUsize,
    /// Number of errors encountered
    pub errors: AtomicUsize,
    /// Number of timeouts encountered
    pub timeouts: AtomicUsize,
}

impl FetchMetrics {
    /// Create new FetchMetrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fetch time
    pub fn record_fetch_time(&self, duration: Duration) -> MetricsResult<()> {
        let micros = duration.as_micros() as u64;

        // SeqCst for consistency with avg_fetch_time calculation
        self.total_fetch_time_micros.fetch_add(micros, Ordering::SeqCst);
        self.fetch_count.fetch_add(1, Ordering::SeqCst);

        // Relaxed OK: last_fetch_time is not used in derived metrics
        self.last_fetch_time_micros.store(micros, Ordering::Relaxed);

        Ok(())
    }

    /// Record an error
    pub fn record_error(&self) -> MetricsResult<()> {
        // Relaxed OK: independent counter
        self.errors.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Record a timeout
    pub fn record_timeout(&self) -> MetricsResult<()> {
        // Relaxed OK: independent counter
        self.timeouts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Get the average fetch time in milliseconds
    ///
    /// Returns 0.0 if no fetch operations have been recorded.
    pub fn get_avg_fetch_time_ms(&self) -> f64 {
        // SeqCst for consistent snapshot
        let total_time = self.total_fetch_time_micros.load(Ordering::SeqCst);
        let count = self.fetch_count.load(Ordering::SeqCst);

        if count == 0 {
            return 0.0;
        }

        (total_time as f64 / count as f64) / 1_000.0
    }

    /// Get the last fetch time in milliseconds
    pub fn get_last_fetch_time_ms(&self) -> f64 {
        self.last_fetch_time_micros.load(Ordering::Relaxed) as f64 / 1_000.0
    }

    /// Number of recorded errors
    pub fn get_error_count(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }

    /// Number of recorded timeouts
    pub fn get_timeout_count(&self) -> usize {
        self.timeouts.load(Ordering::Relaxed)
    }
}
