//! Performance metrics aggregator
//!
//! Holds the individual metric types and provides convenience methods for
//! the recording sites in the workers and schedulers.

use std::time::Duration;

use super::{CallMetrics, FetchMetrics};
use crate::observability::MetricsResult;

/// Performance metrics for tracking infrastructure operations
#[derive(Debug, Default)]
pub struct PerformanceMetrics {
    /// Operation counts and timing
    pub call: CallMetrics,
    /// Provider fetch metrics (timing, errors, timeouts)
    pub fetch: FetchMetrics,
}

impl PerformanceMetrics {
    /// Create new PerformanceMetrics instance
    ///
    /// All individual metrics are initialized to zero/empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an operation
    pub fn record_call(&self) -> MetricsResult<()> {
        self.call.record_call()
    }

    /// Record an operation duration sample
    pub fn record_duration(&self, duration: Duration) -> MetricsResult<()> {
        self.call.record_duration(duration)
    }

    /// Record a provider fetch time
    pub fn record_fetch_time(&self, duration: Duration) -> MetricsResult<()> {
        self.fetch.record_fetch_time(duration)
    }

    /// Record a provider fetch error
    pub fn record_fetch_error(&self) -> MetricsResult<()> {
        self.fetch.record_error()
    }

    /// Record a provider fetch timeout
    pub fn record_fetch_timeout(&self) -> MetricsResult<()> {
        self.fetch.record_timeout()
    }
}
