//! Metrics collection modules
//!
//! Thread-safe metrics for various subsystems.

pub mod call;
pub mod fetch;
pub mod performance;

// Re-export metric types for convenience
pub use call::CallMetrics;
pub use fetch::FetchMetrics;
pub use performance::PerformanceMetrics;
