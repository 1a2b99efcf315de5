//! Application constants
//!
//! Centralized location for all domain-level constants used throughout the
//! application.

// Pagination
pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const MAX_PAGE_SIZE: u32 = 250;

// Task queue configuration
pub const QUEUE_NAME: &str = "catalog_sync";
pub const DEFAULT_VISIBILITY_SECS: u64 = 300;
pub const DEFAULT_QUEUE_READ_BATCH: usize = 10;
pub const DEFAULT_MAX_TASK_ATTEMPTS: i32 = 5;
pub const DEFAULT_ARCHIVE_RETENTION_DAYS: u32 = 7;

// Queueing policies
pub const DEFAULT_STEADY_SYNC_INTERVAL_SECS: u64 = 900;
pub const DEFAULT_AGGRESSIVE_MAX_IN_FLIGHT: usize = 5;

// Deferred relationship resolution
pub const DEFAULT_RESOLVER_BATCH_SIZE: usize = 100;
pub const DEFAULT_RESOLVER_MAX_ATTEMPTS: i32 = 5;
pub const DEFAULT_RESOLVER_CLAIM_SECS: u64 = 60;

// Recovery
pub const DEFAULT_STUCK_THRESHOLD_HOURS: u32 = 2;
