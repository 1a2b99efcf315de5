//! Application configuration structures
//!
//! Plain data structs; loading (environment probing, file fallback) lives in
//! the infra config loader.

use serde::{Deserialize, Serialize};

use crate::constants;

/// Top-level application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub provider: ProviderConfig,
    pub sync: SyncConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    pub path: String,
    /// Connection pool size
    pub pool_size: u32,
}

/// External catalog provider (Medipim) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the provider API, e.g. `https://api.au.medipim.com`
    pub base_url: String,
    /// API key identifier (basic auth username)
    pub api_key_id: String,
    /// API key secret (basic auth password)
    pub api_key_secret: String,
}

/// Sync engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Whether background sync is enabled
    pub enabled: bool,
    /// Interval between steady queueing passes, in seconds
    pub steady_interval_seconds: u64,
    /// Maximum queued/in-flight tasks per entity type for the aggressive policy
    pub aggressive_max_in_flight: usize,
    /// Visibility timeout for dequeued tasks, in seconds
    pub visibility_seconds: u64,
    /// Maximum delivery attempts before a task is archived
    pub max_task_attempts: i32,
    /// Deferred relationship resolution batch size
    pub resolver_batch_size: usize,
    /// Stuck sync threshold, in hours
    pub stuck_threshold_hours: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            steady_interval_seconds: constants::DEFAULT_STEADY_SYNC_INTERVAL_SECS,
            aggressive_max_in_flight: constants::DEFAULT_AGGRESSIVE_MAX_IN_FLIGHT,
            visibility_seconds: constants::DEFAULT_VISIBILITY_SECS,
            max_task_attempts: constants::DEFAULT_MAX_TASK_ATTEMPTS,
            resolver_batch_size: constants::DEFAULT_RESOLVER_BATCH_SIZE,
            stuck_threshold_hours: constants::DEFAULT_STUCK_THRESHOLD_HOURS,
        }
    }
}
