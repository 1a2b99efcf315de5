//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If incomplete, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `PIMSYNC_DB_PATH`: Database file path
//! - `PIMSYNC_DB_POOL_SIZE`: Connection pool size
//! - `PIMSYNC_API_BASE_URL`: Provider API base URL
//! - `PIMSYNC_API_KEY_ID`: Provider API key identifier
//! - `PIMSYNC_API_KEY_SECRET`: Provider API key secret
//! - `PIMSYNC_SYNC_ENABLED`: Whether background sync is enabled (true/false)
//! - `PIMSYNC_SYNC_INTERVAL`: Steady sync interval in seconds (optional)
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./config.json` or `./config.toml` (current working directory)
//! 2. `./pimsync.json` or `./pimsync.toml` (current working directory)
//! 3. `../config.json` or `../config.toml` (parent directory)
//! 4. Relative to executable location

use std::path::{Path, PathBuf};

use pimsync_domain::{
    Config, DatabaseConfig, PimSyncError, ProviderConfig, Result, SyncConfig,
};

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If any required
/// variables are missing, falls back to loading from a config file.
///
/// # Errors
/// Returns `PimSyncError::Config` if:
/// - Configuration cannot be loaded from either source
/// - File format is invalid
/// - Required fields are missing
pub fn load() -> Result<Config> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// All required environment variables must be present. Returns an error
/// if any are missing.
///
/// # Errors
/// Returns `PimSyncError::Config` if required variables are missing
/// or have invalid values.
pub fn load_from_env() -> Result<Config> {
    let db_path = env_var("PIMSYNC_DB_PATH")?;
    let db_pool_size = env_var("PIMSYNC_DB_POOL_SIZE").and_then(|s| {
        s.parse::<u32>().map_err(|e| PimSyncError::Config(format!("Invalid pool size: {}", e)))
    })?;

    let base_url = env_var("PIMSYNC_API_BASE_URL")?;
    let api_key_id = env_var("PIMSYNC_API_KEY_ID")?;
    let api_key_secret = env_var("PIMSYNC_API_KEY_SECRET")?;

    let mut sync = SyncConfig { enabled: env_bool("PIMSYNC_SYNC_ENABLED", true), ..SyncConfig::default() };
    if let Ok(interval) = std::env::var("PIMSYNC_SYNC_INTERVAL") {
        sync.steady_interval_seconds = interval
            .parse::<u64>()
            .map_err(|e| PimSyncError::Config(format!("Invalid sync interval: {}", e)))?;
    }

    Ok(Config {
        database: DatabaseConfig { path: db_path, pool_size: db_pool_size },
        provider: ProviderConfig { base_url, api_key_id, api_key_secret },
        sync,
    })
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `PimSyncError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
/// - Required fields are missing
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(PimSyncError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            PimSyncError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| PimSyncError::Config(format!("Failed to read config file: {}", e)))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| PimSyncError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| PimSyncError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(PimSyncError::Config(format!("Unsupported config format: {}", extension))),
    }
}

/// Probe multiple paths for configuration files
///
/// Searches the current working directory, parent directories, and the
/// executable's directory for `config.{json,toml}` or
/// `pimsync.{json,toml}`.
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(vec![
            cwd.join("config.json"),
            cwd.join("config.toml"),
            cwd.join("pimsync.json"),
            cwd.join("pimsync.toml"),
            cwd.join("../config.json"),
            cwd.join("../config.toml"),
        ]);
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend(vec![
                exe_dir.join("config.json"),
                exe_dir.join("config.toml"),
                exe_dir.join("pimsync.json"),
                exe_dir.join("pimsync.toml"),
            ]);
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

/// Get required environment variable
fn env_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| PimSyncError::Config(format!("Missing environment variable: {}", name)))
}

/// Get boolean environment variable with default
fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}
