//! Sync-specific error types
//!
//! Provides error classification for sync operations with retry metadata.

use pimsync_domain::PimSyncError;
use thiserror::Error;

/// Categories of sync errors for retry logic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncErrorCategory {
    /// Authentication errors (401, 403) - retry after key rotation
    Authentication,
    /// Rate limiting errors (429) - retry with backoff
    RateLimit,
    /// Provider server errors (5xx) - retryable
    Server,
    /// Client errors (4xx except auth) - non-retryable
    Client,
    /// Network/connection errors - retryable
    Network,
    /// Database errors - may be retryable
    Database,
    /// Schema/configuration errors - non-retryable
    Schema,
}

/// Sync operation errors
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Client error: {0}")]
    Client(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Schema violation: {0}")]
    Schema(String),

    #[error("Timeout after {0:?}")]
    Timeout(std::time::Duration),
}

impl SyncError {
    /// Get the error category for this error
    pub fn category(&self) -> SyncErrorCategory {
        match self {
            Self::Auth(_) => SyncErrorCategory::Authentication,
            Self::RateLimit(_) => SyncErrorCategory::RateLimit,
            Self::Server(_) => SyncErrorCategory::Server,
            Self::Client(_) => SyncErrorCategory::Client,
            Self::Network(_) | Self::Timeout(_) => SyncErrorCategory::Network,
            Self::Database(_) => SyncErrorCategory::Database,
            Self::Schema(_) => SyncErrorCategory::Schema,
        }
    }

    /// Check if this error should be retried
    pub fn should_retry(&self) -> bool {
        matches!(
            self.category(),
            SyncErrorCategory::Authentication
                | SyncErrorCategory::RateLimit
                | SyncErrorCategory::Server
                | SyncErrorCategory::Network
                | SyncErrorCategory::Database
        )
    }

    /// Get suggested retry delay in seconds
    pub fn retry_delay_secs(&self) -> u64 {
        match self.category() {
            SyncErrorCategory::Authentication => 30, // wait out a key rotation
            SyncErrorCategory::RateLimit => 60,      // wait for rate limit window
            SyncErrorCategory::Server => 10,         // moderate delay for provider issues
            SyncErrorCategory::Network => 5,         // quick retry for network
            SyncErrorCategory::Database => 2,        // quick retry for DB
            SyncErrorCategory::Client | SyncErrorCategory::Schema => 0, // no retry
        }
    }
}

/// Convert from PimSyncError to SyncError
impl From<PimSyncError> for SyncError {
    fn from(err: PimSyncError) -> Self {
        match err {
            PimSyncError::Database(message) => Self::Database(message),
            PimSyncError::Network(message) => Self::Network(message),
            PimSyncError::Provider(message) => {
                if message.contains("authentication rejected") {
                    Self::Auth(message)
                } else if message.contains("rate limited") {
                    Self::RateLimit(message)
                } else {
                    Self::Server(message)
                }
            }
            PimSyncError::NotFound(message) | PimSyncError::InvalidInput(message) => {
                Self::Client(message)
            }
            PimSyncError::Schema(message) | PimSyncError::Config(message) => Self::Schema(message),
            PimSyncError::Internal(message) => Self::Server(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(
            SyncError::Auth("test".to_string()).category(),
            SyncErrorCategory::Authentication
        );
        assert_eq!(
            SyncError::RateLimit("test".to_string()).category(),
            SyncErrorCategory::RateLimit
        );
        assert_eq!(SyncError::Server("test".to_string()).category(), SyncErrorCategory::Server);
        assert_eq!(SyncError::Network("test".to_string()).category(), SyncErrorCategory::Network);
        assert_eq!(SyncError::Schema("test".to_string()).category(), SyncErrorCategory::Schema);
    }

    #[test]
    fn test_should_retry() {
        assert!(SyncError::Auth("test".to_string()).should_retry());
        assert!(SyncError::RateLimit("test".to_string()).should_retry());
        assert!(SyncError::Server("test".to_string()).should_retry());
        assert!(SyncError::Network("test".to_string()).should_retry());
        assert!(!SyncError::Client("test".to_string()).should_retry());
        assert!(!SyncError::Schema("test".to_string()).should_retry());
    }

    #[test]
    fn test_retry_delays() {
        assert_eq!(SyncError::RateLimit("test".to_string()).retry_delay_secs(), 60);
        assert_eq!(SyncError::Server("test".to_string()).retry_delay_secs(), 10);
        assert_eq!(SyncError::Network("test".to_string()).retry_delay_secs(), 5);
        assert_eq!(SyncError::Client("test".to_string()).retry_delay_secs(), 0);
    }

    #[test]
    fn provider_errors_classify_by_message() {
        let auth: SyncError =
            PimSyncError::Provider("authentication rejected (401)".into()).into();
        assert_eq!(auth.category(), SyncErrorCategory::Authentication);

        let rate: SyncError = PimSyncError::Provider("rate limited (429)".into()).into();
        assert_eq!(rate.category(), SyncErrorCategory::RateLimit);

        let server: SyncError = PimSyncError::Provider("server error (500)".into()).into();
        assert_eq!(server.category(), SyncErrorCategory::Server);
    }
}
