//! Conversions from external infrastructure errors into domain errors.

use pimsync_domain::PimSyncError;
use r2d2::Error as PoolError;
use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub PimSyncError);

impl From<InfraError> for PimSyncError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<PimSyncError> for InfraError {
    fn from(value: PimSyncError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoPimSyncError {
    fn into_pimsync(self) -> PimSyncError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → PimSyncError */
/* -------------------------------------------------------------------------- */

impl IntoPimSyncError for SqlError {
    fn into_pimsync(self) -> PimSyncError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        PimSyncError::Database("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        PimSyncError::Database("database is locked".into())
                    }
                    (ErrorCode::ConstraintViolation, 1555) | (ErrorCode::ConstraintViolation, 2067) => {
                        PimSyncError::Database("unique constraint violation".into())
                    }
                    (ErrorCode::ConstraintViolation, 787) => {
                        PimSyncError::Schema("foreign key constraint violation".into())
                    }
                    _ => PimSyncError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => PimSyncError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                PimSyncError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                PimSyncError::Database(format!("invalid column type: {ty}"))
            }
            RE::Utf8Error(_) => PimSyncError::Database("invalid UTF-8 returned from sqlite".into()),
            RE::InvalidParameterName(parameter_name) => {
                PimSyncError::Database(format!("invalid parameter name: {parameter_name}"))
            }
            RE::InvalidPath(path) => PimSyncError::Database(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            RE::InvalidQuery => PimSyncError::Database("invalid SQL query".into()),
            other => PimSyncError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_pimsync())
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error → PimSyncError */
/* -------------------------------------------------------------------------- */

impl IntoPimSyncError for PoolError {
    fn into_pimsync(self) -> PimSyncError {
        PimSyncError::Database(format!("connection pool error: {self}"))
    }
}

impl From<PoolError> for InfraError {
    fn from(value: PoolError) -> Self {
        InfraError(value.into_pimsync())
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → PimSyncError */
/* -------------------------------------------------------------------------- */

impl IntoPimSyncError for HttpError {
    fn into_pimsync(self) -> PimSyncError {
        if self.is_timeout() {
            return PimSyncError::Network(format!("http request timed out: {self}"));
        }
        if self.is_connect() {
            return PimSyncError::Network(format!("http connection failed: {self}"));
        }
        if self.is_decode() {
            return PimSyncError::Provider(format!("failed to decode response body: {self}"));
        }
        if self.is_builder() || self.is_request() {
            return PimSyncError::Network(format!("http request failed: {self}"));
        }
        PimSyncError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_pimsync())
    }
}

/* -------------------------------------------------------------------------- */
/* tokio join errors → PimSyncError */
/* -------------------------------------------------------------------------- */

impl IntoPimSyncError for tokio::task::JoinError {
    fn into_pimsync(self) -> PimSyncError {
        PimSyncError::Internal(format!("blocking task join failed: {self}"))
    }
}

impl From<tokio::task::JoinError> for InfraError {
    fn from(value: tokio::task::JoinError) -> Self {
        InfraError(value.into_pimsync())
    }
}
