//! SQLite-backed implementation of the sync error log port.
//!
//! Append-only: rows are inserted and read, never updated or deleted.

use std::sync::Arc;

use async_trait::async_trait;
use pimsync_core::SyncErrorLog;
use pimsync_domain::{PimSyncError, Result, SyncErrorRecord};
use rusqlite::{params, Row};
use serde_json::Value;
use tokio::task;

use super::manager::{map_join_error, map_sql_error, now_ms, DbManager};

/// SQLite-backed sync error repository.
pub struct SqliteSyncErrorRepository {
    db: Arc<DbManager>,
}

impl SqliteSyncErrorRepository {
    /// Construct a repository backed by the shared database manager.
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SyncErrorLog for SqliteSyncErrorRepository {
    async fn record(
        &self,
        sync_type: &str,
        message: &str,
        error_data: Option<&Value>,
    ) -> Result<()> {
        let db = Arc::clone(&self.db);
        let sync_type = sync_type.to_string();
        let message = message.to_string();
        let error_data = error_data
            .map(|data| {
                serde_json::to_string(data).map_err(|e| {
                    PimSyncError::Internal(format!("failed to serialize error data: {e}"))
                })
            })
            .transpose()?;

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute(
                "INSERT INTO sync_errors (sync_type, error_message, error_data, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![sync_type, message, error_data, now_ms()],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn recent(&self, limit: usize) -> Result<Vec<SyncErrorRecord>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Vec<SyncErrorRecord>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(
                    "SELECT id, sync_type, error_message, error_data, created_at
                     FROM sync_errors ORDER BY created_at DESC, id DESC LIMIT ?1",
                )
                .map_err(map_sql_error)?;
            let rows = stmt
                .query_map(params![limit as i64], map_error_row)
                .map_err(map_sql_error)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(map_sql_error)?;
            rows.into_iter().collect()
        })
        .await
        .map_err(map_join_error)?
    }
}

fn map_error_row(row: &Row<'_>) -> rusqlite::Result<Result<SyncErrorRecord>> {
    let id: i64 = row.get(0)?;
    let sync_type: Option<String> = row.get(1)?;
    let error_message: Option<String> = row.get(2)?;
    let error_data_raw: Option<String> = row.get(3)?;
    let created_at: i64 = row.get(4)?;

    let error_data = match error_data_raw {
        Some(raw) => match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                Err(PimSyncError::Database(format!("stored error data is not valid JSON: {e}")))
            }
        },
        None => Ok(None),
    };

    Ok(error_data.map(|error_data| SyncErrorRecord {
        id,
        sync_type: sync_type.unwrap_or_default(),
        error_message: error_message.unwrap_or_default(),
        error_data,
        created_at,
    }))
}
