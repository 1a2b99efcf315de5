//! SQLite-backed implementation of the sync state port.
//!
//! Each entity type owns exactly one row. Every transition funnels through
//! a single UPDATE whose WHERE clause checks the current status, which is
//! what serializes concurrent writers per entity type; `updated_at` is
//! bumped to `MAX(now, updated_at + 1)` so it strictly increases even when
//! two transitions land in the same millisecond.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pimsync_core::SyncStateStore;
use pimsync_domain::{
    ChunkStatus, EntityType, PimSyncError, Result, SyncOutcome, SyncState,
};
use rusqlite::{params, Row};
use tokio::task;

use super::manager::{map_join_error, map_sql_error, now_ms, DbConnection, DbManager};

/// SQLite-backed sync state repository.
pub struct SqliteSyncStateRepository {
    db: Arc<DbManager>,
}

impl SqliteSyncStateRepository {
    /// Construct a repository backed by the shared database manager.
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    fn ensure_row(conn: &DbConnection, entity_type: EntityType) -> Result<()> {
        conn.execute(STATE_ENSURE_SQL, params![entity_type.to_string(), now_ms()])
            .map_err(map_sql_error)?;
        Ok(())
    }

    fn fetch(conn: &DbConnection, entity_type: EntityType) -> Result<Option<SyncState>> {
        let mut stmt = conn.prepare(STATE_SELECT_SQL).map_err(map_sql_error)?;
        let mut rows = stmt
            .query_map(params![entity_type.to_string()], map_state_row)
            .map_err(map_sql_error)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(map_sql_error)?;
        rows.pop().transpose()
    }
}

#[async_trait]
impl SyncStateStore for SqliteSyncStateRepository {
    async fn ensure(&self, entity_type: EntityType) -> Result<SyncState> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<SyncState> {
            let conn = db.get_connection()?;
            Self::ensure_row(&conn, entity_type)?;
            Self::fetch(&conn, entity_type)?.ok_or_else(|| {
                PimSyncError::Internal(format!("sync state row missing for {entity_type}"))
            })
        })
        .await
        .map_err(map_join_error)?
    }

    async fn get(&self, entity_type: EntityType) -> Result<Option<SyncState>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Option<SyncState>> {
            let conn = db.get_connection()?;
            Self::fetch(&conn, entity_type)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn list(&self) -> Result<Vec<SyncState>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Vec<SyncState>> {
            let conn = db.get_connection()?;
            let mut stmt = conn.prepare(STATE_LIST_SQL).map_err(map_sql_error)?;
            let rows = stmt
                .query_map([], map_state_row)
                .map_err(map_sql_error)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(map_sql_error)?;
            rows.into_iter().collect()
        })
        .await
        .map_err(map_join_error)?
    }

    async fn current_cursor(&self, entity_type: EntityType) -> Result<i64> {
        Ok(self.get(entity_type).await?.map_or(0, |state| state.current_page))
    }

    async fn transition(
        &self,
        entity_type: EntityType,
        from: &[ChunkStatus],
        to: ChunkStatus,
    ) -> Result<bool> {
        let db = Arc::clone(&self.db);
        let from: Vec<String> = from.iter().map(ToString::to_string).collect();

        task::spawn_blocking(move || -> Result<bool> {
            let conn = db.get_connection()?;
            Self::ensure_row(&conn, entity_type)?;

            // status names come from the domain enum, so inlining them is
            // safe and keeps the remaining parameters typed
            let status_list =
                from.iter().map(|s| format!("'{s}'")).collect::<Vec<_>>().join(", ");
            let sql = format!(
                "UPDATE sync_state
                 SET chunk_status = ?1, updated_at = MAX(?2, updated_at + 1)
                 WHERE entity_type = ?3 AND chunk_status IN ({status_list})"
            );

            let changed = conn
                .execute(&sql, params![to.to_string(), now_ms(), entity_type.to_string()])
                .map_err(map_sql_error)?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn advance(
        &self,
        entity_type: EntityType,
        completed_page: i64,
        has_more: bool,
        items: usize,
    ) -> Result<()> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            Self::ensure_row(&conn, entity_type)?;

            let next_page = if has_more { completed_page + 1 } else { completed_page };
            let outcome =
                if has_more { SyncOutcome::Success } else { SyncOutcome::Complete };
            let now = now_ms();

            conn.execute(
                STATE_ADVANCE_SQL,
                params![
                    next_page,
                    outcome.to_string(),
                    now,
                    items as i64,
                    now,
                    entity_type.to_string()
                ],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn mark_result(&self, entity_type: EntityType, outcome: SyncOutcome) -> Result<()> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            Self::ensure_row(&conn, entity_type)?;

            let now = now_ms();
            if outcome == SyncOutcome::Error {
                conn.execute(STATE_MARK_ERROR_SQL, params![now, now, entity_type.to_string()])
                    .map_err(map_sql_error)?;
            } else {
                conn.execute(
                    STATE_MARK_RESULT_SQL,
                    params![outcome.to_string(), now, now, entity_type.to_string()],
                )
                .map_err(map_sql_error)?;
            }
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn reset_if_stale(&self, entity_type: EntityType, older_than: Duration) -> Result<bool> {
        let db = Arc::clone(&self.db);
        let older_than_ms = older_than.as_millis() as i64;

        task::spawn_blocking(move || -> Result<bool> {
            let conn = db.get_connection()?;
            let now = now_ms();
            let changed = conn
                .execute(
                    STATE_RESET_STALE_SQL,
                    params![now, entity_type.to_string(), now - older_than_ms],
                )
                .map_err(map_sql_error)?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn set_sync_count(&self, entity_type: EntityType, count: i64) -> Result<bool> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<bool> {
            let conn = db.get_connection()?;
            Self::ensure_row(&conn, entity_type)?;
            let changed = conn
                .execute(
                    STATE_SET_COUNT_SQL,
                    params![count, now_ms(), entity_type.to_string(), count],
                )
                .map_err(map_sql_error)?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_join_error)?
    }
}

const STATE_ENSURE_SQL: &str = "INSERT OR IGNORE INTO sync_state (
        entity_type, current_page, chunk_status, sync_count, updated_at
    ) VALUES (?1, 0, 'idle', 0, ?2)";

const STATE_SELECT_SQL: &str = "SELECT
        entity_type, current_page, chunk_status, last_sync_status,
        last_sync_timestamp, sync_count, updated_at
    FROM sync_state WHERE entity_type = ?1";

const STATE_LIST_SQL: &str = "SELECT
        entity_type, current_page, chunk_status, last_sync_status,
        last_sync_timestamp, sync_count, updated_at
    FROM sync_state ORDER BY entity_type ASC";

// current_page never regresses: MAX guards against late or duplicate
// deliveries of an already-completed page.
const STATE_ADVANCE_SQL: &str = "UPDATE sync_state SET
        current_page = MAX(current_page, ?1),
        chunk_status = 'done',
        last_sync_status = ?2,
        last_sync_timestamp = ?3,
        sync_count = sync_count + ?4,
        updated_at = MAX(?5, updated_at + 1)
    WHERE entity_type = ?6";

const STATE_MARK_RESULT_SQL: &str = "UPDATE sync_state SET
        last_sync_status = ?1,
        last_sync_timestamp = ?2,
        updated_at = MAX(?3, updated_at + 1)
    WHERE entity_type = ?4";

const STATE_MARK_ERROR_SQL: &str = "UPDATE sync_state SET
        chunk_status = 'error',
        last_sync_status = 'error',
        last_sync_timestamp = ?1,
        updated_at = MAX(?2, updated_at + 1)
    WHERE entity_type = ?3";

const STATE_RESET_STALE_SQL: &str = "UPDATE sync_state SET
        chunk_status = 'idle',
        updated_at = MAX(?1, updated_at + 1)
    WHERE entity_type = ?2
      AND chunk_status IN ('fetching', 'processing')
      AND updated_at <= ?3";

const STATE_SET_COUNT_SQL: &str = "UPDATE sync_state SET
        sync_count = ?1,
        updated_at = MAX(?2, updated_at + 1)
    WHERE entity_type = ?3 AND sync_count != ?4";

fn map_state_row(row: &Row<'_>) -> rusqlite::Result<Result<SyncState>> {
    let entity_type_raw: String = row.get(0)?;
    let current_page: i64 = row.get(1)?;
    let chunk_status_raw: String = row.get(2)?;
    let last_sync_status_raw: Option<String> = row.get(3)?;
    let last_sync_timestamp: Option<i64> = row.get(4)?;
    let sync_count: i64 = row.get(5)?;
    let updated_at: i64 = row.get(6)?;

    Ok(parse_state_fields(&entity_type_raw, &chunk_status_raw, last_sync_status_raw).map(
        |(entity_type, chunk_status, last_sync_status)| SyncState {
            entity_type,
            current_page,
            chunk_status,
            last_sync_status,
            last_sync_timestamp,
            sync_count,
            updated_at,
        },
    ))
}

fn parse_state_fields(
    entity_type: &str,
    chunk_status: &str,
    last_sync_status: Option<String>,
) -> Result<(EntityType, ChunkStatus, Option<SyncOutcome>)> {
    let entity_type = EntityType::from_str(entity_type).map_err(PimSyncError::Database)?;
    let chunk_status = ChunkStatus::from_str(chunk_status).map_err(PimSyncError::Database)?;
    let last_sync_status = last_sync_status
        .map(|raw| SyncOutcome::from_str(&raw).map_err(PimSyncError::Database))
        .transpose()?;
    Ok((entity_type, chunk_status, last_sync_status))
}
