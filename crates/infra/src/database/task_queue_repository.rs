//! SQLite-backed implementation of the task queue port.
//!
//! Models a durable message queue on the `sync_tasks` table with visibility
//! timeout semantics: a read claims rows by pushing `visible_at` into the
//! future inside a single UPDATE, so a crashed worker's tasks surface again
//! once the window expires. Acknowledged tasks are deleted; terminally
//! failed tasks move to `sync_tasks_archive`.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pimsync_core::TaskQueue;
use pimsync_domain::{
    EntityType, PimSyncError, QueuedSyncTask, Result, SortingFormat, SyncTask,
};
use rusqlite::{params, Row};
use tokio::task;

use super::manager::{map_join_error, map_sql_error, now_ms, DbManager};

/// SQLite-backed task queue repository.
pub struct SqliteTaskQueueRepository {
    db: Arc<DbManager>,
}

impl SqliteTaskQueueRepository {
    /// Construct a repository backed by the shared database manager.
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TaskQueue for SqliteTaskQueueRepository {
    async fn send(&self, task: &SyncTask) -> Result<i64> {
        let db = Arc::clone(&self.db);
        let task = task.clone();

        task::spawn_blocking(move || -> Result<i64> {
            let conn = db.get_connection()?;
            let now = now_ms();
            conn.execute(
                TASK_INSERT_SQL,
                params![
                    task.entity_type.to_string(),
                    task.page,
                    task.sorting_format.to_string(),
                    now,
                    now
                ],
            )
            .map_err(map_sql_error)?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn read(&self, visibility: Duration, limit: usize) -> Result<Vec<QueuedSyncTask>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let db = Arc::clone(&self.db);
        let visibility_ms = visibility.as_millis() as i64;

        task::spawn_blocking(move || -> Result<Vec<QueuedSyncTask>> {
            let conn = db.get_connection()?;
            let now = now_ms();
            let mut stmt = conn.prepare(TASK_CLAIM_SQL).map_err(map_sql_error)?;
            let rows = stmt
                .query_map(params![now + visibility_ms, now, limit as i64], map_task_row)
                .map_err(map_sql_error)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(map_sql_error)?;
            rows.into_iter().collect()
        })
        .await
        .map_err(map_join_error)?
    }

    async fn delete(&self, task_id: i64) -> Result<()> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute("DELETE FROM sync_tasks WHERE id = ?1", params![task_id])
                .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn nack(&self, task_id: i64, delay: Duration) -> Result<()> {
        let db = Arc::clone(&self.db);
        let delay_ms = delay.as_millis() as i64;

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            let changed = conn
                .execute(
                    "UPDATE sync_tasks SET visible_at = ?1 WHERE id = ?2",
                    params![now_ms() + delay_ms, task_id],
                )
                .map_err(map_sql_error)?;
            if changed == 0 {
                return Err(PimSyncError::NotFound(format!("task {task_id} not in queue")));
            }
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn archive(&self, task_id: i64) -> Result<()> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<()> {
            let mut conn = db.get_connection()?;
            let tx = conn.transaction().map_err(map_sql_error)?;
            tx.execute(TASK_ARCHIVE_SQL, params![now_ms(), task_id]).map_err(map_sql_error)?;
            tx.execute("DELETE FROM sync_tasks WHERE id = ?1", params![task_id])
                .map_err(map_sql_error)?;
            tx.commit().map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn pending_count(&self, entity_type: EntityType) -> Result<usize> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<usize> {
            let conn = db.get_connection()?;
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sync_tasks WHERE entity_type = ?1",
                    params![entity_type.to_string()],
                    |row| row.get(0),
                )
                .map_err(map_sql_error)?;
            Ok(count as usize)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn purge_archive(&self, older_than: Duration) -> Result<usize> {
        let db = Arc::clone(&self.db);
        let cutoff_ms = older_than.as_millis() as i64;

        task::spawn_blocking(move || -> Result<usize> {
            let conn = db.get_connection()?;
            conn.execute(
                "DELETE FROM sync_tasks_archive WHERE archived_at < ?1",
                params![now_ms() - cutoff_ms],
            )
            .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

const TASK_INSERT_SQL: &str = "INSERT INTO sync_tasks (
        entity_type, page, sorting_format, attempts, enqueued_at, visible_at
    ) VALUES (?1, ?2, ?3, 0, ?4, ?5)";

// Claim-and-return in one statement so concurrent readers never hand out the
// same task twice.
const TASK_CLAIM_SQL: &str = "UPDATE sync_tasks
    SET visible_at = ?1, attempts = attempts + 1
    WHERE id IN (
        SELECT id FROM sync_tasks
        WHERE visible_at <= ?2
        ORDER BY enqueued_at ASC, id ASC
        LIMIT ?3
    )
    RETURNING id, entity_type, page, sorting_format, attempts, enqueued_at, visible_at";

const TASK_ARCHIVE_SQL: &str = "INSERT OR IGNORE INTO sync_tasks_archive (
        id, entity_type, page, sorting_format, attempts, enqueued_at, archived_at
    )
    SELECT id, entity_type, page, sorting_format, attempts, enqueued_at, ?1
    FROM sync_tasks WHERE id = ?2";

fn map_task_row(row: &Row<'_>) -> rusqlite::Result<Result<QueuedSyncTask>> {
    let id: i64 = row.get(0)?;
    let entity_type_raw: String = row.get(1)?;
    let page: i64 = row.get(2)?;
    let sorting_format_raw: String = row.get(3)?;
    let attempts: i32 = row.get(4)?;
    let enqueued_at: i64 = row.get(5)?;
    let visible_at: i64 = row.get(6)?;

    Ok(parse_task_fields(&entity_type_raw, &sorting_format_raw).map(
        |(entity_type, sorting_format)| QueuedSyncTask {
            id,
            task: SyncTask { entity_type, page, sorting_format },
            attempts,
            enqueued_at,
            visible_at,
        },
    ))
}

fn parse_task_fields(
    entity_type: &str,
    sorting_format: &str,
) -> Result<(EntityType, SortingFormat)> {
    let entity_type = EntityType::from_str(entity_type).map_err(PimSyncError::Database)?;
    let sorting_format = SortingFormat::from_str(sorting_format).map_err(PimSyncError::Database)?;
    Ok((entity_type, sorting_format))
}
