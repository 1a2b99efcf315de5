//! Read-only access to the `sync_dashboard` view for operator monitoring.

use std::str::FromStr;
use std::sync::Arc;

use pimsync_domain::{DashboardRow, EntityType, PimSyncError, Result, SyncOutcome};
use rusqlite::Row;
use tokio::task;

use super::manager::{map_join_error, map_sql_error, DbManager};

/// Reader for the `sync_dashboard` SQL view.
pub struct SqliteDashboardRepository {
    db: Arc<DbManager>,
}

impl SqliteDashboardRepository {
    /// Construct a repository backed by the shared database manager.
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    /// All dashboard rows, one per known entity type.
    pub async fn rows(&self) -> Result<Vec<DashboardRow>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Vec<DashboardRow>> {
            let conn = db.get_connection()?;
            let mut stmt = conn.prepare(DASHBOARD_SELECT_SQL).map_err(map_sql_error)?;
            let rows = stmt
                .query_map([], map_dashboard_row)
                .map_err(map_sql_error)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(map_sql_error)?;
            rows.into_iter().collect()
        })
        .await
        .map_err(map_join_error)?
    }
}

const DASHBOARD_SELECT_SQL: &str = "SELECT
        entity_type, current_page, items_synced, last_sync_status,
        last_sync_at, minutes_since_last_sync
    FROM sync_dashboard ORDER BY entity_type ASC";

fn map_dashboard_row(row: &Row<'_>) -> rusqlite::Result<Result<DashboardRow>> {
    let entity_type_raw: String = row.get(0)?;
    let current_page: i64 = row.get(1)?;
    let items_synced: i64 = row.get(2)?;
    let last_sync_status_raw: Option<String> = row.get(3)?;
    let last_sync_at: Option<i64> = row.get(4)?;
    let minutes_since_last_sync: Option<i64> = row.get(5)?;

    Ok(parse_dashboard_fields(&entity_type_raw, last_sync_status_raw).map(
        |(entity_type, last_sync_status)| DashboardRow {
            entity_type,
            current_page,
            items_synced,
            last_sync_status,
            last_sync_at,
            minutes_since_last_sync,
        },
    ))
}

fn parse_dashboard_fields(
    entity_type: &str,
    last_sync_status: Option<String>,
) -> Result<(EntityType, Option<SyncOutcome>)> {
    let entity_type = EntityType::from_str(entity_type).map_err(PimSyncError::Database)?;
    let last_sync_status = last_sync_status
        .map(|raw| SyncOutcome::from_str(&raw).map_err(PimSyncError::Database))
        .transpose()?;
    Ok((entity_type, last_sync_status))
}
