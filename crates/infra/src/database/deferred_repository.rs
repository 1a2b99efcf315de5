//! SQLite-backed implementation of the deferred relationship port.
//!
//! Entries are unique per `(entity_type, entity_id, relationship_type,
//! target id)` via an expression index, which makes re-deferral during
//! re-ingest or repair a no-op. Claims are a timestamp: a single UPDATE
//! claims a batch oldest-first and hides it from other resolvers until the
//! claim goes stale, so two resolvers never drain the same entries (and
//! even if a claim expires mid-flight, the join row upsert downstream is
//! idempotent).

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pimsync_core::DeferredRelationshipStore;
use pimsync_domain::{DeferredRelationship, EntityType, PimSyncError, RelationshipKind, Result};
use rusqlite::{params, Row};
use serde_json::Value;
use tokio::task;

use super::manager::{map_join_error, map_sql_error, now_ms, DbManager};

/// SQLite-backed deferred relationship repository.
pub struct SqliteDeferredRelationshipRepository {
    db: Arc<DbManager>,
}

impl SqliteDeferredRelationshipRepository {
    /// Construct a repository backed by the shared database manager.
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DeferredRelationshipStore for SqliteDeferredRelationshipRepository {
    async fn defer(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        kind: RelationshipKind,
        data: &Value,
    ) -> Result<()> {
        let db = Arc::clone(&self.db);
        let entity_id = entity_id.to_string();
        let data = serde_json::to_string(data)
            .map_err(|e| PimSyncError::Internal(format!("failed to serialize edge data: {e}")))?;

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute(
                DEFERRED_INSERT_SQL,
                params![entity_type.to_string(), entity_id, kind.to_string(), data, now_ms()],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn claim_batch(
        &self,
        limit: usize,
        claim_ttl: Duration,
        max_attempts: i32,
    ) -> Result<Vec<DeferredRelationship>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let db = Arc::clone(&self.db);
        let claim_ttl_ms = claim_ttl.as_millis() as i64;

        task::spawn_blocking(move || -> Result<Vec<DeferredRelationship>> {
            let conn = db.get_connection()?;
            let now = now_ms();
            let mut stmt = conn.prepare(DEFERRED_CLAIM_SQL).map_err(map_sql_error)?;
            let rows = stmt
                .query_map(
                    params![now, max_attempts, now - claim_ttl_ms, limit as i64],
                    map_deferred_row,
                )
                .map_err(map_sql_error)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(map_sql_error)?;
            rows.into_iter().collect()
        })
        .await
        .map_err(map_join_error)?
    }

    async fn complete(&self, id: i64) -> Result<()> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute("DELETE FROM deferred_relationships WHERE id = ?1", params![id])
                .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn release(&self, id: i64) -> Result<()> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute(
                "UPDATE deferred_relationships
                 SET attempts = attempts + 1, claimed_at = NULL
                 WHERE id = ?1",
                params![id],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn unresolved(&self, min_attempts: i32) -> Result<Vec<DeferredRelationship>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Vec<DeferredRelationship>> {
            let conn = db.get_connection()?;
            let mut stmt = conn.prepare(DEFERRED_UNRESOLVED_SQL).map_err(map_sql_error)?;
            let rows = stmt
                .query_map(params![min_attempts], map_deferred_row)
                .map_err(map_sql_error)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(map_sql_error)?;
            rows.into_iter().collect()
        })
        .await
        .map_err(map_join_error)?
    }

    async fn count(&self) -> Result<usize> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<usize> {
            let conn = db.get_connection()?;
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM deferred_relationships", [], |row| row.get(0))
                .map_err(map_sql_error)?;
            Ok(count as usize)
        })
        .await
        .map_err(map_join_error)?
    }
}

const DEFERRED_INSERT_SQL: &str = "INSERT OR IGNORE INTO deferred_relationships (
        entity_type, entity_id, relationship_type, relationship_data, attempts,
        claimed_at, created_at
    ) VALUES (?1, ?2, ?3, ?4, 0, NULL, ?5)";

const DEFERRED_CLAIM_SQL: &str = "UPDATE deferred_relationships
    SET claimed_at = ?1
    WHERE id IN (
        SELECT id FROM deferred_relationships
        WHERE attempts < ?2
          AND (claimed_at IS NULL OR claimed_at <= ?3)
        ORDER BY created_at ASC, id ASC
        LIMIT ?4
    )
    RETURNING id, entity_type, entity_id, relationship_type, relationship_data,
              attempts, claimed_at, created_at";

const DEFERRED_UNRESOLVED_SQL: &str = "SELECT
        id, entity_type, entity_id, relationship_type, relationship_data,
        attempts, claimed_at, created_at
    FROM deferred_relationships
    WHERE attempts >= ?1
    ORDER BY created_at ASC, id ASC";

fn map_deferred_row(row: &Row<'_>) -> rusqlite::Result<Result<DeferredRelationship>> {
    let id: i64 = row.get(0)?;
    let entity_type_raw: String = row.get(1)?;
    let entity_id: String = row.get(2)?;
    let relationship_type_raw: String = row.get(3)?;
    let relationship_data_raw: String = row.get(4)?;
    let attempts: i32 = row.get(5)?;
    let claimed_at: Option<i64> = row.get(6)?;
    let created_at: i64 = row.get(7)?;

    Ok(parse_deferred_fields(
        &entity_type_raw,
        &relationship_type_raw,
        &relationship_data_raw,
    )
    .map(|(entity_type, relationship_type, relationship_data)| DeferredRelationship {
        id,
        entity_type,
        entity_id,
        relationship_type,
        relationship_data,
        attempts,
        claimed_at,
        created_at,
    }))
}

fn parse_deferred_fields(
    entity_type: &str,
    relationship_type: &str,
    relationship_data: &str,
) -> Result<(EntityType, RelationshipKind, Value)> {
    let entity_type = EntityType::from_str(entity_type).map_err(PimSyncError::Database)?;
    let relationship_type =
        RelationshipKind::from_str(relationship_type).map_err(PimSyncError::Database)?;
    let relationship_data = serde_json::from_str(relationship_data)
        .map_err(|e| PimSyncError::Database(format!("stored edge data is not valid JSON: {e}")))?;
    Ok((entity_type, relationship_type, relationship_data))
}
