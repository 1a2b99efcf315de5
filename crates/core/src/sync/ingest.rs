//! Response processing
//!
//! Ingests one fetched catalog page: projects every item, upserts the
//! catalog row, and resolves embedded relationship edges immediately where
//! the target row exists, deferring the rest. A malformed item never aborts
//! the batch; it is counted, logged to the error log, and processing
//! continues. Re-ingesting the same page is idempotent.

use std::sync::Arc;

use pimsync_domain::{
    CatalogPage, CatalogRecord, EntityType, IngestReport, RelationshipKind, Result, SyncTask,
    UpsertOutcome,
};
use serde_json::Value;
use tracing::{debug, warn};

use super::ports::{CatalogStore, DeferredRelationshipStore, SyncErrorLog, SyncStateStore};
use super::projection;

/// Ingests fetched pages into the catalog store.
pub struct ResponseProcessor {
    catalog: Arc<dyn CatalogStore>,
    deferred: Arc<dyn DeferredRelationshipStore>,
    errors: Arc<dyn SyncErrorLog>,
    state: Arc<dyn SyncStateStore>,
}

impl ResponseProcessor {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        deferred: Arc<dyn DeferredRelationshipStore>,
        errors: Arc<dyn SyncErrorLog>,
        state: Arc<dyn SyncStateStore>,
    ) -> Self {
        Self { catalog, deferred, errors, state }
    }

    /// Ingest one page for the task that fetched it, then advance the sync
    /// state by the number of stored items.
    pub async fn ingest(&self, task: &SyncTask, page: &CatalogPage) -> Result<IngestReport> {
        let entity_type = task.entity_type;
        let mut report = IngestReport::default();

        for item in &page.items {
            match self.ingest_item(entity_type, item).await {
                Ok((outcome, deferred)) => {
                    match outcome {
                        UpsertOutcome::Inserted => report.inserted += 1,
                        UpsertOutcome::Updated => report.updated += 1,
                    }
                    report.deferred += deferred;
                }
                Err(err) => {
                    warn!(%entity_type, error = %err, "failed to ingest catalog item");
                    self.errors
                        .record(&entity_type.to_string(), &err.to_string(), Some(item))
                        .await?;
                    report.failed += 1;
                }
            }
        }

        self.state.advance(entity_type, task.page, page.has_more, report.stored()).await?;

        debug!(
            %entity_type,
            page = task.page,
            inserted = report.inserted,
            updated = report.updated,
            deferred = report.deferred,
            failed = report.failed,
            "page ingested"
        );

        Ok(report)
    }

    /// Upsert one item and its edges. Returns the upsert outcome and the
    /// number of edges that had to be deferred.
    async fn ingest_item(
        &self,
        entity_type: EntityType,
        item: &Value,
    ) -> Result<(UpsertOutcome, usize)> {
        let mut record = projection::project(entity_type, item)?;
        let mut edges = projection::embedded_relationships(entity_type, item);

        // A category's parent edge is applied through the row itself. When
        // the parent row already exists the upsert carries it; when it does
        // not, the column stays unset and the edge goes through deferral so
        // the link is never dangling.
        if let CatalogRecord::Category(ref mut category) = record {
            if let Some(parent) = category.parent {
                if self.catalog.exists(EntityType::Category, &parent.to_string()).await? {
                    edges.retain(|e| e.kind != RelationshipKind::CategoryParent);
                } else {
                    category.parent = None;
                }
            }
        }

        let outcome = self.catalog.upsert(&record).await?;

        let mut deferred_count = 0;
        for edge in &edges {
            let mut target = None;
            if let Some(id) = edge.target_id() {
                if self.catalog.exists(edge.kind.target_entity(), &id.to_string()).await? {
                    target = Some(id);
                }
            }

            match target {
                Some(target_id) => match edge.kind {
                    RelationshipKind::CategoryParent => {
                        self.catalog
                            .set_category_parent(
                                parse_category_id(&edge.source_id)?,
                                Some(target_id),
                            )
                            .await?;
                    }
                    _ => self.catalog.link(edge.kind, &edge.source_id, target_id).await?,
                },
                None => {
                    self.deferred
                        .defer(entity_type, &edge.source_id, edge.kind, &edge.data)
                        .await?;
                    deferred_count += 1;
                }
            }
        }

        Ok((outcome, deferred_count))
    }
}

fn parse_category_id(source_id: &str) -> Result<i64> {
    source_id.parse::<i64>().map_err(|_| {
        pimsync_domain::PimSyncError::Schema(format!("category id is not numeric: {source_id}"))
    })
}
