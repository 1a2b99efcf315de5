//! Deferred relationship resolution and full reconciliation
//!
//! The resolver drains the deferred relationship set in claimed batches:
//! each entry is re-checked against the catalog and either materialized as a
//! join row (then deleted) or released with an incremented attempt counter.
//! Entries that exhaust their attempts stay in the set and are surfaced via
//! the unresolved report. The repair passes recompute the whole edge set
//! from stored `raw` snapshots and are safe to re-run.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use pimsync_domain::{
    constants, DeferredRelationship, EntityType, PimSyncError, RelationshipKind, RepairReport,
    Result,
};
use tracing::{debug, info, warn};

use super::ports::{CatalogStore, DeferredRelationshipStore, SyncErrorLog};
use super::projection;

/// Configuration for the relationship resolver.
#[derive(Debug, Clone)]
pub struct RelationshipResolverConfig {
    /// Maximum resolution attempts before an entry is left for the report.
    pub max_attempts: i32,
    /// How long a claimed batch stays invisible to other resolvers.
    pub claim_ttl: Duration,
}

impl Default for RelationshipResolverConfig {
    fn default() -> Self {
        Self {
            max_attempts: constants::DEFAULT_RESOLVER_MAX_ATTEMPTS,
            claim_ttl: Duration::from_secs(constants::DEFAULT_RESOLVER_CLAIM_SECS),
        }
    }
}

/// Resolves deferred relationship edges against the catalog.
pub struct RelationshipResolver {
    catalog: Arc<dyn CatalogStore>,
    deferred: Arc<dyn DeferredRelationshipStore>,
    errors: Arc<dyn SyncErrorLog>,
    config: RelationshipResolverConfig,
}

impl RelationshipResolver {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        deferred: Arc<dyn DeferredRelationshipStore>,
        errors: Arc<dyn SyncErrorLog>,
        config: RelationshipResolverConfig,
    ) -> Self {
        Self { catalog, deferred, errors, config }
    }

    /// Claim one batch of deferred entries and try to resolve each. Returns
    /// the number of entries resolved.
    pub async fn process_deferred(&self, batch_size: usize) -> Result<usize> {
        let batch = self
            .deferred
            .claim_batch(batch_size, self.config.claim_ttl, self.config.max_attempts)
            .await?;

        if batch.is_empty() {
            debug!("no deferred relationships to resolve");
            return Ok(0);
        }

        let mut resolved = 0;
        for entry in batch {
            if self.resolve_entry(&entry).await? {
                self.deferred.complete(entry.id).await?;
                resolved += 1;
            } else {
                self.deferred.release(entry.id).await?;
                if entry.attempts + 1 >= self.config.max_attempts {
                    warn!(
                        entity_id = %entry.entity_id,
                        relationship = %entry.relationship_type,
                        attempts = entry.attempts + 1,
                        "deferred relationship exhausted its resolution attempts"
                    );
                    self.errors
                        .record(
                            "deferred_relationship",
                            &format!(
                                "unresolved after {} attempts: {} {} -> {:?}",
                                entry.attempts + 1,
                                entry.entity_id,
                                entry.relationship_type,
                                entry.target_id()
                            ),
                            Some(&entry.relationship_data),
                        )
                        .await?;
                }
            }
        }

        info!(resolved, "deferred relationship batch processed");
        Ok(resolved)
    }

    /// Entries that exhausted their attempts; never deleted, only reported.
    pub async fn unresolved_report(&self) -> Result<Vec<DeferredRelationship>> {
        self.deferred.unresolved(self.config.max_attempts).await
    }

    /// Re-check one entry against the catalog and materialize it when the
    /// target row exists. Returns whether the entry resolved.
    async fn resolve_entry(&self, entry: &DeferredRelationship) -> Result<bool> {
        let Some(target_id) = entry.target_id() else {
            return Ok(false);
        };

        let target_entity = entry.relationship_type.target_entity();
        if !self.catalog.exists(target_entity, &target_id.to_string()).await? {
            return Ok(false);
        }

        match entry.relationship_type {
            RelationshipKind::CategoryParent => {
                let category_id = entry.entity_id.parse::<i64>().map_err(|_| {
                    PimSyncError::Schema(format!(
                        "category id is not numeric: {}",
                        entry.entity_id
                    ))
                })?;
                self.catalog.set_category_parent(category_id, Some(target_id)).await?;
            }
            kind => self.catalog.link(kind, &entry.entity_id, target_id).await?,
        }
        Ok(true)
    }

    /// Recompute every product's join rows from its stored raw snapshot,
    /// deleting stale edges and inserting missing ones. Idempotent: a second
    /// run with no intervening writes changes nothing.
    pub async fn repair_product_relationships(&self) -> Result<RepairReport> {
        let mut report = RepairReport::default();

        for (product_id, raw) in self.catalog.product_raw_rows().await? {
            report.products_scanned += 1;
            let edges = projection::embedded_relationships(EntityType::Product, &raw);

            for kind in [
                RelationshipKind::Brand,
                RelationshipKind::Category,
                RelationshipKind::Organization,
                RelationshipKind::Media,
            ] {
                let desired: BTreeSet<i64> = edges
                    .iter()
                    .filter(|e| e.kind == kind)
                    .filter_map(|e| e.target_id())
                    .collect();
                let current: BTreeSet<i64> =
                    self.catalog.links_of(kind, &product_id).await?.into_iter().collect();

                for stale in current.difference(&desired) {
                    self.catalog.unlink(kind, &product_id, *stale).await?;
                    report.edges_removed += 1;
                }

                for missing in desired.difference(&current) {
                    if self
                        .catalog
                        .exists(kind.target_entity(), &missing.to_string())
                        .await?
                    {
                        self.catalog.link(kind, &product_id, *missing).await?;
                        report.edges_added += 1;
                    } else {
                        // target still absent: keep the edge in the deferred
                        // set instead of dropping it
                        let data = serde_json::json!({"id": missing});
                        self.deferred
                            .defer(EntityType::Product, &product_id, kind, &data)
                            .await?;
                    }
                }
            }
        }

        info!(
            products = report.products_scanned,
            added = report.edges_added,
            removed = report.edges_removed,
            "product relationship repair completed"
        );
        Ok(report)
    }

    /// Recompute every category's parent link from its stored raw snapshot.
    /// Parents that do not exist in the store are cleared. Returns the
    /// number of categories whose stored parent changed.
    pub async fn repair_category_parent_relationships(&self) -> Result<usize> {
        let mut changed = 0;

        for (category_id, raw) in self.catalog.category_raw_rows().await? {
            let desired = raw
                .get("parent")
                .and_then(|p| p.get("id"))
                .and_then(serde_json::Value::as_i64);

            let mut applied = None;
            if let Some(parent) = desired {
                if self.catalog.exists(EntityType::Category, &parent.to_string()).await? {
                    applied = Some(parent);
                }
            }

            if self.catalog.set_category_parent(category_id, applied).await? {
                changed += 1;
            }
        }

        info!(changed, "category parent repair completed");
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use pimsync_domain::CatalogRecord;
    use serde_json::json;

    use super::super::testing::{MemoryCatalogStore, MemoryDeferredStore, MemoryErrorLog};
    use super::*;

    struct Fixture {
        catalog: Arc<MemoryCatalogStore>,
        deferred: Arc<MemoryDeferredStore>,
        errors: Arc<MemoryErrorLog>,
        resolver: RelationshipResolver,
    }

    fn fixture(config: RelationshipResolverConfig) -> Fixture {
        let catalog = Arc::new(MemoryCatalogStore::default());
        let deferred = Arc::new(MemoryDeferredStore::default());
        let errors = Arc::new(MemoryErrorLog::default());
        let resolver = RelationshipResolver::new(
            catalog.clone(),
            deferred.clone(),
            errors.clone(),
            config,
        );
        Fixture { catalog, deferred, errors, resolver }
    }

    async fn seed(catalog: &MemoryCatalogStore, entity_type: EntityType, item: serde_json::Value) {
        let record = projection::project(entity_type, &item).unwrap();
        catalog.upsert(&record).await.unwrap();
    }

    async fn seed_product(catalog: &MemoryCatalogStore, id: &str, brands: Vec<i64>) {
        let item = json!({
            "id": id,
            "name": {"en": "product"},
            "brands": brands.iter().map(|b| json!({"id": b})).collect::<Vec<_>>()
        });
        seed(catalog, EntityType::Product, item).await;
    }

    #[tokio::test]
    async fn resolves_once_target_arrives() {
        let fx = fixture(RelationshipResolverConfig::default());
        seed_product(&fx.catalog, "P1", vec![12]).await;
        fx.deferred
            .defer(EntityType::Product, "P1", RelationshipKind::Brand, &json!({"id": 12}))
            .await
            .unwrap();

        // target missing: entry stays, attempt recorded
        assert_eq!(fx.resolver.process_deferred(10).await.unwrap(), 0);
        assert_eq!(fx.deferred.count().await.unwrap(), 1);
        assert_eq!(fx.deferred.entries().await[0].attempts, 1);

        // target arrives: entry resolves and is deleted
        seed(&fx.catalog, EntityType::Brand, json!({"id": 12, "name": "brand"})).await;
        assert_eq!(fx.resolver.process_deferred(10).await.unwrap(), 1);
        assert_eq!(fx.deferred.count().await.unwrap(), 0);
        assert_eq!(
            fx.catalog.link_set(RelationshipKind::Brand).await,
            vec![("P1".to_string(), 12)]
        );
    }

    #[tokio::test]
    async fn exhausted_entries_stay_and_are_reported() {
        let config = RelationshipResolverConfig {
            max_attempts: 2,
            claim_ttl: Duration::from_millis(0),
        };
        let fx = fixture(config);
        fx.deferred
            .defer(EntityType::Product, "P1", RelationshipKind::Brand, &json!({"id": 99}))
            .await
            .unwrap();

        assert_eq!(fx.resolver.process_deferred(10).await.unwrap(), 0);
        assert_eq!(fx.resolver.process_deferred(10).await.unwrap(), 0);
        // past max_attempts: no longer claimed, still present
        assert_eq!(fx.resolver.process_deferred(10).await.unwrap(), 0);
        assert_eq!(fx.deferred.count().await.unwrap(), 1);

        let report = fx.resolver.unresolved_report().await.unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].attempts, 2);
        assert!(!fx.errors.records().await.is_empty());
    }

    #[tokio::test]
    async fn no_loss_after_fixpoint() {
        let fx = fixture(RelationshipResolverConfig {
            max_attempts: 3,
            claim_ttl: Duration::from_millis(0),
        });
        seed_product(&fx.catalog, "P1", vec![1]).await;
        seed(&fx.catalog, EntityType::Brand, json!({"id": 1, "name": "resolvable"})).await;
        fx.deferred
            .defer(EntityType::Product, "P1", RelationshipKind::Brand, &json!({"id": 1}))
            .await
            .unwrap();
        fx.deferred
            .defer(EntityType::Product, "P1", RelationshipKind::Brand, &json!({"id": 77}))
            .await
            .unwrap();

        // drain to fixpoint
        for _ in 0..5 {
            fx.resolver.process_deferred(10).await.unwrap();
        }

        // every entry is either resolved (join row exists) or still present
        let links = fx.catalog.link_set(RelationshipKind::Brand).await;
        assert_eq!(links, vec![("P1".to_string(), 1)]);
        let remaining = fx.deferred.entries().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].target_id(), Some(77));
    }

    #[tokio::test]
    async fn resolves_category_parent_edges() {
        let fx = fixture(RelationshipResolverConfig::default());
        seed(&fx.catalog, EntityType::Category, json!({"id": 2, "name": {"en": "Child"}})).await;
        fx.deferred
            .defer(EntityType::Category, "2", RelationshipKind::CategoryParent, &json!({"id": 1}))
            .await
            .unwrap();

        seed(&fx.catalog, EntityType::Category, json!({"id": 1, "name": {"en": "Root"}})).await;
        assert_eq!(fx.resolver.process_deferred(10).await.unwrap(), 1);
        assert_eq!(fx.catalog.parent_of(2).await, Some(1));
    }

    #[tokio::test]
    async fn repair_rebuilds_edges_from_raw() {
        let fx = fixture(RelationshipResolverConfig::default());
        seed(&fx.catalog, EntityType::Brand, json!({"id": 12, "name": "brand"})).await;
        seed_product(&fx.catalog, "P1", vec![12]).await;

        // a stale edge not present in raw, and the raw edge missing
        fx.catalog.link(RelationshipKind::Brand, "P1", 999).await.unwrap();

        let report = fx.resolver.repair_product_relationships().await.unwrap();
        assert_eq!(report.products_scanned, 1);
        assert_eq!(report.edges_added, 1);
        assert_eq!(report.edges_removed, 1);
        assert_eq!(
            fx.catalog.link_set(RelationshipKind::Brand).await,
            vec![("P1".to_string(), 12)]
        );
    }

    #[tokio::test]
    async fn repair_is_idempotent() {
        let fx = fixture(RelationshipResolverConfig::default());
        seed(&fx.catalog, EntityType::Brand, json!({"id": 12, "name": "brand"})).await;
        seed_product(&fx.catalog, "P1", vec![12]).await;
        fx.catalog.link(RelationshipKind::Brand, "P1", 999).await.unwrap();

        fx.resolver.repair_product_relationships().await.unwrap();
        let first = fx.catalog.link_set(RelationshipKind::Brand).await;

        let second_report = fx.resolver.repair_product_relationships().await.unwrap();
        let second = fx.catalog.link_set(RelationshipKind::Brand).await;

        assert_eq!(first, second);
        assert_eq!(second_report.edges_added, 0);
        assert_eq!(second_report.edges_removed, 0);
    }

    #[tokio::test]
    async fn repair_defers_edges_with_absent_targets() {
        let fx = fixture(RelationshipResolverConfig::default());
        seed_product(&fx.catalog, "P1", vec![55]).await;

        let report = fx.resolver.repair_product_relationships().await.unwrap();
        assert_eq!(report.edges_added, 0);
        assert_eq!(fx.deferred.count().await.unwrap(), 1);
        assert_eq!(fx.deferred.entries().await[0].target_id(), Some(55));
    }

    #[tokio::test]
    async fn repair_category_parents_from_raw() {
        let fx = fixture(RelationshipResolverConfig::default());
        seed(&fx.catalog, EntityType::Category, json!({"id": 1, "name": {"en": "Root"}})).await;
        // ingest order put the child in before its parent existed
        let child = projection::project(
            EntityType::Category,
            &json!({"id": 2, "name": {"en": "Child"}, "parent": {"id": 1}}),
        )
        .unwrap();
        let CatalogRecord::Category(mut record) = child else { panic!("expected category") };
        record.parent = None;
        fx.catalog.upsert(&CatalogRecord::Category(record)).await.unwrap();

        let changed = fx.resolver.repair_category_parent_relationships().await.unwrap();
        assert_eq!(changed, 1);
        assert_eq!(fx.catalog.parent_of(2).await, Some(1));

        // second run changes nothing
        assert_eq!(fx.resolver.repair_category_parent_relationships().await.unwrap(), 0);
    }
}
