//! Repair and recovery passes over a real database, plus the dashboard
//! view.

#[path = "support.rs"]
mod support;

use std::sync::Arc;
use std::time::Duration;

use pimsync_core::sync::projection;
use pimsync_core::{
    CatalogStore, RecoverySupervisor, RecoverySupervisorConfig, RelationshipResolver,
    RelationshipResolverConfig, SyncStateStore, TaskQueue,
};
use pimsync_domain::{
    ChunkStatus, EntityType, RelationshipKind, SortingFormat, SyncOutcome, SyncTask,
};
use pimsync_infra::{
    SqliteCatalogRepository, SqliteDashboardRepository, SqliteDeferredRelationshipRepository,
    SqliteSyncErrorRepository, SqliteSyncStateRepository, SqliteTaskQueueRepository,
};

fn resolver(db: &support::TestDb) -> RelationshipResolver {
    RelationshipResolver::new(
        Arc::new(SqliteCatalogRepository::new(db.manager.clone())),
        Arc::new(SqliteDeferredRelationshipRepository::new(db.manager.clone())),
        Arc::new(SqliteSyncErrorRepository::new(db.manager.clone())),
        RelationshipResolverConfig { max_attempts: 3, claim_ttl: Duration::from_millis(0) },
    )
}

async fn seed_product_with_brand(catalog: &SqliteCatalogRepository, id: &str, brand: i64) {
    let item = serde_json::json!({
        "id": id,
        "name": {"en": "product"},
        "brands": [{"id": brand}]
    });
    let record = projection::project(EntityType::Product, &item).unwrap();
    catalog.upsert(&record).await.unwrap();
}

#[tokio::test]
async fn repair_rebuilds_join_rows_from_raw_and_is_idempotent() {
    let db = support::setup_db();
    let catalog = SqliteCatalogRepository::new(db.manager.clone());

    let brand = projection::project(EntityType::Brand, &support::brand_item(12)).unwrap();
    catalog.upsert(&brand).await.unwrap();
    seed_product_with_brand(&catalog, "P1", 12).await;

    // an edge in raw was never linked; a stale edge points at a brand the
    // raw no longer references
    let stray = projection::project(EntityType::Brand, &support::brand_item(999)).unwrap();
    catalog.upsert(&stray).await.unwrap();
    catalog.link(RelationshipKind::Brand, "P1", 999).await.unwrap();

    let resolver = resolver(&db);
    let report = resolver.repair_product_relationships().await.unwrap();
    assert_eq!(report.products_scanned, 1);
    assert_eq!(report.edges_added, 1);
    assert_eq!(report.edges_removed, 1);
    assert_eq!(catalog.links_of(RelationshipKind::Brand, "P1").await.unwrap(), vec![12]);

    // second run with no writes in between changes nothing
    let second = resolver.repair_product_relationships().await.unwrap();
    assert_eq!(second.edges_added, 0);
    assert_eq!(second.edges_removed, 0);
    assert_eq!(catalog.links_of(RelationshipKind::Brand, "P1").await.unwrap(), vec![12]);
}

#[tokio::test]
async fn repair_fixes_category_parents() {
    let db = support::setup_db();
    let catalog = SqliteCatalogRepository::new(db.manager.clone());

    let root = projection::project(
        EntityType::Category,
        &serde_json::json!({"id": 1, "name": {"en": "Root"}}),
    )
    .unwrap();
    catalog.upsert(&root).await.unwrap();

    // the child arrived before its parent, so its stored parent is NULL
    // even though raw references category 1
    let child_item =
        serde_json::json!({"id": 2, "name": {"en": "Child"}, "parent": {"id": 1}});
    let child = projection::project(EntityType::Category, &child_item).unwrap();
    catalog.upsert(&child).await.unwrap();
    catalog.set_category_parent(2, None).await.unwrap();

    let resolver = resolver(&db);
    let changed = resolver.repair_category_parent_relationships().await.unwrap();
    assert_eq!(changed, 1);

    // re-running is a no-op
    assert_eq!(resolver.repair_category_parent_relationships().await.unwrap(), 0);
}

#[tokio::test]
async fn stuck_scan_resets_only_old_in_flight_entities() {
    let db = support::setup_db();
    let state = Arc::new(SqliteSyncStateRepository::new(db.manager.clone()));
    let queue = Arc::new(SqliteTaskQueueRepository::new(db.manager.clone()));
    let catalog = Arc::new(SqliteCatalogRepository::new(db.manager.clone()));

    state.ensure(EntityType::Product).await.unwrap();
    state
        .transition(EntityType::Product, &[ChunkStatus::Idle], ChunkStatus::Processing)
        .await
        .unwrap();
    state.ensure(EntityType::Brand).await.unwrap();

    let supervisor = RecoverySupervisor::new(
        state.clone(),
        queue,
        catalog,
        RecoverySupervisorConfig::default(),
    );

    // threshold of 0 hours: the processing row counts as stuck immediately
    tokio::time::sleep(Duration::from_millis(5)).await;
    let results = supervisor.reset_stuck_syncs(0).await.unwrap();

    let product = results.iter().find(|r| r.entity_type == EntityType::Product).unwrap();
    let brand = results.iter().find(|r| r.entity_type == EntityType::Brand).unwrap();
    assert!(product.was_stuck);
    assert!(!brand.was_stuck);

    let row = state.get(EntityType::Product).await.unwrap().unwrap();
    assert_eq!(row.chunk_status, ChunkStatus::Idle);
}

#[tokio::test]
async fn backlog_clearing_purges_archive_and_reconciles_counters() {
    let db = support::setup_db();
    let state = Arc::new(SqliteSyncStateRepository::new(db.manager.clone()));
    let queue = Arc::new(SqliteTaskQueueRepository::new(db.manager.clone()));
    let catalog = Arc::new(SqliteCatalogRepository::new(db.manager.clone()));

    // a drifted counter and an expired archived task
    let brand = projection::project(EntityType::Brand, &support::brand_item(1)).unwrap();
    catalog.upsert(&brand).await.unwrap();
    state.set_sync_count(EntityType::Brand, 99).await.unwrap();

    let task_id = queue
        .send(&SyncTask {
            entity_type: EntityType::Brand,
            page: 0,
            sorting_format: SortingFormat::Simple,
        })
        .await
        .unwrap();
    queue.archive(task_id).await.unwrap();

    let supervisor = RecoverySupervisor::new(
        state.clone(),
        queue.clone(),
        catalog,
        RecoverySupervisorConfig {
            archive_retention: Duration::from_millis(0),
            ..RecoverySupervisorConfig::default()
        },
    );

    let report = supervisor.clear_response_backlog().await.unwrap();
    assert_eq!(report.archived_purged, 1);
    assert!(report.counters_reconciled >= 1);
    assert_eq!(state.get(EntityType::Brand).await.unwrap().unwrap().sync_count, 1);
}

#[tokio::test]
async fn dashboard_view_reports_per_entity_rows() {
    let db = support::setup_db();
    let state = SqliteSyncStateRepository::new(db.manager.clone());
    let dashboard = SqliteDashboardRepository::new(db.manager.clone());

    state.advance(EntityType::Brand, 2, false, 500).await.unwrap();
    state.ensure(EntityType::Product).await.unwrap();

    let rows = dashboard.rows().await.unwrap();
    assert_eq!(rows.len(), 2);

    let brand = rows.iter().find(|r| r.entity_type == EntityType::Brand).unwrap();
    assert_eq!(brand.current_page, 2);
    assert_eq!(brand.items_synced, 500);
    assert_eq!(brand.last_sync_status, Some(SyncOutcome::Complete));
    assert!(brand.last_sync_at.is_some());
    assert_eq!(brand.minutes_since_last_sync, Some(0));

    let product = rows.iter().find(|r| r.entity_type == EntityType::Product).unwrap();
    assert_eq!(product.items_synced, 0);
    assert_eq!(product.last_sync_status, None);
    assert_eq!(product.minutes_since_last_sync, None);
}
