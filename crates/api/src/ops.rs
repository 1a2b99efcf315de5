//! Operational command surface.
//!
//! Thin wrappers over the core services, callable by an external
//! orchestrator (or the daemon's own schedulers). Every routine returns
//! serializable report types so callers can log or forward them verbatim.

use pimsync_core::{request, SortingFormatSupport};
use pimsync_domain::{
    BacklogReport, DashboardRow, DeferredRelationship, EntityType, RepairReport, Result,
    SortingFormat, StuckSyncReset, SyncErrorRecord,
};

use crate::context::AppContext;

/// Force entity types stuck in fetching/processing past `hours_threshold`
/// back to idle.
pub async fn reset_stuck_syncs(
    context: &AppContext,
    hours_threshold: u32,
) -> Result<Vec<StuckSyncReset>> {
    context.supervisor.reset_stuck_syncs(hours_threshold).await
}

/// Drain one batch of deferred relationships, returning the resolved count.
pub async fn process_deferred_relationships(context: &AppContext) -> Result<usize> {
    context.resolver.process_deferred(context.config.sync.resolver_batch_size).await
}

/// Rebuild every product's join rows from stored raw snapshots.
pub async fn repair_product_relationships(context: &AppContext) -> Result<RepairReport> {
    context.resolver.repair_product_relationships().await
}

/// Rebuild category parent links from stored raw snapshots.
pub async fn repair_category_parent_relationships(context: &AppContext) -> Result<usize> {
    context.resolver.repair_category_parent_relationships().await
}

/// Purge expired archived tasks and reconcile sync counters.
pub async fn clear_response_backlog(context: &AppContext) -> Result<BacklogReport> {
    context.supervisor.clear_response_backlog().await
}

/// Current per-entity-type dashboard rows.
pub async fn sync_dashboard(context: &AppContext) -> Result<Vec<DashboardRow>> {
    context.dashboard.rows().await
}

/// Deferred relationships that exhausted their resolution attempts.
pub async fn unresolved_relationship_report(
    context: &AppContext,
) -> Result<Vec<DeferredRelationship>> {
    context.resolver.unresolved_report().await
}

/// Most recent sync error rows, newest first.
pub async fn recent_sync_errors(
    context: &AppContext,
    limit: usize,
) -> Result<Vec<SyncErrorRecord>> {
    use pimsync_core::SyncErrorLog as _;
    context.errors.recent(limit).await
}

/// Static sorting-format support per entity type.
pub fn sorting_format_report() -> Vec<SortingFormatSupport> {
    request::sorting_format_report()
}

/// Probe the live provider for the sorting formats an entity type accepts.
pub async fn probe_entity_formats(
    context: &AppContext,
    entity_type: EntityType,
) -> Result<SortingFormatSupport> {
    context.provider().probe_sorting_formats(entity_type).await
}

/// Enqueue a single test task for one entity type.
pub async fn enqueue_test_task(
    context: &AppContext,
    entity_type: EntityType,
    sorting_format: SortingFormat,
) -> Result<i64> {
    context.planner.probe_entity(entity_type, sorting_format).await
}

#[cfg(test)]
mod tests {
    use pimsync_domain::{Config, DatabaseConfig, PimSyncError, ProviderConfig, SyncConfig};
    use tempfile::TempDir;

    use super::*;

    fn context(dir: &TempDir) -> AppContext {
        let config = Config {
            database: DatabaseConfig {
                path: dir.path().join("pimsync.db").to_string_lossy().into_owned(),
                pool_size: 2,
            },
            provider: ProviderConfig {
                base_url: "http://localhost:1".into(),
                api_key_id: "key".into(),
                api_key_secret: "secret".into(),
            },
            sync: SyncConfig::default(),
        };
        AppContext::initialize(config).expect("context")
    }

    #[tokio::test]
    async fn maintenance_routines_run_against_a_fresh_store() {
        let dir = TempDir::new().unwrap();
        let context = context(&dir);

        assert!(sync_dashboard(&context).await.unwrap().is_empty());
        assert_eq!(process_deferred_relationships(&context).await.unwrap(), 0);

        let repair = repair_product_relationships(&context).await.unwrap();
        assert_eq!(repair.products_scanned, 0);
        assert_eq!(repair_category_parent_relationships(&context).await.unwrap(), 0);

        let backlog = clear_response_backlog(&context).await.unwrap();
        assert_eq!(backlog.archived_purged, 0);
        // fresh states get their zero counters confirmed, not changed
        assert_eq!(backlog.counters_reconciled, 0);

        assert!(unresolved_relationship_report(&context).await.unwrap().is_empty());
        assert!(recent_sync_errors(&context, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stuck_reset_reports_every_known_entity_type() {
        let dir = TempDir::new().unwrap();
        let context = context(&dir);

        // dashboard is empty until states exist; the reset pass sees none
        assert!(reset_stuck_syncs(&context, 2).await.unwrap().is_empty());

        use pimsync_core::SyncStateStore as _;
        context.state.ensure(EntityType::Brand).await.unwrap();
        let resets = reset_stuck_syncs(&context, 2).await.unwrap();
        assert_eq!(resets.len(), 1);
        assert!(!resets[0].was_stuck);
    }

    #[tokio::test]
    async fn test_task_enqueue_validates_format() {
        let dir = TempDir::new().unwrap();
        let context = context(&dir);

        let err = enqueue_test_task(&context, EntityType::Media, SortingFormat::Simple)
            .await
            .unwrap_err();
        assert!(matches!(err, PimSyncError::InvalidInput(_)));

        let task_id = enqueue_test_task(&context, EntityType::Media, SortingFormat::Nested)
            .await
            .unwrap();
        assert!(task_id > 0);
    }

    #[test]
    fn format_report_is_static() {
        let report = sorting_format_report();
        assert_eq!(report.len(), EntityType::ALL.len());
    }
}
