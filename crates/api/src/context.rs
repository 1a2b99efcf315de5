//! Application context: constructs and owns the wired object graph.

use std::sync::Arc;
use std::time::Duration;

use pimsync_core::{
    RecoverySupervisor, RecoverySupervisorConfig, RelationshipResolver,
    RelationshipResolverConfig, ResponseProcessor, TaskPlanner, TaskPlannerConfig,
};
use pimsync_domain::{Config, Result};
use pimsync_infra::observability::metrics::PerformanceMetrics;
use pimsync_infra::scheduling::{
    QueueScheduler, QueueSchedulerConfig, RecoveryScheduler, RecoverySchedulerConfig,
    ResolverScheduler, ResolverSchedulerConfig,
};
use pimsync_infra::sync::{SyncWorker, SyncWorkerConfig, SyncWorkerDeps};
use pimsync_infra::{
    DbManager, MedipimClient, MedipimClientConfig, SqliteCatalogRepository,
    SqliteDashboardRepository, SqliteDeferredRelationshipRepository, SqliteSyncErrorRepository,
    SqliteSyncStateRepository, SqliteTaskQueueRepository,
};
use tracing::info;

/// Fully wired application graph.
pub struct AppContext {
    pub config: Config,
    pub db: Arc<DbManager>,
    pub metrics: Arc<PerformanceMetrics>,

    // repositories (shared with services through their port types)
    pub queue: Arc<SqliteTaskQueueRepository>,
    pub state: Arc<SqliteSyncStateRepository>,
    pub catalog: Arc<SqliteCatalogRepository>,
    pub deferred: Arc<SqliteDeferredRelationshipRepository>,
    pub errors: Arc<SqliteSyncErrorRepository>,
    pub dashboard: Arc<SqliteDashboardRepository>,

    // services
    pub planner: Arc<TaskPlanner>,
    pub resolver: Arc<RelationshipResolver>,
    pub supervisor: Arc<RecoverySupervisor>,
    processor: Arc<ResponseProcessor>,
    provider: Arc<MedipimClient>,
}

impl AppContext {
    /// Build the full object graph from configuration: database pool,
    /// repositories, provider client, and core services.
    pub fn initialize(config: Config) -> Result<Self> {
        let db = DbManager::open(&config.database.path, config.database.pool_size)?;
        db.health_check()?;
        info!(db_path = %config.database.path, "database ready");

        let metrics = Arc::new(PerformanceMetrics::new());

        let queue = Arc::new(SqliteTaskQueueRepository::new(db.clone()));
        let state = Arc::new(SqliteSyncStateRepository::new(db.clone()));
        let catalog = Arc::new(SqliteCatalogRepository::new(db.clone()));
        let deferred = Arc::new(SqliteDeferredRelationshipRepository::new(db.clone()));
        let errors = Arc::new(SqliteSyncErrorRepository::new(db.clone()));
        let dashboard = Arc::new(SqliteDashboardRepository::new(db.clone()));

        let provider =
            Arc::new(MedipimClient::new(MedipimClientConfig::from(&config.provider))?);

        let processor = Arc::new(ResponseProcessor::new(
            catalog.clone(),
            deferred.clone(),
            errors.clone(),
            state.clone(),
        ));

        let planner = Arc::new(TaskPlanner::new(
            state.clone(),
            queue.clone(),
            TaskPlannerConfig {
                steady_interval: Duration::from_secs(config.sync.steady_interval_seconds),
                max_in_flight: config.sync.aggressive_max_in_flight,
            },
        ));

        let resolver = Arc::new(RelationshipResolver::new(
            catalog.clone(),
            deferred.clone(),
            errors.clone(),
            RelationshipResolverConfig::default(),
        ));

        let supervisor = Arc::new(RecoverySupervisor::new(
            state.clone(),
            queue.clone(),
            catalog.clone(),
            RecoverySupervisorConfig {
                stuck_threshold_hours: config.sync.stuck_threshold_hours,
                ..RecoverySupervisorConfig::default()
            },
        ));

        Ok(Self {
            config,
            db,
            metrics,
            queue,
            state,
            catalog,
            deferred,
            errors,
            dashboard,
            planner,
            resolver,
            supervisor,
            processor,
            provider,
        })
    }

    /// Construct the queue-consuming worker.
    pub fn sync_worker(&self) -> SyncWorker {
        let deps = SyncWorkerDeps {
            queue: self.queue.clone(),
            fetcher: self.provider.clone(),
            processor: self.processor.clone(),
            state: self.state.clone(),
            errors: self.errors.clone(),
        };
        let config = SyncWorkerConfig {
            visibility: Duration::from_secs(self.config.sync.visibility_seconds),
            max_attempts: self.config.sync.max_task_attempts,
            ..SyncWorkerConfig::default()
        };
        SyncWorker::new(deps, config, self.metrics.clone())
    }

    /// Construct the periodic task-planning scheduler.
    pub fn queue_scheduler(&self) -> QueueScheduler {
        QueueScheduler::new(
            self.planner.clone(),
            QueueSchedulerConfig::default(),
            self.metrics.clone(),
        )
    }

    /// Construct the deferred relationship scheduler.
    pub fn resolver_scheduler(&self) -> ResolverScheduler {
        ResolverScheduler::new(
            self.resolver.clone(),
            ResolverSchedulerConfig {
                batch_size: self.config.sync.resolver_batch_size,
                ..ResolverSchedulerConfig::default()
            },
            self.metrics.clone(),
        )
    }

    /// Construct the recovery scheduler.
    pub fn recovery_scheduler(&self) -> RecoveryScheduler {
        RecoveryScheduler::new(
            self.supervisor.clone(),
            RecoverySchedulerConfig::default(),
            self.metrics.clone(),
        )
    }

    /// The provider client, for ops-level probing.
    pub fn provider(&self) -> Arc<MedipimClient> {
        self.provider.clone()
    }
}

#[cfg(test)]
mod tests {
    use pimsync_domain::{DatabaseConfig, ProviderConfig, SyncConfig};
    use tempfile::TempDir;

    use super::*;

    fn test_config(dir: &TempDir) -> Config {
        Config {
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
        }
    }

    #[tokio::test]
    async fn initialize_wires_the_graph() {
        let dir = TempDir::new().unwrap();
        let context = AppContext::initialize(test_config(&dir)).unwrap();

        // the schema exists and repositories work end to end
        let rows = context.dashboard.rows().await.unwrap();
        assert!(rows.is_empty());

        let worker = context.sync_worker();
        assert!(!worker.is_running());
    }
}
