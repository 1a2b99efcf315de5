//! Sync worker for queue-driven page processing.
//!
//! Polls the task queue for visible sync tasks, fetches each task's page
//! from the provider, and hands the payload to the response processor.
//! Delivery is at-least-once: a task is deleted only after a successful
//! ingest, requeued with a category-specific delay on transient failure,
//! and archived (with a sync error row) once its attempts are exhausted.
//! Join handles are tracked, cancellation is explicit, and every
//! asynchronous operation is wrapped in a timeout.

use std::sync::Arc;
use std::time::{Duration, Instant};

use pimsync_core::{
    CatalogFetcher, ResponseProcessor, SyncErrorLog, SyncStateStore, TaskQueue,
};
use pimsync_domain::{constants, ChunkStatus, QueuedSyncTask, SyncOutcome};
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::errors::SyncError;
use crate::observability::metrics::PerformanceMetrics;
use crate::observability::MetricsResult;

/// Delay before retrying a task whose entity type is owned by another
/// worker.
const CONTENTION_DELAY: Duration = Duration::from_secs(5);

/// Statuses from which a worker may take ownership of an entity type. An
/// errored entity type re-enters the cycle through its next planned task.
const CLAIMABLE: [ChunkStatus; 3] = [ChunkStatus::Idle, ChunkStatus::Done, ChunkStatus::Error];

/// Configuration for the sync worker.
#[derive(Debug, Clone)]
pub struct SyncWorkerConfig {
    /// Maximum number of tasks to claim per batch
    pub batch_size: usize,
    /// Interval between polling attempts
    pub poll_interval: Duration,
    /// Timeout for processing a single batch
    pub processing_timeout: Duration,
    /// Visibility timeout for claimed tasks
    pub visibility: Duration,
    /// Maximum delivery attempts before a task is archived
    pub max_attempts: i32,
    /// Join timeout when stopping
    pub join_timeout: Duration,
}

impl Default for SyncWorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: constants::DEFAULT_QUEUE_READ_BATCH,
            poll_interval: Duration::from_secs(10),
            processing_timeout: Duration::from_secs(300),
            visibility: Duration::from_secs(constants::DEFAULT_VISIBILITY_SECS),
            max_attempts: constants::DEFAULT_MAX_TASK_ATTEMPTS,
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// Ports the worker operates on.
#[derive(Clone)]
pub struct SyncWorkerDeps {
    pub queue: Arc<dyn TaskQueue>,
    pub fetcher: Arc<dyn CatalogFetcher>,
    pub processor: Arc<ResponseProcessor>,
    pub state: Arc<dyn SyncStateStore>,
    pub errors: Arc<dyn SyncErrorLog>,
}

/// How one delivered task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskOutcome {
    Completed,
    Requeued,
    Archived,
    Skipped,
}

/// Sync worker with explicit lifecycle management.
pub struct SyncWorker {
    deps: SyncWorkerDeps,
    config: SyncWorkerConfig,
    cancellation: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
    metrics: Arc<PerformanceMetrics>,
}

impl SyncWorker {
    /// Create a new sync worker with the given configuration.
    pub fn new(
        deps: SyncWorkerDeps,
        config: SyncWorkerConfig,
        metrics: Arc<PerformanceMetrics>,
    ) -> Self {
        Self {
            deps,
            config,
            cancellation: CancellationToken::new(),
            task_handle: None,
            metrics,
        }
    }

    /// Start the worker, spawning the background processing task.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> Result<(), String> {
        if self.is_running() {
            return Err("Worker already running".to_string());
        }

        info!("Starting sync worker");

        // Create fresh cancellation token
        self.cancellation = CancellationToken::new();

        let deps = self.deps.clone();
        let config = self.config.clone();
        let cancel = self.cancellation.clone();
        let metrics = Arc::clone(&self.metrics);

        let handle = tokio::spawn(async move {
            Self::process_loop(deps, config, cancel, metrics).await;
        });

        self.task_handle = Some(handle);
        info!("Sync worker started");
        log_metric(self.metrics.record_call(), "sync_worker.start");

        Ok(())
    }

    /// Stop the worker and wait for the processing task to finish.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> Result<(), String> {
        if !self.is_running() {
            return Err("Worker not running".to_string());
        }

        info!("Stopping sync worker");

        // Cancel background task
        self.cancellation.cancel();

        // Await join handle with timeout
        if let Some(handle) = self.task_handle.take() {
            let join_timeout = self.config.join_timeout;
            match tokio::time::timeout(join_timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!("Worker task panicked: {}", e);
                    return Err("Worker task panicked".to_string());
                }
                Err(_) => {
                    warn!("Worker task did not complete within timeout");
                    return Err("Worker task timeout".to_string());
                }
            }
        }

        info!("Sync worker stopped");
        self.cancellation = CancellationToken::new();
        log_metric(self.metrics.record_call(), "sync_worker.stop");

        Ok(())
    }

    /// Returns true when a worker instance is active.
    pub fn is_running(&self) -> bool {
        self.task_handle.is_some()
    }

    /// Background processing loop.
    async fn process_loop(
        deps: SyncWorkerDeps,
        config: SyncWorkerConfig,
        cancel: CancellationToken,
        metrics: Arc<PerformanceMetrics>,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Sync worker process loop cancelled");
                    break;
                }
                _ = tokio::time::sleep(config.poll_interval) => {
                    log_metric(metrics.record_call(), "sync_worker.tick");
                    let started = Instant::now();

                    match tokio::time::timeout(
                        config.processing_timeout,
                        Self::process_batch(&deps, &config, &metrics),
                    )
                    .await
                    {
                        Ok(Ok(())) => {
                            log_metric(
                                metrics.record_duration(started.elapsed()),
                                "sync_worker.batch.duration",
                            );
                        }
                        Ok(Err(e)) => {
                            error!(error = %e, "Batch processing failed");
                            log_metric(metrics.record_fetch_error(), "sync_worker.batch.error");
                        }
                        Err(_) => {
                            warn!(
                                timeout_secs = config.processing_timeout.as_secs(),
                                "Batch processing timed out"
                            );
                            log_metric(metrics.record_fetch_timeout(), "sync_worker.batch.timeout");
                        }
                    }
                }
            }
        }
    }

    /// Process a single batch of queued tasks.
    async fn process_batch(
        deps: &SyncWorkerDeps,
        config: &SyncWorkerConfig,
        metrics: &Arc<PerformanceMetrics>,
    ) -> Result<(), String> {
        let tasks = deps
            .queue
            .read(config.visibility, config.batch_size)
            .await
            .map_err(|e| format!("Failed to read task batch: {e}"))?;

        if tasks.is_empty() {
            debug!("No visible tasks to process");
            return Ok(());
        }

        info!(count = tasks.len(), "Processing task batch");

        let mut fatal_errors: Vec<String> = Vec::new();
        let mut completed = 0_u32;
        let mut requeued = 0_u32;
        let mut archived = 0_u32;
        let mut skipped = 0_u32;

        for task in tasks {
            let started = Instant::now();
            match Self::handle_task(deps, config, &task).await {
                Ok(TaskOutcome::Completed) => {
                    completed = completed.saturating_add(1);
                    log_metric(
                        metrics.record_fetch_time(started.elapsed()),
                        "sync_worker.task.duration",
                    );
                }
                Ok(TaskOutcome::Requeued) => {
                    requeued = requeued.saturating_add(1);
                    log_metric(metrics.record_fetch_error(), "sync_worker.task.requeued");
                }
                Ok(TaskOutcome::Archived) => {
                    archived = archived.saturating_add(1);
                    log_metric(metrics.record_fetch_error(), "sync_worker.task.archived");
                }
                Ok(TaskOutcome::Skipped) => {
                    skipped = skipped.saturating_add(1);
                }
                Err(err) => {
                    warn!(task_id = task.id, error = %err, "task bookkeeping failed");
                    fatal_errors.push(format!("task {}: {}", task.id, err));
                }
            }
        }

        debug!(
            completed = completed,
            requeued = requeued,
            archived = archived,
            skipped = skipped,
            "Task batch completed"
        );

        if !fatal_errors.is_empty() {
            return Err(fatal_errors.join("; "));
        }

        Ok(())
    }

    /// Drive one task through fetch and ingest.
    async fn handle_task(
        deps: &SyncWorkerDeps,
        config: &SyncWorkerConfig,
        queued: &QueuedSyncTask,
    ) -> pimsync_domain::Result<TaskOutcome> {
        let entity_type = queued.task.entity_type;

        // Per-entity-type serialization: exactly one worker owns an entity
        // type at a time. Losing the transition is not an error; the task
        // comes back after a short delay.
        let owned =
            deps.state.transition(entity_type, &CLAIMABLE, ChunkStatus::Fetching).await?;
        if !owned {
            deps.queue.nack(queued.id, CONTENTION_DELAY).await?;
            debug!(%entity_type, task_id = queued.id, "entity type busy, task delayed");
            return Ok(TaskOutcome::Skipped);
        }

        let page = match deps.fetcher.fetch_page(&queued.task).await {
            Ok(page) => page,
            Err(err) => return Self::fail_task(deps, config, queued, err).await,
        };

        deps.state
            .transition(entity_type, &[ChunkStatus::Fetching], ChunkStatus::Processing)
            .await?;

        match deps.processor.ingest(&queued.task, &page).await {
            Ok(report) => {
                deps.queue.delete(queued.id).await?;
                debug!(
                    %entity_type,
                    page = queued.task.page,
                    stored = report.stored(),
                    deferred = report.deferred,
                    failed = report.failed,
                    "task completed"
                );
                Ok(TaskOutcome::Completed)
            }
            Err(err) => Self::fail_task(deps, config, queued, err).await,
        }
    }

    /// Handle a failed fetch or ingest: requeue while attempts remain and
    /// the error is transient, otherwise archive the task and log it.
    async fn fail_task(
        deps: &SyncWorkerDeps,
        config: &SyncWorkerConfig,
        queued: &QueuedSyncTask,
        err: pimsync_domain::PimSyncError,
    ) -> pimsync_domain::Result<TaskOutcome> {
        let entity_type = queued.task.entity_type;
        let sync_err = SyncError::from(err);

        // Release ownership; the cursor is untouched.
        deps.state
            .transition(
                entity_type,
                &[ChunkStatus::Fetching, ChunkStatus::Processing],
                ChunkStatus::Idle,
            )
            .await?;

        let exhausted = queued.attempts >= config.max_attempts;
        if !exhausted && sync_err.should_retry() {
            let delay = Duration::from_secs(sync_err.retry_delay_secs());
            deps.queue.nack(queued.id, delay).await?;
            warn!(
                %entity_type,
                task_id = queued.id,
                attempts = queued.attempts,
                delay_secs = delay.as_secs(),
                error = %sync_err,
                "task requeued after transient failure"
            );
            return Ok(TaskOutcome::Requeued);
        }

        deps.queue.archive(queued.id).await?;
        deps.errors
            .record(
                &entity_type.to_string(),
                &sync_err.to_string(),
                Some(&json!({
                    "task_id": queued.id,
                    "page": queued.task.page,
                    "attempts": queued.attempts,
                })),
            )
            .await?;
        deps.state.mark_result(entity_type, SyncOutcome::Error).await?;
        warn!(
            %entity_type,
            task_id = queued.id,
            attempts = queued.attempts,
            error = %sync_err,
            "task archived after terminal failure"
        );
        Ok(TaskOutcome::Archived)
    }
}

fn log_metric(result: MetricsResult<()>, metric: &'static str) {
    if let Err(err) = result {
        warn!(metric = metric, error = ?err, "Failed to record worker metric");
    }
}

impl Drop for SyncWorker {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("SyncWorker dropped while running; cancelling tasks");
            self.cancellation.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use pimsync_domain::{
        CatalogPage, CatalogRecord, DeferredRelationship, EntityType, PimSyncError,
        RelationshipKind, SyncErrorRecord, SyncState, SyncTask, UpsertOutcome,
    };
    use serde_json::Value;

    use super::*;
    use pimsync_core::{CatalogStore, DeferredRelationshipStore};

    struct EmptyQueue;

    #[async_trait]
    impl TaskQueue for EmptyQueue {
        async fn send(&self, _task: &SyncTask) -> pimsync_domain::Result<i64> {
            Ok(1)
        }
        async fn read(
            &self,
            _visibility: Duration,
            _limit: usize,
        ) -> pimsync_domain::Result<Vec<QueuedSyncTask>> {
            Ok(Vec::new())
        }
        async fn delete(&self, _task_id: i64) -> pimsync_domain::Result<()> {
            Ok(())
        }
        async fn nack(&self, _task_id: i64, _delay: Duration) -> pimsync_domain::Result<()> {
            Ok(())
        }
        async fn archive(&self, _task_id: i64) -> pimsync_domain::Result<()> {
            Ok(())
        }
        async fn pending_count(&self, _entity_type: EntityType) -> pimsync_domain::Result<usize> {
            Ok(0)
        }
        async fn purge_archive(&self, _older_than: Duration) -> pimsync_domain::Result<usize> {
            Ok(0)
        }
    }

    struct NoopFetcher;

    #[async_trait]
    impl CatalogFetcher for NoopFetcher {
        async fn fetch_page(&self, _task: &SyncTask) -> pimsync_domain::Result<CatalogPage> {
            Ok(CatalogPage { items: Vec::new(), total: Some(0), has_more: false })
        }
    }

    struct NoopCatalog;

    #[async_trait]
    impl CatalogStore for NoopCatalog {
        async fn upsert(&self, _record: &CatalogRecord) -> pimsync_domain::Result<UpsertOutcome> {
            Ok(UpsertOutcome::Inserted)
        }
        async fn exists(
            &self,
            _entity_type: EntityType,
            _external_id: &str,
        ) -> pimsync_domain::Result<bool> {
            Ok(false)
        }
        async fn link(
            &self,
            _kind: RelationshipKind,
            _product_id: &str,
            _target_id: i64,
        ) -> pimsync_domain::Result<()> {
            Ok(())
        }
        async fn unlink(
            &self,
            _kind: RelationshipKind,
            _product_id: &str,
            _target_id: i64,
        ) -> pimsync_domain::Result<()> {
            Ok(())
        }
        async fn links_of(
            &self,
            _kind: RelationshipKind,
            _product_id: &str,
        ) -> pimsync_domain::Result<Vec<i64>> {
            Ok(Vec::new())
        }
        async fn set_category_parent(
            &self,
            _category_id: i64,
            _parent: Option<i64>,
        ) -> pimsync_domain::Result<bool> {
            Ok(false)
        }
        async fn product_raw_rows(&self) -> pimsync_domain::Result<Vec<(String, Value)>> {
            Ok(Vec::new())
        }
        async fn category_raw_rows(&self) -> pimsync_domain::Result<Vec<(i64, Value)>> {
            Ok(Vec::new())
        }
        async fn count(&self, _entity_type: EntityType) -> pimsync_domain::Result<i64> {
            Ok(0)
        }
    }

    struct NoopDeferred;

    #[async_trait]
    impl DeferredRelationshipStore for NoopDeferred {
        async fn defer(
            &self,
            _entity_type: EntityType,
            _entity_id: &str,
            _kind: RelationshipKind,
            _data: &Value,
        ) -> pimsync_domain::Result<()> {
            Ok(())
        }
        async fn claim_batch(
            &self,
            _limit: usize,
            _claim_ttl: Duration,
            _max_attempts: i32,
        ) -> pimsync_domain::Result<Vec<DeferredRelationship>> {
            Ok(Vec::new())
        }
        async fn complete(&self, _id: i64) -> pimsync_domain::Result<()> {
            Ok(())
        }
        async fn release(&self, _id: i64) -> pimsync_domain::Result<()> {
            Ok(())
        }
        async fn unresolved(
            &self,
            _min_attempts: i32,
        ) -> pimsync_domain::Result<Vec<DeferredRelationship>> {
            Ok(Vec::new())
        }
        async fn count(&self) -> pimsync_domain::Result<usize> {
            Ok(0)
        }
    }

    struct NoopErrors;

    #[async_trait]
    impl SyncErrorLog for NoopErrors {
        async fn record(
            &self,
            _sync_type: &str,
            _message: &str,
            _error_data: Option<&Value>,
        ) -> pimsync_domain::Result<()> {
            Ok(())
        }
        async fn recent(&self, _limit: usize) -> pimsync_domain::Result<Vec<SyncErrorRecord>> {
            Ok(Vec::new())
        }
    }

    struct NoopState;

    #[async_trait]
    impl SyncStateStore for NoopState {
        async fn ensure(&self, entity_type: EntityType) -> pimsync_domain::Result<SyncState> {
            Err(PimSyncError::Internal(format!("not used for {entity_type}")))
        }
        async fn get(
            &self,
            _entity_type: EntityType,
        ) -> pimsync_domain::Result<Option<SyncState>> {
            Ok(None)
        }
        async fn list(&self) -> pimsync_domain::Result<Vec<SyncState>> {
            Ok(Vec::new())
        }
        async fn current_cursor(&self, _entity_type: EntityType) -> pimsync_domain::Result<i64> {
            Ok(0)
        }
        async fn transition(
            &self,
            _entity_type: EntityType,
            _from: &[ChunkStatus],
            _to: ChunkStatus,
        ) -> pimsync_domain::Result<bool> {
            Ok(true)
        }
        async fn advance(
            &self,
            _entity_type: EntityType,
            _completed_page: i64,
            _has_more: bool,
            _items: usize,
        ) -> pimsync_domain::Result<()> {
            Ok(())
        }
        async fn mark_result(
            &self,
            _entity_type: EntityType,
            _outcome: SyncOutcome,
        ) -> pimsync_domain::Result<()> {
            Ok(())
        }
        async fn reset_if_stale(
            &self,
            _entity_type: EntityType,
            _older_than: Duration,
        ) -> pimsync_domain::Result<bool> {
            Ok(false)
        }
        async fn set_sync_count(
            &self,
            _entity_type: EntityType,
            _count: i64,
        ) -> pimsync_domain::Result<bool> {
            Ok(false)
        }
    }

    fn worker() -> SyncWorker {
        let catalog: Arc<dyn CatalogStore> = Arc::new(NoopCatalog);
        let deferred: Arc<dyn DeferredRelationshipStore> = Arc::new(NoopDeferred);
        let errors: Arc<dyn SyncErrorLog> = Arc::new(NoopErrors);
        let state: Arc<dyn SyncStateStore> = Arc::new(NoopState);
        let processor = Arc::new(ResponseProcessor::new(
            catalog,
            deferred,
            errors.clone(),
            state.clone(),
        ));
        let deps = SyncWorkerDeps {
            queue: Arc::new(EmptyQueue),
            fetcher: Arc::new(NoopFetcher),
            processor,
            state,
            errors,
        };
        SyncWorker::new(deps, SyncWorkerConfig::default(), Arc::new(PerformanceMetrics::new()))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn worker_lifecycle() {
        let mut worker = worker();

        assert!(!worker.is_running());
        worker.start().await.unwrap();
        assert!(worker.is_running());
        worker.stop().await.unwrap();
        assert!(!worker.is_running());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn double_start_fails() {
        let mut worker = worker();

        worker.start().await.unwrap();
        assert!(worker.start().await.is_err());
        worker.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_without_start_fails() {
        let mut worker = worker();
        assert!(worker.stop().await.is_err());
    }
}
