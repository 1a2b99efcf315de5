//! Resolver scheduler for periodic deferred relationship draining.
//!
//! Each tick drains claimed batches until one comes back empty, so a burst
//! of deferrals created by a large ingest is cleared in a single tick
//! instead of one batch per interval.

use std::sync::Arc;
use std::time::{Duration, Instant};

use pimsync_core::RelationshipResolver;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::observability::metrics::PerformanceMetrics;
use crate::observability::MetricsResult;
use crate::scheduling::error::{SchedulerError, SchedulerResult};

/// Type alias for task handle to avoid complexity warnings
type TaskHandle = Arc<Mutex<Option<JoinHandle<()>>>>;

/// Configuration for the resolver scheduler
#[derive(Debug, Clone)]
pub struct ResolverSchedulerConfig {
    /// Interval between resolution ticks
    pub interval: Duration,
    /// Deferred entries claimed per batch
    pub batch_size: usize,
    /// Timeout for one batch
    pub batch_timeout: Duration,
    /// Cap on batches drained per tick
    pub max_batches_per_tick: usize,
}

impl Default for ResolverSchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            batch_size: pimsync_domain::constants::DEFAULT_RESOLVER_BATCH_SIZE,
            batch_timeout: Duration::from_secs(60),
            max_batches_per_tick: 10,
        }
    }
}

/// Resolver scheduler with lifecycle management
pub struct ResolverScheduler {
    resolver: Arc<RelationshipResolver>,
    config: ResolverSchedulerConfig,
    cancellation_token: CancellationToken,
    task_handle: TaskHandle,
    metrics: Arc<PerformanceMetrics>,
}

impl ResolverScheduler {
    /// Create a new resolver scheduler
    pub fn new(
        resolver: Arc<RelationshipResolver>,
        config: ResolverSchedulerConfig,
        metrics: Arc<PerformanceMetrics>,
    ) -> Self {
        Self {
            resolver,
            config,
            cancellation_token: CancellationToken::new(),
            task_handle: Arc::new(Mutex::new(None)),
            metrics,
        }
    }

    /// Start the scheduler
    ///
    /// # Errors
    ///
    /// Returns error if scheduler is already running
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        info!("Starting resolver scheduler");

        self.cancellation_token = CancellationToken::new();

        let resolver = Arc::clone(&self.resolver);
        let config = self.config.clone();
        let cancel = self.cancellation_token.clone();
        let metrics = Arc::clone(&self.metrics);

        let handle = tokio::spawn(async move {
            Self::resolve_loop(resolver, config, cancel, metrics).await;
        });

        *self.task_handle.lock().await = Some(handle);

        info!("Resolver scheduler started");
        log_metric(self.metrics.record_call(), "scheduler.resolver.start");

        Ok(())
    }

    /// Stop the scheduler gracefully
    ///
    /// # Errors
    ///
    /// Returns error if scheduler is not running
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        info!("Stopping resolver scheduler");

        self.cancellation_token.cancel();

        if let Some(handle) = self.task_handle.lock().await.take() {
            let join_timeout = Duration::from_secs(5);
            tokio::time::timeout(join_timeout, handle)
                .await
                .map_err(|_| SchedulerError::Timeout { seconds: join_timeout.as_secs() })?
                .map_err(|e| SchedulerError::TaskJoinFailed(e.to_string()))?;
        }

        info!("Resolver scheduler stopped");
        log_metric(self.metrics.record_call(), "scheduler.resolver.stop");

        Ok(())
    }

    /// Check if scheduler is running
    pub fn is_running(&self) -> bool {
        self.task_handle
            .try_lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    /// Background resolution loop
    async fn resolve_loop(
        resolver: Arc<RelationshipResolver>,
        config: ResolverSchedulerConfig,
        cancel: CancellationToken,
        metrics: Arc<PerformanceMetrics>,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Resolver loop cancelled");
                    break;
                }
                _ = tokio::time::sleep(config.interval) => {
                    log_metric(metrics.record_call(), "scheduler.resolver.tick");
                    let started = Instant::now();

                    match Self::drain_once(&resolver, &config).await {
                        Ok(resolved) if resolved > 0 => {
                            info!(resolved, "deferred relationships resolved");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!(error = %e, "Deferred resolution pass failed");
                            log_metric(metrics.record_fetch_error(), "scheduler.resolver.error");
                        }
                    }

                    log_metric(
                        metrics.record_duration(started.elapsed()),
                        "scheduler.resolver.duration",
                    );
                }
            }
        }
    }

    /// Drain batches until one resolves nothing or the per-tick cap hits.
    async fn drain_once(
        resolver: &Arc<RelationshipResolver>,
        config: &ResolverSchedulerConfig,
    ) -> SchedulerResult<usize> {
        let mut total = 0;

        for _ in 0..config.max_batches_per_tick {
            let resolved = tokio::time::timeout(
                config.batch_timeout,
                resolver.process_deferred(config.batch_size),
            )
            .await
            .map_err(|_| SchedulerError::Timeout { seconds: config.batch_timeout.as_secs() })?
            .map_err(|source| SchedulerError::PassFailed { operation: "resolve", source })?;

            total += resolved;
            if resolved == 0 {
                break;
            }
        }

        Ok(total)
    }
}

fn log_metric(result: MetricsResult<()>, metric: &'static str) {
    if let Err(err) = result {
        tracing::warn!(metric = metric, error = ?err, "Failed to record scheduler metric");
    }
}

/// Ensure scheduler is stopped when dropped
impl Drop for ResolverScheduler {
    fn drop(&mut self) {
        if !self.cancellation_token.is_cancelled() {
            tracing::warn!("ResolverScheduler dropped while running; cancelling");
            self.cancellation_token.cancel();
        }
    }
}
