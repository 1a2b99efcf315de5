//! Queue scheduler for periodic task planning.
//!
//! Runs the steady planner first on every tick, then the aggressive planner
//! for entity types with an open backlog. Running steady first keeps the
//! arbitration rule simple: aggressive only ever sees entity types the
//! steady policy left without queued work.

use std::sync::Arc;
use std::time::{Duration, Instant};

use pimsync_core::TaskPlanner;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::observability::metrics::PerformanceMetrics;
use crate::observability::MetricsResult;
use crate::scheduling::error::{SchedulerError, SchedulerResult};

/// Type alias for task handle to avoid complexity warnings
type TaskHandle = Arc<Mutex<Option<JoinHandle<()>>>>;

/// Configuration for the queue scheduler
#[derive(Debug, Clone)]
pub struct QueueSchedulerConfig {
    /// Interval between planning ticks
    pub interval: Duration,
    /// Timeout for one planning pass
    pub pass_timeout: Duration,
    /// Whether the aggressive planner runs after the steady planner
    pub aggressive_enabled: bool,
}

impl Default for QueueSchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            pass_timeout: Duration::from_secs(30),
            aggressive_enabled: true,
        }
    }
}

/// Queue scheduler with lifecycle management
pub struct QueueScheduler {
    planner: Arc<TaskPlanner>,
    config: QueueSchedulerConfig,
    cancellation_token: CancellationToken,
    task_handle: TaskHandle,
    metrics: Arc<PerformanceMetrics>,
}

impl QueueScheduler {
    /// Create a new queue scheduler
    pub fn new(
        planner: Arc<TaskPlanner>,
        config: QueueSchedulerConfig,
        metrics: Arc<PerformanceMetrics>,
    ) -> Self {
        Self {
            planner,
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

        info!("Starting queue scheduler");

        // Create a new cancellation token (supports restart after stop)
        self.cancellation_token = CancellationToken::new();

        let planner = Arc::clone(&self.planner);
        let config = self.config.clone();
        let cancel = self.cancellation_token.clone();
        let metrics = Arc::clone(&self.metrics);

        let handle = tokio::spawn(async move {
            Self::plan_loop(planner, config, cancel, metrics).await;
        });

        *self.task_handle.lock().await = Some(handle);

        info!("Queue scheduler started");
        log_metric(self.metrics.record_call(), "scheduler.queue.start");

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

        info!("Stopping queue scheduler");

        self.cancellation_token.cancel();

        if let Some(handle) = self.task_handle.lock().await.take() {
            let join_timeout = Duration::from_secs(5);
            tokio::time::timeout(join_timeout, handle)
                .await
                .map_err(|_| SchedulerError::Timeout { seconds: join_timeout.as_secs() })?
                .map_err(|e| SchedulerError::TaskJoinFailed(e.to_string()))?;
        }

        info!("Queue scheduler stopped");
        log_metric(self.metrics.record_call(), "scheduler.queue.stop");

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

    /// Background planning loop
    async fn plan_loop(
        planner: Arc<TaskPlanner>,
        config: QueueSchedulerConfig,
        cancel: CancellationToken,
        metrics: Arc<PerformanceMetrics>,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Queue planning loop cancelled");
                    break;
                }
                _ = tokio::time::sleep(config.interval) => {
                    log_metric(metrics.record_call(), "scheduler.queue.tick");
                    let started = Instant::now();

                    if let Err(e) = Self::plan_once(&planner, &config).await {
                        error!(error = %e, "Queue planning pass failed");
                        log_metric(metrics.record_fetch_error(), "scheduler.queue.error");
                    }

                    log_metric(
                        metrics.record_duration(started.elapsed()),
                        "scheduler.queue.duration",
                    );
                }
            }
        }
    }

    /// Run one planning pass: steady first, then aggressive.
    async fn plan_once(
        planner: &Arc<TaskPlanner>,
        config: &QueueSchedulerConfig,
    ) -> SchedulerResult<()> {
        let steady = tokio::time::timeout(config.pass_timeout, planner.plan_steady())
            .await
            .map_err(|_| SchedulerError::Timeout { seconds: config.pass_timeout.as_secs() })?
            .map_err(|source| SchedulerError::PassFailed { operation: "steady", source })?;

        let mut aggressive = 0;
        if config.aggressive_enabled {
            aggressive = tokio::time::timeout(config.pass_timeout, planner.plan_aggressive())
                .await
                .map_err(|_| SchedulerError::Timeout { seconds: config.pass_timeout.as_secs() })?
                .map_err(|source| SchedulerError::PassFailed { operation: "aggressive", source })?;
        }

        if steady + aggressive > 0 {
            debug!(steady, aggressive, "planning pass enqueued tasks");
        }
        Ok(())
    }
}

fn log_metric(result: MetricsResult<()>, metric: &'static str) {
    if let Err(err) = result {
        tracing::warn!(metric = metric, error = ?err, "Failed to record scheduler metric");
    }
}

/// Ensure scheduler is stopped when dropped
impl Drop for QueueScheduler {
    fn drop(&mut self) {
        if !self.cancellation_token.is_cancelled() {
            tracing::warn!("QueueScheduler dropped while running; cancelling");
            self.cancellation_token.cancel();
        }
    }
}
