//! Recovery scheduler for periodic self-healing.
//!
//! Each tick runs the stuck-sync scan with the configured threshold, then
//! the backlog-clearing pass (archive purge + counter reconciliation).

use std::sync::Arc;
use std::time::{Duration, Instant};

use pimsync_core::RecoverySupervisor;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::observability::metrics::PerformanceMetrics;
use crate::observability::MetricsResult;
use crate::scheduling::error::{SchedulerError, SchedulerResult};

/// Type alias for task handle to avoid complexity warnings
type TaskHandle = Arc<Mutex<Option<JoinHandle<()>>>>;

/// Configuration for the recovery scheduler
#[derive(Debug, Clone)]
pub struct RecoverySchedulerConfig {
    /// Interval between recovery ticks
    pub interval: Duration,
    /// Timeout for one recovery pass
    pub pass_timeout: Duration,
}

impl Default for RecoverySchedulerConfig {
    fn default() -> Self {
        Self { interval: Duration::from_secs(3600), pass_timeout: Duration::from_secs(120) }
    }
}

/// Recovery scheduler with lifecycle management
pub struct RecoveryScheduler {
    supervisor: Arc<RecoverySupervisor>,
    config: RecoverySchedulerConfig,
    cancellation_token: CancellationToken,
    task_handle: TaskHandle,
    metrics: Arc<PerformanceMetrics>,
}

impl RecoveryScheduler {
    /// Create a new recovery scheduler
    pub fn new(
        supervisor: Arc<RecoverySupervisor>,
        config: RecoverySchedulerConfig,
        metrics: Arc<PerformanceMetrics>,
    ) -> Self {
        Self {
            supervisor,
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

        info!("Starting recovery scheduler");

        self.cancellation_token = CancellationToken::new();

        let supervisor = Arc::clone(&self.supervisor);
        let config = self.config.clone();
        let cancel = self.cancellation_token.clone();
        let metrics = Arc::clone(&self.metrics);

        let handle = tokio::spawn(async move {
            Self::recovery_loop(supervisor, config, cancel, metrics).await;
        });

        *self.task_handle.lock().await = Some(handle);

        info!("Recovery scheduler started");
        log_metric(self.metrics.record_call(), "scheduler.recovery.start");

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

        info!("Stopping recovery scheduler");

        self.cancellation_token.cancel();

        if let Some(handle) = self.task_handle.lock().await.take() {
            let join_timeout = Duration::from_secs(5);
            tokio::time::timeout(join_timeout, handle)
                .await
                .map_err(|_| SchedulerError::Timeout { seconds: join_timeout.as_secs() })?
                .map_err(|e| SchedulerError::TaskJoinFailed(e.to_string()))?;
        }

        info!("Recovery scheduler stopped");
        log_metric(self.metrics.record_call(), "scheduler.recovery.stop");

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

    /// Background recovery loop
    async fn recovery_loop(
        supervisor: Arc<RecoverySupervisor>,
        config: RecoverySchedulerConfig,
        cancel: CancellationToken,
        metrics: Arc<PerformanceMetrics>,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Recovery loop cancelled");
                    break;
                }
                _ = tokio::time::sleep(config.interval) => {
                    log_metric(metrics.record_call(), "scheduler.recovery.tick");
                    let started = Instant::now();

                    if let Err(e) = Self::recover_once(&supervisor, &config).await {
                        error!(error = %e, "Recovery pass failed");
                        log_metric(metrics.record_fetch_error(), "scheduler.recovery.error");
                    }

                    log_metric(
                        metrics.record_duration(started.elapsed()),
                        "scheduler.recovery.duration",
                    );
                }
            }
        }
    }

    /// Run one recovery pass: stuck scan, then backlog clearing.
    async fn recover_once(
        supervisor: &Arc<RecoverySupervisor>,
        config: &RecoverySchedulerConfig,
    ) -> SchedulerResult<()> {
        let resets =
            tokio::time::timeout(config.pass_timeout, supervisor.reset_stuck_syncs_default())
                .await
                .map_err(|_| SchedulerError::Timeout { seconds: config.pass_timeout.as_secs() })?
                .map_err(|source| SchedulerError::PassFailed { operation: "stuck-scan", source })?;

        let stuck = resets.iter().filter(|r| r.was_stuck).count();
        if stuck > 0 {
            warn!(stuck, "stuck entity types reset to idle");
        }

        let report =
            tokio::time::timeout(config.pass_timeout, supervisor.clear_response_backlog())
                .await
                .map_err(|_| SchedulerError::Timeout { seconds: config.pass_timeout.as_secs() })?
                .map_err(|source| SchedulerError::PassFailed { operation: "backlog", source })?;

        debug!(
            purged = report.archived_purged,
            reconciled = report.counters_reconciled,
            "recovery pass completed"
        );
        Ok(())
    }
}

fn log_metric(result: MetricsResult<()>, metric: &'static str) {
    if let Err(err) = result {
        tracing::warn!(metric = metric, error = ?err, "Failed to record scheduler metric");
    }
}

/// Ensure scheduler is stopped when dropped
impl Drop for RecoveryScheduler {
    fn drop(&mut self) {
        if !self.cancellation_token.is_cancelled() {
            tracing::warn!("RecoveryScheduler dropped while running; cancelling");
            self.cancellation_token.cancel();
        }
    }
}
