//! Recovery supervision
//!
//! The supervisor is the only component allowed to reset another
//! component's sync status: entity types stuck in fetching/processing past
//! a time threshold are forced back to idle so the planners pick them up
//! again. The backlog-clearing pass keeps the task archive bounded and
//! reconciles per-entity-type counters against the actual row counts.

use std::sync::Arc;
use std::time::Duration;

use pimsync_domain::{constants, BacklogReport, EntityType, Result, StuckSyncReset};
use tracing::{info, warn};

use super::ports::{CatalogStore, SyncStateStore, TaskQueue};

/// Configuration for the recovery supervisor.
#[derive(Debug, Clone)]
pub struct RecoverySupervisorConfig {
    /// Default stuck threshold when a pass does not specify one.
    pub stuck_threshold_hours: u32,
    /// How long archived tasks are retained before purging.
    pub archive_retention: Duration,
}

impl Default for RecoverySupervisorConfig {
    fn default() -> Self {
        Self {
            stuck_threshold_hours: constants::DEFAULT_STUCK_THRESHOLD_HOURS,
            archive_retention: Duration::from_secs(
                u64::from(constants::DEFAULT_ARCHIVE_RETENTION_DAYS) * 24 * 3600,
            ),
        }
    }
}

/// Detects and heals stalled sync state.
pub struct RecoverySupervisor {
    state: Arc<dyn SyncStateStore>,
    queue: Arc<dyn TaskQueue>,
    catalog: Arc<dyn CatalogStore>,
    config: RecoverySupervisorConfig,
}

impl RecoverySupervisor {
    pub fn new(
        state: Arc<dyn SyncStateStore>,
        queue: Arc<dyn TaskQueue>,
        catalog: Arc<dyn CatalogStore>,
        config: RecoverySupervisorConfig,
    ) -> Self {
        Self { state, queue, catalog, config }
    }

    /// Force every sync state stuck in fetching/processing for longer than
    /// `hours_threshold` back to idle. Reports one row per known entity
    /// type, stating whether it was stuck.
    pub async fn reset_stuck_syncs(&self, hours_threshold: u32) -> Result<Vec<StuckSyncReset>> {
        let older_than = Duration::from_secs(u64::from(hours_threshold) * 3600);
        let mut results = Vec::new();

        for state in self.state.list().await? {
            let was_stuck = self.state.reset_if_stale(state.entity_type, older_than).await?;
            if was_stuck {
                warn!(
                    entity_type = %state.entity_type,
                    status = %state.chunk_status,
                    "stuck sync reset to idle"
                );
            }
            results.push(StuckSyncReset { entity_type: state.entity_type, was_stuck });
        }

        info!(
            checked = results.len(),
            stuck = results.iter().filter(|r| r.was_stuck).count(),
            "stuck sync scan completed"
        );
        Ok(results)
    }

    /// Run a pass with the configured default threshold.
    pub async fn reset_stuck_syncs_default(&self) -> Result<Vec<StuckSyncReset>> {
        self.reset_stuck_syncs(self.config.stuck_threshold_hours).await
    }

    /// Purge expired archived tasks and reconcile each entity type's sync
    /// counter with the number of rows actually stored.
    pub async fn clear_response_backlog(&self) -> Result<BacklogReport> {
        let mut report = BacklogReport::default();

        report.archived_purged = self.queue.purge_archive(self.config.archive_retention).await?;

        for entity_type in EntityType::ALL {
            let stored = self.catalog.count(entity_type).await?;
            if self.state.set_sync_count(entity_type, stored).await? {
                report.counters_reconciled += 1;
            }
        }

        info!(
            purged = report.archived_purged,
            reconciled = report.counters_reconciled,
            "response backlog cleared"
        );
        Ok(report)
    }
}
