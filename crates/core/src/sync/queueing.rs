//! Queueing policies
//!
//! Two planners feed the task queue. The steady planner enqueues one page
//! for each due, idle entity type. The aggressive planner drains an open
//! backlog by enqueueing several consecutive pages ahead, and only for an
//! entity type that is idle with nothing queued or in flight, capped at
//! `max_in_flight` tasks. The steady planner always runs first in a
//! scheduler tick, so every queued task traces to exactly one policy.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pimsync_domain::{
    constants, ChunkStatus, EntityType, Result, SortingFormat, SyncOutcome, SyncState, SyncTask,
};
use tracing::{debug, info};

use super::ports::{SyncStateStore, TaskQueue};
use super::request;

/// Configuration for the task planner.
#[derive(Debug, Clone)]
pub struct TaskPlannerConfig {
    /// Minimum time between steady sync passes for one entity type.
    pub steady_interval: Duration,
    /// Queued-task cap per entity type for the aggressive policy.
    pub max_in_flight: usize,
}

impl Default for TaskPlannerConfig {
    fn default() -> Self {
        Self {
            steady_interval: Duration::from_secs(constants::DEFAULT_STEADY_SYNC_INTERVAL_SECS),
            max_in_flight: constants::DEFAULT_AGGRESSIVE_MAX_IN_FLIGHT,
        }
    }
}

/// Decides which entity-type pages are due and enqueues them.
pub struct TaskPlanner {
    state: Arc<dyn SyncStateStore>,
    queue: Arc<dyn TaskQueue>,
    config: TaskPlannerConfig,
}

impl TaskPlanner {
    pub fn new(
        state: Arc<dyn SyncStateStore>,
        queue: Arc<dyn TaskQueue>,
        config: TaskPlannerConfig,
    ) -> Self {
        Self { state, queue, config }
    }

    /// Steady policy: one task per due, idle entity type with an empty
    /// queue. Returns the number of tasks enqueued.
    pub async fn plan_steady(&self) -> Result<usize> {
        let now = Utc::now().timestamp_millis();
        let mut enqueued = 0;

        for entity_type in EntityType::ALL {
            let state = self.state.ensure(entity_type).await?;
            if !self.steady_due(&state, now) {
                continue;
            }
            if self.queue.pending_count(entity_type).await? > 0 {
                continue;
            }

            let task = SyncTask {
                entity_type,
                page: state.current_page,
                sorting_format: request::default_format(entity_type),
            };
            let task_id = self.queue.send(&task).await?;
            debug!(%entity_type, page = task.page, task_id, "steady task enqueued");
            enqueued += 1;
        }

        if enqueued > 0 {
            info!(enqueued, "steady queueing pass completed");
        }
        Ok(enqueued)
    }

    /// Aggressive policy: for an idle entity type mid-backfill with nothing
    /// queued or in flight, enqueue up to `max_in_flight` consecutive
    /// pages. Returns the number of tasks enqueued.
    pub async fn plan_aggressive(&self) -> Result<usize> {
        let mut enqueued = 0;

        for entity_type in EntityType::ALL {
            let state = self.state.ensure(entity_type).await?;
            if !backlog_open(&state) {
                continue;
            }
            if self.queue.pending_count(entity_type).await? > 0 {
                continue;
            }

            let format = request::default_format(entity_type);
            for offset in 0..self.config.max_in_flight as i64 {
                let task =
                    SyncTask { entity_type, page: state.current_page + offset, sorting_format: format };
                self.queue.send(&task).await?;
                enqueued += 1;
            }
            debug!(
                %entity_type,
                from_page = state.current_page,
                pages = self.config.max_in_flight,
                "aggressive backlog tasks enqueued"
            );
        }

        if enqueued > 0 {
            info!(enqueued, "aggressive queueing pass completed");
        }
        Ok(enqueued)
    }

    /// Enqueue a single test task for one entity type, validating the
    /// request shape first. Returns the queue id.
    pub async fn probe_entity(
        &self,
        entity_type: EntityType,
        sorting_format: SortingFormat,
    ) -> Result<i64> {
        let state = self.state.ensure(entity_type).await?;
        let task = SyncTask { entity_type, page: state.current_page, sorting_format };
        // surfaces unsupported formats as a build error before queueing
        request::build_request_body(&task)?;
        self.queue.send(&task).await
    }

    fn steady_due(&self, state: &SyncState, now: i64) -> bool {
        // error states re-enter the cycle here once the interval passes
        if !matches!(
            state.chunk_status,
            ChunkStatus::Idle | ChunkStatus::Done | ChunkStatus::Error
        ) {
            return false;
        }
        match state.last_sync_timestamp {
            None => true,
            Some(last) => now - last >= self.config.steady_interval.as_millis() as i64,
        }
    }
}

/// An entity type has an open backlog while its last outcome is anything
/// but complete.
fn backlog_open(state: &SyncState) -> bool {
    state.chunk_status == ChunkStatus::Idle
        && state.last_sync_status != Some(SyncOutcome::Complete)
        && state.last_sync_status != Some(SyncOutcome::Error)
}
