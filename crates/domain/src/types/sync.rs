//! Sync engine types: state tracking, task queue, deferred relationships,
//! error log records, and operation reports.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::entity::EntityType;
use crate::impl_domain_status_conversions;

/// Per-page processing status of an entity type's sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    Idle,
    Fetching,
    Processing,
    Done,
    Error,
}

impl_domain_status_conversions!(ChunkStatus {
    Idle => "idle",
    Fetching => "fetching",
    Processing => "processing",
    Done => "done",
    Error => "error"
});

impl ChunkStatus {
    /// Statuses that indicate a worker owns the entity type right now.
    pub fn is_in_flight(self) -> bool {
        matches!(self, ChunkStatus::Fetching | ChunkStatus::Processing)
    }
}

/// Outcome of the most recent sync cycle for an entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOutcome {
    /// A page was ingested and more pages remain.
    Success,
    /// The final page was ingested; the backlog is drained.
    Complete,
    /// The last cycle ended in a terminal failure.
    Error,
}

impl_domain_status_conversions!(SyncOutcome {
    Success => "success",
    Complete => "complete",
    Error => "error"
});

/// One live row per entity type tracking pagination and status.
///
/// `updated_at` (unix milliseconds) strictly increases on every transition
/// and doubles as the compare-and-set token for per-entity-type
/// serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncState {
    pub entity_type: EntityType,
    pub current_page: i64,
    pub chunk_status: ChunkStatus,
    pub last_sync_status: Option<SyncOutcome>,
    pub last_sync_timestamp: Option<i64>,
    pub sync_count: i64,
    pub updated_at: i64,
}

/// Payload shape for the provider's sorting clause.
///
/// The provider accepts two shapes; not every entity type accepts both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortingFormat {
    /// `{"id": "ASC"}`
    Simple,
    /// `[{"field": "id", "order": "ASC"}]`
    Nested,
}

impl_domain_status_conversions!(SortingFormat {
    Simple => "simple",
    Nested => "nested"
});

/// A unit of sync work to enqueue: one page of one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTask {
    pub entity_type: EntityType,
    pub page: i64,
    pub sorting_format: SortingFormat,
}

/// A task as delivered by the queue, with delivery bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedSyncTask {
    pub id: i64,
    pub task: SyncTask,
    pub attempts: i32,
    pub enqueued_at: i64,
    pub visible_at: i64,
}

/// Kinds of relationship edges embedded in catalog items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    Brand,
    Category,
    Organization,
    Media,
    CategoryParent,
}

impl_domain_status_conversions!(RelationshipKind {
    Brand => "brand",
    Category => "category",
    Organization => "organization",
    Media => "media",
    CategoryParent => "category_parent"
});

impl RelationshipKind {
    /// The entity type the edge points at.
    pub fn target_entity(self) -> EntityType {
        match self {
            RelationshipKind::Brand => EntityType::Brand,
            RelationshipKind::Category | RelationshipKind::CategoryParent => EntityType::Category,
            RelationshipKind::Organization => EntityType::Organization,
            RelationshipKind::Media => EntityType::Media,
        }
    }
}

/// An edge recorded before its target row existed, resolved later.
///
/// `relationship_data` carries the raw embedded payload (at minimum the
/// target `id`) so resolution never needs the original response again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeferredRelationship {
    pub id: i64,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub relationship_type: RelationshipKind,
    pub relationship_data: Value,
    pub attempts: i32,
    pub claimed_at: Option<i64>,
    pub created_at: i64,
}

impl DeferredRelationship {
    /// Target row id carried in the relationship payload.
    pub fn target_id(&self) -> Option<i64> {
        self.relationship_data.get("id").and_then(Value::as_i64)
    }
}

/// Append-only failure record for audit and diagnosis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncErrorRecord {
    pub id: i64,
    pub sync_type: String,
    pub error_message: String,
    pub error_data: Option<Value>,
    pub created_at: i64,
}

/// Per-batch ingest counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub inserted: usize,
    pub updated: usize,
    pub deferred: usize,
    pub failed: usize,
}

impl IngestReport {
    /// Items that made it into the catalog (inserted or updated).
    pub fn stored(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Result row of a stuck-sync recovery pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StuckSyncReset {
    pub entity_type: EntityType,
    pub was_stuck: bool,
}

/// Result of a backlog-clearing pass: archive hygiene plus counter
/// reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacklogReport {
    pub archived_purged: usize,
    pub counters_reconciled: usize,
}

/// Result of a full relationship reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairReport {
    pub products_scanned: usize,
    pub edges_added: usize,
    pub edges_removed: usize,
}

/// One row of the operator-facing sync dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardRow {
    pub entity_type: EntityType,
    pub current_page: i64,
    pub items_synced: i64,
    pub last_sync_status: Option<SyncOutcome>,
    pub last_sync_at: Option<i64>,
    pub minutes_since_last_sync: Option<i64>,
}
