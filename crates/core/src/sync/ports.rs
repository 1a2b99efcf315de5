//! Port interfaces for sync operations

use std::time::Duration;

use async_trait::async_trait;
use pimsync_domain::{
    CatalogPage, CatalogRecord, ChunkStatus, DeferredRelationship, EntityType, QueuedSyncTask,
    RelationshipKind, Result, SyncErrorRecord, SyncOutcome, SyncState, SyncTask, UpsertOutcome,
};
use serde_json::Value;

/// Trait for the durable sync task queue.
///
/// Delivery is at-least-once under a visibility timeout model: a task read
/// but never deleted becomes visible again once its visibility window
/// expires. FIFO ordering within an entity type is best-effort only;
/// consumers must be idempotent.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue a task, returning its queue id.
    async fn send(&self, task: &SyncTask) -> Result<i64>;

    /// Claim up to `limit` visible tasks, hiding them for `visibility`.
    async fn read(&self, visibility: Duration, limit: usize) -> Result<Vec<QueuedSyncTask>>;

    /// Acknowledge a task: remove it from the queue for good.
    async fn delete(&self, task_id: i64) -> Result<()>;

    /// Negative-acknowledge a task: make it visible again after `delay`,
    /// incrementing its attempt count.
    async fn nack(&self, task_id: i64, delay: Duration) -> Result<()>;

    /// Move a task out of the live queue into the archive.
    async fn archive(&self, task_id: i64) -> Result<()>;

    /// Number of live (queued or in-flight) tasks for an entity type.
    async fn pending_count(&self, entity_type: EntityType) -> Result<usize>;

    /// Delete archived tasks older than `older_than`, returning the count.
    async fn purge_archive(&self, older_than: Duration) -> Result<usize>;
}

/// Trait for the per-entity-type sync state tracker.
///
/// Implementations must serialize concurrent transitions per entity type
/// (single writer at a time); the compare-and-set methods return whether the
/// caller won the transition.
#[async_trait]
pub trait SyncStateStore: Send + Sync {
    /// Fetch the state row for an entity type, creating it at page 0/idle if
    /// missing.
    async fn ensure(&self, entity_type: EntityType) -> Result<SyncState>;

    /// Fetch the state row for an entity type, if present.
    async fn get(&self, entity_type: EntityType) -> Result<Option<SyncState>>;

    /// All state rows.
    async fn list(&self) -> Result<Vec<SyncState>>;

    /// Current page cursor for an entity type (0 when no row exists).
    async fn current_cursor(&self, entity_type: EntityType) -> Result<i64>;

    /// Compare-and-set status transition: succeeds only while the current
    /// status is one of `from`. Returns whether the transition happened.
    async fn transition(
        &self,
        entity_type: EntityType,
        from: &[ChunkStatus],
        to: ChunkStatus,
    ) -> Result<bool>;

    /// Record a completed page: advance the cursor (never regressing), add
    /// `items` to the sync counter, stamp the sync timestamp, and set the
    /// status to done with outcome success (more pages) or complete
    /// (backlog drained).
    async fn advance(
        &self,
        entity_type: EntityType,
        completed_page: i64,
        has_more: bool,
        items: usize,
    ) -> Result<()>;

    /// Record a terminal outcome without touching the cursor.
    async fn mark_result(&self, entity_type: EntityType, outcome: SyncOutcome) -> Result<()>;

    /// Force an in-flight state back to idle when it has not progressed for
    /// `older_than`. Returns whether the row was stuck and got reset.
    async fn reset_if_stale(&self, entity_type: EntityType, older_than: Duration) -> Result<bool>;

    /// Overwrite the sync counter. Returns whether the stored value changed.
    async fn set_sync_count(&self, entity_type: EntityType, count: i64) -> Result<bool>;
}

/// Trait for catalog row and join row storage.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert-or-replace a catalog row keyed by external id. `raw` is always
    /// overwritten with the latest snapshot.
    async fn upsert(&self, record: &CatalogRecord) -> Result<UpsertOutcome>;

    /// Whether a row with the given external id exists.
    async fn exists(&self, entity_type: EntityType, external_id: &str) -> Result<bool>;

    /// Upsert a join row (idempotent; duplicate pairs are a no-op).
    async fn link(&self, kind: RelationshipKind, product_id: &str, target_id: i64) -> Result<()>;

    /// Remove a join row.
    async fn unlink(&self, kind: RelationshipKind, product_id: &str, target_id: i64) -> Result<()>;

    /// Target ids currently linked to a product for one relationship kind.
    async fn links_of(&self, kind: RelationshipKind, product_id: &str) -> Result<Vec<i64>>;

    /// Set a category's parent link. Returns whether the stored value
    /// changed.
    async fn set_category_parent(&self, category_id: i64, parent: Option<i64>) -> Result<bool>;

    /// `(id, raw)` for every product row; repair input.
    async fn product_raw_rows(&self) -> Result<Vec<(String, Value)>>;

    /// `(id, raw)` for every category row; repair input.
    async fn category_raw_rows(&self) -> Result<Vec<(i64, Value)>>;

    /// Number of rows stored for an entity type.
    async fn count(&self, entity_type: EntityType) -> Result<i64>;
}

/// Trait for the deferred relationship set.
#[async_trait]
pub trait DeferredRelationshipStore: Send + Sync {
    /// Record an edge whose target row does not exist yet. Idempotent for
    /// the same `(entity_type, entity_id, kind, target id)`.
    async fn defer(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        kind: RelationshipKind,
        data: &Value,
    ) -> Result<()>;

    /// Claim a batch oldest-first for resolution. Claimed entries are hidden
    /// from other resolvers for `claim_ttl`; entries with `attempts >=
    /// max_attempts` are never claimed.
    async fn claim_batch(
        &self,
        limit: usize,
        claim_ttl: Duration,
        max_attempts: i32,
    ) -> Result<Vec<DeferredRelationship>>;

    /// Delete a resolved entry.
    async fn complete(&self, id: i64) -> Result<()>;

    /// Release a claim after a failed resolution attempt, incrementing the
    /// attempt counter.
    async fn release(&self, id: i64) -> Result<()>;

    /// Entries that exhausted their resolution attempts (the repair report
    /// input). Never deleted here.
    async fn unresolved(&self, min_attempts: i32) -> Result<Vec<DeferredRelationship>>;

    /// Number of entries currently in the set.
    async fn count(&self) -> Result<usize>;
}

/// Trait for the append-only sync error log.
#[async_trait]
pub trait SyncErrorLog: Send + Sync {
    /// Append a failure record. Rows are never mutated afterwards.
    async fn record(&self, sync_type: &str, message: &str, error_data: Option<&Value>)
        -> Result<()>;

    /// Most recent failure records, newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<SyncErrorRecord>>;
}

/// Trait for fetching one catalog page from the external provider.
#[async_trait]
pub trait CatalogFetcher: Send + Sync {
    /// Fetch the page described by `task`.
    async fn fetch_page(&self, task: &SyncTask) -> Result<CatalogPage>;
}
