//! In-memory port implementations shared by the service unit tests.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use pimsync_domain::{
    CatalogRecord, ChunkStatus, DeferredRelationship, EntityType, PimSyncError, QueuedSyncTask,
    RelationshipKind, Result, SyncErrorRecord, SyncOutcome, SyncState, SyncTask, UpsertOutcome,
};
use serde_json::Value;
use tokio::sync::Mutex;

use super::ports::{
    CatalogStore, DeferredRelationshipStore, SyncErrorLog, SyncStateStore, TaskQueue,
};

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// In-memory catalog store: rows keyed by `(entity type, external id)`,
/// join rows as a set of `(kind, product id, target id)` triples.
#[derive(Default)]
pub struct MemoryCatalogStore {
    rows: Mutex<HashMap<(EntityType, String), CatalogRecord>>,
    links: Mutex<BTreeSet<(String, String, i64)>>,
    parents: Mutex<HashMap<i64, Option<i64>>>,
}

impl MemoryCatalogStore {
    pub async fn link_set(&self, kind: RelationshipKind) -> Vec<(String, i64)> {
        let kind = kind.to_string();
        self.links
            .lock()
            .await
            .iter()
            .filter(|(k, _, _)| *k == kind)
            .map(|(_, p, t)| (p.clone(), *t))
            .collect()
    }

    pub async fn parent_of(&self, category_id: i64) -> Option<i64> {
        self.parents.lock().await.get(&category_id).copied().flatten()
    }

    pub async fn row(&self, entity_type: EntityType, external_id: &str) -> Option<CatalogRecord> {
        self.rows.lock().await.get(&(entity_type, external_id.to_string())).cloned()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn upsert(&self, record: &CatalogRecord) -> Result<UpsertOutcome> {
        let key = (record.entity_type(), record.external_id());
        if let CatalogRecord::Category(category) = record {
            self.parents.lock().await.insert(category.id, category.parent);
        }
        let previous = self.rows.lock().await.insert(key, record.clone());
        Ok(if previous.is_some() { UpsertOutcome::Updated } else { UpsertOutcome::Inserted })
    }

    async fn exists(&self, entity_type: EntityType, external_id: &str) -> Result<bool> {
        Ok(self.rows.lock().await.contains_key(&(entity_type, external_id.to_string())))
    }

    async fn link(&self, kind: RelationshipKind, product_id: &str, target_id: i64) -> Result<()> {
        self.links.lock().await.insert((kind.to_string(), product_id.to_string(), target_id));
        Ok(())
    }

    async fn unlink(&self, kind: RelationshipKind, product_id: &str, target_id: i64) -> Result<()> {
        self.links.lock().await.remove(&(kind.to_string(), product_id.to_string(), target_id));
        Ok(())
    }

    async fn links_of(&self, kind: RelationshipKind, product_id: &str) -> Result<Vec<i64>> {
        let kind = kind.to_string();
        Ok(self
            .links
            .lock()
            .await
            .iter()
            .filter(|(k, p, _)| *k == kind && p == product_id)
            .map(|(_, _, t)| *t)
            .collect())
    }

    async fn set_category_parent(&self, category_id: i64, parent: Option<i64>) -> Result<bool> {
        let mut parents = self.parents.lock().await;
        let changed = parents.get(&category_id).copied() != Some(parent);
        parents.insert(category_id, parent);

        let mut rows = self.rows.lock().await;
        if let Some(CatalogRecord::Category(category)) =
            rows.get_mut(&(EntityType::Category, category_id.to_string()))
        {
            category.parent = parent;
        }
        Ok(changed)
    }

    async fn product_raw_rows(&self) -> Result<Vec<(String, Value)>> {
        Ok(self
            .rows
            .lock()
            .await
            .values()
            .filter_map(|record| match record {
                CatalogRecord::Product(p) => Some((p.id.clone(), p.raw.clone())),
                _ => None,
            })
            .collect())
    }

    async fn category_raw_rows(&self) -> Result<Vec<(i64, Value)>> {
        Ok(self
            .rows
            .lock()
            .await
            .values()
            .filter_map(|record| match record {
                CatalogRecord::Category(c) => Some((c.id, c.raw.clone())),
                _ => None,
            })
            .collect())
    }

    async fn count(&self, entity_type: EntityType) -> Result<i64> {
        Ok(self.rows.lock().await.keys().filter(|(e, _)| *e == entity_type).count() as i64)
    }
}

/// In-memory deferred relationship set with claim/attempt bookkeeping.
#[derive(Default)]
pub struct MemoryDeferredStore {
    entries: Mutex<Vec<DeferredRelationship>>,
    next_id: Mutex<i64>,
}

impl MemoryDeferredStore {
    pub async fn entries(&self) -> Vec<DeferredRelationship> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl DeferredRelationshipStore for MemoryDeferredStore {
    async fn defer(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        kind: RelationshipKind,
        data: &Value,
    ) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let target = data.get("id").and_then(Value::as_i64);
        let duplicate = entries.iter().any(|e| {
            e.entity_type == entity_type
                && e.entity_id == entity_id
                && e.relationship_type == kind
                && e.target_id() == target
        });
        if duplicate {
            return Ok(());
        }
        let mut next_id = self.next_id.lock().await;
        *next_id += 1;
        entries.push(DeferredRelationship {
            id: *next_id,
            entity_type,
            entity_id: entity_id.to_string(),
            relationship_type: kind,
            relationship_data: data.clone(),
            attempts: 0,
            claimed_at: None,
            created_at: now_ms(),
        });
        Ok(())
    }

    async fn claim_batch(
        &self,
        limit: usize,
        claim_ttl: Duration,
        max_attempts: i32,
    ) -> Result<Vec<DeferredRelationship>> {
        let now = now_ms();
        let stale_before = now - claim_ttl.as_millis() as i64;
        let mut entries = self.entries.lock().await;
        let mut claimed = Vec::new();
        for entry in entries.iter_mut() {
            if claimed.len() >= limit {
                break;
            }
            let claimable = entry.attempts < max_attempts
                && entry.claimed_at.map_or(true, |at| at <= stale_before);
            if claimable {
                entry.claimed_at = Some(now);
                claimed.push(entry.clone());
            }
        }
        Ok(claimed)
    }

    async fn complete(&self, id: i64) -> Result<()> {
        self.entries.lock().await.retain(|e| e.id != id);
        Ok(())
    }

    async fn release(&self, id: i64) -> Result<()> {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.iter_mut().find(|e| e.id == id) {
            entry.attempts += 1;
            entry.claimed_at = None;
        }
        Ok(())
    }

    async fn unresolved(&self, min_attempts: i32) -> Result<Vec<DeferredRelationship>> {
        Ok(self
            .entries
            .lock()
            .await
            .iter()
            .filter(|e| e.attempts >= min_attempts)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.lock().await.len())
    }
}

/// In-memory append-only error log.
#[derive(Default)]
pub struct MemoryErrorLog {
    records: Mutex<Vec<SyncErrorRecord>>,
}

impl MemoryErrorLog {
    pub async fn records(&self) -> Vec<SyncErrorRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl SyncErrorLog for MemoryErrorLog {
    async fn record(
        &self,
        sync_type: &str,
        message: &str,
        error_data: Option<&Value>,
    ) -> Result<()> {
        let mut records = self.records.lock().await;
        let id = records.len() as i64 + 1;
        records.push(SyncErrorRecord {
            id,
            sync_type: sync_type.to_string(),
            error_message: message.to_string(),
            error_data: error_data.cloned(),
            created_at: now_ms(),
        });
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<SyncErrorRecord>> {
        let records = self.records.lock().await;
        Ok(records.iter().rev().take(limit).cloned().collect())
    }
}

/// In-memory sync state tracker with the same transition semantics as the
/// SQLite repository.
#[derive(Default)]
pub struct MemoryStateStore {
    states: Mutex<HashMap<EntityType, SyncState>>,
}

impl MemoryStateStore {
    pub async fn seed(&self, state: SyncState) {
        self.states.lock().await.insert(state.entity_type, state);
    }
}

fn new_state(entity_type: EntityType) -> SyncState {
    SyncState {
        entity_type,
        current_page: 0,
        chunk_status: ChunkStatus::Idle,
        last_sync_status: None,
        last_sync_timestamp: None,
        sync_count: 0,
        updated_at: now_ms(),
    }
}

fn touch(state: &mut SyncState) {
    // updated_at must strictly increase even within one millisecond.
    state.updated_at = now_ms().max(state.updated_at + 1);
}

#[async_trait]
impl SyncStateStore for MemoryStateStore {
    async fn ensure(&self, entity_type: EntityType) -> Result<SyncState> {
        let mut states = self.states.lock().await;
        Ok(states.entry(entity_type).or_insert_with(|| new_state(entity_type)).clone())
    }

    async fn get(&self, entity_type: EntityType) -> Result<Option<SyncState>> {
        Ok(self.states.lock().await.get(&entity_type).cloned())
    }

    async fn list(&self) -> Result<Vec<SyncState>> {
        Ok(self.states.lock().await.values().cloned().collect())
    }

    async fn current_cursor(&self, entity_type: EntityType) -> Result<i64> {
        Ok(self.states.lock().await.get(&entity_type).map_or(0, |s| s.current_page))
    }

    async fn transition(
        &self,
        entity_type: EntityType,
        from: &[ChunkStatus],
        to: ChunkStatus,
    ) -> Result<bool> {
        let mut states = self.states.lock().await;
        let state = states.entry(entity_type).or_insert_with(|| new_state(entity_type));
        if !from.contains(&state.chunk_status) {
            return Ok(false);
        }
        state.chunk_status = to;
        touch(state);
        Ok(true)
    }

    async fn advance(
        &self,
        entity_type: EntityType,
        completed_page: i64,
        has_more: bool,
        items: usize,
    ) -> Result<()> {
        let mut states = self.states.lock().await;
        let state = states.entry(entity_type).or_insert_with(|| new_state(entity_type));
        let next = if has_more { completed_page + 1 } else { completed_page };
        state.current_page = state.current_page.max(next);
        state.chunk_status = ChunkStatus::Done;
        state.last_sync_status =
            Some(if has_more { SyncOutcome::Success } else { SyncOutcome::Complete });
        state.last_sync_timestamp = Some(now_ms());
        state.sync_count += items as i64;
        touch(state);
        Ok(())
    }

    async fn mark_result(&self, entity_type: EntityType, outcome: SyncOutcome) -> Result<()> {
        let mut states = self.states.lock().await;
        let state = states.entry(entity_type).or_insert_with(|| new_state(entity_type));
        state.last_sync_status = Some(outcome);
        state.last_sync_timestamp = Some(now_ms());
        if outcome == SyncOutcome::Error {
            state.chunk_status = ChunkStatus::Error;
        }
        touch(state);
        Ok(())
    }

    async fn reset_if_stale(&self, entity_type: EntityType, older_than: Duration) -> Result<bool> {
        let mut states = self.states.lock().await;
        let Some(state) = states.get_mut(&entity_type) else {
            return Ok(false);
        };
        let cutoff = now_ms() - older_than.as_millis() as i64;
        if state.chunk_status.is_in_flight() && state.updated_at <= cutoff {
            state.chunk_status = ChunkStatus::Idle;
            touch(state);
            return Ok(true);
        }
        Ok(false)
    }

    async fn set_sync_count(&self, entity_type: EntityType, count: i64) -> Result<bool> {
        let mut states = self.states.lock().await;
        let state = states.entry(entity_type).or_insert_with(|| new_state(entity_type));
        if state.sync_count == count {
            return Ok(false);
        }
        state.sync_count = count;
        touch(state);
        Ok(true)
    }
}

/// In-memory task queue with visibility timeout semantics.
#[derive(Default)]
pub struct MemoryTaskQueue {
    live: Mutex<Vec<QueuedSyncTask>>,
    archived: Mutex<Vec<QueuedSyncTask>>,
    next_id: Mutex<i64>,
}

impl MemoryTaskQueue {
    pub async fn live_tasks(&self) -> Vec<QueuedSyncTask> {
        self.live.lock().await.clone()
    }

    pub async fn archived_tasks(&self) -> Vec<QueuedSyncTask> {
        self.archived.lock().await.clone()
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn send(&self, task: &SyncTask) -> Result<i64> {
        let mut next_id = self.next_id.lock().await;
        *next_id += 1;
        let now = now_ms();
        self.live.lock().await.push(QueuedSyncTask {
            id: *next_id,
            task: task.clone(),
            attempts: 0,
            enqueued_at: now,
            visible_at: now,
        });
        Ok(*next_id)
    }

    async fn read(&self, visibility: Duration, limit: usize) -> Result<Vec<QueuedSyncTask>> {
        let now = now_ms();
        let hidden_until = now + visibility.as_millis() as i64;
        let mut live = self.live.lock().await;
        let mut batch = Vec::new();
        for entry in live.iter_mut() {
            if batch.len() >= limit {
                break;
            }
            if entry.visible_at <= now {
                entry.visible_at = hidden_until;
                entry.attempts += 1;
                batch.push(entry.clone());
            }
        }
        Ok(batch)
    }

    async fn delete(&self, task_id: i64) -> Result<()> {
        self.live.lock().await.retain(|t| t.id != task_id);
        Ok(())
    }

    async fn nack(&self, task_id: i64, delay: Duration) -> Result<()> {
        let mut live = self.live.lock().await;
        let entry = live
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or_else(|| PimSyncError::NotFound(format!("task {task_id} not in queue")))?;
        entry.visible_at = now_ms() + delay.as_millis() as i64;
        Ok(())
    }

    async fn archive(&self, task_id: i64) -> Result<()> {
        let mut live = self.live.lock().await;
        if let Some(pos) = live.iter().position(|t| t.id == task_id) {
            let entry = live.remove(pos);
            self.archived.lock().await.push(entry);
        }
        Ok(())
    }

    async fn pending_count(&self, entity_type: EntityType) -> Result<usize> {
        Ok(self.live.lock().await.iter().filter(|t| t.task.entity_type == entity_type).count())
    }

    async fn purge_archive(&self, older_than: Duration) -> Result<usize> {
        let cutoff = now_ms() - older_than.as_millis() as i64;
        let mut archived = self.archived.lock().await;
        let before = archived.len();
        archived.retain(|t| t.enqueued_at > cutoff);
        Ok(before - archived.len())
    }
}
