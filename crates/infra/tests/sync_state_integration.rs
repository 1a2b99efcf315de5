//! Sync state transitions against a real database: compare-and-set
//! serialization, cursor monotonicity, stuck resets.

#[path = "support.rs"]
mod support;

use std::time::Duration;

use pimsync_core::SyncStateStore;
use pimsync_domain::{ChunkStatus, EntityType, SyncOutcome};
use pimsync_infra::SqliteSyncStateRepository;

#[tokio::test]
async fn ensure_creates_one_idle_row() {
    let db = support::setup_db();
    let state = SqliteSyncStateRepository::new(db.manager.clone());

    let row = state.ensure(EntityType::Product).await.unwrap();
    assert_eq!(row.current_page, 0);
    assert_eq!(row.chunk_status, ChunkStatus::Idle);
    assert_eq!(row.sync_count, 0);

    // ensure again: same row, not a second one
    state.ensure(EntityType::Product).await.unwrap();
    assert_eq!(state.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn transition_is_compare_and_set() {
    let db = support::setup_db();
    let state = SqliteSyncStateRepository::new(db.manager.clone());
    state.ensure(EntityType::Brand).await.unwrap();

    // idle -> fetching wins exactly once
    assert!(state
        .transition(EntityType::Brand, &[ChunkStatus::Idle], ChunkStatus::Fetching)
        .await
        .unwrap());
    assert!(!state
        .transition(EntityType::Brand, &[ChunkStatus::Idle], ChunkStatus::Fetching)
        .await
        .unwrap());

    // fetching -> processing
    assert!(state
        .transition(EntityType::Brand, &[ChunkStatus::Fetching], ChunkStatus::Processing)
        .await
        .unwrap());

    let row = state.get(EntityType::Brand).await.unwrap().unwrap();
    assert_eq!(row.chunk_status, ChunkStatus::Processing);
}

#[tokio::test]
async fn updated_at_strictly_increases() {
    let db = support::setup_db();
    let state = SqliteSyncStateRepository::new(db.manager.clone());
    let before = state.ensure(EntityType::Brand).await.unwrap();

    state
        .transition(EntityType::Brand, &[ChunkStatus::Idle], ChunkStatus::Fetching)
        .await
        .unwrap();
    let mid = state.get(EntityType::Brand).await.unwrap().unwrap();
    state
        .transition(EntityType::Brand, &[ChunkStatus::Fetching], ChunkStatus::Processing)
        .await
        .unwrap();
    let after = state.get(EntityType::Brand).await.unwrap().unwrap();

    assert!(mid.updated_at > before.updated_at);
    assert!(after.updated_at > mid.updated_at);
}

#[tokio::test]
async fn advance_never_regresses_the_cursor() {
    let db = support::setup_db();
    let state = SqliteSyncStateRepository::new(db.manager.clone());

    state.advance(EntityType::Product, 3, true, 100).await.unwrap();
    assert_eq!(state.current_cursor(EntityType::Product).await.unwrap(), 4);

    // a late duplicate delivery of an earlier page cannot move it back
    state.advance(EntityType::Product, 1, true, 100).await.unwrap();
    assert_eq!(state.current_cursor(EntityType::Product).await.unwrap(), 4);

    let row = state.get(EntityType::Product).await.unwrap().unwrap();
    assert_eq!(row.sync_count, 200);
    assert_eq!(row.chunk_status, ChunkStatus::Done);
    assert_eq!(row.last_sync_status, Some(SyncOutcome::Success));
}

#[tokio::test]
async fn advance_on_final_page_marks_complete() {
    let db = support::setup_db();
    let state = SqliteSyncStateRepository::new(db.manager.clone());

    state.advance(EntityType::Brand, 5, false, 17).await.unwrap();
    let row = state.get(EntityType::Brand).await.unwrap().unwrap();
    assert_eq!(row.current_page, 5);
    assert_eq!(row.last_sync_status, Some(SyncOutcome::Complete));
}

#[tokio::test]
async fn mark_error_sets_error_status()
{
    let db = support::setup_db();
    let state = SqliteSyncStateRepository::new(db.manager.clone());

    state.mark_result(EntityType::Media, SyncOutcome::Error).await.unwrap();
    let row = state.get(EntityType::Media).await.unwrap().unwrap();
    assert_eq!(row.chunk_status, ChunkStatus::Error);
    assert_eq!(row.last_sync_status, Some(SyncOutcome::Error));
}

#[tokio::test]
async fn reset_if_stale_only_touches_old_in_flight_rows() {
    let db = support::setup_db();
    let state = SqliteSyncStateRepository::new(db.manager.clone());
    state.ensure(EntityType::Product).await.unwrap();
    state
        .transition(EntityType::Product, &[ChunkStatus::Idle], ChunkStatus::Processing)
        .await
        .unwrap();

    // fresh: not stuck
    assert!(!state
        .reset_if_stale(EntityType::Product, Duration::from_secs(3600))
        .await
        .unwrap());

    // with a zero threshold the same row counts as stuck
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(state
        .reset_if_stale(EntityType::Product, Duration::from_millis(0))
        .await
        .unwrap());
    let row = state.get(EntityType::Product).await.unwrap().unwrap();
    assert_eq!(row.chunk_status, ChunkStatus::Idle);

    // idle rows are never reset, however old
    assert!(!state
        .reset_if_stale(EntityType::Product, Duration::from_millis(0))
        .await
        .unwrap());
}

#[tokio::test]
async fn set_sync_count_reports_change() {
    let db = support::setup_db();
    let state = SqliteSyncStateRepository::new(db.manager.clone());

    assert!(state.set_sync_count(EntityType::Brand, 42).await.unwrap());
    assert!(!state.set_sync_count(EntityType::Brand, 42).await.unwrap());
    assert_eq!(state.get(EntityType::Brand).await.unwrap().unwrap().sync_count, 42);
}
