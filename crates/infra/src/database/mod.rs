//! SQLite-backed implementations of the core storage ports.

pub mod catalog_repository;
pub mod dashboard;
pub mod deferred_repository;
pub mod manager;
pub mod sync_error_repository;
pub mod sync_state_repository;
pub mod task_queue_repository;

pub use catalog_repository::SqliteCatalogRepository;
pub use dashboard::SqliteDashboardRepository;
pub use deferred_repository::SqliteDeferredRelationshipRepository;
pub use manager::{DbConnection, DbManager};
pub use sync_error_repository::SqliteSyncErrorRepository;
pub use sync_state_repository::SqliteSyncStateRepository;
pub use task_queue_repository::SqliteTaskQueueRepository;
