//! # Pimsync Core
//!
//! Pure business logic layer - no infrastructure dependencies.
//!
//! This crate contains:
//! - Port/adapter interfaces (traits) for the queue, stores, and fetcher
//! - The request builder and the raw→normalized projection
//! - The response processor, relationship resolver, task planner, and
//!   recovery supervisor services
//!
//! ## Architecture Principles
//! - Only depends on `pimsync-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits
//! - Pure, testable business logic

pub mod sync;

// Re-export specific items to avoid ambiguity
pub use sync::ingest::ResponseProcessor;
pub use sync::ports::{
    CatalogFetcher, CatalogStore, DeferredRelationshipStore, SyncErrorLog, SyncStateStore,
    TaskQueue,
};
pub use sync::queueing::{TaskPlanner, TaskPlannerConfig};
pub use sync::recovery::{RecoverySupervisor, RecoverySupervisorConfig};
pub use sync::request::{self, SortingFormatSupport};
pub use sync::resolver::{RelationshipResolver, RelationshipResolverConfig};
