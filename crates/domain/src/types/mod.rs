//! Domain types and models

pub mod catalog;
pub mod entity;
pub mod sync;

pub use catalog::{
    ActiveIngredientRecord, BrandRecord, CatalogPage, CatalogRecord, CategoryRecord,
    EmbeddedRelationship, MediaRecord, OrganizationRecord, ProductFamilyRecord, ProductRecord,
    UpsertOutcome,
};
pub use entity::EntityType;
pub use sync::{
    BacklogReport, ChunkStatus, DashboardRow, DeferredRelationship, IngestReport, QueuedSyncTask,
    RelationshipKind, RepairReport, SortingFormat, StuckSyncReset, SyncErrorRecord, SyncOutcome,
    SyncState, SyncTask,
};
