//! Sync infrastructure for pimsync
//!
//! Background services around the task queue:
//! - SyncWorker: consumes queued page tasks, fetches from the provider, and
//!   ingests the results
//!
//! All modules follow explicit lifecycle management: join handles are
//! tracked, cancellation is explicit, and every asynchronous operation is
//! wrapped in a timeout.

mod errors;
pub mod sync_worker;

pub use errors::{SyncError, SyncErrorCategory};
pub use sync_worker::{SyncWorker, SyncWorkerConfig, SyncWorkerDeps};
