//! Scheduling infrastructure for automated sync maintenance
//!
//! Interval-based schedulers with lifecycle management:
//! - Queue scheduler (steady + aggressive task planning)
//! - Resolver scheduler (deferred relationship draining)
//! - Recovery scheduler (stuck sync resets and backlog clearing)

pub mod error;
pub mod queue_scheduler;
pub mod recovery_scheduler;
pub mod resolver_scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use queue_scheduler::{QueueScheduler, QueueSchedulerConfig};
pub use recovery_scheduler::{RecoveryScheduler, RecoverySchedulerConfig};
pub use resolver_scheduler::{ResolverScheduler, ResolverSchedulerConfig};
