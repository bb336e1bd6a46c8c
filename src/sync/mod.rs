//! Image synchronization: jobs, fan-out, pruning and the scheduling loop

pub mod job;
pub mod orchestrator;
pub mod pruner;
pub mod report;
pub mod scheduler;

pub use job::{ImageSyncJob, JobError, SyncStep};
pub use pruner::Pruner;
pub use report::{CycleReport, JobOutcome, PruneFailure, PruneReport};
pub use scheduler::Scheduler;
