//! Concurrent fan-out of sync jobs
//!
//! Every spec of the snapshot gets its own tokio task. The task owns a clone of the
//! spec and of the credentials resolved for it, so tasks never observe each other.
//! All tasks are awaited before returning; a failing or panicking job only affects
//! its own outcome.

use crate::config::SyncConfig;
use crate::engine::ImageEngine;
use crate::error::SyncerError;
use crate::sync::job::{ImageSyncJob, JobError, SyncStep};
use crate::sync::report::JobOutcome;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, error, info, Instrument};

/// Build one job per spec, in config order
pub fn plan_jobs(config: &SyncConfig) -> Vec<ImageSyncJob> {
    config
        .specs
        .iter()
        .map(|spec| ImageSyncJob::new(spec.clone(), config.credentials.resolve_spec(spec)))
        .collect()
}

/// Run every job concurrently and collect the outcomes in config order
pub async fn run_jobs(engine: Arc<dyn ImageEngine>, jobs: Vec<ImageSyncJob>) -> Vec<JobOutcome> {
    debug!("Starting {} sync job(s)", jobs.len());

    let handles: Vec<_> = jobs
        .into_iter()
        .map(|job| {
            let engine = Arc::clone(&engine);
            let spec = job.spec().clone();
            let handle = tokio::spawn(
                async move {
                    let result = job.run(engine.as_ref()).await;
                    match &result {
                        Ok(elapsed) => info!(
                            "Synced {} in {}",
                            job.spec(),
                            crate::logging::format_duration(*elapsed)
                        ),
                        Err(e) => error!("Sync of {} failed: {}", job.spec(), e),
                    }
                    result
                }
                .in_current_span(),
            );
            (spec, handle)
        })
        .collect();

    let (specs, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
    let results = join_all(handles).await;

    specs
        .into_iter()
        .zip(results)
        .map(|(spec, joined)| {
            let result = joined.unwrap_or_else(|join_error| {
                error!("Sync task for {} aborted: {}", spec, join_error);
                Err(JobError::new(
                    SyncStep::Task,
                    SyncerError::Engine(join_error.to_string()),
                ))
            });
            JobOutcome { spec, result }
        })
        .collect()
}

/// Resolve credentials for every spec of the snapshot and run the jobs
pub async fn run_all(engine: Arc<dyn ImageEngine>, config: &SyncConfig) -> Vec<JobOutcome> {
    run_jobs(engine, plan_jobs(config)).await
}
