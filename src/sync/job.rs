//! One source→target mirroring job: pull, tag, push

use crate::config::SyncSpec;
use crate::engine::ImageEngine;
use crate::error::SyncerError;
use crate::registry::reference::ImageReference;
use crate::registry::resolver::ResolvedCredentials;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, info_span, Instrument};

/// Step of a sync job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStep {
    Pull,
    Tag,
    Push,
    /// The job's task died before reporting a step
    Task,
}

impl fmt::Display for SyncStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncStep::Pull => "pull",
            SyncStep::Tag => "tag",
            SyncStep::Push => "push",
            SyncStep::Task => "sync task",
        };
        f.write_str(name)
    }
}

/// Failure of a sync job, tagged with the step that failed
#[derive(Debug, Error)]
#[error("{step} failed: {source}")]
pub struct JobError {
    pub step: SyncStep,
    #[source]
    pub source: SyncerError,
}

impl JobError {
    pub fn new(step: SyncStep, source: SyncerError) -> Self {
        Self { step, source }
    }
}

/// A job owns its spec and credentials; nothing is shared with sibling jobs
#[derive(Debug, Clone)]
pub struct ImageSyncJob {
    spec: SyncSpec,
    credentials: ResolvedCredentials,
}

impl ImageSyncJob {
    pub fn new(spec: SyncSpec, credentials: ResolvedCredentials) -> Self {
        Self { spec, credentials }
    }

    pub fn spec(&self) -> &SyncSpec {
        &self.spec
    }

    pub fn credentials(&self) -> &ResolvedCredentials {
        &self.credentials
    }

    /// Run the three steps in order, stopping at the first failure
    pub async fn run(&self, engine: &dyn ImageEngine) -> Result<Duration, JobError> {
        let span = info_span!("sync", source = %self.spec.source, target = %self.spec.target);
        self.run_steps(engine).instrument(span).await
    }

    async fn run_steps(&self, engine: &dyn ImageEngine) -> Result<Duration, JobError> {
        let started = Instant::now();

        let source = ImageReference::parse(&self.spec.source)
            .map_err(|e| JobError::new(SyncStep::Pull, e))?;
        info!(
            "Pulling {}{}",
            source,
            auth_note(self.credentials.pull.as_ref().map(|c| c.key()))
        );
        engine
            .pull_image(&source, self.credentials.pull.as_ref())
            .await
            .map_err(|e| JobError::new(SyncStep::Pull, e))?;
        info!("Pulled {}", source);

        let target = ImageReference::parse(&self.spec.target)
            .map_err(|e| JobError::new(SyncStep::Tag, e))?;
        if target.digest().is_some() {
            return Err(JobError::new(
                SyncStep::Tag,
                SyncerError::reference(target.as_str(), "target must not carry a digest"),
            ));
        }
        debug!("Tagging {} as {}", source, target);
        engine
            .tag_image(&source, &target)
            .await
            .map_err(|e| JobError::new(SyncStep::Tag, e))?;
        info!("Tagged {} as {}", source, target);

        info!(
            "Pushing {}{}",
            target,
            auth_note(self.credentials.push.as_ref().map(|c| c.key()))
        );
        engine
            .push_image(&target, self.credentials.push.as_ref())
            .await
            .map_err(|e| JobError::new(SyncStep::Push, e))?;
        info!("Pushed {}", target);

        Ok(started.elapsed())
    }
}

fn auth_note(key: Option<&str>) -> String {
    match key {
        Some(key) => format!(" (credentials for {})", key),
        None => " (anonymous)".to_string(),
    }
}
