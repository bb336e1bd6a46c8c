//! Results of one sync cycle

use crate::config::SyncSpec;
use crate::error::SyncerError;
use crate::logging::{format_duration, format_size};
use crate::sync::job::JobError;
use std::time::Duration;
use uuid::Uuid;

/// Outcome of one sync job
#[derive(Debug)]
pub struct JobOutcome {
    pub spec: SyncSpec,
    pub result: Result<Duration, JobError>,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Removal failure of a single prune candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneFailure {
    pub id: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub removed: usize,
    pub reclaimed_bytes: u64,
    /// Dangling images left alone because a configured reference names them
    pub protected: usize,
    pub failures: Vec<PruneFailure>,
}

impl PruneReport {
    pub fn summary(&self) -> String {
        format!(
            "removed {} image(s), reclaimed {}",
            self.removed,
            format_size(self.reclaimed_bytes)
        )
    }
}

/// Everything that happened in one cycle
#[derive(Debug)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub outcomes: Vec<JobOutcome>,
    /// `None` when pruning was disabled; `Some(Err)` when listing images failed
    pub prune: Option<Result<PruneReport, SyncerError>>,
    pub elapsed: Duration,
}

impl CycleReport {
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&SyncSpec, &JobError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (&o.spec, e)))
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Aggregate of all job failures, `None` when every job succeeded
    pub fn error(&self) -> Option<SyncerError> {
        let details: Vec<String> = self
            .failures()
            .map(|(spec, err)| format!("{}: {}", spec, err))
            .collect();
        if details.is_empty() {
            return None;
        }
        Some(SyncerError::CycleFailed {
            failed: details.len(),
            total: self.attempted(),
            details: details.join("; "),
        })
    }

    pub fn summary(&self) -> String {
        let mut line = format!(
            "{}/{} image(s) synced in {}",
            self.succeeded(),
            self.attempted(),
            format_duration(self.elapsed)
        );
        match &self.prune {
            Some(Ok(prune)) => {
                line.push_str(", ");
                line.push_str(&prune.summary());
            }
            Some(Err(_)) => line.push_str(", prune failed"),
            None => {}
        }
        line
    }
}
