//! Error types for configuration loading, engine calls and sync cycles

pub mod handlers;

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncerError>;

#[derive(Error, Debug)]
pub enum SyncerError {
    /// Config document could not be fetched over HTTP
    #[error("failed to fetch config from {url}: {message}")]
    ConfigFetch { url: String, message: String },

    /// Config document could not be read from disk
    #[error("failed to read config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config document is not valid JSON or has the wrong shape
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// Config document parsed but holds unusable values
    #[error("invalid config: {0}")]
    Validation(String),

    #[error("invalid image reference '{reference}': {reason}")]
    Reference { reference: String, reason: String },

    /// The Docker engine could not be reached at all
    #[error("docker engine unreachable at {endpoint}: {message}")]
    EngineUnreachable { endpoint: String, message: String },

    /// The Docker engine answered with an error status
    #[error("{0}")]
    Engine(String),

    /// The Docker engine reported an error inside a streamed progress body
    #[error("{0}")]
    Stream(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Aggregate of the per-image failures of one cycle
    #[error("{failed} of {total} image syncs failed: {details}")]
    CycleFailed {
        failed: usize,
        total: usize,
        details: String,
    },
}

impl SyncerError {
    pub fn reference(reference: &str, reason: impl Into<String>) -> Self {
        SyncerError::Reference {
            reference: reference.to_string(),
            reason: reason.into(),
        }
    }

    /// Fatal errors stop the process at startup; everything else is retried next cycle
    pub fn is_startup_fatal(&self) -> bool {
        matches!(
            self,
            SyncerError::ConfigFetch { .. }
                | SyncerError::ConfigRead { .. }
                | SyncerError::ConfigParse(_)
                | SyncerError::Validation(_)
                | SyncerError::EngineUnreachable { .. }
        )
    }
}
