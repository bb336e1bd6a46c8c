//! Docker Image Syncer Library
//!
//! Mirrors container images between registries: every configured source image is
//! pulled through the local Docker engine, tagged as its target and pushed, on a fixed
//! interval with a config reload between cycles.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod registry;
pub mod sync;

pub use config::{ConfigLoader, ConfigSource, SyncConfig, SyncSpec};
pub use engine::{DockerEngineClient, EngineSettings, ImageEngine};
pub use error::{Result, SyncerError};
pub use sync::{CycleReport, Scheduler};
