//! In-memory engine shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use docker_image_syncer::config::ConfigLoader;
use docker_image_syncer::engine::{ImageEngine, ImageSummary, RemovedImage};
use docker_image_syncer::error::{Result, SyncerError};
use docker_image_syncer::registry::auth::RegistryCredential;
use docker_image_syncer::registry::reference::ImageReference;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Pull { image: String, auth: Option<String> },
    Tag { source: String, target: String },
    Push { image: String, auth: Option<String> },
    List,
    Remove { id: String },
}

/// Engine that records every call and fails on demand
#[derive(Default)]
pub struct RecordingEngine {
    calls: Mutex<Vec<Call>>,
    failing_pulls: HashSet<String>,
    failing_pushes: HashSet<String>,
    failing_removals: HashSet<String>,
    fail_listing: bool,
    images: Vec<ImageSummary>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_pull(mut self, source: &str) -> Self {
        self.failing_pulls.insert(source.to_string());
        self
    }

    pub fn fail_push(mut self, target: &str) -> Self {
        self.failing_pushes.insert(target.to_string());
        self
    }

    pub fn fail_removal(mut self, id: &str) -> Self {
        self.failing_removals.insert(id.to_string());
        self
    }

    pub fn fail_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    pub fn with_image(mut self, id: &str, tags: &[&str], digests: &[&str], size: i64) -> Self {
        self.images.push(ImageSummary {
            id: id.to_string(),
            repo_tags: tags.iter().map(|t| t.to_string()).collect(),
            repo_digests: digests.iter().map(|d| d.to_string()).collect(),
            size,
        });
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls that concern one image, in the order they happened
    pub fn calls_for(&self, image: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| match call {
                Call::Pull { image: i, .. } | Call::Push { image: i, .. } => i == image,
                Call::Tag { source, target } => source == image || target == image,
                _ => false,
            })
            .collect()
    }

    pub fn removed(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Remove { id } => Some(id),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ImageEngine for RecordingEngine {
    async fn pull_image(
        &self,
        image: &ImageReference,
        auth: Option<&RegistryCredential>,
    ) -> Result<()> {
        self.record(Call::Pull {
            image: image.to_string(),
            auth: auth.map(|c| c.key().to_string()),
        });
        tokio::task::yield_now().await;
        if self.failing_pulls.contains(image.as_str()) {
            return Err(SyncerError::Stream(format!("manifest for {} not found", image)));
        }
        Ok(())
    }

    async fn tag_image(&self, source: &ImageReference, target: &ImageReference) -> Result<()> {
        self.record(Call::Tag {
            source: source.to_string(),
            target: target.to_string(),
        });
        Ok(())
    }

    async fn push_image(
        &self,
        image: &ImageReference,
        auth: Option<&RegistryCredential>,
    ) -> Result<()> {
        self.record(Call::Push {
            image: image.to_string(),
            auth: auth.map(|c| c.key().to_string()),
        });
        tokio::task::yield_now().await;
        if self.failing_pushes.contains(image.as_str()) {
            return Err(SyncerError::Stream("denied: requested access to the resource is denied".to_string()));
        }
        Ok(())
    }

    async fn list_images(&self) -> Result<Vec<ImageSummary>> {
        self.record(Call::List);
        if self.fail_listing {
            return Err(SyncerError::Engine("list images failed (status 500): boom".to_string()));
        }
        Ok(self.images.clone())
    }

    async fn remove_image(&self, id: &str) -> Result<Vec<RemovedImage>> {
        self.record(Call::Remove { id: id.to_string() });
        if self.failing_removals.contains(id) {
            return Err(SyncerError::Engine(format!("conflict during remove image: {} is in use", id)));
        }
        Ok(vec![RemovedImage {
            untagged: None,
            deleted: Some(id.to_string()),
        }])
    }
}

/// Loader whose credential store fallback points into `dir`, where nothing exists
pub fn isolated_loader(dir: &Path) -> ConfigLoader {
    ConfigLoader::new()
        .unwrap()
        .with_credential_store(Some(dir.join("no-docker-config.json")))
}
