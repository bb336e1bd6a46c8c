//! Container engine access
//!
//! [`ImageEngine`] is the seam between the sync logic and the Docker engine. The
//! production implementation is [`DockerEngineClient`], which speaks the engine's REST
//! API; tests substitute an in-memory engine.

pub mod client;
pub mod progress;

pub use client::{DockerEngineClient, EngineSettings};

use crate::error::Result;
use crate::registry::auth::RegistryCredential;
use crate::registry::reference::ImageReference;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer};

/// Sentinel the engine reports for an image without a name or tag
pub const NONE_TAG: &str = "<none>:<none>";

/// Image operations the sync loop needs from the engine
#[async_trait]
pub trait ImageEngine: Send + Sync {
    /// Pull an image, waiting until the engine has finished streaming progress
    async fn pull_image(
        &self,
        image: &ImageReference,
        auth: Option<&RegistryCredential>,
    ) -> Result<()>;

    /// Add `target` as a tag of the local image `source`
    async fn tag_image(&self, source: &ImageReference, target: &ImageReference) -> Result<()>;

    /// Push a local tag to its registry, waiting until the engine has finished streaming progress
    async fn push_image(
        &self,
        image: &ImageReference,
        auth: Option<&RegistryCredential>,
    ) -> Result<()>;

    /// List all local images, intermediate layers included
    async fn list_images(&self) -> Result<Vec<ImageSummary>>;

    /// Force-remove an image by id, pruning untagged parents
    async fn remove_image(&self, id: &str) -> Result<Vec<RemovedImage>>;
}

/// Entry of the engine's image list
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageSummary {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub repo_tags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub repo_digests: Vec<String>,
    #[serde(default)]
    pub size: i64,
}

impl ImageSummary {
    /// An image is dangling when it has no tag at all, or only empty and `<none>` tags
    pub fn is_dangling(&self) -> bool {
        self.repo_tags
            .iter()
            .all(|tag| tag.is_empty() || tag == NONE_TAG || tag.ends_with(":<none>"))
    }

    /// First tag, for log lines
    pub fn display_name(&self) -> &str {
        self.repo_tags
            .first()
            .map(String::as_str)
            .unwrap_or("<unnamed>")
    }
}

/// One line of the engine's answer to an image removal
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RemovedImage {
    #[serde(rename = "Untagged", default)]
    pub untagged: Option<String>,
    #[serde(rename = "Deleted", default)]
    pub deleted: Option<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}
