//! Removal of dangling local images after a cycle

use crate::config::SyncSpec;
use crate::engine::{ImageEngine, ImageSummary};
use crate::error::Result;
use crate::logging::format_size;
use crate::registry::reference::ImageReference;
use crate::sync::report::{PruneFailure, PruneReport};
use tracing::{debug, info, warn};

/// Removes images that no longer carry a tag, sparing anything a spec still names
pub struct Pruner {
    protected: Vec<ImageReference>,
}

impl Pruner {
    /// Protect every parseable source and target reference of the given specs
    pub fn new(specs: &[SyncSpec]) -> Self {
        let protected = specs
            .iter()
            .flat_map(|spec| [spec.source.as_str(), spec.target.as_str()])
            .filter_map(|reference| ImageReference::parse(reference).ok())
            .collect();
        Self { protected }
    }

    /// Whether any tag or repo digest of the image names a configured reference
    pub fn is_protected(&self, image: &ImageSummary) -> bool {
        image
            .repo_tags
            .iter()
            .chain(image.repo_digests.iter())
            .any(|local| self.protected.iter().any(|r| r.matches_local_tag(local)))
    }

    /// List local images and force-remove the dangling ones
    ///
    /// A listing failure is returned; a failed removal is logged, recorded and skipped.
    pub async fn prune(&self, engine: &dyn ImageEngine) -> Result<PruneReport> {
        let images = engine.list_images().await?;
        let mut report = PruneReport::default();

        for image in images.iter().filter(|image| image.is_dangling()) {
            if self.is_protected(image) {
                debug!("Keeping {}: referenced by config", image.id);
                report.protected += 1;
                continue;
            }

            match engine.remove_image(&image.id).await {
                Ok(removed) => {
                    let size = u64::try_from(image.size).unwrap_or(0);
                    debug!(
                        "Removed {} ({}, {} layer(s) deleted)",
                        image.id,
                        format_size(size),
                        removed.iter().filter(|r| r.deleted.is_some()).count()
                    );
                    report.removed += 1;
                    report.reclaimed_bytes += size;
                }
                Err(e) => {
                    warn!("Failed to remove image {} (ID: {}): {}", image.display_name(), image.id, e);
                    report.failures.push(PruneFailure {
                        id: image.id.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        info!("Prune finished: {}", report.summary());
        Ok(report)
    }
}
