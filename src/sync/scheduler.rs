//! The sync loop: run a cycle, prune, reload, sleep, repeat

use crate::config::{ConfigLoader, ConfigSource, SyncConfig};
use crate::engine::ImageEngine;
use crate::error::Result;
use crate::logging::format_duration;
use crate::sync::orchestrator;
use crate::sync::pruner::Pruner;
use crate::sync::report::CycleReport;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub struct Scheduler {
    engine: Arc<dyn ImageEngine>,
    loader: ConfigLoader,
    source: ConfigSource,
    config: Arc<SyncConfig>,
}

impl Scheduler {
    /// Start from an already loaded snapshot
    pub fn new(
        engine: Arc<dyn ImageEngine>,
        loader: ConfigLoader,
        source: ConfigSource,
        config: SyncConfig,
    ) -> Self {
        Self {
            engine,
            loader,
            source,
            config: Arc::new(config),
        }
    }

    /// Snapshot the next cycle will use
    pub fn config(&self) -> Arc<SyncConfig> {
        Arc::clone(&self.config)
    }

    /// Sync every spec of the current snapshot, then prune if enabled
    pub async fn run_cycle(&self) -> CycleReport {
        let cycle_id = Uuid::new_v4();
        let span = info_span!("cycle", id = %cycle_id);
        let config = self.config();
        let engine = Arc::clone(&self.engine);

        async move {
            let started = Instant::now();
            info!(
                "Starting sync cycle for {} image(s), config {}",
                config.specs.len(),
                config.short_digest()
            );

            let outcomes = orchestrator::run_all(Arc::clone(&engine), &config).await;

            let prune = if config.prune_enabled {
                let result = Pruner::new(&config.specs).prune(engine.as_ref()).await;
                if let Err(e) = &result {
                    error!("Prune skipped this cycle: {}", e);
                }
                Some(result)
            } else {
                None
            };

            let report = CycleReport {
                cycle_id,
                outcomes,
                prune,
                elapsed: started.elapsed(),
            };
            match report.error() {
                None => info!("Cycle finished: {}", report.summary()),
                Some(e) => warn!("Cycle finished: {}; {}", report.summary(), e),
            }
            report
        }
        .instrument(span)
        .await
    }

    /// Replace the snapshot with a freshly loaded one; on failure the previous one stays
    pub async fn reload(&mut self) -> Result<()> {
        match self.loader.load(&self.source).await {
            Ok(config) => {
                if config.digest == self.config.digest {
                    info!("Config {} unchanged", self.source);
                } else {
                    info!(
                        "Config {} changed ({} -> {}), {} image(s), interval {}s, prune {}",
                        self.source,
                        self.config.short_digest(),
                        config.short_digest(),
                        config.specs.len(),
                        config.interval_seconds,
                        if config.prune_enabled { "enabled" } else { "disabled" }
                    );
                }
                self.config = Arc::new(config);
                Ok(())
            }
            Err(e) => {
                error!("Failed to reload config from {}, keeping previous: {}", self.source, e);
                Err(e)
            }
        }
    }

    /// Run one cycle and reload; returns the pause the next cycle waits for
    pub async fn advance(&mut self) -> (CycleReport, Duration) {
        let report = self.run_cycle().await;
        if self.reload().await.is_err() {
            debug!("Continuing with config {}", self.config.short_digest());
        }
        (report, self.config.interval())
    }

    /// Run cycles forever
    pub async fn run(mut self) {
        loop {
            let (_, interval) = self.advance().await;
            info!("Sleeping {} before next cycle", format_duration(interval));
            tokio::time::sleep(interval).await;
        }
    }
}
