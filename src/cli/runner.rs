//! Startup and main loop wiring

use crate::cli::args::Args;
use crate::config::{ConfigLoader, ConfigSource, CredentialSource};
use crate::engine::{DockerEngineClient, EngineSettings, ImageEngine};
use crate::error::Result;
use crate::sync::Scheduler;
use std::sync::Arc;
use tracing::{info, warn};

pub struct Runner {
    args: Args,
    settings: EngineSettings,
}

impl Runner {
    pub fn new(args: Args) -> Self {
        Self {
            args,
            settings: EngineSettings::from_env(),
        }
    }

    pub fn with_engine_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Load the config and connect to the engine; both failures are fatal
    pub async fn prepare(&self) -> Result<Scheduler> {
        let source: ConfigSource = self.args.config.parse()?;
        let loader = ConfigLoader::new()?;
        let config = loader.load(&source).await?;

        info!(
            "Loaded {} image(s) from {}, interval {}s, prune {}",
            config.specs.len(),
            source,
            config.interval_seconds,
            if config.prune_enabled { "enabled" } else { "disabled" }
        );
        match config.credential_source {
            CredentialSource::Config => {}
            CredentialSource::LocalStore => info!(
                "Using {} credential(s) from the local docker config",
                config.credentials.len()
            ),
            CredentialSource::None => warn!("No registry credentials found, all requests are anonymous"),
        }

        let engine = DockerEngineClient::connect(&self.settings).await?;
        info!(
            "Connected to docker engine at {} (API {})",
            engine.endpoint(),
            engine.api_version()
        );
        let engine: Arc<dyn ImageEngine> = Arc::new(engine);

        Ok(Scheduler::new(engine, loader, source, config))
    }

    pub async fn run(&self) -> Result<()> {
        let scheduler = self.prepare().await?;

        if self.args.once {
            let report = scheduler.run_cycle().await;
            return match report.error() {
                Some(e) => Err(e),
                None => Ok(()),
            };
        }

        scheduler.run().await;
        Ok(())
    }
}
