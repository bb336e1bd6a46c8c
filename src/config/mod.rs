//! Sync configuration: document format, sources and loading
//!
//! The config document is JSON, read from a local path or fetched from an `http(s)://`
//! URL. It is loaded once at startup and again after every cycle; each load produces a
//! fresh, immutable [`SyncConfig`] snapshot.

pub mod docker_config;

use crate::error::{Result, SyncerError};
use crate::registry::auth::RegistryCredential;
use crate::registry::resolver::{CredentialResolver, Matcher};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// One source→target mirroring pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSpec {
    pub source: String,
    pub target: String,
}

impl fmt::Display for SyncSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)
    }
}

/// Credential entry under `auths`: either username/password or a ready `auth` blob
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthEntry {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub auth: Option<String>,
}

impl AuthEntry {
    fn into_credential(self, key: &str) -> Option<RegistryCredential> {
        if let Some(auth) = self.auth.filter(|a| !a.trim().is_empty()) {
            return Some(RegistryCredential::from_token(key, auth.trim()));
        }
        let username = self.username.filter(|u| !u.is_empty())?;
        Some(RegistryCredential::from_basic(
            key,
            &username,
            self.password.as_deref().unwrap_or_default(),
        ))
    }
}

/// The config document as written on disk
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigDocument {
    #[serde(default)]
    pub images: Vec<SyncSpec>,
    #[serde(default)]
    pub auths: Option<IndexMap<String, AuthEntry>>,
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub disable_prune: bool,
}

/// Where the credentials of a snapshot came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Config,
    LocalStore,
    None,
}

/// Immutable configuration snapshot used for one cycle
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub specs: Vec<SyncSpec>,
    pub credentials: CredentialResolver,
    pub interval_seconds: u64,
    pub prune_enabled: bool,
    pub credential_source: CredentialSource,
    /// sha256 of the raw document
    pub digest: String,
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    /// Short form of the document digest for log lines
    pub fn short_digest(&self) -> &str {
        &self.digest[..self.digest.len().min(12)]
    }
}

/// Location of the config document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Url(Url),
}

impl FromStr for ConfigSource {
    type Err = SyncerError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(SyncerError::Validation("config location is empty".to_string()));
        }
        if s.starts_with("http://") || s.starts_with("https://") {
            let url = Url::parse(s)
                .map_err(|e| SyncerError::Validation(format!("invalid config URL '{}': {}", s, e)))?;
            Ok(ConfigSource::Url(url))
        } else {
            Ok(ConfigSource::File(PathBuf::from(s)))
        }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::File(path) => write!(f, "{}", path.display()),
            ConfigSource::Url(url) => write!(f, "{}", url),
        }
    }
}

/// Reads config documents and turns them into snapshots
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    http: reqwest::Client,
    credential_store: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            credential_store: docker_config::default_path(),
        })
    }

    /// Override the local credential store consulted when `auths` is absent
    pub fn with_credential_store(mut self, path: Option<PathBuf>) -> Self {
        self.credential_store = path;
        self
    }

    /// Read the raw document from its source
    pub async fn fetch(&self, source: &ConfigSource) -> Result<Vec<u8>> {
        match source {
            ConfigSource::File(path) => {
                tokio::fs::read(path)
                    .await
                    .map_err(|source| SyncerError::ConfigRead {
                        path: path.clone(),
                        source,
                    })
            }
            ConfigSource::Url(url) => {
                let fetch_error = |e: reqwest::Error| SyncerError::ConfigFetch {
                    url: url.to_string(),
                    message: e.to_string(),
                };
                let response = self
                    .http
                    .get(url.clone())
                    .send()
                    .await
                    .map_err(fetch_error)?
                    .error_for_status()
                    .map_err(fetch_error)?;
                let body = response.bytes().await.map_err(fetch_error)?;
                Ok(body.to_vec())
            }
        }
    }

    /// Fetch, parse and validate a config snapshot
    pub async fn load(&self, source: &ConfigSource) -> Result<SyncConfig> {
        let raw = self.fetch(source).await?;
        let config = self.parse(&raw).await?;
        debug!(
            "Loaded config from {} ({} images, digest {})",
            source,
            config.specs.len(),
            config.short_digest()
        );
        Ok(config)
    }

    /// Build a snapshot from raw document bytes
    pub async fn parse(&self, raw: &[u8]) -> Result<SyncConfig> {
        let document: ConfigDocument = serde_json::from_slice(raw)?;
        validate_specs(&document.images)?;

        let (credentials, credential_source) = match document.auths {
            Some(auths) if !auths.is_empty() => {
                (resolver_from_auths(auths)?, CredentialSource::Config)
            }
            _ => {
                debug!("No auths found in config, loading local credential store");
                let resolver = docker_config::load_credentials(self.credential_store.as_deref()).await;
                let source = if resolver.is_empty() {
                    CredentialSource::None
                } else {
                    CredentialSource::LocalStore
                };
                (resolver, source)
            }
        };

        Ok(SyncConfig {
            specs: document.images,
            credentials,
            interval_seconds: document.duration,
            prune_enabled: !document.disable_prune,
            credential_source,
            digest: hex::encode(Sha256::digest(raw)),
        })
    }
}

fn validate_specs(specs: &[SyncSpec]) -> Result<()> {
    for (index, spec) in specs.iter().enumerate() {
        if spec.source.trim().is_empty() {
            return Err(SyncerError::Validation(format!("images[{}].source is empty", index)));
        }
        if spec.target.trim().is_empty() {
            return Err(SyncerError::Validation(format!("images[{}].target is empty", index)));
        }
    }
    Ok(())
}

fn resolver_from_auths(auths: IndexMap<String, AuthEntry>) -> Result<CredentialResolver> {
    let mut resolver = CredentialResolver::new();
    for (key, entry) in auths {
        let matcher = Matcher::for_config_key(&key)?;
        match entry.into_credential(&key) {
            Some(credential) => resolver.push(matcher, credential),
            None => warn!("Ignoring auths entry '{}': neither auth nor username given", key),
        }
    }
    let keys: Vec<&str> = resolver.entries().iter().map(|e| e.credential.key()).collect();
    info!("Found {} credential(s) in config: {:?}", keys.len(), keys);
    Ok(resolver)
}
