// This file contains the implementation of the DockerEngineClient struct,
// which talks to the local Docker engine's REST API to pull, tag, push,
// list and remove images on behalf of the sync loop.

use crate::engine::progress::drain_response;
use crate::engine::{ImageEngine, ImageSummary, RemovedImage};
use crate::error::handlers::EngineErrorHandler;
use crate::error::{Result, SyncerError};
use crate::registry::auth::{anonymous_engine_header, RegistryCredential, REGISTRY_AUTH_HEADER};
use crate::registry::reference::ImageReference;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_DOCKER_HOST: &str = "unix:///var/run/docker.sock";

/// Newest engine API version this client speaks
pub const MAX_API_VERSION: &str = "1.43";

/// Connection settings, normally taken from the standard `DOCKER_*` variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub host: String,
    pub tls_verify: bool,
    pub cert_path: Option<PathBuf>,
    pub api_version: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_DOCKER_HOST.to_string(),
            tls_verify: false,
            cert_path: None,
            api_version: None,
        }
    }
}

impl EngineSettings {
    /// Read `DOCKER_HOST`, `DOCKER_TLS_VERIFY`, `DOCKER_CERT_PATH` and `DOCKER_API_VERSION`
    pub fn from_env() -> Self {
        let non_empty = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            host: non_empty("DOCKER_HOST").unwrap_or_else(|| DEFAULT_DOCKER_HOST.to_string()),
            tls_verify: non_empty("DOCKER_TLS_VERIFY").is_some_and(|v| v != "0"),
            cert_path: non_empty("DOCKER_CERT_PATH").map(PathBuf::from),
            api_version: non_empty("DOCKER_API_VERSION"),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    fn uses_tls(&self) -> bool {
        self.tls_verify || self.cert_path.is_some()
    }
}

#[derive(Debug, Deserialize)]
struct VersionResponse {
    #[serde(rename = "ApiVersion")]
    api_version: String,
}

/// Docker engine REST client
#[derive(Debug, Clone)]
pub struct DockerEngineClient {
    http: Client,
    base_url: Url,
    endpoint: String,
    api_version: String,
    version_pinned: bool,
}

impl DockerEngineClient {
    /// Build a client without contacting the engine
    pub fn new(settings: &EngineSettings) -> Result<Self> {
        let mut builder = Client::builder();

        let base_url = if let Some(socket) = settings.host.strip_prefix("unix://") {
            builder = unix_socket(builder, socket)?;
            Url::parse("http://localhost").map_err(invalid_host(&settings.host))?
        } else if let Some(address) = settings.host.strip_prefix("tcp://") {
            let scheme = if settings.uses_tls() { "https" } else { "http" };
            Url::parse(&format!("{}://{}", scheme, address)).map_err(invalid_host(&settings.host))?
        } else if settings.host.starts_with("http://") || settings.host.starts_with("https://") {
            Url::parse(&settings.host).map_err(invalid_host(&settings.host))?
        } else {
            return Err(SyncerError::Validation(format!(
                "unsupported DOCKER_HOST '{}': expected unix://, tcp://, http:// or https://",
                settings.host
            )));
        };

        if base_url.scheme() == "https" {
            builder = configure_tls(builder, settings)?;
        }

        let http = builder.build()?;
        Ok(Self {
            http,
            base_url,
            endpoint: settings.host.clone(),
            api_version: settings
                .api_version
                .clone()
                .unwrap_or_else(|| MAX_API_VERSION.to_string()),
            version_pinned: settings.api_version.is_some(),
        })
    }

    /// Build a client and verify the engine answers, negotiating the API version
    pub async fn connect(settings: &EngineSettings) -> Result<Self> {
        let mut client = Self::new(settings)?;
        client.negotiate_api_version().await?;
        Ok(client)
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Ask the engine for its API version and settle on the lower of theirs and ours
    pub async fn negotiate_api_version(&mut self) -> Result<String> {
        let url = self.unversioned_url("/version")?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| SyncerError::EngineUnreachable {
                endpoint: self.endpoint.clone(),
                message: e.to_string(),
            })?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SyncerError::EngineUnreachable {
                endpoint: self.endpoint.clone(),
                message: EngineErrorHandler::handle_engine_error(status, &body, "query version").to_string(),
            });
        }
        let version: VersionResponse = response.json().await?;

        if !self.version_pinned {
            self.api_version = lower_version(&version.api_version, MAX_API_VERSION).to_string();
        }
        debug!(
            "Connected to docker engine at {} (engine API {}, using {})",
            self.endpoint, version.api_version, self.api_version
        );
        Ok(self.api_version.clone())
    }

    fn unversioned_url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| SyncerError::Validation(format!("invalid engine path '{}': {}", path, e)))
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.unversioned_url(&format!("v{}{}", self.api_version, path))
    }

    async fn send(&self, request: RequestBuilder, operation: &str) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| EngineErrorHandler::handle_network_error(e, &self.endpoint, operation))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(EngineErrorHandler::handle_engine_error(status, &body, operation))
    }
}

#[async_trait]
impl ImageEngine for DockerEngineClient {
    async fn pull_image(
        &self,
        image: &ImageReference,
        auth: Option<&RegistryCredential>,
    ) -> Result<()> {
        let mut request = self.http.post(self.url("/images/create")?).query(&[
            ("fromImage", image.name().as_str()),
            ("tag", image.pull_reference()),
        ]);
        if let Some(credential) = auth {
            request = request.header(
                REGISTRY_AUTH_HEADER,
                credential.to_engine_header(image.registry_host()),
            );
        }

        let response = self.send(request, "pull image").await?;
        let summary = drain_response(response).await?;
        debug!(
            "Pull of {} finished after {} progress messages: {}",
            image,
            summary.messages,
            summary.last_status.as_deref().unwrap_or("no status")
        );
        Ok(())
    }

    async fn tag_image(&self, source: &ImageReference, target: &ImageReference) -> Result<()> {
        let request = self
            .http
            .post(self.url(&format!("/images/{}/tag", source.as_str()))?)
            .query(&[("repo", target.name().as_str()), ("tag", target.tag_or_default())]);

        let response = self.send(request, "tag image").await?;
        // Release the connection
        response.bytes().await?;
        Ok(())
    }

    async fn push_image(
        &self,
        image: &ImageReference,
        auth: Option<&RegistryCredential>,
    ) -> Result<()> {
        let header = match auth {
            Some(credential) => credential.to_engine_header(image.registry_host()),
            None => anonymous_engine_header(),
        };
        let request = self
            .http
            .post(self.url(&format!("/images/{}/push", image.name()))?)
            .query(&[("tag", image.tag_or_default())])
            .header(REGISTRY_AUTH_HEADER, header);

        let response = self.send(request, "push image").await?;
        let summary = drain_response(response).await?;
        debug!(
            "Push of {} finished after {} progress messages: {}",
            image,
            summary.messages,
            summary.last_status.as_deref().unwrap_or("no status")
        );
        Ok(())
    }

    async fn list_images(&self) -> Result<Vec<ImageSummary>> {
        let request = self
            .http
            .get(self.url("/images/json")?)
            .query(&[("all", "true")]);
        let response = self.send(request, "list images").await?;
        Ok(response.json().await?)
    }

    async fn remove_image(&self, id: &str) -> Result<Vec<RemovedImage>> {
        let request = self
            .http
            .delete(self.url(&format!("/images/{}", id))?)
            .query(&[("force", "true"), ("noprune", "false")]);
        let response = self.send(request, "remove image").await?;
        Ok(response.json().await?)
    }
}

fn invalid_host(host: &str) -> impl Fn(url::ParseError) -> SyncerError + '_ {
    move |e| SyncerError::Validation(format!("invalid DOCKER_HOST '{}': {}", host, e))
}

#[cfg(unix)]
fn unix_socket(builder: reqwest::ClientBuilder, socket: &str) -> Result<reqwest::ClientBuilder> {
    Ok(builder.unix_socket(PathBuf::from(socket)))
}

#[cfg(not(unix))]
fn unix_socket(_builder: reqwest::ClientBuilder, socket: &str) -> Result<reqwest::ClientBuilder> {
    Err(SyncerError::Validation(format!(
        "unix socket {} is not supported on this platform",
        socket
    )))
}

fn configure_tls(mut builder: reqwest::ClientBuilder, settings: &EngineSettings) -> Result<reqwest::ClientBuilder> {
    if !settings.tls_verify {
        warn!("DOCKER_TLS_VERIFY is not set, engine certificate will not be verified");
        builder = builder
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true);
    }

    let Some(cert_path) = settings.cert_path.as_deref() else {
        return Ok(builder);
    };

    let ca = read_pem(cert_path, "ca.pem")?;
    builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&ca)?);

    let cert = read_pem(cert_path, "cert.pem")?;
    let key = read_pem(cert_path, "key.pem")?;
    let identity = reqwest::Identity::from_pkcs8_pem(&cert, &key)?;
    Ok(builder.identity(identity))
}

fn read_pem(dir: &Path, name: &str) -> Result<Vec<u8>> {
    let path = dir.join(name);
    std::fs::read(&path).map_err(|e| {
        SyncerError::Validation(format!("cannot read {}: {}", path.display(), e))
    })
}

/// Lower of two `major.minor` API versions
fn lower_version<'a>(a: &'a str, b: &'a str) -> &'a str {
    let parse = |v: &str| -> (u32, u32) {
        let mut parts = v.trim().split('.');
        let major = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        let minor = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        (major, minor)
    };
    if parse(a) <= parse(b) { a } else { b }
}
