//! Fallback to the local Docker credential store
//!
//! When the sync config carries no `auths`, credentials are read from the same
//! `config.json` the docker CLI writes on `docker login`. Every failure along the way is
//! logged at debug level and yields an empty resolver; a missing store is normal.

use crate::registry::auth::RegistryCredential;
use crate::registry::resolver::{CredentialResolver, Matcher};
use indexmap::IndexMap;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
struct DockerConfigFile {
    #[serde(default)]
    auths: IndexMap<String, DockerAuthEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct DockerAuthEntry {
    #[serde(default)]
    auth: Option<String>,
}

/// Location of the docker CLI config: `$DOCKER_CONFIG/config.json`, else `~/.docker/config.json`
pub fn default_path() -> Option<PathBuf> {
    resolve_path(std::env::var_os("DOCKER_CONFIG"), dirs::home_dir())
}

fn resolve_path(docker_config: Option<OsString>, home: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(dir) = docker_config.filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(dir).join("config.json"));
    }
    home.map(|home| home.join(".docker").join("config.json"))
}

/// Parse the `auths` section of a docker CLI config
///
/// Entries without an inline `auth` blob (credential helpers) and blobs that do not
/// decode to `username:password` are skipped.
pub fn parse_credentials(content: &str) -> serde_json::Result<CredentialResolver> {
    let file: DockerConfigFile = serde_json::from_str(content)?;
    let mut resolver = CredentialResolver::new();

    for (registry, entry) in &file.auths {
        let Some(auth) = entry.auth.as_deref().filter(|a| !a.trim().is_empty()) else {
            debug!("Skipping {} from credential store: no inline auth", registry);
            continue;
        };
        let credential = RegistryCredential::from_token(registry, auth.trim());
        if credential.decode_basic().is_none() {
            debug!("Skipping {} from credential store: auth is not username:password", registry);
            continue;
        }
        resolver.push(Matcher::for_store_key(registry), credential);
    }

    Ok(resolver)
}

/// Load credentials from the store at `path`, or from the default location
pub async fn load_credentials(path: Option<&Path>) -> CredentialResolver {
    let path = match path.map(Path::to_path_buf).or_else(default_path) {
        Some(path) => path,
        None => {
            debug!("No home directory, skipping local credential store");
            return CredentialResolver::new();
        }
    };

    debug!("Looking for registry credentials in {}", path.display());
    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) => {
            debug!("No credential store at {}: {}", path.display(), e);
            return CredentialResolver::new();
        }
    };

    match parse_credentials(&content) {
        Ok(resolver) => {
            debug!(
                "Loaded {} credential(s) from {}",
                resolver.len(),
                path.display()
            );
            resolver
        }
        Err(e) => {
            debug!("Failed to parse {}: {}", path.display(), e);
            CredentialResolver::new()
        }
    }
}
