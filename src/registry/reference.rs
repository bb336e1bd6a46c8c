//! Docker-style image reference parsing
//!
//! A reference looks like `[host[:port]/]repository[:tag][@digest]`. The first path
//! component is treated as a registry host when it contains a `.` or `:` or is exactly
//! `localhost`; otherwise the image lives on Docker Hub.

use crate::error::{Result, SyncerError};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_REGISTRY: &str = "docker.io";
pub const DEFAULT_TAG: &str = "latest";

const DOCKER_HUB_ALIASES: &[&str] = &[
    "docker.io",
    "index.docker.io",
    "registry-1.docker.io",
    "registry.hub.docker.com",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    raw: String,
    registry: Option<String>,
    repository: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageReference {
    pub fn parse(reference: &str) -> Result<Self> {
        let raw = reference.trim();
        if raw.is_empty() {
            return Err(SyncerError::reference(reference, "reference is empty"));
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(SyncerError::reference(reference, "reference contains whitespace"));
        }

        let (name_and_tag, digest) = match raw.split_once('@') {
            Some((name, digest)) => {
                if !digest.contains(':') || digest.ends_with(':') {
                    return Err(SyncerError::reference(
                        reference,
                        "digest must look like algorithm:hex",
                    ));
                }
                (name, Some(digest.to_string()))
            }
            None => (raw, None),
        };

        // A tag is the part after the last ':' that follows the last '/'
        let last_slash = name_and_tag.rfind('/');
        let (name, tag) = match name_and_tag.rfind(':') {
            Some(colon) if last_slash.is_none_or(|slash| colon > slash) => {
                let tag = &name_and_tag[colon + 1..];
                validate_tag(reference, tag)?;
                (&name_and_tag[..colon], Some(tag.to_string()))
            }
            _ => (name_and_tag, None),
        };

        let (registry, repository) = match name.split_once('/') {
            Some((first, rest)) if is_registry_host(first) => (Some(first.to_string()), rest),
            _ => (None, name),
        };

        validate_repository(reference, repository)?;

        Ok(Self {
            raw: raw.to_string(),
            registry,
            repository: repository.to_string(),
            tag,
            digest,
        })
    }

    /// The reference exactly as configured
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Registry host, defaulting to Docker Hub when none is given
    pub fn registry_host(&self) -> &str {
        self.registry.as_deref().unwrap_or(DEFAULT_REGISTRY)
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Host and repository as written, without tag or digest
    pub fn name(&self) -> String {
        match &self.registry {
            Some(host) => format!("{}/{}", host, self.repository),
            None => self.repository.clone(),
        }
    }

    /// Tag used when pulling: the digest wins, then the tag, then `latest`
    pub fn pull_reference(&self) -> &str {
        self.digest
            .as_deref()
            .or(self.tag.as_deref())
            .unwrap_or(DEFAULT_TAG)
    }

    /// Tag used when tagging or pushing
    pub fn tag_or_default(&self) -> &str {
        self.tag.as_deref().unwrap_or(DEFAULT_TAG)
    }

    /// Whether a local image tag such as `nginx:latest` names this reference
    pub fn matches_local_tag(&self, local: &str) -> bool {
        match ImageReference::parse(local) {
            Ok(other) => {
                normalize_registry_host(self.registry_host())
                    == normalize_registry_host(other.registry_host())
                    && strip_library(&self.repository) == strip_library(&other.repository)
                    && match (&self.digest, &other.digest) {
                        (Some(mine), Some(theirs)) => mine == theirs,
                        (Some(_), None) => false,
                        (None, _) => self.tag_or_default() == other.tag_or_default(),
                    }
            }
            Err(_) => false,
        }
    }
}

impl FromStr for ImageReference {
    type Err = SyncerError;

    fn from_str(s: &str) -> Result<Self> {
        ImageReference::parse(s)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Normalize a registry key or host for exact comparison
///
/// Drops any scheme and path (`https://index.docker.io/v1/` becomes `docker.io`) and
/// folds the Docker Hub aliases into `docker.io`.
pub fn normalize_registry_host(key: &str) -> String {
    let without_scheme = key
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let host = without_scheme
        .split('/')
        .next()
        .unwrap_or(without_scheme)
        .to_ascii_lowercase();

    if DOCKER_HUB_ALIASES.contains(&host.as_str()) {
        DEFAULT_REGISTRY.to_string()
    } else {
        host
    }
}

fn is_registry_host(component: &str) -> bool {
    component.contains('.') || component.contains(':') || component == "localhost"
}

fn strip_library(repository: &str) -> &str {
    repository.strip_prefix("library/").unwrap_or(repository)
}

fn validate_repository(reference: &str, repository: &str) -> Result<()> {
    if repository.is_empty() {
        return Err(SyncerError::reference(reference, "repository is empty"));
    }
    if repository.split('/').any(str::is_empty) {
        return Err(SyncerError::reference(reference, "repository has an empty path component"));
    }
    if repository.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(SyncerError::reference(reference, "repository must be lowercase"));
    }
    let allowed = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || "._-/".contains(c);
    if !repository.chars().all(allowed) {
        return Err(SyncerError::reference(reference, "repository contains invalid characters"));
    }
    Ok(())
}

fn validate_tag(reference: &str, tag: &str) -> Result<()> {
    if tag.is_empty() {
        return Err(SyncerError::reference(reference, "tag is empty"));
    }
    if tag.len() > 128 {
        return Err(SyncerError::reference(reference, "tag is longer than 128 characters"));
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || "_.-".contains(c);
    if !tag.chars().all(allowed) || tag.starts_with(['.', '-']) {
        return Err(SyncerError::reference(reference, "tag contains invalid characters"));
    }
    Ok(())
}
