//! Credential resolution for image references
//!
//! Each configured credential carries a [`Matcher`]. Lookup walks the entries in the
//! order they were configured and the first matcher that accepts the reference wins.
//! Pull credentials are resolved against the source reference and push credentials
//! against the target reference, independently of each other.

use crate::config::SyncSpec;
use crate::error::{Result, SyncerError};
use crate::registry::auth::RegistryCredential;
use crate::registry::reference::{normalize_registry_host, ImageReference};
use regex::Regex;

const PATTERN_METACHARACTERS: &[char] = &['^', '$', '*', '+', '?', '(', ')', '[', ']', '{', '}', '|', '\\'];

/// How a registry key is compared against an image reference
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Reference starts with the key
    Prefix(String),
    /// Reference matches the regular expression
    Pattern(Regex),
    /// Registry host of the reference equals the normalized key
    Host(String),
}

impl Matcher {
    /// Matcher for a key of the config document's `auths` object
    pub fn for_config_key(key: &str) -> Result<Self> {
        let key = key.trim();
        if key.is_empty() {
            return Err(SyncerError::Validation("auths key must not be empty".to_string()));
        }
        if key.contains(PATTERN_METACHARACTERS) {
            let regex = Regex::new(key).map_err(|e| {
                SyncerError::Validation(format!("auths key '{}' is not a valid pattern: {}", key, e))
            })?;
            return Ok(Matcher::Pattern(regex));
        }
        let prefix = key
            .trim_start_matches("https://")
            .trim_start_matches("http://");
        Ok(Matcher::Prefix(prefix.to_string()))
    }

    /// Matcher for a key of the local credential store
    pub fn for_store_key(key: &str) -> Self {
        Matcher::Host(normalize_registry_host(key))
    }

    pub fn matches(&self, reference: &str) -> bool {
        match self {
            Matcher::Prefix(prefix) => reference.starts_with(prefix.as_str()),
            Matcher::Pattern(regex) => regex.is_match(reference),
            Matcher::Host(host) => ImageReference::parse(reference)
                .map(|r| normalize_registry_host(r.registry_host()) == *host)
                .unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CredentialEntry {
    pub matcher: Matcher,
    pub credential: RegistryCredential,
}

/// Credentials bound to one sync job, owned by that job
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedCredentials {
    pub pull: Option<RegistryCredential>,
    pub push: Option<RegistryCredential>,
}

#[derive(Debug, Clone, Default)]
pub struct CredentialResolver {
    entries: Vec<CredentialEntry>,
}

impl CredentialResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, matcher: Matcher, credential: RegistryCredential) {
        self.entries.push(CredentialEntry { matcher, credential });
    }

    pub fn with_entry(mut self, matcher: Matcher, credential: RegistryCredential) -> Self {
        self.push(matcher, credential);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[CredentialEntry] {
        &self.entries
    }

    /// First credential whose matcher accepts the reference, if any
    pub fn resolve(&self, reference: &str) -> Option<&RegistryCredential> {
        self.entries
            .iter()
            .find(|entry| entry.matcher.matches(reference))
            .map(|entry| &entry.credential)
    }

    /// Resolve pull and push credentials for a spec
    pub fn resolve_spec(&self, spec: &SyncSpec) -> ResolvedCredentials {
        ResolvedCredentials {
            pull: self.resolve(&spec.source).cloned(),
            push: self.resolve(&spec.target).cloned(),
        }
    }
}
