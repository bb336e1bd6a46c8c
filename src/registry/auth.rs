//! Registry credential material
//!
//! A credential holds the opaque basic-auth token (`base64(username:password)`) bound to
//! the registry key it was configured under. The Docker engine wants credentials in the
//! `X-Registry-Auth` header as base64url-encoded JSON, so the token is converted at that
//! seam only.

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use serde::Serialize;
use std::fmt;

/// Header the Docker engine reads registry credentials from
pub const REGISTRY_AUTH_HEADER: &str = "X-Registry-Auth";

#[derive(Clone, PartialEq, Eq)]
pub struct RegistryCredential {
    key: String,
    token: String,
}

/// Body of the `X-Registry-Auth` header
#[derive(Debug, Default, Serialize)]
struct EngineAuthConfig<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    auth: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    serveraddress: Option<&'a str>,
}

impl RegistryCredential {
    /// Build a credential from a username and password
    pub fn from_basic(key: &str, username: &str, password: &str) -> Self {
        Self {
            key: key.to_string(),
            token: STANDARD.encode(format!("{}:{}", username, password)),
        }
    }

    /// Use an existing docker-style `auth` blob unmodified
    pub fn from_token(key: &str, token: &str) -> Self {
        Self {
            key: key.to_string(),
            token: token.to_string(),
        }
    }

    /// Registry key (prefix, pattern or host) this credential was configured under
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Decode the token into `(username, password)` if it is a basic-auth blob
    pub fn decode_basic(&self) -> Option<(String, String)> {
        let bytes = STANDARD
            .decode(self.token.trim())
            .or_else(|_| URL_SAFE.decode(self.token.trim()))
            .ok()?;
        let decoded = String::from_utf8(bytes).ok()?;
        let (username, password) = decoded.split_once(':')?;
        Some((username.to_string(), password.to_string()))
    }

    /// Encode this credential for the `X-Registry-Auth` header
    pub fn to_engine_header(&self, server_address: &str) -> String {
        let json = match self.decode_basic() {
            Some((username, password)) => serde_json::to_vec(&EngineAuthConfig {
                username: Some(&username),
                password: Some(&password),
                serveraddress: Some(server_address),
                ..Default::default()
            }),
            None => serde_json::to_vec(&EngineAuthConfig {
                auth: Some(&self.token),
                serveraddress: Some(server_address),
                ..Default::default()
            }),
        };
        // Serializing a struct of string fields cannot fail
        URL_SAFE.encode(json.unwrap_or_default())
    }
}

/// `X-Registry-Auth` value for anonymous access
pub fn anonymous_engine_header() -> String {
    URL_SAFE.encode(b"{}")
}

impl fmt::Debug for RegistryCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryCredential")
            .field("key", &self.key)
            .field("token", &"<redacted>")
            .finish()
    }
}
