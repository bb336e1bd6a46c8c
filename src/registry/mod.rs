//! Registry-side concerns: image references and the credentials used to reach them
//!
//! Nothing in here talks to a registry directly. Pulls and pushes go through the Docker
//! engine, which only needs to know which credential belongs to which reference.

pub mod auth;
pub mod reference;
pub mod resolver;

pub use auth::RegistryCredential;
pub use reference::ImageReference;
pub use resolver::{CredentialResolver, Matcher, ResolvedCredentials};
