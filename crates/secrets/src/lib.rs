//! Stackweave secret-store adapters.
//!
//! Implements [`construct::SecretStore`] for the two places a synthesis run
//! can find credentials without a network call: the process environment and
//! an in-memory map.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** No construct rules live here. A store only answers
//! "does this name resolve, and to what".

use std::collections::BTreeMap;

use construct::{Credential, SecretError, SecretName, SecretStore};
use tracing::debug;

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Resolves `NAME` from the environment variable `{prefix}NAME`.
#[derive(Debug, Clone, Default)]
pub struct EnvSecretStore {
    prefix: String,
}

impl EnvSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks secrets up under `{prefix}{name}`, e.g. `STACK_SECRET_GITHUB_TOKEN`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    fn variable(&self, name: &SecretName) -> String {
        format!("{}{}", self.prefix, name)
    }
}

impl SecretStore for EnvSecretStore {
    fn resolve(&self, name: &SecretName) -> Result<Credential, SecretError> {
        let variable = self.variable(name);
        match std::env::var(&variable) {
            Ok(value) if !value.is_empty() => {
                debug!(secret = %name, variable, "secret resolved from environment");
                Ok(Credential::new(value))
            }
            Ok(_) | Err(std::env::VarError::NotPresent) => Err(SecretError::NotFound(name.clone())),
            Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::Unreadable {
                name: name.clone(),
                reason: format!("{variable} is not valid unicode"),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Fixed name-to-value map. Used by tests and dry runs.
#[derive(Default)]
pub struct StaticSecretStore {
    secrets: BTreeMap<SecretName, Credential>,
}

impl StaticSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, name: SecretName, value: impl Into<String>) -> Self {
        self.secrets.insert(name, Credential::new(value));
        self
    }
}

impl std::fmt::Debug for StaticSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticSecretStore")
            .field("names", &self.secrets.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SecretStore for StaticSecretStore {
    fn resolve(&self, name: &SecretName) -> Result<Credential, SecretError> {
        self.secrets
            .get(name)
            .cloned()
            .ok_or_else(|| SecretError::NotFound(name.clone()))
    }
}
