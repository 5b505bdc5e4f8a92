//! Port traits implemented by infrastructure adapters.
//!
//! The construct layer never talks to a secret store or a provisioning engine
//! directly. It defines what it needs here; the `secrets` and `assembly`
//! crates supply implementations, and the CLI wires them together.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Declaration, SecretName, StackResult};

// ---------------------------------------------------------------------------
// Secret store
// ---------------------------------------------------------------------------

/// A resolved secret value.
///
/// `Debug` is redacted so the value cannot leak into logs through `{:?}`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Exposes the secret value. Callers must not log it.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Failure to resolve a secret.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecretError {
    #[error("secret '{0}' was not found")]
    NotFound(SecretName),

    #[error("secret '{name}' could not be read: {reason}")]
    Unreadable { name: SecretName, reason: String },
}

/// Looks up credentials by name.
pub trait SecretStore: Send + Sync {
    fn resolve(&self, name: &SecretName) -> Result<Credential, SecretError>;
}

// ---------------------------------------------------------------------------
// Provisioning backend
// ---------------------------------------------------------------------------

/// Acknowledgement returned by a backend after accepting a declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Backend-specific location of the accepted declaration (a directory,
    /// a change-set id, ...).
    pub location: String,
    pub node_count: usize,
}

/// Engine that turns a declaration into real infrastructure.
///
/// Implementations receive the complete, validated graph and must never call
/// back into the construct layer.
#[async_trait]
pub trait ProvisioningBackend: Send + Sync {
    async fn submit(&self, declaration: &Declaration) -> StackResult<Receipt>;
}
