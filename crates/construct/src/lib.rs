//! Core construct domain for Stackweave.
//!
//! This crate holds every building block the stack components compose:
//! identifiers, value types, the error taxonomy, resource nodes, typed
//! handles, explicit registration scopes, dependency-graph validation, the
//! configuration model, and the port traits adapters implement.
//!
//! ## Architectural Layer
//!
//! **Domain + port definitions.** No I/O happens here. Secret stores and
//! provisioning backends are reached only through [`ports`].
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`ConstructId`, `NodePath`, `SecretName`, ...) |
//! | [`types`] | Value types with invariants (`Port`, `CapacityBounds`, `HealthProbe`, ...) |
//! | [`errors`] | `StackError` and `ConfigurationError` |
//! | [`resource`] | `ResourceNode` and `ResourceKind` |
//! | [`handle`] | Typed `Handle<K>` and kind markers |
//! | [`scope`] | `Scope`: registration, child fragments, merging |
//! | [`graph`] | Graph validation and the `Declaration` |
//! | [`config`] | `StackConfig` loading and validation |
//! | [`ports`] | `SecretStore`, `ProvisioningBackend` |

pub mod config;
pub mod errors;
pub mod graph;
pub mod handle;
pub mod identifiers;
pub mod ports;
pub mod resource;
pub mod scope;
pub mod types;

pub use config::StackConfig;
pub use errors::{ConfigurationError, FailureSurface, StackError, StackResult};
pub use graph::{Declaration, Edge};
pub use handle::{kind, Dependency, Handle, ResourceType};
pub use identifiers::{
    ArtifactName, BranchName, ConstructId, ContainerName, NodePath, OutputName, SecretName,
    SynthesisId,
};
pub use ports::{Credential, ProvisioningBackend, Receipt, SecretError, SecretStore};
pub use resource::{Attributes, ResourceKind, ResourceNode};
pub use scope::Scope;
