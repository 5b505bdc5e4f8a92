//! Error types for synthesis and for pipeline-stage failures.
//!
//! [`StackError`] covers the whole taxonomy. Configuration and dependency
//! errors abort a synthesis pass before anything is handed to a provisioning
//! backend; source/build/deploy failures are produced when interpreting what
//! the external pipeline runner reports. None of them is retried here: retry
//! policy, if any, belongs to that runner.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ConstructId, NodePath};

// ---------------------------------------------------------------------------
// Where an error surfaces
// ---------------------------------------------------------------------------

/// The phase in which an error is observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureSurface {
    /// Raised while assembling the resource graph; nothing was declared.
    Synthesis,
    /// Raised by a stage of the deployed pipeline and reported by its runner.
    PipelineRun,
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Malformed or missing input, including construct id collisions.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ConfigurationError {
    /// A required field is absent or empty.
    #[error("missing required field '{field}'")]
    MissingField { field: String },

    /// A field is present but its value is not acceptable.
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// Two siblings in the same scope share an id.
    #[error("construct id '{id}' already exists in scope '{scope}'")]
    DuplicateId { scope: NodePath, id: ConstructId },

    /// The configuration document could not be parsed.
    #[error("configuration could not be parsed: {message}")]
    Parse { message: String },
}

impl ConfigurationError {
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Stack errors
// ---------------------------------------------------------------------------

/// Every failure a synthesis pass or pipeline-stage interpretation can report.
///
/// All variants are fatal for the operation that produced them: synthesis is
/// all-or-nothing and there is no partial-graph success state.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum StackError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// A consumer referenced an upstream output that does not exist yet.
    ///
    /// Always a graph-ordering bug in the composing code.
    #[error("'{consumer}' depends on '{dependency}', which is not resolved")]
    DependencyUnresolved { consumer: String, dependency: String },

    /// The source stage cannot reach its repository, branch, or credential.
    #[error("source unavailable: {reason}")]
    SourceUnavailable { reason: String },

    /// The build stage exited with a non-zero status.
    #[error("build failed with exit code {exit_code}")]
    BuildFailed { exit_code: i32 },

    /// The deploy stage's target service cannot accept a deployment.
    #[error("deployment to '{service}' failed: {reason}")]
    DeployFailed { service: String, reason: String },

    /// The provisioning backend rejected or could not store the declaration.
    #[error("provisioning backend error: {message}")]
    Backend { message: String },
}

impl StackError {
    pub fn unresolved(consumer: impl std::fmt::Display, dependency: impl std::fmt::Display) -> Self {
        Self::DependencyUnresolved {
            consumer: consumer.to_string(),
            dependency: dependency.to_string(),
        }
    }

    /// Returns where this error is observed.
    pub fn surface(&self) -> FailureSurface {
        match self {
            Self::Configuration(_) | Self::DependencyUnresolved { .. } | Self::Backend { .. } => {
                FailureSurface::Synthesis
            }
            Self::SourceUnavailable { .. } | Self::BuildFailed { .. } | Self::DeployFailed { .. } => {
                FailureSurface::PipelineRun
            }
        }
    }
}

/// Result type for construct operations.
pub type StackResult<T> = Result<T, StackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_id_message_names_the_collision() {
        let err = StackError::from(ConfigurationError::DuplicateId {
            scope: NodePath::root(&ConstructId::new("stack").unwrap()),
            id: ConstructId::new("Cluster").unwrap(),
        });
        assert_eq!(
            err.to_string(),
            "configuration error: construct id 'Cluster' already exists in scope 'stack'"
        );
        assert_eq!(err.surface(), FailureSurface::Synthesis);
    }

    #[test]
    fn stage_failures_surface_in_pipeline_runs() {
        assert_eq!(StackError::BuildFailed { exit_code: 2 }.surface(), FailureSurface::PipelineRun);
        assert_eq!(
            StackError::SourceUnavailable { reason: "x".into() }.surface(),
            FailureSurface::PipelineRun
        );
    }
}
