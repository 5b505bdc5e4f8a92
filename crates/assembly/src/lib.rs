//! Stackweave provisioning backends.
//!
//! Both backends implement [`construct::ProvisioningBackend`]. Neither calls
//! back into the construct layer: they receive a finished [`Declaration`] and
//! either persist it or describe it.
//!
//! | Backend | Effect |
//! |---------|--------|
//! | [`AssemblyWriter`] | Writes `<stack>.template.json` and `manifest.json` into a directory |
//! | [`DryRunBackend`] | Logs what would be submitted; touches nothing |

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use construct::{Declaration, ProvisioningBackend, Receipt, StackError, StackResult};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

pub const MANIFEST_FILE: &str = "manifest.json";

/// Summary written next to the template so an operator can tell runs apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub assembly_id: Uuid,
    pub stack: String,
    pub template: String,
    pub created_at: DateTime<Utc>,
    pub node_count: usize,
    pub edge_count: usize,
    pub outputs: Vec<String>,
}

// ---------------------------------------------------------------------------
// Assembly writer
// ---------------------------------------------------------------------------

/// Persists declarations as a cloud assembly directory.
#[derive(Debug, Clone)]
pub struct AssemblyWriter {
    out_dir: PathBuf,
}

impl AssemblyWriter {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self { out_dir: out_dir.into() }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Template file name for a stack. Path separators are flattened.
    pub fn template_name(declaration: &Declaration) -> String {
        format!("{}.template.json", declaration.stack.as_str().replace('/', "-"))
    }
}

fn io_error(path: &Path, e: std::io::Error) -> StackError {
    StackError::Backend {
        message: format!("{}: {e}", path.display()),
    }
}

#[async_trait]
impl ProvisioningBackend for AssemblyWriter {
    #[instrument(skip_all, fields(stack = %declaration.stack, out_dir = %self.out_dir.display()))]
    async fn submit(&self, declaration: &Declaration) -> StackResult<Receipt> {
        tokio::fs::create_dir_all(&self.out_dir)
            .await
            .map_err(|e| io_error(&self.out_dir, e))?;

        let template = Self::template_name(declaration);
        let template_path = self.out_dir.join(&template);
        tokio::fs::write(&template_path, declaration.to_json()?)
            .await
            .map_err(|e| io_error(&template_path, e))?;

        let manifest = Manifest {
            assembly_id: Uuid::new_v4(),
            stack: declaration.stack.to_string(),
            template,
            created_at: Utc::now(),
            node_count: declaration.nodes.len(),
            edge_count: declaration.edges.len(),
            outputs: declaration.outputs.keys().map(ToString::to_string).collect(),
        };
        let manifest_path = self.out_dir.join(MANIFEST_FILE);
        let body = serde_json::to_vec_pretty(&manifest).map_err(|e| StackError::Backend {
            message: format!("manifest could not be serialised: {e}"),
        })?;
        tokio::fs::write(&manifest_path, body)
            .await
            .map_err(|e| io_error(&manifest_path, e))?;

        info!(
            assembly_id = %manifest.assembly_id,
            nodes = manifest.node_count,
            "cloud assembly written"
        );
        Ok(Receipt {
            location: self.out_dir.display().to_string(),
            node_count: manifest.node_count,
        })
    }
}

// ---------------------------------------------------------------------------
// Dry run
// ---------------------------------------------------------------------------

/// Logs each node that would be provisioned.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunBackend;

#[async_trait]
impl ProvisioningBackend for DryRunBackend {
    #[instrument(skip_all, fields(stack = %declaration.stack))]
    async fn submit(&self, declaration: &Declaration) -> StackResult<Receipt> {
        for node in &declaration.nodes {
            info!(node = %node.path(), kind = ?node.kind(), deps = node.depends_on().len(), "would provision");
        }
        for (name, value) in &declaration.outputs {
            info!(output = %name, value = %value, "would bind output");
        }
        Ok(Receipt {
            location: "dry-run".to_owned(),
            node_count: declaration.nodes.len(),
        })
    }
}
