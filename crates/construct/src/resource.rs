//! Resource nodes: the smallest unit of declared infrastructure.
//!
//! A [`ResourceNode`] is a named, typed declaration of one provisioned
//! resource. Its `outputs` stay empty until the owning scope resolves it; from
//! then on the node is frozen. Outputs are deterministic tokens of the form
//! `${<path>.<Attr>}` that the provisioning backend substitutes with live
//! values when it materialises the resource.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ConstructId, NodePath};

/// Attribute map attached to a node. Ordered so declarations serialize stably.
pub type Attributes = BTreeMap<String, Value>;

/// The resource kinds this topology composes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Network,
    ComputeCluster,
    SecurityBoundary,
    Role,
    Policy,
    Certificate,
    LogGroup,
    TaskDefinition,
    LoadBalancer,
    Listener,
    TargetGroup,
    Service,
    Registry,
    ScalableTarget,
    ScalingPolicy,
    BuildProject,
    ArtifactStore,
    Pipeline,
}

impl ResourceKind {
    /// Output attributes a node of this kind exposes once resolved.
    pub fn output_attributes(self) -> &'static [&'static str] {
        match self {
            Self::Network => &["Id"],
            Self::ComputeCluster => &["Arn", "Name"],
            Self::SecurityBoundary => &["GroupId"],
            Self::Role => &["Arn", "Name"],
            Self::Policy => &["Id"],
            Self::Certificate => &["Arn"],
            Self::LogGroup => &["Arn", "Name"],
            Self::TaskDefinition => &["Arn", "Family"],
            Self::LoadBalancer => &["Arn", "DnsName"],
            Self::Listener | Self::TargetGroup | Self::ScalingPolicy => &["Arn"],
            Self::Service => &["Arn", "Name"],
            Self::Registry => &["Arn", "Name", "Uri"],
            Self::ScalableTarget => &["Id"],
            Self::BuildProject | Self::ArtifactStore | Self::Pipeline => &["Arn", "Name"],
        }
    }
}

/// One declared resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceNode {
    id: ConstructId,
    path: NodePath,
    kind: ResourceKind,
    attributes: Attributes,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    depends_on: BTreeSet<NodePath>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    outputs: BTreeMap<String, String>,
}

impl ResourceNode {
    pub(crate) fn new(
        id: ConstructId,
        path: NodePath,
        kind: ResourceKind,
        attributes: Attributes,
        depends_on: BTreeSet<NodePath>,
    ) -> Self {
        Self {
            id,
            path,
            kind,
            attributes,
            depends_on,
            outputs: BTreeMap::new(),
        }
    }

    /// Assigns output tokens. Returns `false` and leaves the node untouched if
    /// it was already resolved.
    pub(crate) fn resolve(&mut self) -> bool {
        if self.is_resolved() {
            return false;
        }
        self.outputs = self
            .kind
            .output_attributes()
            .iter()
            .map(|attr| ((*attr).to_owned(), format!("${{{}.{}}}", self.path, attr)))
            .collect();
        true
    }

    pub fn id(&self) -> &ConstructId {
        &self.id
    }

    pub fn path(&self) -> &NodePath {
        &self.path
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Looks up one attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Paths of the nodes this node consumes outputs from.
    pub fn depends_on(&self) -> &BTreeSet<NodePath> {
        &self.depends_on
    }

    pub fn outputs(&self) -> &BTreeMap<String, String> {
        &self.outputs
    }

    pub fn is_resolved(&self) -> bool {
        !self.outputs.is_empty()
    }
}
