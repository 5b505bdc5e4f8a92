//! Typed handles to resolved resource nodes.
//!
//! A [`Handle<K>`] is the only way one component reads another component's
//! outputs. The kind parameter `K` is a zero-sized marker from [`kind`], so a
//! handle to a registry cannot be passed where a handle to a role is required;
//! the mismatch is a type error, not a runtime lookup failure.
//!
//! Handles are minted exclusively by [`crate::Scope::declare`], which resolves
//! the node first. Holding a handle therefore proves the node exists and has
//! outputs.

use std::collections::BTreeMap;
use std::marker::PhantomData;

use serde_json::Value;

use crate::{NodePath, ResourceKind, StackError, StackResult};

mod sealed {
    pub trait Sealed {}
}

/// Compile-time resource kind carried by a [`Handle`].
pub trait ResourceType: sealed::Sealed {
    /// Runtime kind this marker stands for.
    const KIND: ResourceKind;
}

macro_rules! resource_markers {
    ($($name:ident),+ $(,)?) => {
        /// Zero-sized kind markers used as the type parameter of [`Handle`].
        pub mod kind {
            $(
                #[doc = concat!("Marker for [`crate::ResourceKind::", stringify!($name), "`].")]
                #[derive(Debug, Clone, Copy, PartialEq, Eq)]
                pub enum $name {}

                impl super::sealed::Sealed for $name {}

                impl super::ResourceType for $name {
                    const KIND: crate::ResourceKind = crate::ResourceKind::$name;
                }
            )+
        }
    };
}

resource_markers!(
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
);

/// Anything a node can depend on. Implemented by every [`Handle`].
pub trait Dependency {
    fn node_path(&self) -> &NodePath;
}

/// Resolved, immutable output view of one node of kind `K`.
#[derive(Debug)]
pub struct Handle<K: ResourceType> {
    path: NodePath,
    outputs: BTreeMap<String, String>,
    _kind: PhantomData<K>,
}

// Manual impl: `K` is uninhabited and must not need `Clone`.
impl<K: ResourceType> Clone for Handle<K> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            outputs: self.outputs.clone(),
            _kind: PhantomData,
        }
    }
}

impl<K: ResourceType> PartialEq for Handle<K> {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && self.outputs == other.outputs
    }
}

impl<K: ResourceType> Handle<K> {
    pub(crate) fn new(path: NodePath, outputs: BTreeMap<String, String>) -> Self {
        Self {
            path,
            outputs,
            _kind: PhantomData,
        }
    }

    pub fn path(&self) -> &NodePath {
        &self.path
    }

    pub fn kind(&self) -> ResourceKind {
        K::KIND
    }

    /// Returns the output token for `attr`.
    ///
    /// Fails with [`StackError::DependencyUnresolved`] when the node's kind
    /// does not expose that attribute.
    pub fn output(&self, attr: &str) -> StackResult<&str> {
        self.outputs
            .get(attr)
            .map(String::as_str)
            .ok_or_else(|| StackError::unresolved(&self.path, format!("{}.{attr}", self.path)))
    }

    pub fn arn(&self) -> StackResult<&str> {
        self.output("Arn")
    }

    pub fn name(&self) -> StackResult<&str> {
        self.output("Name")
    }

    /// Output token as a JSON string, ready to drop into an attribute map.
    pub fn value(&self, attr: &str) -> StackResult<Value> {
        self.output(attr).map(|token| Value::String(token.to_owned()))
    }
}

impl<K: ResourceType> Dependency for Handle<K> {
    fn node_path(&self) -> &NodePath {
        &self.path
    }
}
