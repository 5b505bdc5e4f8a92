//! Explicit registration scopes.
//!
//! There is no ambient construct tree. A component receives its parent
//! [`Scope`] by reference, opens a child scope with [`Scope::child`], declares
//! its nodes into that child, and hands the child back to the caller, who
//! folds it in with [`Scope::merge`]. Nothing reaches the parent until the
//! merge succeeds.
//!
//! Dependencies that cross a scope boundary are carried upward as
//! *external references* and checked at each merge: when a fragment lands in
//! a scope that should contain the referenced node and does not, the merge
//! fails with [`StackError::DependencyUnresolved`].

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde_json::Value;
use tracing::debug;

use crate::handle::{Dependency, Handle, ResourceType};
use crate::{
    Attributes, ConfigurationError, ConstructId, NodePath, OutputName, ResourceNode, StackError,
    StackResult,
};

/// A reference from a node in this scope to a node declared outside it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ExternalRef {
    consumer: NodePath,
    dependency: NodePath,
}

/// Registration target for nodes, child constructs, and output bindings.
#[derive(Debug)]
pub struct Scope {
    path: NodePath,
    /// Ids taken in this scope, by nodes and by merged child constructs alike.
    taken: BTreeSet<ConstructId>,
    /// Nodes of this scope and every merged descendant, in registration order.
    nodes: Vec<ResourceNode>,
    known: HashSet<NodePath>,
    outputs: BTreeMap<OutputName, String>,
    external: BTreeSet<ExternalRef>,
}

fn parse_id(id: &str) -> StackResult<ConstructId> {
    ConstructId::new(id).ok_or_else(|| {
        ConfigurationError::invalid("construct id", format!("'{id}' must be non-empty and must not contain '/'"))
            .into()
    })
}

impl Scope {
    /// Opens the top-level scope of a stack.
    pub fn root(id: &str) -> StackResult<Self> {
        let id = parse_id(id)?;
        Ok(Self::at(NodePath::root(&id)))
    }

    /// Opens a child scope below `parent`.
    ///
    /// Fails with [`ConfigurationError::DuplicateId`] if `id` is already taken
    /// in `parent`. The child is not registered until [`Scope::merge`].
    pub fn child(parent: &Scope, id: &str) -> StackResult<Self> {
        let id = parse_id(id)?;
        parent.ensure_free(&id)?;
        Ok(Self::at(parent.path.join(&id)))
    }

    fn at(path: NodePath) -> Self {
        Self {
            path,
            taken: BTreeSet::new(),
            nodes: Vec::new(),
            known: HashSet::new(),
            outputs: BTreeMap::new(),
            external: BTreeSet::new(),
        }
    }

    fn ensure_free(&self, id: &ConstructId) -> StackResult<()> {
        if self.taken.contains(id) {
            return Err(ConfigurationError::DuplicateId {
                scope: self.path.clone(),
                id: id.clone(),
            }
            .into());
        }
        Ok(())
    }

    pub fn path(&self) -> &NodePath {
        &self.path
    }

    /// Declares and resolves one node, returning a typed handle to it.
    ///
    /// `attributes` must be a JSON object. Every entry of `depends_on` must
    /// either be registered in this scope already or live outside it; a
    /// reference into this scope to a node that does not exist is a graph
    /// ordering bug.
    pub fn declare<K: ResourceType>(
        &mut self,
        id: &str,
        attributes: Value,
        depends_on: &[&dyn Dependency],
    ) -> StackResult<Handle<K>> {
        let id = parse_id(id)?;
        self.ensure_free(&id)?;
        let path = self.path.join(&id);

        let attributes: Attributes = match attributes {
            Value::Object(map) => map.into_iter().collect(),
            Value::Null => Attributes::new(),
            other => {
                return Err(ConfigurationError::invalid(
                    format!("{path} attributes"),
                    format!("expected an object, got {other}"),
                )
                .into())
            }
        };

        let mut deps = BTreeSet::new();
        for dep in depends_on {
            let dep_path = dep.node_path();
            if !self.known.contains(dep_path) {
                if dep_path.is_within(&self.path) {
                    return Err(StackError::unresolved(&path, dep_path));
                }
                self.external.insert(ExternalRef {
                    consumer: path.clone(),
                    dependency: dep_path.clone(),
                });
            }
            deps.insert(dep_path.clone());
        }

        let mut node = ResourceNode::new(id.clone(), path.clone(), K::KIND, attributes, deps);
        node.resolve();
        debug!(node = %path, kind = ?K::KIND, "declared resource node");

        let handle = Handle::new(path.clone(), node.outputs().clone());
        self.taken.insert(id);
        self.known.insert(path);
        self.nodes.push(node);
        Ok(handle)
    }

    /// Binds a named stack output. Names are unique across the whole stack
    /// and the value must be non-empty.
    pub fn output(&mut self, name: &str, value: impl Into<String>) -> StackResult<()> {
        let value = value.into();
        let name = OutputName::new(name).ok_or_else(|| ConfigurationError::missing("output name"))?;
        if value.is_empty() {
            return Err(ConfigurationError::invalid(format!("output '{name}'"), "value is empty").into());
        }
        if self.outputs.contains_key(&name) {
            return Err(ConfigurationError::invalid(
                format!("output '{name}'"),
                format!("already declared in scope '{}'", self.path),
            )
            .into());
        }
        self.outputs.insert(name, value);
        Ok(())
    }

    /// Folds a child fragment produced by [`Scope::child`] into this scope.
    pub fn merge(&mut self, child: Scope) -> StackResult<()> {
        let child_id = self.direct_child_id(&child.path)?;
        self.ensure_free(&child_id)?;

        if let Some(name) = child.outputs.keys().find(|name| self.outputs.contains_key(*name)) {
            return Err(ConfigurationError::invalid(
                format!("output '{name}'"),
                format!("already declared in scope '{}'", self.path),
            )
            .into());
        }

        let mut still_external = Vec::new();
        for reference in child.external {
            if self.known.contains(&reference.dependency) {
                continue;
            }
            if reference.dependency.is_within(&self.path) {
                return Err(StackError::unresolved(&reference.consumer, &reference.dependency));
            }
            still_external.push(reference);
        }

        debug!(scope = %self.path, child = %child.path, nodes = child.nodes.len(), "merged construct");
        self.external.extend(still_external);
        self.taken.insert(child_id);
        self.known.extend(child.known);
        self.nodes.extend(child.nodes);
        self.outputs.extend(child.outputs);
        Ok(())
    }

    fn direct_child_id(&self, path: &NodePath) -> StackResult<ConstructId> {
        path.as_str()
            .strip_prefix(self.path.as_str())
            .and_then(|rest| rest.strip_prefix(NodePath::SEPARATOR))
            .filter(|rest| !rest.contains(NodePath::SEPARATOR))
            .and_then(|rest| ConstructId::new(rest))
            .ok_or_else(|| {
                ConfigurationError::invalid(
                    "scope",
                    format!("'{path}' is not a direct child of '{}'", self.path),
                )
                .into()
            })
    }

    pub fn nodes(&self) -> &[ResourceNode] {
        &self.nodes
    }

    pub fn node(&self, path: &NodePath) -> Option<&ResourceNode> {
        self.nodes.iter().find(|node| node.path() == path)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn outputs(&self) -> &BTreeMap<OutputName, String> {
        &self.outputs
    }

    /// Dependencies on nodes outside this scope that are still unchecked.
    pub fn unresolved_references(&self) -> impl Iterator<Item = (&NodePath, &NodePath)> {
        self.external.iter().map(|r| (&r.consumer, &r.dependency))
    }

    pub(crate) fn into_parts(self) -> (NodePath, Vec<ResourceNode>, BTreeMap<OutputName, String>) {
        (self.path, self.nodes, self.outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::kind;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn sibling_id_collision_names_the_id() {
        let mut root = Scope::root("stack").unwrap();
        let first = Scope::child(&root, "Cluster").unwrap();
        root.merge(first).unwrap();

        let err = Scope::child(&root, "Cluster").unwrap_err();
        assert_eq!(
            err,
            StackError::Configuration(ConfigurationError::DuplicateId {
                scope: root.path().clone(),
                id: ConstructId::new("Cluster").unwrap(),
            })
        );
    }

    #[test]
    fn collision_between_unmerged_siblings_is_caught_at_merge() {
        let mut root = Scope::root("stack").unwrap();
        let a = Scope::child(&root, "WebApp").unwrap();
        let b = Scope::child(&root, "WebApp").unwrap();
        root.merge(a).unwrap();
        assert!(matches!(
            root.merge(b),
            Err(StackError::Configuration(ConfigurationError::DuplicateId { .. }))
        ));
    }

    #[test]
    fn node_and_child_share_the_id_namespace() {
        let mut root = Scope::root("stack").unwrap();
        root.declare::<kind::Network>("vpc", json!({}), &[]).unwrap();
        assert!(Scope::child(&root, "vpc").is_err());
    }

    #[test]
    fn cross_scope_dependency_is_checked_on_merge() {
        let mut root = Scope::root("stack").unwrap();

        let mut net = Scope::child(&root, "Cluster").unwrap();
        let vpc = net.declare::<kind::Network>("vpc", json!({}), &[]).unwrap();

        // The consumer is built before the network fragment is merged.
        let mut app = Scope::child(&root, "WebApp").unwrap();
        app.declare::<kind::SecurityBoundary>("sg", json!({ "vpc": vpc.output("Id").unwrap() }), &[&vpc])
            .unwrap();

        assert!(matches!(
            root.merge(app),
            Err(StackError::DependencyUnresolved { .. })
        ));
    }

    #[test]
    fn merged_fragment_keeps_registration_order() {
        let mut root = Scope::root("stack").unwrap();
        let mut net = Scope::child(&root, "Cluster").unwrap();
        let vpc = net.declare::<kind::Network>("vpc", json!({}), &[]).unwrap();
        net.declare::<kind::ComputeCluster>("ecs", json!({}), &[&vpc]).unwrap();
        net.output("clusterArn", "${stack/Cluster/ecs.Arn}").unwrap();
        root.merge(net).unwrap();

        let paths: Vec<&str> = root.nodes().iter().map(|n| n.path().as_str()).collect();
        assert_eq!(paths, vec!["stack/Cluster/vpc", "stack/Cluster/ecs"]);
        assert_eq!(root.unresolved_references().count(), 0);
        assert_eq!(root.outputs().len(), 1);
    }

    #[test]
    fn attributes_must_be_an_object() {
        let mut root = Scope::root("stack").unwrap();
        assert!(root.declare::<kind::Network>("vpc", json!([1, 2]), &[]).is_err());
        assert_eq!(root.node_count(), 0);
    }

    #[test]
    fn empty_output_value_is_rejected() {
        let mut root = Scope::root("stack").unwrap();
        assert!(root.output("clusterArn", "").is_err());
    }
}
