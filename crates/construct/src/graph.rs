//! Dependency-graph validation and the declaration handed to a backend.
//!
//! [`Declaration::from_scope`] is the last step of synthesis. It rebuilds the
//! dependency graph from the registered nodes with petgraph, rejects dangling
//! references and cycles, and emits the nodes in topological order together
//! with the explicit edge list and the output bindings.

use std::collections::{BTreeMap, HashMap};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};

use crate::{NodePath, OutputName, ResourceNode, Scope, StackError, StackResult};

/// A "`to` consumes outputs of `from`" relationship.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodePath,
    pub to: NodePath,
}

/// A complete, acyclic, fully-attributed resource declaration.
///
/// This is the entire contract with a provisioning backend: it never calls
/// back into the construct layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    pub stack: NodePath,
    pub nodes: Vec<ResourceNode>,
    pub edges: Vec<Edge>,
    pub outputs: BTreeMap<OutputName, String>,
}

impl Declaration {
    /// Validates a fully merged root scope and freezes it into a declaration.
    pub fn from_scope(root: Scope) -> StackResult<Self> {
        if let Some((consumer, dependency)) = root.unresolved_references().next() {
            return Err(StackError::unresolved(consumer, dependency));
        }
        let (stack, nodes, outputs) = root.into_parts();
        let (nodes, edges) = order(nodes)?;
        Ok(Self {
            stack,
            nodes,
            edges,
            outputs,
        })
    }

    pub fn node(&self, path: &str) -> Option<&ResourceNode> {
        self.nodes.iter().find(|n| n.path().as_str() == path)
    }

    pub fn output(&self, name: &str) -> Option<&str> {
        self.outputs
            .iter()
            .find(|(key, _)| key.as_str() == name)
            .map(|(_, value)| value.as_str())
    }

    /// Renders the declaration as pretty-printed JSON.
    pub fn to_json(&self) -> StackResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| StackError::Backend {
            message: format!("declaration could not be serialised: {e}"),
        })
    }
}

/// Sorts nodes topologically and returns them with the edge list.
fn order(nodes: Vec<ResourceNode>) -> StackResult<(Vec<ResourceNode>, Vec<Edge>)> {
    let index: HashMap<&NodePath, usize> =
        nodes.iter().enumerate().map(|(i, n)| (n.path(), i)).collect();

    let mut graph: DiGraphMap<usize, ()> = DiGraphMap::new();
    let mut edges = Vec::new();
    for (i, node) in nodes.iter().enumerate() {
        graph.add_node(i);
        for dep in node.depends_on() {
            let &from = index
                .get(dep)
                .ok_or_else(|| StackError::unresolved(node.path(), dep))?;
            graph.add_edge(from, i, ());
            edges.push(Edge {
                from: dep.clone(),
                to: node.path().clone(),
            });
        }
    }

    let sorted = toposort(&graph, None)
        .map_err(|cycle| StackError::unresolved(nodes[cycle.node_id()].path(), "a dependency cycle"))?;

    let mut slots: Vec<Option<ResourceNode>> = nodes.into_iter().map(Some).collect();
    let ordered = sorted.into_iter().filter_map(|i| slots[i].take()).collect();
    edges.sort();
    Ok((ordered, edges))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::kind;
    use crate::{Attributes, ConstructId, ResourceKind};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn raw(path: &str, deps: &[&str]) -> ResourceNode {
        let mut segments = path.split('/');
        let root = NodePath::root(&ConstructId::new(segments.next().unwrap()).unwrap());
        let (path, id) = segments.fold((root, None), |(p, _), s| {
            let id = ConstructId::new(s).unwrap();
            (p.join(&id), Some(id))
        });
        let deps: BTreeSet<NodePath> = deps
            .iter()
            .map(|d| {
                let mut s = d.split('/');
                let root = NodePath::root(&ConstructId::new(s.next().unwrap()).unwrap());
                s.fold(root, |p, seg| p.join(&ConstructId::new(seg).unwrap()))
            })
            .collect();
        ResourceNode::new(id.unwrap(), path, ResourceKind::Network, Attributes::new(), deps)
    }

    #[test]
    fn declaration_lists_edges_and_keeps_dependency_order() {
        let mut root = Scope::root("stack").unwrap();
        let vpc = root.declare::<kind::Network>("vpc", json!({}), &[]).unwrap();
        let ecs = root.declare::<kind::ComputeCluster>("ecs", json!({}), &[&vpc]).unwrap();
        root.output("clusterArn", ecs.arn().unwrap()).unwrap();

        let declaration = Declaration::from_scope(root).unwrap();
        let paths: Vec<&str> = declaration.nodes.iter().map(|n| n.path().as_str()).collect();
        assert_eq!(paths, vec!["stack/vpc", "stack/ecs"]);
        assert_eq!(declaration.edges.len(), 1);
        assert_eq!(declaration.edges[0].from.as_str(), "stack/vpc");
        assert_eq!(declaration.output("clusterArn"), Some("${stack/ecs.Arn}"));
    }

    #[test]
    fn dangling_edge_is_rejected() {
        let nodes = vec![raw("stack/a", &["stack/missing"])];
        assert!(matches!(order(nodes), Err(StackError::DependencyUnresolved { .. })));
    }

    #[test]
    fn cycle_is_rejected() {
        let nodes = vec![raw("stack/a", &["stack/b"]), raw("stack/b", &["stack/a"])];
        assert!(matches!(order(nodes), Err(StackError::DependencyUnresolved { .. })));
    }

    #[test]
    fn unchecked_external_reference_fails_the_declaration() {
        let mut other = Scope::root("other").unwrap();
        let foreign = other.declare::<kind::Network>("vpc", json!({}), &[]).unwrap();

        let mut root = Scope::root("stack").unwrap();
        root.declare::<kind::ComputeCluster>("ecs", json!({}), &[&foreign]).unwrap();
        assert!(matches!(
            Declaration::from_scope(root),
            Err(StackError::DependencyUnresolved { .. })
        ));
    }
}
