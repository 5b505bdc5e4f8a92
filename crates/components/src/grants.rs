//! Registry permission grants.
//!
//! A grant is its own policy node attached to exactly one role. The service's
//! execution role receives pull only; the build project's role receives pull
//! and push. Nothing else is granted registry access.

use std::collections::{BTreeMap, BTreeSet};

use construct::types::RegistryAccess;
use construct::{kind, Declaration, Handle, NodePath, ResourceKind, ResourceNode, Scope, StackResult};
use serde_json::{json, Value};

/// Attaches `access` on `registry` to `role` as a policy node named `id`.
pub fn grant_registry_access(
    scope: &mut Scope,
    id: &str,
    role: &Handle<kind::Role>,
    registry: &Handle<kind::Registry>,
    access: &[RegistryAccess],
) -> StackResult<Handle<kind::Policy>> {
    let access: BTreeSet<RegistryAccess> = access.iter().copied().collect();
    let actions: Vec<&str> = access.iter().flat_map(|a| a.actions().iter().copied()).collect();

    scope.declare::<kind::Policy>(
        id,
        json!({
            "principal": role.path(),
            "roles": [role.name()?],
            "access": access,
            "statements": [
                {
                    "effect": "Allow",
                    "actions": actions,
                    "resources": [registry.arn()?],
                },
                {
                    // Token exchange is account-wide; it grants no image access.
                    "effect": "Allow",
                    "actions": ["ecr:GetAuthorizationToken"],
                    "resources": ["*"],
                },
            ],
        }),
        &[role, registry],
    )
}

/// Registry access levels recorded on a policy node, if it is a grant.
pub fn granted_access(node: &ResourceNode) -> Option<(NodePath, BTreeSet<RegistryAccess>)> {
    if node.kind() != ResourceKind::Policy {
        return None;
    }
    let principal: NodePath = serde_json::from_value(node.attribute("principal")?.clone()).ok()?;
    let access = node
        .attribute("access")
        .and_then(Value::as_array)?
        .iter()
        .filter_map(|v| serde_json::from_value(v.clone()).ok())
        .collect();
    Some((principal, access))
}

/// Every role holding registry access in a declaration, with its access set.
pub fn registry_access_by_role(declaration: &Declaration) -> BTreeMap<NodePath, BTreeSet<RegistryAccess>> {
    let mut by_role: BTreeMap<NodePath, BTreeSet<RegistryAccess>> = BTreeMap::new();
    for (role, access) in declaration.nodes.iter().filter_map(granted_access) {
        by_role.entry(role).or_default().extend(access);
    }
    by_role
}
