//! Newtype domain identifiers.
//!
//! Every named thing in a stack (a construct, a secret, an output binding, a
//! pipeline artifact) is a distinct newtype wrapping a `String`. This keeps a
//! [`SecretName`] from being passed where an [`OutputName`] is expected even
//! though both are plain strings underneath.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Construct identity
// ---------------------------------------------------------------------------

/// Identifies a construct or resource node within its parent scope.
///
/// A single path segment: non-empty and free of the `/` separator used by
/// [`NodePath`]. Uniqueness is enforced by the owning scope, not here.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConstructId(String);

impl ConstructId {
    /// Creates a construct id, returning `None` if the value is empty or
    /// contains a path separator.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let v = value.into();
        if v.is_empty() || v.contains(NodePath::SEPARATOR) {
            None
        } else {
            Some(Self(v))
        }
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConstructId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fully qualified location of a node in the construct tree
/// (e.g. `"web-stack/WebApp/server-sg"`).
///
/// Built only by joining [`ConstructId`] segments, so every segment is
/// guaranteed non-empty.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodePath(String);

impl NodePath {
    /// Separator between path segments.
    pub const SEPARATOR: char = '/';

    /// Creates a single-segment root path.
    pub fn root(id: &ConstructId) -> Self {
        Self(id.as_str().to_owned())
    }

    /// Returns a new path with `id` appended as the last segment.
    pub fn join(&self, id: &ConstructId) -> Self {
        Self(format!("{}{}{}", self.0, Self::SEPARATOR, id.as_str()))
    }

    /// Returns the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if `self` equals `ancestor` or lies beneath it.
    pub fn is_within(&self, ancestor: &NodePath) -> bool {
        self.0 == ancestor.0
            || (self.0.starts_with(&ancestor.0)
                && self.0[ancestor.0.len()..].starts_with(Self::SEPARATOR))
    }
}

impl std::fmt::Display for NodePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Synthesis run identity: UUID-backed
// ---------------------------------------------------------------------------

/// Identifies a single synthesis pass.
///
/// Generated fresh for every call so log lines from one pass can be
/// correlated. It never appears inside the resource graph itself, which keeps
/// two passes over the same configuration structurally identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SynthesisId(Uuid);

impl SynthesisId {
    /// Generates a new random synthesis identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for SynthesisId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// String-backed identifiers
// ---------------------------------------------------------------------------

string_id! {
    /// Name of a credential held by the external secret store
    /// (e.g. `"GITHUB_TOKEN"`).
    SecretName
}

string_id! {
    /// A Git branch name (e.g. `"main"`).
    BranchName
}

string_id! {
    /// Key of a declared stack output (e.g. `"clusterArn"`).
    OutputName
}

string_id! {
    /// Identity of a pipeline artifact. Assigned positionally by the pipeline
    /// builder; never chosen by the caller.
    ArtifactName
}

string_id! {
    /// Name of the container inside the service's task definition.
    ContainerName
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construct_id_rejects_separator_and_empty() {
        assert!(ConstructId::new("").is_none());
        assert!(ConstructId::new("a/b").is_none());
        assert_eq!(ConstructId::new("vpc-1").map(|id| id.to_string()), Some("vpc-1".into()));
    }

    #[test]
    fn node_path_join_and_containment() {
        let stack = ConstructId::new("stack").unwrap();
        let cluster = ConstructId::new("Cluster").unwrap();
        let root = NodePath::root(&stack);
        let child = root.join(&cluster);

        assert_eq!(child.as_str(), "stack/Cluster");
        assert!(child.is_within(&root));
        assert!(root.is_within(&root));

        let sibling = NodePath::root(&ConstructId::new("stacked").unwrap());
        assert!(!sibling.is_within(&root));
    }
}
