use serde::{Deserialize, Serialize};

/// Category of a content-addressed resource persisted by the repository.
///
/// The kind alone decides the key prefix a resource is stored under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Immutable repository state segment.
    State,
    /// Packfile holding deduplicated chunk data.
    Packfile,
    /// Advisory lock.
    Lock,
}

impl ResourceKind {
    /// Every kind, in key-prefix order.
    pub const ALL: [ResourceKind; 3] = [Self::State, Self::Packfile, Self::Lock];

    /// The key prefix under the repository root.
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::State => "states",
            Self::Packfile => "packfiles",
            Self::Lock => "locks",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.prefix())
    }
}
