//! Module identifiers and their comparison semantics.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::version::Version;

/// Outcome of comparing two module identifiers.
///
/// Identifiers with different logical identities (group/name) are not
/// comparable; that is a normal negative result, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionOrder {
    Less,
    Equal,
    Greater,
    Incompatible,
}

/// A concrete module version within a repository
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleIdentifier {
    /// Stable id of the repository that produced this identifier
    pub repository: String,
    /// Logical group key (e.g. "org.example")
    pub group: String,
    /// Logical name key
    pub name: String,
    /// Concrete version
    pub version: Version,
}

impl ModuleIdentifier {
    pub fn new(repository: &str, group: &str, name: &str, version: Version) -> Self {
        Self {
            repository: repository.to_string(),
            group: group.to_string(),
            name: name.to_string(),
            version,
        }
    }

    /// The group/name pair used for conflict partitioning
    pub fn logical_identity(&self) -> (&str, &str) {
        (&self.group, &self.name)
    }

    /// Whether two identifiers name the same logical module
    pub fn same_logical_identity(&self, other: &ModuleIdentifier) -> bool {
        self.logical_identity() == other.logical_identity()
    }

    /// Three-way comparison; `Incompatible` when logical identities differ
    pub fn compare(&self, other: &ModuleIdentifier) -> VersionOrder {
        if !self.same_logical_identity(other) {
            return VersionOrder::Incompatible;
        }
        match self.version.cmp(&other.version) {
            std::cmp::Ordering::Less => VersionOrder::Less,
            std::cmp::Ordering::Equal => VersionOrder::Equal,
            std::cmp::Ordering::Greater => VersionOrder::Greater,
        }
    }
}

impl fmt::Display for ModuleIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.group, self.name, self.version)
    }
}
