//! Module specifications: declarative queries for one or more modules.
//!
//! A specification names a logical module and constrains its version with a
//! pattern. Textual form is `group:name`, `group:name@1.2`, `group:name@1.*`
//! or `group:name@>=1.2`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::id::ModuleIdentifier;
use crate::version::Version;

/// Version constraint within a specification
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionPattern {
    /// Any version matches
    Any,
    /// Exactly this version
    Exact(Version),
    /// This version or newer
    AtLeast(Version),
    /// Versions whose textual form starts with this prefix (`1.*` -> `1.`)
    Prefix(String),
}

impl VersionPattern {
    pub fn matches(&self, version: &Version) -> bool {
        match self {
            VersionPattern::Any => true,
            VersionPattern::Exact(wanted) => version == wanted,
            VersionPattern::AtLeast(floor) => version >= floor,
            VersionPattern::Prefix(prefix) => version.as_str().starts_with(prefix.as_str()),
        }
    }
}

impl fmt::Display for VersionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionPattern::Any => f.write_str("*"),
            VersionPattern::Exact(version) => write!(f, "{}", version),
            VersionPattern::AtLeast(version) => write!(f, ">={}", version),
            VersionPattern::Prefix(prefix) => write!(f, "{}*", prefix),
        }
    }
}

/// A declarative query for a module
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleSpec {
    pub group: String,
    pub name: String,
    pub version: VersionPattern,
}

/// Specification parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecError {
    #[error("Invalid module specification: '{input}'")]
    InvalidFormat { input: String },
}

impl ModuleSpec {
    pub fn new(group: &str, name: &str, version: VersionPattern) -> Self {
        Self {
            group: group.to_string(),
            name: name.to_string(),
            version,
        }
    }

    /// Whether this specification allows the given identifier
    pub fn matches(&self, identifier: &ModuleIdentifier) -> bool {
        self.group == identifier.group
            && self.name == identifier.name
            && self.version.matches(&identifier.version)
    }

    /// Propagate a post-resolution identity change: a specification that
    /// matched `old` is pinned to `new`'s exact identity.
    pub fn rewrite(&mut self, old: &ModuleIdentifier, new: &ModuleIdentifier) {
        if self.matches(old) {
            self.group = new.group.clone();
            self.name = new.name.clone();
            self.version = VersionPattern::Exact(new.version.clone());
        }
    }
}

impl FromStr for ModuleSpec {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SpecError::InvalidFormat {
            input: s.to_string(),
        };
        let (coordinates, pattern_text) = match s.split_once('@') {
            Some((left, right)) => (left, Some(right)),
            None => (s, None),
        };
        let (group, name) = coordinates.split_once(':').ok_or_else(invalid)?;
        if group.is_empty() || name.is_empty() {
            return Err(invalid());
        }
        let version = match pattern_text {
            None | Some("*") => VersionPattern::Any,
            Some(text) if text.starts_with(">=") => {
                let floor = text[2..].parse().map_err(|_| invalid())?;
                VersionPattern::AtLeast(floor)
            }
            Some(text) if text.ends_with('*') => {
                let prefix = &text[..text.len() - 1];
                if prefix.is_empty() {
                    VersionPattern::Any
                } else {
                    VersionPattern::Prefix(prefix.to_string())
                }
            }
            Some(text) => VersionPattern::Exact(text.parse().map_err(|_| invalid())?),
        };
        Ok(Self::new(group, name, version))
    }
}

impl TryFrom<String> for ModuleSpec {
    type Error = SpecError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ModuleSpec> for String {
    fn from(spec: ModuleSpec) -> Self {
        spec.to_string()
    }
}

impl fmt::Display for ModuleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            VersionPattern::Any => write!(f, "{}:{}", self.group, self.name),
            pattern => write!(f, "{}:{}@{}", self.group, self.name, pattern),
        }
    }
}
