//! Serde models for the on-disk/on-wire repository index.
//!
//! Both the `json` repository (which fetches an index document) and the
//! `memory` repository factory (which reads the same shape inline from
//! configuration) deserialize into these types.

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use url::Url;

use trawl_core::{Artifact, ModuleIdentifier, ModuleSpec, TrawlError, TrawlResult, Version};

/// One artifact entry of an index module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexArtifact {
    /// Path relative to the install root
    pub file: String,
    /// Source URL the content is fetched from
    pub url: String,
    #[serde(default)]
    pub volatile: bool,
    /// Lowercase hex digest of the content under the engine's algorithm,
    /// when the repository publishes one
    #[serde(default)]
    pub digest: Option<String>,
}

/// One module entry of a repository index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexModule {
    pub group: String,
    pub name: String,
    pub version: Version,
    #[serde(default)]
    pub dependencies: Vec<ModuleSpec>,
    #[serde(default)]
    pub artifacts: Vec<IndexArtifact>,
}

/// A whole repository index document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryIndex {
    pub modules: Vec<IndexModule>,
}

impl IndexModule {
    /// The identifier this entry resolves to within `repository`
    pub fn identifier(&self, repository: &str) -> ModuleIdentifier {
        ModuleIdentifier::new(repository, &self.group, &self.name, self.version.clone())
    }

    /// Materialize artifact records under `root`
    pub fn artifacts_under(&self, root: &Utf8Path) -> TrawlResult<Vec<Artifact>> {
        self.artifacts
            .iter()
            .map(|entry| {
                let url = Url::parse(&entry.url).map_err(|e| TrawlError::ConfigValidation {
                    field: "artifacts.url".to_string(),
                    reason: format!("'{}': {}", entry.url, e),
                })?;
                let mut artifact = Artifact::new(root.join(&entry.file), url, entry.volatile);
                artifact.source_digest = entry.digest.clone();
                Ok(artifact)
            })
            .collect()
    }
}

impl RepositoryIndex {
    /// The highest-versioned entry matching `spec`, if any
    pub fn best_match(&self, spec: &ModuleSpec, repository: &str) -> Option<&IndexModule> {
        self.modules
            .iter()
            .filter(|module| spec.matches(&module.identifier(repository)))
            .max_by(|a, b| a.version.cmp(&b.version))
    }

    /// The entry carrying exactly this identifier, if any
    pub fn find(&self, identifier: &ModuleIdentifier) -> Option<&IndexModule> {
        self.modules.iter().find(|module| {
            module.group == identifier.group
                && module.name == identifier.name
                && module.version == identifier.version
        })
    }
}
