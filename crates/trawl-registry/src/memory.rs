//! In-memory repository.
//!
//! Backs the `memory` plugin type and serves as the fixture repository for
//! engine and installer tests. Modules are registered through a builder-ish
//! API or loaded from an inline `RepositoryIndex`.

use async_trait::async_trait;
use camino::Utf8Path;
use dashmap::DashMap;
use url::Url;

use trawl_core::{
    Artifact, ModuleIdentifier, ModuleSpec, Repository, ResolvedModule, TrawlError, TrawlResult,
};

use crate::index::{IndexArtifact, IndexModule, RepositoryIndex};

/// A repository whose contents live in process memory
#[derive(Debug)]
pub struct MemoryRepository {
    id: String,
    /// Entries keyed by identifier; values carry dependency specs + artifacts
    modules: DashMap<ModuleIdentifier, IndexModule>,
    /// Number of get_module calls, for tests asserting query behavior
    queries: std::sync::atomic::AtomicU64,
}

impl MemoryRepository {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            modules: DashMap::new(),
            queries: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Load every module of an index document
    pub fn from_index(id: &str, index: RepositoryIndex) -> Self {
        let repository = Self::new(id);
        for module in index.modules {
            repository.insert(module);
        }
        repository
    }

    pub fn insert(&self, module: IndexModule) {
        self.modules.insert(module.identifier(&self.id), module);
    }

    /// Register a module by coordinates, with dependency specs in textual
    /// form and no artifacts.
    pub fn add_module(&self, group: &str, name: &str, version: &str, dependencies: &[&str]) {
        self.insert(IndexModule {
            group: group.to_string(),
            name: name.to_string(),
            version: version.parse().expect("valid version literal"),
            dependencies: dependencies
                .iter()
                .map(|text| text.parse().expect("valid spec literal"))
                .collect(),
            artifacts: Vec::new(),
        });
    }

    /// Attach an artifact entry to an already registered module
    pub fn add_artifact(&self, group: &str, name: &str, version: &str, file: &str, url: &Url) {
        self.add_artifact_entry(group, name, version, file, url, false, None);
    }

    /// Attach a volatile artifact entry to an already registered module
    pub fn add_volatile_artifact(
        &self,
        group: &str,
        name: &str,
        version: &str,
        file: &str,
        url: &Url,
    ) {
        self.add_artifact_entry(group, name, version, file, url, true, None);
    }

    /// Attach an artifact entry that also publishes its content digest
    pub fn add_artifact_with_digest(
        &self,
        group: &str,
        name: &str,
        version: &str,
        file: &str,
        url: &Url,
        digest: &str,
    ) {
        self.add_artifact_entry(group, name, version, file, url, false, Some(digest.to_string()));
    }

    #[allow(clippy::too_many_arguments)]
    fn add_artifact_entry(
        &self,
        group: &str,
        name: &str,
        version: &str,
        file: &str,
        url: &Url,
        volatile: bool,
        digest: Option<String>,
    ) {
        let identifier = ModuleIdentifier::new(
            &self.id,
            group,
            name,
            version.parse().expect("valid version literal"),
        );
        let mut entry = self
            .modules
            .get_mut(&identifier)
            .expect("artifact added to unregistered module");
        entry.artifacts.push(IndexArtifact {
            file: file.to_string(),
            url: url.to_string(),
            volatile,
            digest,
        });
    }

    /// How many times get_module has been called
    pub fn query_count(&self) -> u64 {
        self.queries.load(std::sync::atomic::Ordering::Relaxed)
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get_module(&self, spec: &ModuleSpec) -> TrawlResult<Option<ResolvedModule>> {
        self.queries
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let best = self
            .modules
            .iter()
            .filter(|entry| spec.matches(entry.key()))
            .max_by(|a, b| a.key().version.cmp(&b.key().version))
            .map(|entry| ResolvedModule {
                identifier: entry.key().clone(),
                dependencies: entry.value().dependencies.clone(),
            });
        Ok(best)
    }

    async fn get_artifacts(
        &self,
        module: &ModuleIdentifier,
        root: &Utf8Path,
    ) -> TrawlResult<Vec<Artifact>> {
        let entry = self
            .modules
            .get(module)
            .ok_or_else(|| TrawlError::MalformedModule {
                repository: self.id.clone(),
                spec: module.to_string(),
                reason: "module is not registered in this repository".to_string(),
            })?;
        entry.value().artifacts_under(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_module_picks_highest_matching() {
        let repository = MemoryRepository::new("r1");
        repository.add_module("g", "a", "1.0", &[]);
        repository.add_module("g", "a", "2.0", &["g:b"]);
        repository.add_module("g", "b", "1.0", &[]);

        let spec: ModuleSpec = "g:a".parse().unwrap();
        let resolved = repository.get_module(&spec).await.unwrap().unwrap();
        assert_eq!(resolved.identifier.version, "2.0".parse().unwrap());
        assert_eq!(resolved.dependencies.len(), 1);

        let pinned: ModuleSpec = "g:a@1.0".parse().unwrap();
        let resolved = repository.get_module(&pinned).await.unwrap().unwrap();
        assert_eq!(resolved.identifier.version, "1.0".parse().unwrap());

        let missing: ModuleSpec = "g:missing".parse().unwrap();
        assert!(repository.get_module(&missing).await.unwrap().is_none());
        assert_eq!(repository.query_count(), 3);
    }

    #[tokio::test]
    async fn test_get_artifacts_lays_files_under_root() {
        let repository = MemoryRepository::new("r1");
        repository.add_module("g", "a", "1.0", &[]);
        let url = Url::parse("file:///src/a.jar").unwrap();
        repository.add_artifact("g", "a", "1.0", "lib/a.jar", &url);

        let identifier = ModuleIdentifier::new("r1", "g", "a", "1.0".parse().unwrap());
        let artifacts = repository
            .get_artifacts(&identifier, Utf8Path::new("/install"))
            .await
            .unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].file, "/install/lib/a.jar");
        assert!(!artifacts[0].volatile);
    }
}
