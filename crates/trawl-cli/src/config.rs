//! The `trawl.json` run configuration.
//!
//! ```json
//! {
//!     "repositories": [
//!         {"type": "json", "id": "central", "url": "https://repo.example.org/index.json"}
//!     ],
//!     "modules": ["org.example:app", "org.example:extras@2.*"],
//!     "exclusions": ["org.example:legacy"],
//!     "policy": "newest",
//!     "root": "libraries",
//!     "digest": "sha1"
//! }
//! ```

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

use trawl_core::{DigestAlgorithm, ModuleSpec, TrawlError, TrawlResult};
use trawl_engine::{ConflictPolicy, Engine};
use trawl_registry::RepositoryRegistry;

/// Deserialized shape of trawl.json
#[derive(Debug, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub repositories: Vec<serde_json::Value>,
    #[serde(default)]
    pub modules: Vec<ModuleSpec>,
    #[serde(default)]
    pub exclusions: Vec<ModuleSpec>,
    pub policy: Option<String>,
    pub root: Option<String>,
    pub state: Option<String>,
    pub digest: Option<String>,
    pub workers: Option<usize>,
}

impl RunConfig {
    pub fn load(path: &Utf8Path) -> TrawlResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| TrawlError::io(format!("Failed to read {}", path), e))?;
        serde_json::from_str(&text).map_err(|e| TrawlError::ConfigValidation {
            field: path.to_string(),
            reason: e.to_string(),
        })
    }

    /// Build a fully configured engine. `root_override` and `overwrite`
    /// come from the command line and win over the file.
    pub fn into_engine(
        self,
        registry: &RepositoryRegistry,
        root_override: Option<Utf8PathBuf>,
        overwrite: bool,
        workers_override: Option<usize>,
    ) -> TrawlResult<Engine> {
        let algorithm: DigestAlgorithm = match &self.digest {
            Some(name) => name.parse()?,
            None => DigestAlgorithm::default(),
        };
        let mut engine = Engine::new(algorithm);

        if self.modules.is_empty() {
            return Err(TrawlError::ConfigValidation {
                field: "modules".to_string(),
                reason: "at least one module specification is required".to_string(),
            });
        }
        for repository_config in &self.repositories {
            engine.add_repository(registry.create(repository_config)?);
        }
        for spec in self.modules {
            engine.add_module_spec(spec, true);
        }
        for spec in self.exclusions {
            engine.add_exclusion(spec);
        }
        if let Some(policy) = &self.policy {
            engine.set_conflict_policy(policy.parse::<ConflictPolicy>()?);
        }

        let root = root_override
            .or_else(|| self.root.as_deref().map(Utf8PathBuf::from))
            .unwrap_or_else(|| Utf8PathBuf::from("."));
        engine.set_root(root);
        if let Some(state) = self.state {
            engine.set_state_file(Utf8PathBuf::from(state));
        }
        if let Some(workers) = workers_override.or(self.workers) {
            engine.set_workers(workers);
        }
        engine.set_overwrite(overwrite);
        Ok(engine)
    }
}
