//! # trawl-engine
//!
//! The full Trawl pipeline: identification of module specifications against
//! a set of repositories, conflict resolution over the identified graph,
//! and artifact installation for the chosen modules.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use trawl_core::{DigestAlgorithm, TracingNotifier};
//! # use trawl_engine::Engine;
//! # async fn example(repository: Arc<dyn trawl_core::Repository>) -> trawl_core::TrawlResult<()> {
//! let mut engine = Engine::new(DigestAlgorithm::Sha1);
//! engine.set_root("/opt/app/libraries".into());
//! engine.add_repository(repository);
//! engine.add_module_spec("org.example:app".parse().unwrap(), true);
//! let report = engine.run(Arc::new(TracingNotifier)).await?;
//! assert!(report.unresolved.is_empty());
//! # Ok(())
//! # }
//! ```

pub mod conflict;
pub mod identify;

pub use conflict::{ConflictPolicy, ResolvedConflict};
pub use identify::{IdentifyConfig, UnresolvedModule};

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use camino::Utf8PathBuf;

use trawl_core::{
    Artifact, DigestAlgorithm, ModuleGraph, ModuleIdentifier, ModuleSpec, Notifier, Repository,
    TrawlError, TrawlResult,
};
use trawl_install::{InstallReport, Installer, InstallerConfig, TransferConfig};

use identify::IdentificationEngine;

/// Everything a finished run produced
#[derive(Debug)]
pub struct RunReport {
    /// Identifiers resolved during identification, before conflicts
    pub identified: Vec<ModuleIdentifier>,
    /// The conflict-free set that was installed
    pub chosen: Vec<ModuleIdentifier>,
    pub unresolved: Vec<UnresolvedModule>,
    pub conflicts: Vec<ResolvedConflict>,
    pub install: InstallReport,
    /// The final graph, for hosts that want to inspect structure
    pub graph: ModuleGraph,
}

/// The blocking-entry engine facade.
///
/// Configure with the builder-style methods, then call [`Engine::run`].
/// The digest algorithm is fixed at construction.
#[derive(Debug)]
pub struct Engine {
    algorithm: DigestAlgorithm,
    repositories: Vec<Arc<dyn Repository>>,
    specs: Vec<(ModuleSpec, bool)>,
    exclusions: HashSet<ModuleSpec>,
    policy: ConflictPolicy,
    root: Utf8PathBuf,
    state_file: Option<Utf8PathBuf>,
    identify: IdentifyConfig,
    install_workers: usize,
    overwrite: bool,
    transfer: TransferConfig,
    cancel: Arc<AtomicBool>,
}

impl Engine {
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            algorithm,
            repositories: Vec::new(),
            specs: Vec::new(),
            exclusions: HashSet::new(),
            policy: ConflictPolicy::default(),
            root: Utf8PathBuf::from("."),
            state_file: None,
            identify: IdentifyConfig::default(),
            install_workers: workers,
            overwrite: false,
            transfer: TransferConfig::default(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request modules matching `spec`; explicit modules are graph roots
    pub fn add_module_spec(&mut self, spec: ModuleSpec, explicit: bool) {
        self.specs.push((spec, explicit));
    }

    /// Repositories are consulted in the order they were added
    pub fn add_repository(&mut self, repository: Arc<dyn Repository>) {
        self.repositories.push(repository);
    }

    /// Modules whose specification equals an exclusion are dropped from the
    /// graph together with dependencies nothing else needs
    pub fn add_exclusion(&mut self, spec: ModuleSpec) {
        self.exclusions.insert(spec);
    }

    pub fn set_conflict_policy(&mut self, policy: ConflictPolicy) {
        self.policy = policy;
    }

    pub fn set_root(&mut self, root: Utf8PathBuf) {
        self.root = root;
    }

    pub fn set_state_file(&mut self, path: Utf8PathBuf) {
        self.state_file = Some(path);
    }

    pub fn set_workers(&mut self, workers: usize) {
        self.identify.workers = workers.max(1);
        self.install_workers = workers.max(1);
    }

    pub fn set_overwrite(&mut self, overwrite: bool) {
        self.overwrite = overwrite;
    }

    pub fn set_transfer_config(&mut self, transfer: TransferConfig) {
        self.transfer = transfer;
    }

    /// Handle for cancelling a running pipeline from another task
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// The full pipeline: identify, resolve conflicts, install. Blocks the
    /// caller until everything finished or the run was cancelled.
    pub async fn run(&self, notifier: Arc<dyn Notifier>) -> TrawlResult<RunReport> {
        let mut graph = ModuleGraph::new();
        for (spec, explicit) in &self.specs {
            graph.add_module(spec.clone(), *explicit, None);
        }

        // Identification
        let identifier = IdentificationEngine::new(self.identify.clone());
        let unresolved = identifier
            .run(
                &mut graph,
                &self.repositories,
                &self.exclusions,
                Arc::clone(&notifier),
                &self.cancel,
            )
            .await?;
        let identified: Vec<ModuleIdentifier> = graph
            .identified_modules()
            .filter_map(|(_, node)| node.identifier.clone())
            .collect();
        tracing::info!(
            identified = identified.len(),
            unresolved = unresolved.len(),
            "identification finished"
        );

        // Conflict resolution
        if self.cancel.load(Ordering::Relaxed) {
            return Err(TrawlError::Cancelled);
        }
        let conflicts = conflict::resolve_conflicts(&mut graph, self.policy, notifier.as_ref());
        let chosen: Vec<ModuleIdentifier> = graph
            .identified_modules()
            .filter_map(|(_, node)| node.identifier.clone())
            .collect();

        // Installation
        if self.cancel.load(Ordering::Relaxed) {
            return Err(TrawlError::Cancelled);
        }
        let modules = self.collect_artifacts(&graph).await?;
        let mut config = InstallerConfig::new(self.root.clone());
        if let Some(state_file) = &self.state_file {
            config.state_file = state_file.clone();
        }
        config.workers = self.install_workers;
        config.overwrite = self.overwrite;
        config.algorithm = self.algorithm;
        config.transfer = self.transfer.clone();
        let installer = Installer::new(config)?;
        let install = installer
            .install(&modules, notifier, Arc::clone(&self.cancel))
            .await?;

        Ok(RunReport {
            identified,
            chosen,
            unresolved,
            conflicts,
            install,
            graph,
        })
    }

    /// Ask each chosen module's repository for its artifacts, preserving
    /// discovery order so downstream output is reproducible
    async fn collect_artifacts(
        &self,
        graph: &ModuleGraph,
    ) -> TrawlResult<Vec<(ModuleIdentifier, Vec<Artifact>)>> {
        let mut modules = Vec::new();
        for (_, node) in graph.identified_modules() {
            let Some(identifier) = node.identifier.clone() else {
                continue;
            };
            let repository = self
                .repositories
                .iter()
                .find(|repository| repository.id() == identifier.repository)
                .ok_or_else(|| TrawlError::ConfigValidation {
                    field: "repositories".to_string(),
                    reason: format!(
                        "module {} names unknown repository '{}'",
                        identifier, identifier.repository
                    ),
                })?;
            let artifacts = repository.get_artifacts(&identifier, &self.root).await?;
            modules.push((identifier, artifacts));
        }
        Ok(modules)
    }
}
