//! The repository query surface consumed by the identification engine.

use async_trait::async_trait;
use camino::Utf8Path;

use crate::artifact::Artifact;
use crate::error::TrawlResult;
use crate::id::ModuleIdentifier;
use crate::spec::ModuleSpec;

/// A repository's answer to a specification: the concrete identifier plus
/// the specifications of the module's own dependencies, ready for the
/// engine to graft into the graph.
#[derive(Debug, Clone)]
pub struct ResolvedModule {
    pub identifier: ModuleIdentifier,
    pub dependencies: Vec<ModuleSpec>,
}

/// An external source of modules and their artifacts.
///
/// Implementations may be queried from many workers concurrently and should
/// be deterministic within a single run.
#[async_trait]
pub trait Repository: Send + Sync + std::fmt::Debug {
    /// Stable identifier used in notifications and module identifiers
    fn id(&self) -> &str;

    /// Look up the best module satisfying `spec`, or `None` when this
    /// repository has no match. Transport failures surface as errors and
    /// are treated by the engine as a miss for this repository.
    async fn get_module(&self, spec: &ModuleSpec) -> TrawlResult<Option<ResolvedModule>>;

    /// The artifacts of an identified module, with file paths laid out
    /// under `root`.
    async fn get_artifacts(
        &self,
        module: &ModuleIdentifier,
        root: &Utf8Path,
    ) -> TrawlResult<Vec<Artifact>>;
}
