//! The identification engine.
//!
//! Drives the module graph from explicit specifications to a fully
//! identified state in rounds. Each round snapshots the unidentified
//! modules, queries repositories for all of them in parallel, joins at a
//! barrier, and integrates the results serially so graph invariants never
//! need locks on the hot path.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use trawl_core::{
    ModuleGraph, ModuleId, ModuleIdentifier, ModuleSpec, Notifier, Repository, ResolvedModule,
    TrawlError, TrawlResult,
};

/// A module no repository could identify
#[derive(Debug, Clone)]
pub struct UnresolvedModule {
    pub spec: ModuleSpec,
    /// Present when a repository answered but the answer was unusable
    pub cause: Option<String>,
}

/// Identification settings
#[derive(Debug, Clone)]
pub struct IdentifyConfig {
    /// Concurrent repository query limit
    pub workers: usize,
    /// Time limit for a single repository query
    pub query_timeout: Duration,
}

impl Default for IdentifyConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            query_timeout: Duration::from_secs(60),
        }
    }
}

/// Iteratively identifies every module reachable from the graph roots
pub struct IdentificationEngine {
    config: IdentifyConfig,
    /// Modules resolved in this run, keyed by identifier. Written only
    /// during the serial integration phase.
    identified: DashMap<ModuleIdentifier, ModuleId>,
}

/// Outcome of querying all repositories for one module
enum QueryOutcome {
    /// The winning answer (first non-null in declared order) plus any
    /// disagreeing answers from later repositories, which become conflict
    /// candidates rather than being short-circuited away
    Found(ResolvedModule, Vec<ResolvedModule>),
    Miss,
    Unusable(String),
}

impl IdentificationEngine {
    pub fn new(config: IdentifyConfig) -> Self {
        Self {
            config,
            identified: DashMap::new(),
        }
    }

    /// Run rounds until nothing is left to identify. Modules nobody could
    /// identify are returned; they stay in the graph, unidentified.
    pub async fn run(
        &self,
        graph: &mut ModuleGraph,
        repositories: &[Arc<dyn Repository>],
        exclusions: &HashSet<ModuleSpec>,
        notifier: Arc<dyn Notifier>,
        cancel: &AtomicBool,
    ) -> TrawlResult<Vec<UnresolvedModule>> {
        let mut unresolved = Vec::new();
        // Pending modules by spec, so the same specification is only ever
        // queried once per run
        let mut pending_by_spec: HashMap<ModuleSpec, ModuleId> = HashMap::new();
        let mut queue: VecDeque<ModuleId> = VecDeque::new();

        for (id, node) in graph.unidentified_modules() {
            queue.push_back(id);
            pending_by_spec.insert(node.spec.clone(), id);
        }

        let mut round = 0u32;
        loop {
            if cancel.load(Ordering::Relaxed) {
                return Err(TrawlError::Cancelled);
            }

            // Snapshot phase: take everything currently waiting
            let mut batch = Vec::new();
            while let Some(id) = queue.pop_front() {
                if !graph.is_live(id) || graph.node(id).identifier.is_some() {
                    continue;
                }
                let spec = graph.node(id).spec.clone();
                if exclusions.contains(&spec) {
                    notifier.info(&format!("Excluded {}", spec));
                    graph.remove_module(id);
                    continue;
                }
                batch.push((id, spec));
            }
            if batch.is_empty() {
                break;
            }
            round += 1;
            tracing::debug!(round, modules = batch.len(), "identification round");

            // Parallel phase: query repositories, first answer in declared
            // order wins
            let semaphore = Arc::new(Semaphore::new(self.config.workers.max(1)));
            let mut tasks: JoinSet<(ModuleId, QueryOutcome)> = JoinSet::new();
            for (id, spec) in &batch {
                let id = *id;
                let spec = spec.clone();
                let repositories: Vec<Arc<dyn Repository>> = repositories.to_vec();
                let semaphore = Arc::clone(&semaphore);
                let notifier = Arc::clone(&notifier);
                let timeout = self.config.query_timeout;
                tasks.spawn(async move {
                    let _permit = semaphore.acquire().await;
                    (id, query(&repositories, &spec, timeout, notifier).await)
                });
            }

            // Barrier: collect every result before touching the graph
            let mut outcomes: HashMap<ModuleId, QueryOutcome> = HashMap::new();
            while let Some(joined) = tasks.join_next().await {
                let (id, outcome) = joined.map_err(|e| TrawlError::Network {
                    message: format!("Identification worker panicked: {}", e),
                    source: None,
                })?;
                outcomes.insert(id, outcome);
            }
            if cancel.load(Ordering::Relaxed) {
                // Discard the round's results wholesale
                return Err(TrawlError::Cancelled);
            }

            // Serial integration phase, in snapshot order for determinism
            for (id, spec) in batch {
                pending_by_spec.remove(&spec);
                match outcomes.remove(&id) {
                    Some(QueryOutcome::Found(resolved, alternates)) => {
                        self.integrate(
                            graph,
                            id,
                            resolved,
                            alternates,
                            exclusions,
                            &mut queue,
                            &mut pending_by_spec,
                            notifier.as_ref(),
                        );
                    }
                    Some(QueryOutcome::Unusable(cause)) => {
                        notifier.warn(&format!("Could not identify {}: {}", spec, cause));
                        unresolved.push(UnresolvedModule {
                            spec,
                            cause: Some(cause),
                        });
                    }
                    Some(QueryOutcome::Miss) | None => {
                        unresolved.push(UnresolvedModule { spec, cause: None });
                    }
                }
            }
        }

        Ok(unresolved)
    }

    /// Install a repository answer into the graph
    #[allow(clippy::too_many_arguments)]
    fn integrate(
        &self,
        graph: &mut ModuleGraph,
        id: ModuleId,
        resolved: ResolvedModule,
        alternates: Vec<ResolvedModule>,
        exclusions: &HashSet<ModuleSpec>,
        queue: &mut VecDeque<ModuleId>,
        pending_by_spec: &mut HashMap<ModuleSpec, ModuleId>,
        notifier: &dyn Notifier,
    ) {
        // A repository may hand back a module we already know; fold this
        // node into the existing one instead of duplicating it
        if let Some(existing) = self.identified.get(&resolved.identifier) {
            let existing = *existing;
            if existing != id {
                graph.redirect_module(id, existing);
            }
            return;
        }

        notifier.info(&format!("Identified {}", resolved.identifier));
        graph.node_mut(id).identifier = Some(resolved.identifier.clone());
        self.identified.insert(resolved.identifier, id);
        self.enqueue_dependencies(graph, id, resolved.dependencies, exclusions, queue, pending_by_spec, notifier);

        // A later repository that disagrees contributes a rival node; the
        // conflict resolver decides between them
        let explicit = graph.node(id).explicit;
        let spec = graph.node(id).spec.clone();
        for alternate in alternates {
            if self.identified.contains_key(&alternate.identifier) {
                continue;
            }
            notifier.info(&format!(
                "Identified rival {} for {}",
                alternate.identifier, spec
            ));
            let rival = graph.add_module(spec.clone(), explicit, Some(alternate.identifier.clone()));
            self.identified.insert(alternate.identifier, rival);
            self.enqueue_dependencies(
                graph,
                rival,
                alternate.dependencies,
                exclusions,
                queue,
                pending_by_spec,
                notifier,
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn enqueue_dependencies(
        &self,
        graph: &mut ModuleGraph,
        parent: ModuleId,
        dependencies: Vec<ModuleSpec>,
        exclusions: &HashSet<ModuleSpec>,
        queue: &mut VecDeque<ModuleId>,
        pending_by_spec: &mut HashMap<ModuleSpec, ModuleId>,
        notifier: &dyn Notifier,
    ) {
        for dependency_spec in dependencies {
            if exclusions.contains(&dependency_spec) {
                notifier.info(&format!("Excluded {}", dependency_spec));
                continue;
            }
            // Reuse a pending node with the same specification rather than
            // querying it twice
            let child = match pending_by_spec.get(&dependency_spec) {
                Some(&pending) if graph.is_live(pending) => pending,
                _ => {
                    let child = graph.add_module(dependency_spec.clone(), false, None);
                    pending_by_spec.insert(dependency_spec, child);
                    queue.push_back(child);
                    child
                }
            };
            graph.add_dependency(parent, child);
            graph.add_supplicant(child, parent);
        }
    }
}

/// Consult every repository in declared order. The first non-null answer
/// identifies the module; later answers naming a different version of the
/// same logical module are kept as conflict candidates instead of being
/// short-circuited away. Transport errors demote the repository to a miss;
/// an unusable answer is fatal for the module.
async fn query(
    repositories: &[Arc<dyn Repository>],
    spec: &ModuleSpec,
    timeout: Duration,
    notifier: Arc<dyn Notifier>,
) -> QueryOutcome {
    use trawl_core::VersionOrder;

    let mut primary: Option<ResolvedModule> = None;
    let mut alternates: Vec<ResolvedModule> = Vec::new();
    for repository in repositories {
        match tokio::time::timeout(timeout, repository.get_module(spec)).await {
            Ok(Ok(Some(resolved))) => match &primary {
                None => primary = Some(resolved),
                Some(first) => {
                    let disagrees = matches!(
                        first.identifier.compare(&resolved.identifier),
                        VersionOrder::Less | VersionOrder::Greater
                    );
                    let seen = alternates
                        .iter()
                        .any(|alternate| alternate.identifier == resolved.identifier);
                    if disagrees && !seen {
                        alternates.push(resolved);
                    }
                }
            },
            Ok(Ok(None)) => {}
            Ok(Err(TrawlError::MalformedModule {
                repository: from,
                reason,
                ..
            })) => {
                return QueryOutcome::Unusable(format!("{} (from {})", reason, from));
            }
            Ok(Err(error)) => {
                notifier.warn(&format!(
                    "Repository {} failed for {}: {}",
                    repository.id(),
                    spec,
                    error
                ));
            }
            Err(_) => {
                notifier.warn(&format!(
                    "Repository {} timed out for {}",
                    repository.id(),
                    spec
                ));
            }
        }
    }
    match primary {
        Some(primary) => QueryOutcome::Found(primary, alternates),
        None => QueryOutcome::Miss,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8Path;
    use trawl_core::{Artifact, NullNotifier};

    /// A repository that always fails with a transport error, to exercise
    /// the warn-and-miss path without network code in unit tests.
    #[derive(Debug)]
    struct FailingRepository;

    #[async_trait::async_trait]
    impl Repository for FailingRepository {
        fn id(&self) -> &str {
            "failing"
        }

        async fn get_module(&self, _spec: &ModuleSpec) -> TrawlResult<Option<ResolvedModule>> {
            Err(TrawlError::Network {
                message: "connection refused".to_string(),
                source: None,
            })
        }

        async fn get_artifacts(
            &self,
            _module: &ModuleIdentifier,
            _root: &Utf8Path,
        ) -> TrawlResult<Vec<Artifact>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_transport_failure_leaves_module_unresolved() {
        let mut graph = ModuleGraph::new();
        let spec: ModuleSpec = "g:a".parse().unwrap();
        graph.add_module(spec.clone(), true, None);

        let engine = IdentificationEngine::new(IdentifyConfig::default());
        let unresolved = engine
            .run(
                &mut graph,
                &[Arc::new(FailingRepository) as Arc<dyn Repository>],
                &HashSet::new(),
                Arc::new(NullNotifier),
                &AtomicBool::new(false),
            )
            .await
            .unwrap();

        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].spec, spec);
        assert!(unresolved[0].cause.is_none());
        // The module stays in the graph, unidentified
        assert_eq!(graph.unidentified_modules().count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_before_first_round() {
        let mut graph = ModuleGraph::new();
        graph.add_module("g:a".parse().unwrap(), true, None);

        let engine = IdentificationEngine::new(IdentifyConfig::default());
        let error = engine
            .run(
                &mut graph,
                &[Arc::new(FailingRepository) as Arc<dyn Repository>],
                &HashSet::new(),
                Arc::new(NullNotifier),
                &AtomicBool::new(true),
            )
            .await
            .unwrap_err();
        assert!(matches!(error, TrawlError::Cancelled));
    }
}
