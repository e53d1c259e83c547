//! End-to-end pipeline tests over in-memory repositories and a temp root.

use std::sync::Arc;

use camino::Utf8PathBuf;
use url::Url;

use trawl_core::{DigestAlgorithm, ModuleSpec, NullNotifier, Repository};
use trawl_engine::{ConflictPolicy, Engine, RunReport};
use trawl_registry::MemoryRepository;

struct Fixture {
    _dir: tempfile::TempDir,
    root: Utf8PathBuf,
    sources: Utf8PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let base = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let sources = base.join("sources");
        std::fs::create_dir_all(&sources).unwrap();
        Self {
            _dir: dir,
            root: base.join("install"),
            sources,
        }
    }

    /// Create a source file and return its file:// URL
    fn seed(&self, name: &str, content: &[u8]) -> Url {
        let path = self.sources.join(name);
        std::fs::write(&path, content).unwrap();
        Url::from_file_path(path.as_std_path()).unwrap()
    }

    fn engine(&self, repositories: &[Arc<MemoryRepository>]) -> Engine {
        let mut engine = Engine::new(DigestAlgorithm::Sha1);
        engine.set_root(self.root.clone());
        for repository in repositories {
            engine.add_repository(Arc::clone(repository) as Arc<dyn Repository>);
        }
        engine
    }
}

fn spec(text: &str) -> ModuleSpec {
    text.parse().unwrap()
}

async fn run(engine: &Engine) -> RunReport {
    engine.run(Arc::new(NullNotifier)).await.unwrap()
}

fn chosen_names(report: &RunReport) -> Vec<String> {
    let mut names: Vec<String> = report
        .chosen
        .iter()
        .map(|identifier| identifier.to_string())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn linear_chain_installs_everything() {
    let fixture = Fixture::new();
    let repository = Arc::new(MemoryRepository::new("r1"));
    repository.add_module("g", "a", "1.0", &["g:b"]);
    repository.add_module("g", "b", "1.0", &["g:c"]);
    repository.add_module("g", "c", "1.0", &[]);
    for name in ["a", "b", "c"] {
        let url = fixture.seed(&format!("{}.jar", name), name.as_bytes());
        repository.add_artifact("g", name, "1.0", &format!("lib/{}.jar", name), &url);
    }

    let mut engine = fixture.engine(&[repository]);
    engine.add_module_spec(spec("g:a"), true);
    let report = run(&engine).await;

    assert_eq!(
        chosen_names(&report),
        vec!["g:a@1.0", "g:b@1.0", "g:c@1.0"]
    );
    assert!(report.unresolved.is_empty());
    assert!(report.conflicts.is_empty());
    assert_eq!(report.install.installed.len(), 3);
    for name in ["a", "b", "c"] {
        assert!(fixture.root.join(format!("lib/{}.jar", name)).exists());
    }
    report.graph.check_integrity().unwrap();

    // The persisted state has one record per artifact
    let state = std::fs::read_to_string(fixture.root.join(".trawl-state")).unwrap();
    assert_eq!(state.matches("file=").count(), 3);
}

#[tokio::test]
async fn cross_repo_override_resolves_to_newest() {
    let fixture = Fixture::new();
    let first = Arc::new(MemoryRepository::new("r1"));
    first.add_module("g", "a", "1.0", &[]);
    let old_url = fixture.seed("a-1.jar", b"old");
    first.add_artifact("g", "a", "1.0", "lib/a-1.jar", &old_url);

    let second = Arc::new(MemoryRepository::new("r2"));
    second.add_module("g", "a", "2.0", &[]);
    let new_url = fixture.seed("a-2.jar", b"new");
    second.add_artifact("g", "a", "2.0", "lib/a-2.jar", &new_url);

    let mut engine = fixture.engine(&[first, second]);
    engine.add_module_spec(spec("g:a"), true);
    engine.set_conflict_policy(ConflictPolicy::Newest);
    let report = run(&engine).await;

    // Both repositories answered; the disagreement became a conflict and
    // the newest version won
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].chosen.to_string(), "g:a@2.0");
    assert_eq!(report.conflicts[0].chosen.repository, "r2");
    assert_eq!(chosen_names(&report), vec!["g:a@2.0"]);
    assert_eq!(report.install.installed.len(), 1);
    assert!(fixture.root.join("lib/a-2.jar").exists());
    assert!(!fixture.root.join("lib/a-1.jar").exists());
}

#[tokio::test]
async fn diamond_collapses_to_one_node() {
    let fixture = Fixture::new();
    let repository = Arc::new(MemoryRepository::new("r1"));
    repository.add_module("g", "x", "1.0", &["g:l@1.0"]);
    repository.add_module("g", "y", "1.0", &["g:l@2.0"]);
    repository.add_module("g", "l", "1.0", &[]);
    repository.add_module("g", "l", "2.0", &[]);
    let l1_url = fixture.seed("l-1.jar", b"l one");
    repository.add_artifact("g", "l", "1.0", "lib/l-1.jar", &l1_url);
    let l2_url = fixture.seed("l-2.jar", b"l two");
    repository.add_artifact("g", "l", "2.0", "lib/l-2.jar", &l2_url);

    let mut engine = fixture.engine(&[repository]);
    engine.add_module_spec(spec("g:x"), true);
    engine.add_module_spec(spec("g:y"), true);
    engine.set_conflict_policy(ConflictPolicy::Newest);
    let report = run(&engine).await;

    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].chosen.to_string(), "g:l@2.0");
    assert_eq!(
        chosen_names(&report),
        vec!["g:l@2.0", "g:x@1.0", "g:y@1.0"]
    );
    assert!(!fixture.root.join("lib/l-1.jar").exists());
    assert!(fixture.root.join("lib/l-2.jar").exists());

    // Both parents point at the same surviving node
    let graph = &report.graph;
    let l_node = graph
        .identified_modules()
        .find(|(_, node)| node.identifier.as_ref().unwrap().name == "l")
        .map(|(id, _)| id)
        .unwrap();
    let mut parents = 0;
    for (_, node) in graph.identified_modules() {
        if node.dependencies().contains(&l_node) {
            parents += 1;
        }
    }
    assert_eq!(parents, 2);
    graph.check_integrity().unwrap();
}

#[tokio::test]
async fn cycle_terminates_with_back_edges() {
    let fixture = Fixture::new();
    let repository = Arc::new(MemoryRepository::new("r1"));
    repository.add_module("g", "a", "1.0", &["g:b"]);
    repository.add_module("g", "b", "1.0", &["g:a"]);
    let a_url = fixture.seed("a.jar", b"a");
    repository.add_artifact("g", "a", "1.0", "lib/a.jar", &a_url);
    let b_url = fixture.seed("b.jar", b"b");
    repository.add_artifact("g", "b", "1.0", "lib/b.jar", &b_url);

    let mut engine = fixture.engine(&[repository]);
    engine.add_module_spec(spec("g:a"), true);
    let report = run(&engine).await;

    assert_eq!(chosen_names(&report), vec!["g:a@1.0", "g:b@1.0"]);
    assert_eq!(report.install.installed.len(), 2);
    report.graph.check_integrity().unwrap();

    // The supplicant edges close the loop
    let graph = &report.graph;
    let find = |name: &str| {
        graph
            .identified_modules()
            .find(|(_, node)| node.identifier.as_ref().unwrap().name == name)
            .map(|(id, _)| id)
            .unwrap()
    };
    let a = find("a");
    let b = find("b");
    assert!(graph.node(a).dependencies().contains(&b));
    assert!(graph.node(b).dependencies().contains(&a));
    assert!(graph.node(a).supplicants().contains(&b));
    assert!(graph.node(b).supplicants().contains(&a));
}

#[tokio::test]
async fn exclusion_prunes_subtree_before_fetching() {
    let fixture = Fixture::new();
    let repository = Arc::new(MemoryRepository::new("r1"));
    repository.add_module("g", "a", "1.0", &["g:b"]);
    repository.add_module("g", "b", "1.0", &["g:c"]);
    repository.add_module("g", "c", "1.0", &[]);
    let a_url = fixture.seed("a.jar", b"a");
    repository.add_artifact("g", "a", "1.0", "lib/a.jar", &a_url);

    let mut engine = fixture.engine(&[Arc::clone(&repository)]);
    engine.add_module_spec(spec("g:a"), true);
    engine.add_exclusion(spec("g:b"));
    let report = run(&engine).await;

    assert_eq!(chosen_names(&report), vec!["g:a@1.0"]);
    // b was never queried, so c cannot have been discovered either:
    // one query for a is the only repository traffic
    assert_eq!(repository.query_count(), 1);
}

#[tokio::test]
async fn incremental_run_skips_and_preserves_volatile() {
    let fixture = Fixture::new();
    let repository = Arc::new(MemoryRepository::new("r1"));
    repository.add_module("g", "app", "1.0", &[]);
    let jar_url = fixture.seed("plain.jar", b"library bytes");
    repository.add_artifact("g", "app", "1.0", "lib/plain.jar", &jar_url);
    let config_url = fixture.seed("config.xml", b"<defaults/>");
    repository.add_volatile_artifact("g", "app", "1.0", "conf/config.xml", &config_url);

    let mut engine = fixture.engine(&[repository]);
    engine.add_module_spec(spec("g:app"), true);

    let first = run(&engine).await;
    assert_eq!(first.install.installed.len(), 2);

    // The user customizes the volatile file between runs
    let config_file = fixture.root.join("conf/config.xml");
    std::fs::write(&config_file, b"<customized/>").unwrap();

    let second = run(&engine).await;
    assert!(second.install.installed.is_empty());
    assert_eq!(second.install.skipped.len(), 2);
    assert_eq!(std::fs::read(&config_file).unwrap(), b"<customized/>");

    // The recorded digest follows the user's content
    let state = std::fs::read_to_string(fixture.root.join(".trawl-state")).unwrap();
    assert!(state.contains(&DigestAlgorithm::Sha1.hash_bytes(b"<customized/>")));
}

#[tokio::test]
async fn preexisting_file_matching_published_digest_is_adopted() {
    let fixture = Fixture::new();
    let repository = Arc::new(MemoryRepository::new("r1"));
    repository.add_module("g", "a", "1.0", &[]);
    let url = fixture.seed("a.jar", b"published bytes");
    repository.add_artifact_with_digest(
        "g",
        "a",
        "1.0",
        "lib/a.jar",
        &url,
        &DigestAlgorithm::Sha1.hash_bytes(b"published bytes"),
    );

    // The file is already in place from outside Trawl; no state exists yet
    std::fs::create_dir_all(fixture.root.join("lib")).unwrap();
    std::fs::write(fixture.root.join("lib/a.jar"), b"published bytes").unwrap();

    let mut engine = fixture.engine(&[repository]);
    engine.add_module_spec(spec("g:a"), true);
    let report = run(&engine).await;

    assert!(report.install.installed.is_empty());
    assert_eq!(report.install.skipped.len(), 1);
}

#[tokio::test]
async fn repeated_runs_produce_identical_state() {
    let fixture = Fixture::new();
    let repository = Arc::new(MemoryRepository::new("r1"));
    repository.add_module("g", "a", "1.0", &["g:b"]);
    repository.add_module("g", "b", "1.0", &[]);
    let a_url = fixture.seed("a.jar", b"a");
    repository.add_artifact("g", "a", "1.0", "lib/a.jar", &a_url);
    let b_url = fixture.seed("b.jar", b"b");
    repository.add_artifact("g", "b", "1.0", "lib/b.jar", &b_url);

    let mut engine = fixture.engine(&[repository]);
    engine.add_module_spec(spec("g:a"), true);

    run(&engine).await;
    let state_path = fixture.root.join(".trawl-state");
    let first_state = std::fs::read(&state_path).unwrap();
    let second = run(&engine).await;
    let second_state = std::fs::read(&state_path).unwrap();

    assert_eq!(first_state, second_state);
    assert!(second.install.installed.is_empty());
    assert_eq!(second.install.skipped.len(), 2);
}

#[tokio::test]
async fn unresolved_module_is_reported_not_fatal() {
    let fixture = Fixture::new();
    let repository = Arc::new(MemoryRepository::new("r1"));
    repository.add_module("g", "a", "1.0", &["g:ghost"]);
    let a_url = fixture.seed("a.jar", b"a");
    repository.add_artifact("g", "a", "1.0", "lib/a.jar", &a_url);

    let mut engine = fixture.engine(&[repository]);
    engine.add_module_spec(spec("g:a"), true);
    let report = run(&engine).await;

    assert_eq!(chosen_names(&report), vec!["g:a@1.0"]);
    assert_eq!(report.unresolved.len(), 1);
    assert_eq!(report.unresolved[0].spec, spec("g:ghost"));
    assert_eq!(report.install.installed.len(), 1);
}

#[tokio::test]
async fn orphaned_artifacts_are_cleaned_up() {
    let fixture = Fixture::new();
    let repository = Arc::new(MemoryRepository::new("r1"));
    repository.add_module("g", "a", "1.0", &["g:b"]);
    repository.add_module("g", "b", "1.0", &[]);
    let a_url = fixture.seed("a.jar", b"a");
    repository.add_artifact("g", "a", "1.0", "lib/a.jar", &a_url);
    let b_url = fixture.seed("b.jar", b"b");
    repository.add_artifact("g", "b", "1.0", "lib/b.jar", &b_url);

    let mut engine = fixture.engine(&[Arc::clone(&repository)]);
    engine.add_module_spec(spec("g:a"), true);
    run(&engine).await;
    assert!(fixture.root.join("lib/b.jar").exists());

    // b disappears from the dependency tree; its artifact must follow
    let updated = Arc::new(MemoryRepository::new("r1"));
    updated.add_module("g", "a", "1.0", &[]);
    updated.add_artifact("g", "a", "1.0", "lib/a.jar", &a_url);
    let mut engine = fixture.engine(&[updated]);
    engine.add_module_spec(spec("g:a"), true);
    let report = run(&engine).await;

    assert_eq!(report.install.removed.len(), 1);
    assert!(!fixture.root.join("lib/b.jar").exists());
    assert!(fixture.root.join("lib/a.jar").exists());
}

#[tokio::test]
async fn cancelled_run_leaves_no_state() {
    let fixture = Fixture::new();
    let repository = Arc::new(MemoryRepository::new("r1"));
    repository.add_module("g", "a", "1.0", &[]);

    let mut engine = fixture.engine(&[repository]);
    engine.add_module_spec(spec("g:a"), true);
    engine.cancel();
    let error = engine.run(Arc::new(NullNotifier)).await.unwrap_err();
    assert!(matches!(error, trawl_core::TrawlError::Cancelled));
    assert!(!fixture.root.join(".trawl-state").exists());
}
