//! Installer behavior against an HTTP artifact source.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use camino::Utf8PathBuf;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use trawl_core::{Artifact, DigestAlgorithm, ModuleIdentifier, NullNotifier};
use trawl_install::{InstallState, Installer, InstallerConfig};

fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().join("install")).unwrap();
    (dir, root)
}

fn module(name: &str) -> ModuleIdentifier {
    ModuleIdentifier::new("remote", "g", name, "1.0".parse().unwrap())
}

#[tokio::test]
async fn http_artifacts_install_and_skip_on_rerun() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a.jar"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jar one".to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b.jar"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jar two".to_vec()))
        .mount(&server)
        .await;

    let (_dir, root) = temp_root();
    let modules = vec![
        (
            module("a"),
            vec![Artifact::new(
                root.join("lib/a.jar"),
                Url::parse(&format!("{}/a.jar", server.uri())).unwrap(),
                false,
            )],
        ),
        (
            module("b"),
            vec![Artifact::new(
                root.join("lib/b.jar"),
                Url::parse(&format!("{}/b.jar", server.uri())).unwrap(),
                false,
            )],
        ),
    ];

    let installer = Installer::new(InstallerConfig::new(root.clone())).unwrap();
    let first = installer
        .install(&modules, Arc::new(NullNotifier), Arc::new(AtomicBool::new(false)))
        .await
        .unwrap();
    assert_eq!(first.installed.len(), 2);
    assert_eq!(std::fs::read(root.join("lib/a.jar")).unwrap(), b"jar one");

    // Digests land in the state and the second run is a no-op
    let state = InstallState::load(&root.join(".trawl-state")).unwrap().unwrap();
    let record = state.get(camino::Utf8Path::new("lib/a.jar")).unwrap();
    assert_eq!(
        record.digest.as_deref().unwrap(),
        DigestAlgorithm::Sha1.hash_bytes(b"jar one")
    );

    let second = installer
        .install(&modules, Arc::new(NullNotifier), Arc::new(AtomicBool::new(false)))
        .await
        .unwrap();
    assert!(second.installed.is_empty());
    assert_eq!(second.skipped.len(), 2);
}

#[tokio::test]
async fn server_error_marks_artifact_failed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broken.jar"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (_dir, root) = temp_root();
    let modules = vec![(
        module("broken"),
        vec![Artifact::new(
            root.join("lib/broken.jar"),
            Url::parse(&format!("{}/broken.jar", server.uri())).unwrap(),
            false,
        )],
    )];

    let mut config = InstallerConfig::new(root.clone());
    config.transfer.max_retries = 1;
    config.transfer.backoff_base = std::time::Duration::from_millis(1);
    let installer = Installer::new(config).unwrap();
    let report = installer
        .install(&modules, Arc::new(NullNotifier), Arc::new(AtomicBool::new(false)))
        .await
        .unwrap();

    assert!(report.installed.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert!(!root.join("lib/broken.jar").exists());
}
