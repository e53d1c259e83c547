//! JSON-index repository.
//!
//! The repository is described by a single JSON index document (see
//! [`crate::index`]) reachable through a `file://` or `http(s)://` URL. The
//! document is fetched once per run and cached.

use std::time::Duration;

use async_trait::async_trait;
use camino::Utf8Path;
use reqwest::{Client, ClientBuilder};
use tokio::sync::OnceCell;
use url::Url;

use trawl_core::{
    Artifact, ModuleIdentifier, ModuleSpec, Repository, ResolvedModule, TrawlError, TrawlResult,
};

use crate::index::RepositoryIndex;

const USER_AGENT: &str = concat!("trawl/", env!("CARGO_PKG_VERSION"));

/// A repository backed by a fetched JSON index
#[derive(Debug)]
pub struct JsonRepository {
    id: String,
    index_url: Url,
    client: Client,
    index: OnceCell<RepositoryIndex>,
}

impl JsonRepository {
    pub fn new(id: &str, index_url: Url) -> TrawlResult<Self> {
        let client = ClientBuilder::new()
            .pool_max_idle_per_host(8)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(Duration::from_secs(30))
            .gzip(true)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TrawlError::network("Failed to create HTTP client".to_string(), e))?;
        Ok(Self {
            id: id.to_string(),
            index_url,
            client,
            index: OnceCell::new(),
        })
    }

    async fn index(&self) -> TrawlResult<&RepositoryIndex> {
        self.index
            .get_or_try_init(|| async { self.fetch_index().await })
            .await
    }

    async fn fetch_index(&self) -> TrawlResult<RepositoryIndex> {
        let text = match self.index_url.scheme() {
            "file" => {
                let path = self.index_url.to_file_path().map_err(|_| {
                    TrawlError::ConfigValidation {
                        field: "url".to_string(),
                        reason: format!("'{}' is not a local path", self.index_url),
                    }
                })?;
                tokio::fs::read_to_string(&path).await.map_err(|e| {
                    TrawlError::io(format!("Failed to read index {}", path.display()), e)
                })?
            }
            "http" | "https" => {
                let response = self
                    .client
                    .get(self.index_url.clone())
                    .send()
                    .await
                    .and_then(|response| response.error_for_status())
                    .map_err(|e| {
                        TrawlError::network(format!("Failed to fetch index {}", self.index_url), e)
                    })?;
                response.text().await.map_err(|e| {
                    TrawlError::network(format!("Failed to read index {}", self.index_url), e)
                })?
            }
            scheme => {
                return Err(TrawlError::ConfigValidation {
                    field: "url".to_string(),
                    reason: format!("unsupported scheme '{}'", scheme),
                })
            }
        };
        let index: RepositoryIndex =
            serde_json::from_str(&text).map_err(|e| TrawlError::MalformedModule {
                repository: self.id.clone(),
                spec: self.index_url.to_string(),
                reason: format!("invalid index document: {}", e),
            })?;
        tracing::debug!(
            repository = %self.id,
            modules = index.modules.len(),
            "loaded repository index"
        );
        Ok(index)
    }
}

#[async_trait]
impl Repository for JsonRepository {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get_module(&self, spec: &ModuleSpec) -> TrawlResult<Option<ResolvedModule>> {
        let index = self.index().await?;
        Ok(index
            .best_match(spec, &self.id)
            .map(|module| ResolvedModule {
                identifier: module.identifier(&self.id),
                dependencies: module.dependencies.clone(),
            }))
    }

    async fn get_artifacts(
        &self,
        module: &ModuleIdentifier,
        root: &Utf8Path,
    ) -> TrawlResult<Vec<Artifact>> {
        let index = self.index().await?;
        let entry = index.find(module).ok_or_else(|| TrawlError::MalformedModule {
            repository: self.id.clone(),
            spec: module.to_string(),
            reason: "module vanished from the index".to_string(),
        })?;
        entry.artifacts_under(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_index(dir: &std::path::Path, body: &str) -> Url {
        let path = dir.join("index.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        Url::from_file_path(&path).unwrap()
    }

    #[tokio::test]
    async fn test_file_index_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let url = write_index(
            dir.path(),
            r#"{"modules": [
                {"group": "g", "name": "a", "version": "1.0", "dependencies": ["g:b"]},
                {"group": "g", "name": "b", "version": "1.0",
                 "artifacts": [{"file": "lib/b.jar", "url": "file:///src/b.jar"}]}
            ]}"#,
        );
        let repository = JsonRepository::new("central", url).unwrap();

        let spec: ModuleSpec = "g:a".parse().unwrap();
        let resolved = repository.get_module(&spec).await.unwrap().unwrap();
        assert_eq!(resolved.identifier.to_string(), "g:a@1.0");
        assert_eq!(resolved.dependencies[0].to_string(), "g:b");

        let b = ModuleIdentifier::new("central", "g", "b", "1.0".parse().unwrap());
        let artifacts = repository
            .get_artifacts(&b, Utf8Path::new("/install"))
            .await
            .unwrap();
        assert_eq!(artifacts[0].file, "/install/lib/b.jar");
    }

    #[tokio::test]
    async fn test_corrupt_index_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let url = write_index(dir.path(), "not json");
        let repository = JsonRepository::new("central", url).unwrap();
        let spec: ModuleSpec = "g:a".parse().unwrap();
        let error = repository.get_module(&spec).await.unwrap_err();
        assert!(matches!(error, TrawlError::MalformedModule { .. }));
    }

    #[tokio::test]
    async fn test_http_index() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"modules": [{"group": "g", "name": "a", "version": "3.0"}]}"#,
            ))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/index.json", server.uri())).unwrap();
        let repository = JsonRepository::new("remote", url).unwrap();
        let spec: ModuleSpec = "g:a".parse().unwrap();
        let resolved = repository.get_module(&spec).await.unwrap().unwrap();
        assert_eq!(resolved.identifier.version, "3.0".parse().unwrap());
    }
}
