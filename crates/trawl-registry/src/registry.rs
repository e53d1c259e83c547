//! The repository plugin registry.
//!
//! Repository implementations are instantiated from a configuration value
//! `{"type": <logical-name>, ...options}` through factories keyed by the
//! logical name. Unknown names fail with `UnknownRepositoryType`.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use url::Url;

use trawl_core::{Repository, TrawlError, TrawlResult};

use crate::index::RepositoryIndex;
use crate::json::JsonRepository;
use crate::memory::MemoryRepository;

type Factory = Box<dyn Fn(&Value) -> TrawlResult<Arc<dyn Repository>> + Send + Sync>;

/// Maps logical repository type names to factory closures
pub struct RepositoryRegistry {
    factories: HashMap<String, Factory>,
}

impl RepositoryRegistry {
    /// An empty registry with no types registered
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// A registry with the built-in `memory` and `json` types
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register("memory", |config| {
            let id = string_field(config, "id")?;
            let index: RepositoryIndex = match config.get("modules") {
                Some(modules) => serde_json::from_value(Value::Object(
                    [("modules".to_string(), modules.clone())].into_iter().collect(),
                ))
                .map_err(|e| TrawlError::ConfigValidation {
                    field: "modules".to_string(),
                    reason: e.to_string(),
                })?,
                None => RepositoryIndex::default(),
            };
            Ok(Arc::new(MemoryRepository::from_index(&id, index)) as Arc<dyn Repository>)
        });
        registry.register("json", |config| {
            let id = string_field(config, "id")?;
            let url_text = string_field(config, "url")?;
            let url = Url::parse(&url_text).map_err(|e| TrawlError::ConfigValidation {
                field: "url".to_string(),
                reason: format!("'{}': {}", url_text, e),
            })?;
            Ok(Arc::new(JsonRepository::new(&id, url)?) as Arc<dyn Repository>)
        });
        registry
    }

    /// Register a factory under a logical name, replacing any previous one
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&Value) -> TrawlResult<Arc<dyn Repository>> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    /// Instantiate a repository from `{"type": ..., ...options}`
    pub fn create(&self, config: &Value) -> TrawlResult<Arc<dyn Repository>> {
        let name = string_field(config, "type")?;
        let factory = self
            .factories
            .get(&name)
            .ok_or(TrawlError::UnknownRepositoryType { name: name.clone() })?;
        factory(config)
    }
}

impl Default for RepositoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn string_field(config: &Value, field: &str) -> TrawlResult<String> {
    config
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| TrawlError::ConfigValidation {
            field: field.to_string(),
            reason: "missing or not a string".to_string(),
        })
}
