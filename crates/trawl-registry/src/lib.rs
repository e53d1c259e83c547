//! # trawl-registry
//!
//! Repository implementations for the Trawl engine plus the plugin
//! registry that instantiates them from configuration.
//!
//! Two repository types ship in-tree:
//! - `memory`: module tables held in memory, used as a test fixture and for
//!   fully config-defined setups
//! - `json`: a JSON index fetched from a `file://` or `http(s)://` base URL

pub mod index;
pub mod json;
pub mod memory;
pub mod registry;

pub use index::{IndexArtifact, IndexModule, RepositoryIndex};
pub use json::JsonRepository;
pub use memory::MemoryRepository;
pub use registry::RepositoryRegistry;
