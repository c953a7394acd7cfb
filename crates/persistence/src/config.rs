//! Declarative persistence configuration.
//!
//! A [`PersistenceConfig`] is a JSON document naming resource types,
//! metadata adapters and storage adapters. [`PersistenceConfig::build`]
//! turns it into a [`PersistenceContext`]:
//!
//! ```json
//! {
//!   "types": [
//!     { "name": "Book", "capabilities": ["access_controls", "optimistic_locking"] },
//!     { "name": "Page", "defaults": { "title": "Untitled" } }
//!   ],
//!   "adapters": [
//!     { "name": "primary", "type": "sqlite", "path": "trellis.db" },
//!     { "name": "index", "type": "search_index", "client": { "type": "memory" } },
//!     { "name": "scratch", "type": "memory" }
//!   ],
//!   "storage": [
//!     { "name": "disk", "type": "disk", "path": "blobs" }
//!   ]
//! }
//! ```
//!
//! Relative paths are resolved against the configuration file's directory
//! when loaded with [`PersistenceConfig::load`].

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::backends::index::{IndexAdapter, IndexBackendConfig, IndexClient, MemoryIndex};
use crate::backends::memory::MemoryAdapter;
use crate::core::MetadataAdapter;
use crate::error::{BackendError, StorageResult};
use crate::mapping::document;
use crate::registry::PersistenceContext;
use crate::storage::{BlobStore, DiskBlobStore, MemoryBlobStore};
use crate::types::{Capability, ResourceDefinition, ResourceTypes};

#[cfg(feature = "elasticsearch")]
use crate::backends::elasticsearch::{ElasticsearchConfig, ElasticsearchIndexClient};
#[cfg(feature = "sqlite")]
use crate::backends::sqlite::{SqliteAdapter, SqliteBackendConfig};

/// Default pattern adapter names must match.
pub const DEFAULT_NAME_PATTERN: &str = "^[a-z][a-z0-9_-]*$";

fn default_name_pattern() -> String {
    DEFAULT_NAME_PATTERN.to_string()
}

fn default_true() -> bool {
    true
}

/// Top-level persistence configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Resource type definitions.
    #[serde(default)]
    pub types: Vec<TypeConfig>,

    /// Metadata adapters, registered under their names.
    #[serde(default)]
    pub adapters: Vec<AdapterConfig>,

    /// Blob storage adapters, registered under their names.
    #[serde(default)]
    pub storage: Vec<StorageConfig>,

    /// Regular expression every adapter name must match.
    #[serde(default = "default_name_pattern")]
    pub name_pattern: String,

    /// Freeze both registries after building (default: true).
    #[serde(default = "default_true")]
    pub freeze: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            types: Vec::new(),
            adapters: Vec::new(),
            storage: Vec::new(),
            name_pattern: default_name_pattern(),
            freeze: true,
        }
    }
}

/// One resource type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeConfig {
    /// Type tag.
    pub name: String,

    /// Capabilities the type opts into.
    #[serde(default)]
    pub capabilities: Vec<Capability>,

    /// Default attribute values, in the document JSON form.
    #[serde(default)]
    pub defaults: Map<String, Value>,
}

/// One named metadata adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Registry name.
    pub name: String,

    /// Backend settings.
    #[serde(flatten)]
    pub backend: AdapterBackend,
}

/// Backend of a metadata adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdapterBackend {
    /// In-process map.
    Memory,

    /// SQLite document store.
    #[cfg(feature = "sqlite")]
    Sqlite {
        /// Database file; an in-memory database when omitted.
        #[serde(default)]
        path: Option<PathBuf>,
        /// Pool settings.
        #[serde(default)]
        config: SqliteBackendConfig,
    },

    /// Search-index backend.
    SearchIndex {
        /// Engine the documents go to.
        #[serde(default)]
        client: IndexClientConfig,
        /// Query settings.
        #[serde(default)]
        config: IndexBackendConfig,
    },
}

impl AdapterBackend {
    /// Returns the backend name the built adapter reports.
    pub fn backend_name(&self) -> &'static str {
        match self {
            AdapterBackend::Memory => "memory",
            #[cfg(feature = "sqlite")]
            AdapterBackend::Sqlite { .. } => "sqlite",
            AdapterBackend::SearchIndex { .. } => "search_index",
        }
    }

    fn path_mut(&mut self) -> Option<&mut PathBuf> {
        match self {
            #[cfg(feature = "sqlite")]
            AdapterBackend::Sqlite { path, .. } => path.as_mut(),
            _ => None,
        }
    }
}

/// Search engine behind a search-index adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IndexClientConfig {
    /// In-process [`MemoryIndex`].
    #[default]
    Memory,

    /// Elasticsearch cluster.
    #[cfg(feature = "elasticsearch")]
    Elasticsearch(ElasticsearchConfig),
}

/// One named blob storage adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Registry name.
    pub name: String,

    /// Store settings.
    #[serde(flatten)]
    pub backend: StorageBackend,
}

/// Backend of a blob storage adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageBackend {
    /// [`MemoryBlobStore`].
    Memory,

    /// [`DiskBlobStore`] rooted at `path`.
    Disk {
        /// Base directory.
        path: PathBuf,
    },
}

/// A single configuration problem.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// The name pattern is not a valid regular expression.
    #[error("invalid name pattern '{pattern}': {message}")]
    InvalidNamePattern {
        /// The rejected pattern.
        pattern: String,
        /// Parser message.
        message: String,
    },

    /// A name does not match the name pattern.
    #[error("{section} name '{name}' does not match '{pattern}'")]
    InvalidName {
        /// `"type"`, `"adapter"` or `"storage"`.
        section: &'static str,
        /// The rejected name.
        name: String,
        /// The pattern it was checked against.
        pattern: String,
    },

    /// A name appears twice in one section.
    #[error("duplicate {section} name '{name}'")]
    DuplicateName {
        /// `"type"`, `"adapter"` or `"storage"`.
        section: &'static str,
        /// The repeated name.
        name: String,
    },

    /// A type default cannot be read as an attribute value.
    #[error("type '{kind}' has an invalid default for '{attribute}': {message}")]
    InvalidDefault {
        /// The type.
        kind: String,
        /// The attribute.
        attribute: String,
        /// Mapper message.
        message: String,
    },

    /// An adapter setting is out of range.
    #[error("adapter '{name}': {message}")]
    InvalidSetting {
        /// The adapter.
        name: String,
        /// What is wrong.
        message: String,
    },
}

/// Every problem found by [`PersistenceConfig::validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigErrors(pub Vec<ConfigError>);

impl fmt::Display for ConfigErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigErrors {}

impl From<ConfigErrors> for BackendError {
    fn from(errors: ConfigErrors) -> Self {
        BackendError::Configuration {
            message: errors.to_string(),
        }
    }
}

impl PersistenceConfig {
    /// Parses a JSON configuration.
    pub fn from_json(json: &str) -> StorageResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a JSON configuration file, resolving relative paths against
    /// its directory.
    pub fn load(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let mut config = Self::from_json(&std::fs::read_to_string(path)?)?;
        if let Some(dir) = path.parent() {
            config.resolve_paths(dir);
        }
        tracing::info!(path = %path.display(), "Loaded persistence configuration");
        Ok(config)
    }

    /// Makes relative file paths absolute against `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        for adapter in &mut self.adapters {
            if let Some(path) = adapter.backend.path_mut() {
                resolve(path);
            }
        }
        for store in &mut self.storage {
            if let StorageBackend::Disk { path } = &mut store.backend {
                resolve(path);
            }
        }
    }

    /// Builds the resource-type registry, reading defaults through the
    /// document reader.
    pub fn resource_types(&self) -> Result<ResourceTypes, ConfigErrors> {
        let mut errors = Vec::new();
        let types = self.collect_types(&mut errors);
        if errors.is_empty() {
            Ok(types)
        } else {
            Err(ConfigErrors(errors))
        }
    }

    fn collect_types(&self, errors: &mut Vec<ConfigError>) -> ResourceTypes {
        let reader = document::reader();
        let mut types = ResourceTypes::new();
        for entry in &self.types {
            let mut definition = entry
                .capabilities
                .iter()
                .fold(ResourceDefinition::new(&entry.name), |d, c| {
                    d.with_capability(*c)
                });
            for (attribute, value) in &entry.defaults {
                match reader.map(value) {
                    Ok(value) => definition = definition.with_default(attribute.clone(), value),
                    Err(e) => errors.push(ConfigError::InvalidDefault {
                        kind: entry.name.clone(),
                        attribute: attribute.clone(),
                        message: e.to_string(),
                    }),
                }
            }
            types.register(definition);
        }
        types
    }

    /// Checks the whole configuration and reports every problem at once.
    pub fn validate(&self) -> Result<(), ConfigErrors> {
        let mut errors = Vec::new();

        let pattern = match Regex::new(&self.name_pattern) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                errors.push(ConfigError::InvalidNamePattern {
                    pattern: self.name_pattern.clone(),
                    message: e.to_string(),
                });
                None
            }
        };

        let sections: [(&'static str, Vec<&str>); 3] = [
            ("type", self.types.iter().map(|t| t.name.as_str()).collect()),
            ("adapter", self.adapters.iter().map(|a| a.name.as_str()).collect()),
            ("storage", self.storage.iter().map(|s| s.name.as_str()).collect()),
        ];
        for (section, names) in &sections {
            let section = *section;
            let mut seen = BTreeSet::new();
            for name in names {
                if !seen.insert(*name) {
                    errors.push(ConfigError::DuplicateName {
                        section,
                        name: name.to_string(),
                    });
                }
            }
        }
        // Type tags are free-form; only registry names follow the pattern.
        if let Some(pattern) = &pattern {
            for (section, names) in &sections[1..] {
                let section = *section;
                for name in names.iter().filter(|name| !pattern.is_match(name)) {
                    errors.push(ConfigError::InvalidName {
                        section,
                        name: name.to_string(),
                        pattern: self.name_pattern.clone(),
                    });
                }
            }
        }

        self.collect_types(&mut errors);

        for adapter in &self.adapters {
            let mut invalid = |message: String| {
                errors.push(ConfigError::InvalidSetting {
                    name: adapter.name.clone(),
                    message,
                })
            };
            match &adapter.backend {
                AdapterBackend::Memory => {}
                #[cfg(feature = "sqlite")]
                AdapterBackend::Sqlite { config, .. } => {
                    if config.max_connections == 0 {
                        invalid("max_connections must be at least 1".to_string());
                    }
                    if config.min_connections > config.max_connections {
                        invalid(format!(
                            "min_connections ({}) exceeds max_connections ({})",
                            config.min_connections, config.max_connections
                        ));
                    }
                }
                AdapterBackend::SearchIndex { config, .. } => {
                    if config.batch_size == 0 {
                        invalid("batch_size must be at least 1".to_string());
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigErrors(errors))
        }
    }

    /// Validates the configuration and builds every adapter.
    ///
    /// SQLite schemas are initialized. Both registries are frozen unless
    /// `freeze` is `false`.
    pub fn build(&self) -> StorageResult<PersistenceContext> {
        self.validate().map_err(BackendError::from)?;
        let types = Arc::new(self.resource_types().map_err(BackendError::from)?);
        let context = PersistenceContext::new(types.clone());

        for entry in &self.adapters {
            let adapter = build_adapter(&entry.backend, types.clone())?;
            context.adapters().register(&entry.name, adapter)?;
        }
        for entry in &self.storage {
            let store: Arc<dyn BlobStore> = match &entry.backend {
                StorageBackend::Memory => Arc::new(MemoryBlobStore::new()),
                StorageBackend::Disk { path } => Arc::new(DiskBlobStore::new(path)?),
            };
            context.storage().register(&entry.name, store)?;
        }

        if self.freeze {
            context.freeze();
        }
        tracing::info!(
            types = types.len(),
            adapters = context.adapters().len(),
            storage = context.storage().len(),
            "Built persistence context"
        );
        Ok(context)
    }
}

fn build_adapter(
    backend: &AdapterBackend,
    types: Arc<ResourceTypes>,
) -> StorageResult<Arc<dyn MetadataAdapter>> {
    Ok(match backend {
        AdapterBackend::Memory => Arc::new(MemoryAdapter::new(types)),
        #[cfg(feature = "sqlite")]
        AdapterBackend::Sqlite { path, config } => {
            let path = path.as_deref().unwrap_or(Path::new(":memory:"));
            let adapter = SqliteAdapter::with_config(path, config.clone(), types)?;
            adapter.init_schema()?;
            Arc::new(adapter)
        }
        AdapterBackend::SearchIndex { client, config } => {
            let client: Arc<dyn IndexClient> = match client {
                IndexClientConfig::Memory => Arc::new(MemoryIndex::new()),
                #[cfg(feature = "elasticsearch")]
                IndexClientConfig::Elasticsearch(es) => {
                    Arc::new(ElasticsearchIndexClient::new(es.clone())?)
                }
            };
            Arc::new(IndexAdapter::with_config(client, config.clone(), types))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PropertyValue;

    #[test]
    fn test_parse_defaults() {
        let config = PersistenceConfig::from_json(
            r#"{ "adapters": [ { "name": "scratch", "type": "memory" } ] }"#,
        )
        .unwrap();
        assert_eq!(config.name_pattern, DEFAULT_NAME_PATTERN);
        assert!(config.freeze);
        assert_eq!(config.adapters[0].backend, AdapterBackend::Memory);
    }

    #[test]
    fn test_search_index_client_defaults_to_memory() {
        let config = PersistenceConfig::from_json(
            r#"{ "adapters": [ { "name": "index", "type": "search_index", "config": { "batch_size": 50 } } ] }"#,
        )
        .unwrap();
        assert_eq!(
            config.adapters[0].backend,
            AdapterBackend::SearchIndex {
                client: IndexClientConfig::Memory,
                config: IndexBackendConfig { batch_size: 50 },
            }
        );
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let config = PersistenceConfig::from_json(
            r#"{
                "types": [ { "name": "Book", "defaults": { "note": { "internal_resource": "Note", "member_ids": "x" } } } ],
                "adapters": [
                    { "name": "Primary", "type": "memory" },
                    { "name": "index", "type": "search_index", "config": { "batch_size": 0 } },
                    { "name": "index", "type": "memory" }
                ]
            }"#,
        )
        .unwrap();
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.0.len(), 4, "{}", errors);
        assert!(errors.0.iter().any(|e| matches!(e, ConfigError::InvalidName { name, .. } if name == "Primary")));
        assert!(errors.0.iter().any(|e| matches!(e, ConfigError::DuplicateName { name, .. } if name == "index")));
        assert!(errors.0.iter().any(|e| matches!(e, ConfigError::InvalidDefault { .. })));
        assert!(errors.0.iter().any(|e| matches!(e, ConfigError::InvalidSetting { .. })));
    }

    #[test]
    fn test_invalid_name_pattern() {
        let config = PersistenceConfig {
            name_pattern: "[".to_string(),
            ..Default::default()
        };
        let errors = config.validate().unwrap_err();
        assert!(matches!(errors.0[0], ConfigError::InvalidNamePattern { .. }));
    }

    #[test]
    fn test_type_defaults_read_as_values() {
        let config = PersistenceConfig::from_json(
            r#"{ "types": [ { "name": "Page", "capabilities": ["access_controls"], "defaults": { "title": "Untitled", "parent": { "id": "b1" } } } ] }"#,
        )
        .unwrap();
        let types = config.resource_types().unwrap();
        let page = types.instantiate("Page").unwrap();
        assert_eq!(page.get("title"), Some(&PropertyValue::from("Untitled")));
        assert!(page.get("parent").unwrap().contains_id(&"b1".into()));
        assert!(types.has_capability("Page", Capability::AccessControls));
    }

    #[test]
    fn test_build_freezes_registries() {
        let config = PersistenceConfig::from_json(
            r#"{
                "types": [ { "name": "Book" } ],
                "adapters": [ { "name": "scratch", "type": "memory" }, { "name": "index", "type": "search_index" } ],
                "storage": [ { "name": "memory", "type": "memory" } ]
            }"#,
        )
        .unwrap();
        let context = config.build().unwrap();
        assert_eq!(context.adapters().names(), vec!["index", "scratch"]);
        assert_eq!(context.adapter("index").unwrap().backend_name(), "search_index");
        assert!(context.adapters().is_frozen());
        assert!(context.storage().is_frozen());
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let config = PersistenceConfig::from_json(
            r#"{ "adapters": [ { "name": "Bad Name", "type": "memory" } ] }"#,
        )
        .unwrap();
        let err = config.build().unwrap_err();
        assert!(err.to_string().contains("Bad Name"));
    }

    #[test]
    fn test_resolve_paths() {
        let mut config = PersistenceConfig::from_json(
            r#"{ "storage": [ { "name": "disk", "type": "disk", "path": "blobs" }, { "name": "abs", "type": "disk", "path": "/var/blobs" } ] }"#,
        )
        .unwrap();
        config.resolve_paths(Path::new("/etc/trellis"));
        assert_eq!(
            config.storage[0].backend,
            StorageBackend::Disk { path: PathBuf::from("/etc/trellis/blobs") }
        );
        assert_eq!(
            config.storage[1].backend,
            StorageBackend::Disk { path: PathBuf::from("/var/blobs") }
        );
    }
}
