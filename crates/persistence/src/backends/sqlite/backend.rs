//! SQLite adapter implementation.

use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use serde::{Deserialize, Serialize};

use crate::core::{MetadataAdapter, Persister, QueryService};
use crate::error::{BackendError, StorageError, StorageResult};
use crate::types::ResourceTypes;

use super::factory::DocumentFactory;
use super::schema;
use super::storage::{SqlitePersister, SqliteQueryService};

pub(super) struct SqliteInner {
    pub(super) pool: Pool<SqliteConnectionManager>,
    pub(super) config: SqliteBackendConfig,
    pub(super) is_memory: bool,
    pub(super) types: Arc<ResourceTypes>,
    pub(super) factory: DocumentFactory,
}

/// Metadata adapter storing resources as JSON documents in SQLite.
#[derive(Clone)]
pub struct SqliteAdapter {
    pub(super) inner: Arc<SqliteInner>,
}

impl Debug for SqliteAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteAdapter")
            .field("config", &self.inner.config)
            .field("is_memory", &self.inner.is_memory)
            .field("scope", &self.inner.factory.scope())
            .finish_non_exhaustive()
    }
}

/// Configuration for the SQLite backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqliteBackendConfig {
    /// Maximum number of connections in the pool.
    ///
    /// In-memory databases always use a single connection.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of idle connections.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in milliseconds.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u32,

    /// Enable WAL mode for better concurrency.
    #[serde(default = "default_true")]
    pub enable_wal: bool,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connection_timeout_ms() -> u64 {
    30000
}

fn default_busy_timeout_ms() -> u32 {
    5000
}

fn default_true() -> bool {
    true
}

impl Default for SqliteBackendConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connection_timeout_ms: default_connection_timeout_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
            enable_wal: true,
        }
    }
}

impl SqliteAdapter {
    /// Creates a new in-memory SQLite adapter.
    pub fn in_memory(types: Arc<ResourceTypes>) -> StorageResult<Self> {
        Self::with_config(":memory:", SqliteBackendConfig::default(), types)
    }

    /// Opens or creates a file-based SQLite database.
    pub fn open<P: AsRef<Path>>(path: P, types: Arc<ResourceTypes>) -> StorageResult<Self> {
        Self::with_config(path, SqliteBackendConfig::default(), types)
    }

    /// Creates an adapter with custom configuration.
    pub fn with_config<P: AsRef<Path>>(
        path: P,
        config: SqliteBackendConfig,
        types: Arc<ResourceTypes>,
    ) -> StorageResult<Self> {
        let path_str = path.as_ref().to_string_lossy().into_owned();
        let is_memory = path_str == ":memory:";

        let busy_timeout = std::time::Duration::from_millis(config.busy_timeout_ms as u64);
        let enable_wal = config.enable_wal && !is_memory;
        let manager = if is_memory {
            SqliteConnectionManager::memory()
        } else {
            SqliteConnectionManager::file(path.as_ref())
        }
        .with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            if enable_wal {
                conn.execute_batch("PRAGMA journal_mode = WAL;")?;
            }
            Ok(())
        });

        // Every connection of the memory manager opens its own database.
        let max_size = if is_memory { 1 } else { config.max_connections };
        let pool = Pool::builder()
            .max_size(max_size)
            .min_idle(Some(config.min_connections.min(max_size)))
            .connection_timeout(std::time::Duration::from_millis(
                config.connection_timeout_ms,
            ))
            .build(manager)
            .map_err(|e| {
                StorageError::Backend(BackendError::ConnectionFailed {
                    backend_name: "sqlite".to_string(),
                    message: e.to_string(),
                })
            })?;

        let scope = if is_memory {
            format!("sqlite:memory:{}", uuid::Uuid::new_v4())
        } else {
            format!("sqlite:{}", path_str)
        };
        tracing::info!(path = %path_str, max_connections = max_size, "Opened SQLite adapter");

        Ok(Self {
            inner: Arc::new(SqliteInner {
                pool,
                config,
                is_memory,
                factory: DocumentFactory::new(types.clone(), scope),
                types,
            }),
        })
    }

    /// Initialize the database schema.
    pub fn init_schema(&self) -> StorageResult<()> {
        let conn = self.get_connection()?;
        schema::initialize_schema(&conn)
    }

    /// Get a connection from the pool.
    pub(crate) fn get_connection(
        &self,
    ) -> StorageResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.inner.pool.get()?)
    }

    /// Returns whether this is an in-memory database.
    pub fn is_memory(&self) -> bool {
        self.inner.is_memory
    }

    /// Returns the backend configuration.
    pub fn config(&self) -> &SqliteBackendConfig {
        &self.inner.config
    }

    /// Returns the adapter's factory.
    pub fn factory(&self) -> &DocumentFactory {
        &self.inner.factory
    }
}

impl MetadataAdapter for SqliteAdapter {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    fn persister(&self) -> Arc<dyn Persister> {
        Arc::new(SqlitePersister::new(self.clone()))
    }

    fn query_service(&self) -> Arc<dyn QueryService> {
        Arc::new(SqliteQueryService::new(self.clone()))
    }

    fn resource_types(&self) -> &Arc<ResourceTypes> {
        &self.inner.types
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_from_empty_json() {
        let config: SqliteBackendConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SqliteBackendConfig::default());
        assert_eq!(config.busy_timeout_ms, 5000);
    }

    #[test]
    fn test_in_memory_adapter() {
        let adapter = SqliteAdapter::in_memory(Arc::new(ResourceTypes::new())).unwrap();
        adapter.init_schema().unwrap();
        assert!(adapter.is_memory());
        assert_eq!(adapter.backend_name(), "sqlite");
    }

    #[test]
    fn test_file_adapter_persists_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.db");
        let adapter = SqliteAdapter::open(&path, Arc::new(ResourceTypes::new())).unwrap();
        adapter.init_schema().unwrap();
        drop(adapter);

        let reopened = SqliteAdapter::open(&path, Arc::new(ResourceTypes::new())).unwrap();
        let conn = reopened.get_connection().unwrap();
        assert_eq!(
            schema::get_schema_version(&conn).unwrap(),
            schema::SCHEMA_VERSION
        );
    }
}
