//! Search-index adapter.

use std::fmt::Debug;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::{MetadataAdapter, Persister, QueryService};
use crate::types::ResourceTypes;

use super::client::IndexClient;
use super::factory::{IndexFactory, Indexer};
use super::storage::{IndexPersister, IndexQueryService};

/// Configuration for the search-index backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexBackendConfig {
    /// Documents requested per round trip when a relationship query has to
    /// collect every match.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    1000
}

impl Default for IndexBackendConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

pub(super) struct IndexInner {
    pub(super) client: Arc<dyn IndexClient>,
    pub(super) config: IndexBackendConfig,
    pub(super) types: Arc<ResourceTypes>,
    pub(super) factory: IndexFactory,
}

/// Metadata adapter over a search engine.
///
/// Resources are flattened into term documents (see [`IndexFactory`]);
/// relationship queries are term lookups.
#[derive(Clone)]
pub struct IndexAdapter {
    pub(super) inner: Arc<IndexInner>,
}

impl Debug for IndexAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexAdapter")
            .field("client", &self.inner.client)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl IndexAdapter {
    /// Creates an adapter with default configuration.
    pub fn new(client: Arc<dyn IndexClient>, types: Arc<ResourceTypes>) -> Self {
        Self::with_config(client, IndexBackendConfig::default(), types)
    }

    /// Creates an adapter with custom configuration.
    pub fn with_config(
        client: Arc<dyn IndexClient>,
        config: IndexBackendConfig,
        types: Arc<ResourceTypes>,
    ) -> Self {
        Self::with_factory(
            client.clone(),
            config,
            types.clone(),
            IndexFactory::new(types, format!("index:{}", client.location())),
        )
    }

    /// Creates an adapter with additional indexers.
    pub fn with_indexers(
        client: Arc<dyn IndexClient>,
        config: IndexBackendConfig,
        types: Arc<ResourceTypes>,
        indexers: Vec<Arc<dyn Indexer>>,
    ) -> Self {
        let factory = indexers.into_iter().fold(
            IndexFactory::new(types.clone(), format!("index:{}", client.location())),
            IndexFactory::with_indexer,
        );
        Self::with_factory(client, config, types, factory)
    }

    fn with_factory(
        client: Arc<dyn IndexClient>,
        config: IndexBackendConfig,
        types: Arc<ResourceTypes>,
        factory: IndexFactory,
    ) -> Self {
        tracing::info!(
            engine = client.name(),
            location = %client.location(),
            "Opened search-index adapter"
        );
        Self {
            inner: Arc::new(IndexInner {
                client,
                config,
                types,
                factory,
            }),
        }
    }

    /// Returns the search engine client.
    pub fn client(&self) -> &Arc<dyn IndexClient> {
        &self.inner.client
    }

    /// Returns the adapter's factory.
    pub fn factory(&self) -> &IndexFactory {
        &self.inner.factory
    }

    /// Returns the backend configuration.
    pub fn config(&self) -> &IndexBackendConfig {
        &self.inner.config
    }
}

impl MetadataAdapter for IndexAdapter {
    fn backend_name(&self) -> &'static str {
        "search_index"
    }

    fn persister(&self) -> Arc<dyn Persister> {
        Arc::new(IndexPersister::new(self.clone()))
    }

    fn query_service(&self) -> Arc<dyn QueryService> {
        Arc::new(IndexQueryService::new(self.clone()))
    }

    fn resource_types(&self) -> &Arc<ResourceTypes> {
        &self.inner.types
    }
}
