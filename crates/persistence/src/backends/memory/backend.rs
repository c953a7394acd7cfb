//! In-memory adapter and factory.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::{MetadataAdapter, Persister, QueryService, ResourceFactory, StoredMeta};
use crate::error::StorageResult;
use crate::types::{Resource, ResourceId, ResourceTypes};

use super::storage::{MemoryPersister, MemoryQueryService};

/// Translates resources to stored copies.
///
/// The stored record is the resource itself; the factory only validates the
/// kind in both directions and assigns identifiers.
#[derive(Debug, Clone)]
pub struct MemoryFactory {
    types: Arc<ResourceTypes>,
}

impl MemoryFactory {
    /// Creates a factory over the given types.
    pub fn new(types: Arc<ResourceTypes>) -> Self {
        Self { types }
    }
}

impl ResourceFactory for MemoryFactory {
    type Record = Resource;

    fn to_record(&self, resource: &Resource) -> StorageResult<Resource> {
        self.types.resolve(resource.kind())?;
        let mut record = resource.clone();
        if record.id().is_none() {
            record.set_id(ResourceId::generate());
        }
        Ok(record)
    }

    fn to_resource(&self, record: Resource) -> StorageResult<Resource> {
        self.types.resolve(record.kind())?;
        Ok(record)
    }

    fn resource_types(&self) -> &ResourceTypes {
        &self.types
    }
}

pub(super) struct MemoryInner {
    pub(super) types: Arc<ResourceTypes>,
    pub(super) factory: MemoryFactory,
    pub(super) scope: String,
    pub(super) records: RwLock<BTreeMap<ResourceId, Resource>>,
}

/// Metadata adapter keeping records in process memory.
#[derive(Clone)]
pub struct MemoryAdapter {
    pub(super) inner: Arc<MemoryInner>,
}

impl Debug for MemoryAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryAdapter")
            .field("scope", &self.inner.scope)
            .field("records", &self.len())
            .finish()
    }
}

impl MemoryAdapter {
    /// Creates an empty adapter.
    pub fn new(types: Arc<ResourceTypes>) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                factory: MemoryFactory::new(types.clone()),
                types,
                scope: format!("memory:{}", uuid::Uuid::new_v4()),
                records: RwLock::new(BTreeMap::new()),
            }),
        }
    }

    /// Returns the number of stored records.
    pub fn len(&self) -> usize {
        self.inner.records.read().len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.inner.records.read().is_empty()
    }

    /// Returns a copy of every stored resource in identifier order.
    pub fn snapshot(&self) -> Vec<Resource> {
        self.inner.records.read().values().cloned().collect()
    }

    /// Returns the adapter's factory.
    pub fn factory(&self) -> &MemoryFactory {
        &self.inner.factory
    }

    /// Returns the scope the adapter issues lock tokens under.
    pub fn lock_scope(&self) -> &str {
        &self.inner.scope
    }

    pub(super) fn stored_meta(record: &Resource, scope: &str) -> Option<StoredMeta> {
        Some(StoredMeta {
            created_at: record.created_at()?,
            updated_at: record.updated_at()?,
            lock_token: record.lock_token(scope),
        })
    }
}

impl MetadataAdapter for MemoryAdapter {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn persister(&self) -> Arc<dyn Persister> {
        Arc::new(MemoryPersister::new(self.clone()))
    }

    fn query_service(&self) -> Arc<dyn QueryService> {
        Arc::new(MemoryQueryService::new(self.clone()))
    }

    fn resource_types(&self) -> &Arc<ResourceTypes> {
        &self.inner.types
    }
}
