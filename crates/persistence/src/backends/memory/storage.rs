//! Persister and QueryService implementations for the in-memory backend.

use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{MetadataAdapter, Persister, QueryService, ResourceFactory, SaveStamp};
use crate::error::{StorageError, StorageResult};
use crate::types::{ALTERNATE_IDS, PageRequest, Resource, ResourceId, ResourcePage};

use super::MemoryAdapter;

/// Persister writing into a [`MemoryAdapter`].
#[derive(Debug, Clone)]
pub struct MemoryPersister {
    adapter: MemoryAdapter,
}

impl MemoryPersister {
    /// Creates a persister for the adapter.
    pub fn new(adapter: MemoryAdapter) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl Persister for MemoryPersister {
    fn adapter(&self) -> Arc<dyn MetadataAdapter> {
        Arc::new(self.adapter.clone())
    }

    async fn save(&self, resource: &Resource) -> StorageResult<Resource> {
        let inner = &self.adapter.inner;
        let mut records = inner.records.write();

        let stored = resource
            .id()
            .and_then(|id| records.get(id))
            .and_then(|r| MemoryAdapter::stored_meta(r, &inner.scope));
        let stamp = SaveStamp::prepare(&inner.types, &inner.scope, resource, stored.as_ref())?;
        let record = inner.factory.to_record(&stamp.apply(&inner.scope, resource))?;

        records.insert(stamp.id.clone(), record.clone());
        tracing::debug!(id = %stamp.id, kind = %resource.kind(), "Saved resource in memory");

        inner.factory.to_resource(record)
    }

    async fn delete(&self, resource: &Resource) -> StorageResult<()> {
        let Some(id) = resource.id() else {
            return Ok(());
        };
        let removed = self.adapter.inner.records.write().remove(id);
        tracing::debug!(id = %id, existed = removed.is_some(), "Deleted resource from memory");
        Ok(())
    }

    async fn wipe(&self) -> StorageResult<()> {
        self.adapter.inner.records.write().clear();
        Ok(())
    }
}

/// Query service reading from a [`MemoryAdapter`].
#[derive(Debug, Clone)]
pub struct MemoryQueryService {
    adapter: MemoryAdapter,
}

impl MemoryQueryService {
    /// Creates a query service for the adapter.
    pub fn new(adapter: MemoryAdapter) -> Self {
        Self { adapter }
    }

    /// Reconstructs every record matching the predicate, in identifier order.
    fn scan(&self, predicate: impl Fn(&Resource) -> bool) -> StorageResult<Vec<Resource>> {
        let factory = self.adapter.factory();
        self.adapter
            .inner
            .records
            .read()
            .values()
            .filter(|r| predicate(r))
            .map(|r| factory.to_resource(r.clone()))
            .collect()
    }
}

#[async_trait]
impl QueryService for MemoryQueryService {
    fn adapter(&self) -> Arc<dyn MetadataAdapter> {
        Arc::new(self.adapter.clone())
    }

    async fn find_by_id(&self, id: &ResourceId) -> StorageResult<Resource> {
        let record = self.adapter.inner.records.read().get(id).cloned();
        match record {
            Some(record) => self.adapter.factory().to_resource(record),
            None => Err(StorageError::not_found(id.as_str())),
        }
    }

    async fn find_by_alternate_identifier(&self, id: &ResourceId) -> StorageResult<Resource> {
        self.scan(|r| r.get(ALTERNATE_IDS).is_some_and(|v| v.has_identifier(id)))?
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::not_found(id.as_str()))
    }

    async fn fetch_page(
        &self,
        kind: Option<&str>,
        page: &PageRequest,
    ) -> StorageResult<ResourcePage> {
        let lower = match page.after_id() {
            Some(id) => Bound::Excluded(id.clone()),
            None => Bound::Unbounded,
        };
        let factory = self.adapter.factory();
        let fetched = self
            .adapter
            .inner
            .records
            .read()
            .range((lower, Bound::Unbounded))
            .map(|(_, r)| r)
            .filter(|r| kind.is_none_or(|k| r.kind() == k))
            .take(page.limit + 1)
            .map(|r| factory.to_resource(r.clone()))
            .collect::<StorageResult<Vec<_>>>()?;
        Ok(ResourcePage::from_overfetch(fetched, page.limit))
    }

    async fn count_all_of_type(&self, kind: &str) -> StorageResult<u64> {
        let records = self.adapter.inner.records.read();
        Ok(records.values().filter(|r| r.kind() == kind).count() as u64)
    }

    async fn find_inverse_references_by(
        &self,
        resource: &Resource,
        property: &str,
    ) -> StorageResult<Vec<Resource>> {
        let Some(id) = resource.id() else {
            return Ok(Vec::new());
        };
        self.scan(|r| r.get(property).is_some_and(|v| v.contains_id(id)))
    }

    async fn find_parents(&self, resource: &Resource) -> StorageResult<Vec<Resource>> {
        let Some(id) = resource.id() else {
            return Ok(Vec::new());
        };
        self.scan(|r| r.member_ids().contains(id))
    }
}
