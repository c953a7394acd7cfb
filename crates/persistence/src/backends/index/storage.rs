//! Persister and QueryService implementations for the search-index backend.

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{MetadataAdapter, Persister, QueryService, ResourceFactory, SaveStamp};
use crate::error::{StorageError, StorageResult};
use crate::mapping::index::id_term;
use crate::types::{
    ALTERNATE_IDS, PageRequest, PropertyValue, Resource, ResourceId, ResourcePage,
};

use super::IndexAdapter;
use super::client::IndexQuery;
use super::factory::{IndexFactory, KIND_FIELD, MEMBER_IDS_FIELD};

/// Matches `term` in any field form of `attribute`, nested lists included.
fn attribute_holds(factory: &IndexFactory, attribute: &str, terms: &[String]) -> IndexQuery {
    let fields = [
        factory.single_field(attribute),
        factory.multi_field(attribute),
        factory.nested_field(attribute),
    ];
    IndexQuery::AnyOf(
        terms
            .iter()
            .flat_map(|term| {
                fields
                    .iter()
                    .map(|field| IndexQuery::term(field.clone(), term.clone()))
            })
            .collect(),
    )
}

/// Persister writing into an [`IndexAdapter`].
#[derive(Debug, Clone)]
pub struct IndexPersister {
    adapter: IndexAdapter,
}

impl IndexPersister {
    /// Creates a persister for the adapter.
    pub fn new(adapter: IndexAdapter) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl Persister for IndexPersister {
    fn adapter(&self) -> Arc<dyn MetadataAdapter> {
        Arc::new(self.adapter.clone())
    }

    async fn save(&self, resource: &Resource) -> StorageResult<Resource> {
        let inner = &self.adapter.inner;
        let factory = &inner.factory;

        let stored = match resource.id() {
            Some(id) => inner
                .client
                .get(id)
                .await?
                .map(|doc| factory.stored_meta(&doc))
                .transpose()?,
            None => None,
        };
        let stamp = SaveStamp::prepare(&inner.types, factory.scope(), resource, stored.as_ref())?;
        let document = factory.to_record(&stamp.apply(factory.scope(), resource))?;

        inner.client.add(document.clone()).await?;
        tracing::debug!(
            id = %stamp.id,
            kind = %resource.kind(),
            engine = inner.client.name(),
            "Indexed resource"
        );

        factory.to_resource(document)
    }

    async fn delete(&self, resource: &Resource) -> StorageResult<()> {
        let Some(id) = resource.id() else {
            return Ok(());
        };
        let existed = self.adapter.inner.client.delete(id).await?;
        tracing::debug!(id = %id, existed, "Removed resource from index");
        Ok(())
    }

    async fn wipe(&self) -> StorageResult<()> {
        self.adapter.inner.client.clear().await
    }
}

/// Query service reading from an [`IndexAdapter`].
#[derive(Debug, Clone)]
pub struct IndexQueryService {
    adapter: IndexAdapter,
}

impl IndexQueryService {
    /// Creates a query service for the adapter.
    pub fn new(adapter: IndexAdapter) -> Self {
        Self { adapter }
    }

    /// Collects every match, batch by batch, in identifier order.
    async fn collect(&self, query: &IndexQuery) -> StorageResult<Vec<Resource>> {
        let inner = &self.adapter.inner;
        let batch = inner.config.batch_size.max(1);
        let mut found = Vec::new();
        let mut after: Option<ResourceId> = None;
        loop {
            let documents = inner.client.query(query, after.as_ref(), batch).await?;
            let full = documents.len() == batch;
            for document in documents {
                let resource = inner.factory.to_resource(document)?;
                after = resource.id().cloned();
                found.push(resource);
            }
            if !full {
                return Ok(found);
            }
        }
    }
}

#[async_trait]
impl QueryService for IndexQueryService {
    fn adapter(&self) -> Arc<dyn MetadataAdapter> {
        Arc::new(self.adapter.clone())
    }

    async fn find_by_id(&self, id: &ResourceId) -> StorageResult<Resource> {
        match self.adapter.inner.client.get(id).await? {
            Some(document) => self.adapter.inner.factory.to_resource(document),
            None => Err(StorageError::not_found(id.as_str())),
        }
    }

    async fn find_by_alternate_identifier(&self, id: &ResourceId) -> StorageResult<Resource> {
        let inner = &self.adapter.inner;
        let writer = crate::mapping::index::writer();
        let terms = vec![
            id_term(id),
            writer.map(&PropertyValue::String(id.to_string()))?,
            writer.map(&PropertyValue::Uri(id.to_string()))?,
        ];
        let query = attribute_holds(&inner.factory, ALTERNATE_IDS, &terms);
        inner
            .client
            .query(&query, None, 1)
            .await?
            .into_iter()
            .next()
            .map(|document| inner.factory.to_resource(document))
            .unwrap_or_else(|| Err(StorageError::not_found(id.as_str())))
    }

    async fn fetch_page(
        &self,
        kind: Option<&str>,
        page: &PageRequest,
    ) -> StorageResult<ResourcePage> {
        let inner = &self.adapter.inner;
        let query = match kind {
            Some(kind) => IndexQuery::term(KIND_FIELD, kind),
            None => IndexQuery::MatchAll,
        };
        let fetched = inner
            .client
            .query(&query, page.after_id(), page.limit + 1)
            .await?
            .into_iter()
            .map(|document| inner.factory.to_resource(document))
            .collect::<StorageResult<Vec<_>>>()?;
        Ok(ResourcePage::from_overfetch(fetched, page.limit))
    }

    async fn count_all_of_type(&self, kind: &str) -> StorageResult<u64> {
        self.adapter
            .inner
            .client
            .count(&IndexQuery::term(KIND_FIELD, kind))
            .await
    }

    async fn find_inverse_references_by(
        &self,
        resource: &Resource,
        property: &str,
    ) -> StorageResult<Vec<Resource>> {
        let Some(id) = resource.id() else {
            return Ok(Vec::new());
        };
        self.collect(&attribute_holds(&self.adapter.inner.factory, property, &[id_term(id)]))
            .await
    }

    async fn find_parents(&self, resource: &Resource) -> StorageResult<Vec<Resource>> {
        let Some(id) = resource.id() else {
            return Ok(Vec::new());
        };
        self.collect(&IndexQuery::term(MEMBER_IDS_FIELD, id_term(id)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::index::{IndexBackendConfig, MemoryIndex};
    use crate::types::{ResourceDefinition, ResourceTypes};

    fn adapter(batch_size: usize) -> IndexAdapter {
        IndexAdapter::with_config(
            Arc::new(MemoryIndex::new()),
            IndexBackendConfig { batch_size },
            Arc::new(
                ResourceTypes::new()
                    .with(ResourceDefinition::new("Book"))
                    .with(ResourceDefinition::new("Page")),
            ),
        )
    }

    #[tokio::test]
    async fn test_parents_are_collected_across_batches() {
        let adapter = adapter(2);
        let persister = adapter.persister();
        let page = persister.save(&Resource::new("Page").with_id("p")).await.unwrap();
        for id in ["b1", "b2", "b3", "b4", "b5"] {
            persister
                .save(&Resource::new("Book").with_id(id).with_members(["p", "p"]))
                .await
                .unwrap();
        }

        let parents = adapter.query_service().find_parents(&page).await.unwrap();
        assert_eq!(parents.len(), 5);
    }

    #[tokio::test]
    async fn test_inverse_references_do_not_match_strings() {
        let adapter = adapter(10);
        let persister = adapter.persister();
        let page = persister.save(&Resource::new("Page").with_id("p")).await.unwrap();
        persister
            .save(&Resource::new("Book").with_id("ref").with("first", ResourceId::new("p")))
            .await
            .unwrap();
        persister
            .save(&Resource::new("Book").with_id("str").with("first", "p"))
            .await
            .unwrap();

        let found = adapter
            .query_service()
            .find_inverse_references_by(&page, "first")
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id().unwrap().as_str(), "ref");
    }

    #[tokio::test]
    async fn test_alternate_identifier_as_string_or_reference() {
        let adapter = adapter(10);
        let persister = adapter.persister();
        persister
            .save(&Resource::new("Book").with_id("b1").with(ALTERNATE_IDS, vec!["id-escaped"]))
            .await
            .unwrap();
        persister
            .save(&Resource::new("Book").with_id("b2").with(ALTERNATE_IDS, ResourceId::new("ark:1")))
            .await
            .unwrap();

        let query = adapter.query_service();
        let first = query
            .find_by_alternate_identifier(&ResourceId::new("id-escaped"))
            .await
            .unwrap();
        assert_eq!(first.id().unwrap().as_str(), "b1");
        let second = query
            .find_by_alternate_identifier(&ResourceId::new("ark:1"))
            .await
            .unwrap();
        assert_eq!(second.id().unwrap().as_str(), "b2");
    }
}
