//! Appending saved resources to a parent's members.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::instrument;

use crate::core::{MetadataAdapter, Persister, QueryService};
use crate::error::StorageResult;
use crate::types::{Resource, ResourceId};

/// A resource submitted for saving, with an optional parent to append it to.
///
/// Change sets arrive validated; the persistence layer only reads them.
pub trait ChangeSet: Send + Sync {
    /// The resource to save.
    fn resource(&self) -> &Resource;

    /// Identifier of the parent the saved resource joins as a member.
    fn append_id(&self) -> Option<&ResourceId>;
}

/// Plain [`ChangeSet`].
#[derive(Debug, Clone)]
pub struct ResourceChangeSet {
    resource: Resource,
    append_id: Option<ResourceId>,
}

impl ResourceChangeSet {
    /// Creates a change set without a parent.
    pub fn new(resource: Resource) -> Self {
        Self {
            resource,
            append_id: None,
        }
    }

    /// Sets the parent to append to.
    pub fn with_append_id(mut self, parent: impl Into<ResourceId>) -> Self {
        self.append_id = Some(parent.into());
        self
    }
}

impl ChangeSet for ResourceChangeSet {
    fn resource(&self) -> &Resource {
        &self.resource
    }

    fn append_id(&self) -> Option<&ResourceId> {
        self.append_id.as_ref()
    }
}

/// Builds an [`AppendPersister`] per request.
#[derive(Clone)]
pub struct AppendPersisterFactory {
    persister: Arc<dyn Persister>,
    query_service: Arc<dyn QueryService>,
    auxiliary: Arc<dyn Persister>,
}

impl std::fmt::Debug for AppendPersisterFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppendPersisterFactory")
            .field("adapter", &self.persister.adapter().backend_name())
            .finish_non_exhaustive()
    }
}

impl AppendPersisterFactory {
    /// Creates a factory.
    ///
    /// `persister` saves the child, `query_service` loads the parent and
    /// `auxiliary` re-saves it (typically an index-aware persister).
    pub fn new(
        persister: Arc<dyn Persister>,
        query_service: Arc<dyn QueryService>,
        auxiliary: Arc<dyn Persister>,
    ) -> Self {
        Self {
            persister,
            query_service,
            auxiliary,
        }
    }

    /// Builds a persister that appends to the change set's parent, if any.
    pub fn for_change_set(&self, change_set: &dyn ChangeSet) -> AppendPersister {
        AppendPersister {
            persister: self.persister.clone(),
            query_service: self.query_service.clone(),
            auxiliary: self.auxiliary.clone(),
            pending: Mutex::new(change_set.append_id().cloned()),
        }
    }
}

/// Saves a resource, then appends it to a pending parent.
///
/// The pending target is consumed by the first save; later saves through
/// the same persister append nothing.
pub struct AppendPersister {
    persister: Arc<dyn Persister>,
    query_service: Arc<dyn QueryService>,
    auxiliary: Arc<dyn Persister>,
    pending: Mutex<Option<ResourceId>>,
}

impl std::fmt::Debug for AppendPersister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppendPersister")
            .field("pending", &*self.pending.lock())
            .finish_non_exhaustive()
    }
}

impl AppendPersister {
    /// Returns the parent the next save appends to.
    pub fn pending_target(&self) -> Option<ResourceId> {
        self.pending.lock().clone()
    }
}

#[async_trait]
impl Persister for AppendPersister {
    fn adapter(&self) -> Arc<dyn MetadataAdapter> {
        self.persister.adapter()
    }

    #[instrument(skip_all, fields(kind = %resource.kind()))]
    async fn save(&self, resource: &Resource) -> StorageResult<Resource> {
        let saved = self.persister.save(resource).await?;
        let target = self.pending.lock().take();
        if let Some(parent_id) = target {
            let child_id = saved.require_id()?.clone();
            let mut parent = self.query_service.find_by_id(&parent_id).await?;
            parent.push_member(child_id.clone());
            self.auxiliary.save(&parent).await?;
            tracing::debug!(parent = %parent_id, child = %child_id, "Appended member");
        }
        Ok(saved)
    }

    async fn delete(&self, resource: &Resource) -> StorageResult<()> {
        self.persister.delete(resource).await
    }

    async fn wipe(&self) -> StorageResult<()> {
        self.persister.wipe().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryAdapter;
    use crate::types::{ResourceDefinition, ResourceTypes};

    fn adapter() -> MemoryAdapter {
        MemoryAdapter::new(Arc::new(
            ResourceTypes::new()
                .with(ResourceDefinition::new("Book"))
                .with(ResourceDefinition::new("Page")),
        ))
    }

    #[tokio::test]
    async fn test_target_is_consumed_by_first_save() {
        let adapter = adapter();
        let factory = AppendPersisterFactory::new(
            adapter.persister(),
            adapter.query_service(),
            adapter.persister(),
        );
        let book = adapter.persister().save(&Resource::new("Book")).await.unwrap();

        let change_set =
            ResourceChangeSet::new(Resource::new("Page")).with_append_id(book.id().unwrap());
        let append = factory.for_change_set(&change_set);
        assert_eq!(append.pending_target().as_ref(), book.id());

        let page = append.save(change_set.resource()).await.unwrap();
        assert!(append.pending_target().is_none());
        append.save(&page).await.unwrap();

        let book = adapter.query_service().find_by_id(book.id().unwrap()).await.unwrap();
        assert_eq!(book.member_ids(), &[page.id().unwrap().clone()]);
    }

    #[tokio::test]
    async fn test_missing_parent_fails_after_child_is_saved() {
        let adapter = adapter();
        let factory = AppendPersisterFactory::new(
            adapter.persister(),
            adapter.query_service(),
            adapter.persister(),
        );
        let change_set = ResourceChangeSet::new(Resource::new("Page")).with_append_id("gone");
        let err = factory
            .for_change_set(&change_set)
            .save(change_set.resource())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(adapter.len(), 1);
    }
}
