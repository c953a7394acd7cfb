//! Removing deleted resources from their parents.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use crate::core::{MetadataAdapter, Persister, QueryService};
use crate::error::StorageResult;
use crate::types::Resource;

/// Deletes a resource after dropping it from every parent's `member_ids`.
///
/// Every occurrence is removed, so a parent listing the resource twice
/// loses both entries. Parents are re-saved through the wrapped persister
/// before the delete.
#[derive(Clone)]
pub struct ParentCleanupPersister {
    persister: Arc<dyn Persister>,
    query_service: Arc<dyn QueryService>,
}

impl std::fmt::Debug for ParentCleanupPersister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParentCleanupPersister")
            .field("adapter", &self.persister.adapter().backend_name())
            .finish_non_exhaustive()
    }
}

impl ParentCleanupPersister {
    /// Wraps `persister`; parents are looked up with `query_service`.
    pub fn new(persister: Arc<dyn Persister>, query_service: Arc<dyn QueryService>) -> Self {
        Self {
            persister,
            query_service,
        }
    }
}

#[async_trait]
impl Persister for ParentCleanupPersister {
    fn adapter(&self) -> Arc<dyn MetadataAdapter> {
        self.persister.adapter()
    }

    async fn save(&self, resource: &Resource) -> StorageResult<Resource> {
        self.persister.save(resource).await
    }

    async fn save_all(&self, resources: &[Resource]) -> StorageResult<Vec<Resource>> {
        self.persister.save_all(resources).await
    }

    #[instrument(skip_all, fields(id = ?resource.id()))]
    async fn delete(&self, resource: &Resource) -> StorageResult<()> {
        if let Some(id) = resource.id() {
            for mut parent in self.query_service.find_parents(resource).await? {
                let removed = parent.remove_member(id);
                self.persister.save(&parent).await?;
                tracing::debug!(
                    parent = ?parent.id(),
                    removed,
                    "Removed deleted member from parent"
                );
            }
        }
        self.persister.delete(resource).await
    }

    async fn wipe(&self) -> StorageResult<()> {
        self.persister.wipe().await
    }
}
