//! Buffered index writes.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::instrument;

use crate::backends::memory::MemoryAdapter;
use crate::core::{MetadataAdapter, Persister};
use crate::error::StorageResult;
use crate::types::{Resource, ResourceId};

use super::chain::CompositePersister;

/// Writes to a primary persister and mirrors batches into an index.
///
/// Plain `save` and `delete` reach the primary only. Work that should also
/// be indexed runs inside [`buffer_into_index`](Self::buffer_into_index):
/// its writes are staged in memory and replayed to the index once the
/// block succeeds.
#[derive(Clone)]
pub struct BufferedPersister {
    primary: Arc<dyn Persister>,
    index: Arc<dyn Persister>,
}

impl std::fmt::Debug for BufferedPersister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedPersister")
            .field("primary", &self.primary.adapter().backend_name())
            .field("index", &self.index.adapter().backend_name())
            .finish()
    }
}

impl BufferedPersister {
    /// Creates a buffered persister.
    pub fn new(primary: Arc<dyn Persister>, index: Arc<dyn Persister>) -> Self {
        Self { primary, index }
    }

    /// Returns the index persister.
    pub fn index(&self) -> &Arc<dyn Persister> {
        &self.index
    }

    /// Runs `block` with a persister writing to the primary and a staging
    /// area.
    ///
    /// When the block returns `Ok`, every staged save is replayed to the
    /// index with `save_all`, then every staged delete. When it returns
    /// `Err`, the staged writes are dropped and the index is untouched;
    /// primary writes made by the block remain.
    ///
    /// ```ignore
    /// let book = buffered
    ///     .buffer_into_index(|persister| async move {
    ///         let page = persister.save(&Resource::new("Page")).await?;
    ///         persister.save(&Resource::new("Book").with_members([page.id().unwrap()])).await
    ///     })
    ///     .await?;
    /// ```
    #[instrument(skip_all)]
    pub async fn buffer_into_index<F, Fut, T>(&self, block: F) -> StorageResult<T>
    where
        F: FnOnce(Arc<dyn Persister>) -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        let types = self.index.adapter().resource_types().clone();
        let staging = Arc::new(StagingPersister::new(MemoryAdapter::new(types)));
        let composite = CompositePersister::new(self.primary.clone()).with(staging.clone());

        let value = match block(Arc::new(composite)).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    staged = staging.adapter.len(),
                    error = %e,
                    "Buffered block failed; discarding staged index writes"
                );
                return Err(e);
            }
        };

        let saves = staging.adapter.snapshot();
        let deletes = staging.take_deletes();
        tracing::debug!(
            saves = saves.len(),
            deletes = deletes.len(),
            "Replaying staged writes to index"
        );
        self.index.save_all(&saves).await?;
        for resource in &deletes {
            self.index.delete(resource).await?;
        }
        Ok(value)
    }
}

#[async_trait]
impl Persister for BufferedPersister {
    fn adapter(&self) -> Arc<dyn MetadataAdapter> {
        self.primary.adapter()
    }

    async fn save(&self, resource: &Resource) -> StorageResult<Resource> {
        self.primary.save(resource).await
    }

    async fn save_all(&self, resources: &[Resource]) -> StorageResult<Vec<Resource>> {
        self.primary.save_all(resources).await
    }

    async fn delete(&self, resource: &Resource) -> StorageResult<()> {
        self.primary.delete(resource).await
    }

    /// Wipes the primary and the index.
    async fn wipe(&self) -> StorageResult<()> {
        self.primary.wipe().await?;
        self.index.wipe().await
    }
}

/// Memory persister that also remembers deletions.
struct StagingPersister {
    adapter: MemoryAdapter,
    persister: Arc<dyn Persister>,
    deletes: Mutex<BTreeMap<ResourceId, Resource>>,
}

impl StagingPersister {
    fn new(adapter: MemoryAdapter) -> Self {
        Self {
            persister: adapter.persister(),
            adapter,
            deletes: Mutex::new(BTreeMap::new()),
        }
    }

    fn take_deletes(&self) -> Vec<Resource> {
        std::mem::take(&mut *self.deletes.lock())
            .into_values()
            .collect()
    }
}

#[async_trait]
impl Persister for StagingPersister {
    fn adapter(&self) -> Arc<dyn MetadataAdapter> {
        Arc::new(self.adapter.clone())
    }

    async fn save(&self, resource: &Resource) -> StorageResult<Resource> {
        if let Some(id) = resource.id() {
            self.deletes.lock().remove(id);
        }
        self.persister.save(resource).await
    }

    async fn delete(&self, resource: &Resource) -> StorageResult<()> {
        if let Some(id) = resource.id() {
            self.deletes.lock().insert(id.clone(), resource.clone());
        }
        self.persister.delete(resource).await
    }

    async fn wipe(&self) -> StorageResult<()> {
        self.persister.wipe().await
    }
}
