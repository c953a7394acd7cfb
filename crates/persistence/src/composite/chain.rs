//! Ordered persister chains.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use crate::core::{MetadataAdapter, Persister};
use crate::error::StorageResult;
use crate::types::Resource;

/// Copies lock tokens of scopes `into` does not carry.
///
/// Each backend reconstructs resources with its own token only; a chain's
/// result keeps every adapter's token so the next save is checked
/// everywhere.
pub(crate) fn carry_lock_tokens(from: &Resource, into: &mut Resource) {
    for (scope, token) in from.lock_tokens() {
        if into.lock_token(scope).is_none() {
            into.set_lock_token(scope, Some(*token));
        }
    }
}

/// Threads every write through an ordered list of persisters.
///
/// The output of each persister is the input of the next, so identifiers
/// and timestamps assigned by the first persister are kept downstream.
/// `delete` and `wipe` hit each persister in order. The chain stops at the
/// first failure; earlier persisters keep their writes.
#[derive(Clone)]
pub struct CompositePersister {
    persisters: Vec<Arc<dyn Persister>>,
}

impl std::fmt::Debug for CompositePersister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositePersister")
            .field(
                "adapters",
                &self
                    .persisters
                    .iter()
                    .map(|p| p.adapter().backend_name())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl CompositePersister {
    /// Starts a chain with its first persister.
    pub fn new(first: Arc<dyn Persister>) -> Self {
        Self {
            persisters: vec![first],
        }
    }

    /// Appends a persister to the chain.
    pub fn with(mut self, next: Arc<dyn Persister>) -> Self {
        self.persisters.push(next);
        self
    }

    /// Returns the number of persisters.
    pub fn len(&self) -> usize {
        self.persisters.len()
    }

    /// Always `false`; a chain has at least one persister.
    pub fn is_empty(&self) -> bool {
        self.persisters.is_empty()
    }
}

#[async_trait]
impl Persister for CompositePersister {
    fn adapter(&self) -> Arc<dyn MetadataAdapter> {
        self.persisters[0].adapter()
    }

    #[instrument(skip_all, fields(kind = %resource.kind(), chain = self.persisters.len()))]
    async fn save(&self, resource: &Resource) -> StorageResult<Resource> {
        let mut current = resource.clone();
        for persister in &self.persisters {
            let mut saved = persister.save(&current).await?;
            carry_lock_tokens(&current, &mut saved);
            current = saved;
        }
        Ok(current)
    }

    #[instrument(skip_all, fields(count = resources.len(), chain = self.persisters.len()))]
    async fn save_all(&self, resources: &[Resource]) -> StorageResult<Vec<Resource>> {
        let mut current = resources.to_vec();
        for persister in &self.persisters {
            let mut saved = persister.save_all(&current).await?;
            for (before, after) in current.iter().zip(saved.iter_mut()) {
                carry_lock_tokens(before, after);
            }
            current = saved;
        }
        Ok(current)
    }

    async fn delete(&self, resource: &Resource) -> StorageResult<()> {
        for persister in &self.persisters {
            persister.delete(resource).await?;
        }
        Ok(())
    }

    async fn wipe(&self) -> StorageResult<()> {
        for persister in &self.persisters {
            persister.wipe().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryAdapter;
    use crate::types::{Capability, ResourceDefinition, ResourceTypes};

    fn types() -> Arc<ResourceTypes> {
        Arc::new(
            ResourceTypes::new()
                .with(ResourceDefinition::new("Book").with_capability(Capability::OptimisticLocking)),
        )
    }

    #[tokio::test]
    async fn test_identity_flows_downstream() {
        let first = MemoryAdapter::new(types());
        let second = MemoryAdapter::new(types());
        let chain = CompositePersister::new(first.persister()).with(second.persister());

        let saved = chain.save(&Resource::new("Book")).await.unwrap();
        let id = saved.id().unwrap();
        assert_eq!(first.snapshot()[0].id(), Some(id));
        assert_eq!(second.snapshot()[0].id(), Some(id));
        assert_eq!(second.snapshot()[0].created_at(), first.snapshot()[0].created_at());

        assert_eq!(saved.lock_token(first.lock_scope()), Some(1));
        assert_eq!(saved.lock_token(second.lock_scope()), Some(1));
        let again = chain.save(&saved).await.unwrap();
        assert_eq!(again.lock_token(first.lock_scope()), Some(2));
    }

    #[tokio::test]
    async fn test_delete_and_wipe_hit_every_persister() {
        let first = MemoryAdapter::new(types());
        let second = MemoryAdapter::new(types());
        let chain = CompositePersister::new(first.persister()).with(second.persister());

        let saved = chain
            .save_all(&[Resource::new("Book"), Resource::new("Book")])
            .await
            .unwrap();
        chain.delete(&saved[0]).await.unwrap();
        assert_eq!((first.len(), second.len()), (1, 1));

        chain.wipe().await.unwrap();
        assert!(first.is_empty() && second.is_empty());
        assert_eq!(chain.adapter().backend_name(), "memory");
    }
}
