//! The persister trait and shared save bookkeeping.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::{ConcurrencyError, StorageError, StorageResult};
use crate::types::{Capability, Resource, ResourceId, ResourceTypes};

use super::adapter::MetadataAdapter;

/// Writes and deletes resource records for one backend.
///
/// # Save semantics
///
/// `save` assigns an identifier when the resource has none, keeps the
/// `created_at` of an existing record, moves `updated_at` forward and
/// returns the resource as reconstructed from the written record. Callers
/// must use the returned value; the argument is never mutated.
///
/// # Delete semantics
///
/// Deleting a resource that was never saved, or whose record is already
/// gone, is a no-op.
///
/// # Example
///
/// ```ignore
/// use trellis_persistence::core::Persister;
/// use trellis_persistence::types::Resource;
///
/// async fn example(persister: &dyn Persister) -> StorageResult<()> {
///     let saved = persister.save(&Resource::new("Book").with("title", "Emma")).await?;
///     assert!(saved.id().is_some());
///
///     persister.delete(&saved).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait Persister: Send + Sync {
    /// Returns the adapter that owns this persister.
    fn adapter(&self) -> Arc<dyn MetadataAdapter>;

    /// Creates or updates the resource's record.
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(UnknownResourceType)` - the kind is not registered
    /// * `StorageError::Concurrency(StaleLockToken)` - the caller's copy is stale
    /// * `StorageError::Backend` - the write failed
    async fn save(&self, resource: &Resource) -> StorageResult<Resource>;

    /// Saves each resource in order, stopping at the first failure.
    ///
    /// Resources saved before the failure stay persisted.
    async fn save_all(&self, resources: &[Resource]) -> StorageResult<Vec<Resource>> {
        let mut saved = Vec::with_capacity(resources.len());
        for resource in resources {
            saved.push(self.save(resource).await?);
        }
        Ok(saved)
    }

    /// Removes the resource's record.
    async fn delete(&self, resource: &Resource) -> StorageResult<()>;

    /// Removes every record held by the adapter.
    async fn wipe(&self) -> StorageResult<()>;
}

/// Persistence metadata of an already stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredMeta {
    /// When the record was first written.
    pub created_at: DateTime<Utc>,
    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
    /// Current lock token, if the record carries one.
    pub lock_token: Option<u64>,
}

/// Identity, timestamps and lock token for one save.
///
/// Every backend computes these the same way; [`SaveStamp::prepare`] is the
/// single place that decides them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveStamp {
    /// Identifier the record is written under.
    pub id: ResourceId,
    /// Creation time (preserved across updates).
    pub created_at: DateTime<Utc>,
    /// Modification time, strictly later than the previous one.
    pub updated_at: DateTime<Utc>,
    /// New lock token for kinds with optimistic locking.
    pub lock_token: Option<u64>,
}

impl SaveStamp {
    /// Decides the stamp for saving `resource` over `stored`.
    ///
    /// `scope` identifies the adapter whose lock token is checked.
    pub fn prepare(
        types: &ResourceTypes,
        scope: &str,
        resource: &Resource,
        stored: Option<&StoredMeta>,
    ) -> StorageResult<Self> {
        let definition = types.resolve(resource.kind())?;
        let id = resource
            .id()
            .cloned()
            .unwrap_or_else(ResourceId::generate);

        let lock_token = if definition.has_capability(Capability::OptimisticLocking) {
            let current = stored.and_then(|s| s.lock_token);
            if let (Some(expected), Some(actual)) = (resource.lock_token(scope), current) {
                if expected != actual {
                    return Err(StorageError::Concurrency(ConcurrencyError::StaleLockToken {
                        id: id.to_string(),
                        expected,
                        actual,
                    }));
                }
            }
            Some(current.unwrap_or(0) + 1)
        } else {
            None
        };

        let now = Utc::now();
        let (created_at, updated_at) = match stored {
            Some(meta) if now <= meta.updated_at => {
                (meta.created_at, meta.updated_at + Duration::microseconds(1))
            }
            Some(meta) => (meta.created_at, now),
            // Copies of a resource persisted elsewhere keep its creation time.
            None => (resource.created_at().unwrap_or(now), now),
        };

        Ok(Self {
            id,
            created_at,
            updated_at,
            lock_token,
        })
    }

    /// Returns a copy of the resource carrying this stamp.
    pub fn apply(&self, scope: &str, resource: &Resource) -> Resource {
        let mut stamped = resource.clone();
        stamped.set_persisted(self.id.clone(), self.created_at, self.updated_at);
        stamped.set_lock_token(scope, self.lock_token);
        stamped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResourceDefinition;

    fn types() -> ResourceTypes {
        ResourceTypes::new()
            .with(ResourceDefinition::new("Book").with_capability(Capability::OptimisticLocking))
            .with(ResourceDefinition::new("Page"))
    }

    #[test]
    fn test_new_resource_gets_identity() {
        let stamp = SaveStamp::prepare(&types(), "test", &Resource::new("Page"), None).unwrap();
        assert!(!stamp.id.as_str().is_empty());
        assert_eq!(stamp.created_at, stamp.updated_at);
        assert_eq!(stamp.lock_token, None);
    }

    #[test]
    fn test_update_keeps_created_and_advances_updated() {
        let later = Utc::now() + Duration::seconds(60);
        let stored = StoredMeta {
            created_at: later - Duration::seconds(120),
            updated_at: later,
            lock_token: None,
        };
        let page = Resource::new("Page").with_id("p1");
        let stamp = SaveStamp::prepare(&types(), "test", &page, Some(&stored)).unwrap();
        assert_eq!(stamp.id.as_str(), "p1");
        assert_eq!(stamp.created_at, stored.created_at);
        assert!(stamp.updated_at > stored.updated_at);
    }

    #[test]
    fn test_stale_lock_token_rejected() {
        let stored = StoredMeta {
            created_at: Utc::now(),
            updated_at: Utc::now(),
            lock_token: Some(3),
        };
        let mut book = Resource::new("Book").with_id("b1");
        book.set_lock_token("test", Some(2));
        book.set_lock_token("other", Some(9));
        let err = SaveStamp::prepare(&types(), "test", &book, Some(&stored)).unwrap_err();
        assert!(matches!(
            err,
            StorageError::Concurrency(ConcurrencyError::StaleLockToken { expected: 2, actual: 3, .. })
        ));

        book.set_lock_token("test", Some(3));
        let stamp = SaveStamp::prepare(&types(), "test", &book, Some(&stored)).unwrap();
        assert_eq!(stamp.lock_token, Some(4));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let err = SaveStamp::prepare(&types(), "test", &Resource::new("Chapter"), None).unwrap_err();
        assert!(matches!(err, StorageError::Resource(_)));
    }
}
