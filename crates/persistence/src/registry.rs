//! Named adapter registries and the persistence context.
//!
//! A [`Registry`] maps symbolic names to shared adapters. Registries are
//! filled at start-up (usually by
//! [`PersistenceConfig::build`](crate::config::PersistenceConfig::build)),
//! then frozen. Tests that need a temporary adapter use
//! [`Registry::scoped`], which restores the previous state on drop.
//!
//! ```
//! use std::sync::Arc;
//! use trellis_persistence::backends::memory::MemoryAdapter;
//! use trellis_persistence::registry::AdapterRegistry;
//! use trellis_persistence::types::{ResourceDefinition, ResourceTypes};
//!
//! let types = Arc::new(ResourceTypes::new().with(ResourceDefinition::new("Book")));
//! let registry = AdapterRegistry::metadata();
//! registry.register("memory", Arc::new(MemoryAdapter::new(types))).unwrap();
//!
//! assert_eq!(registry.find("memory").unwrap().backend_name(), "memory");
//! assert!(registry.find("postgres").is_err());
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::MetadataAdapter;
use crate::error::{RegistryError, StorageResult};
use crate::storage::{BlobStore, FileHandle};
use crate::types::ResourceTypes;

struct RegistryState<T: ?Sized> {
    entries: BTreeMap<String, Arc<T>>,
    frozen: bool,
}

/// A name-to-adapter map shared by reference.
///
/// All operations take `&self`; the map sits behind a `parking_lot::RwLock`.
pub struct Registry<T: ?Sized> {
    label: &'static str,
    state: RwLock<RegistryState<T>>,
}

/// Registry of metadata adapters.
pub type AdapterRegistry = Registry<dyn MetadataAdapter>;

/// Registry of blob storage adapters.
pub type StorageAdapterRegistry = Registry<dyn BlobStore>;

impl<T: ?Sized> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Registry")
            .field("label", &self.label)
            .field("names", &state.entries.keys().collect::<Vec<_>>())
            .field("frozen", &state.frozen)
            .finish()
    }
}

impl<T: ?Sized> Registry<T> {
    /// Creates an empty registry; `label` names it in error messages.
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            state: RwLock::new(RegistryState {
                entries: BTreeMap::new(),
                frozen: false,
            }),
        }
    }

    /// Returns the label used in error messages.
    pub fn label(&self) -> &'static str {
        self.label
    }

    fn frozen_error(&self) -> RegistryError {
        RegistryError::Frozen {
            registry: self.label.to_string(),
        }
    }

    /// Registers `adapter` under `name`.
    pub fn register(&self, name: impl Into<String>, adapter: Arc<T>) -> StorageResult<()> {
        let name = name.into();
        let mut state = self.state.write();
        if state.frozen {
            return Err(self.frozen_error().into());
        }
        if state.entries.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered {
                registry: self.label.to_string(),
                name,
            }
            .into());
        }
        tracing::info!(registry = self.label, name = %name, "Registered adapter");
        state.entries.insert(name, adapter);
        Ok(())
    }

    /// Removes and returns the adapter registered under `name`.
    pub fn unregister(&self, name: &str) -> StorageResult<Arc<T>> {
        let mut state = self.state.write();
        if state.frozen {
            return Err(self.frozen_error().into());
        }
        let adapter = state.entries.remove(name).ok_or_else(|| RegistryError::AdapterNotFound {
            registry: self.label.to_string(),
            name: name.to_string(),
        })?;
        tracing::info!(registry = self.label, name, "Unregistered adapter");
        Ok(adapter)
    }

    /// Looks up an adapter by name.
    pub fn find(&self, name: &str) -> StorageResult<Arc<T>> {
        self.state
            .read()
            .entries
            .get(name)
            .cloned()
            .ok_or_else(|| {
                RegistryError::AdapterNotFound {
                    registry: self.label.to_string(),
                    name: name.to_string(),
                }
                .into()
            })
    }

    /// Returns `true` if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.state.read().entries.contains_key(name)
    }

    /// Returns the registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.state.read().entries.keys().cloned().collect()
    }

    /// Returns the number of registered adapters.
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// Rejects every later change.
    pub fn freeze(&self) {
        let mut state = self.state.write();
        if !state.frozen {
            state.frozen = true;
            tracing::info!(registry = self.label, adapters = state.entries.len(), "Registry frozen");
        }
    }

    /// Returns `true` once [`freeze`](Self::freeze) has been called.
    pub fn is_frozen(&self) -> bool {
        self.state.read().frozen
    }

    /// Registers `adapter` under `name` until the returned guard drops.
    ///
    /// An adapter already registered under `name` is shadowed and comes
    /// back when the guard drops.
    pub fn scoped(&self, name: impl Into<String>, adapter: Arc<T>) -> StorageResult<Scoped<'_, T>> {
        let name = name.into();
        let mut state = self.state.write();
        if state.frozen {
            return Err(self.frozen_error().into());
        }
        let previous = state.entries.insert(name.clone(), adapter);
        tracing::debug!(registry = self.label, name = %name, shadowed = previous.is_some(), "Scoped registration");
        Ok(Scoped {
            registry: self,
            name,
            previous,
        })
    }
}

impl Registry<dyn MetadataAdapter> {
    /// Creates an empty metadata adapter registry.
    pub fn metadata() -> Self {
        Self::new("metadata adapter")
    }
}

impl Registry<dyn BlobStore> {
    /// Creates an empty storage adapter registry.
    pub fn storage() -> Self {
        Self::new("storage adapter")
    }

    /// Returns the first adapter, by name, whose protocol prefix matches `id`.
    pub fn adapter_for(&self, id: &str) -> StorageResult<Arc<dyn BlobStore>> {
        self.state
            .read()
            .entries
            .values()
            .find(|store| store.handles(id))
            .cloned()
            .ok_or_else(|| RegistryError::NoHandler { id: id.to_string() }.into())
    }

    /// Looks up a stored file through the adapter that handles its id.
    pub async fn find_file(&self, id: &str) -> StorageResult<FileHandle> {
        let store = self.adapter_for(id)?;
        store.find_by_id(id).await
    }
}

/// Guard returned by [`Registry::scoped`].
#[must_use = "the registration is removed when the guard drops"]
pub struct Scoped<'a, T: ?Sized> {
    registry: &'a Registry<T>,
    name: String,
    previous: Option<Arc<T>>,
}

impl<T: ?Sized> fmt::Debug for Scoped<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scoped")
            .field("registry", &self.registry.label)
            .field("name", &self.name)
            .finish()
    }
}

impl<T: ?Sized> Scoped<'_, T> {
    /// Returns the scoped name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T: ?Sized> Drop for Scoped<'_, T> {
    fn drop(&mut self) {
        // Restores even when the registry was frozen meanwhile.
        let mut state = self.registry.state.write();
        match self.previous.take() {
            Some(previous) => {
                state.entries.insert(self.name.clone(), previous);
            }
            None => {
                state.entries.remove(&self.name);
            }
        }
    }
}

/// Everything a caller needs to reach persistence: resource types plus the
/// metadata and storage adapter registries.
///
/// Passed explicitly instead of living in process-wide globals.
#[derive(Debug)]
pub struct PersistenceContext {
    types: Arc<ResourceTypes>,
    adapters: AdapterRegistry,
    storage: StorageAdapterRegistry,
}

impl PersistenceContext {
    /// Creates a context with empty, unfrozen registries.
    pub fn new(types: Arc<ResourceTypes>) -> Self {
        Self {
            types,
            adapters: AdapterRegistry::metadata(),
            storage: StorageAdapterRegistry::storage(),
        }
    }

    /// Returns the resource types.
    pub fn types(&self) -> &Arc<ResourceTypes> {
        &self.types
    }

    /// Returns the metadata adapter registry.
    pub fn adapters(&self) -> &AdapterRegistry {
        &self.adapters
    }

    /// Returns the storage adapter registry.
    pub fn storage(&self) -> &StorageAdapterRegistry {
        &self.storage
    }

    /// Shorthand for `adapters().find(name)`.
    pub fn adapter(&self, name: &str) -> StorageResult<Arc<dyn MetadataAdapter>> {
        self.adapters.find(name)
    }

    /// Freezes both registries.
    pub fn freeze(&self) {
        self.adapters.freeze();
        self.storage.freeze();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryAdapter;
    use crate::error::StorageError;
    use crate::storage::MemoryBlobStore;
    use crate::types::ResourceDefinition;

    fn memory() -> Arc<dyn MetadataAdapter> {
        Arc::new(MemoryAdapter::new(Arc::new(
            ResourceTypes::new().with(ResourceDefinition::new("Book")),
        )))
    }

    #[test]
    fn test_register_find_unregister() {
        let registry = AdapterRegistry::metadata();
        registry.register("primary", memory()).unwrap();
        registry.register("index", memory()).unwrap();
        assert_eq!(registry.names(), vec!["index", "primary"]);

        let err = registry.register("primary", memory()).unwrap_err();
        assert_eq!(err.to_string(), "metadata adapter 'primary' is already registered");

        registry.unregister("index").unwrap();
        let err = registry.find("index").unwrap_err();
        assert!(matches!(
            err,
            StorageError::Registry(RegistryError::AdapterNotFound { .. })
        ));
        assert!(registry.unregister("index").is_err());
    }

    #[test]
    fn test_frozen_registry_rejects_changes() {
        let registry = AdapterRegistry::metadata();
        registry.register("primary", memory()).unwrap();
        registry.freeze();

        assert!(registry.is_frozen());
        assert!(registry.register("other", memory()).is_err());
        assert!(registry.unregister("primary").is_err());
        assert!(registry.scoped("tmp", memory()).is_err());
        assert!(registry.find("primary").is_ok());
    }

    #[test]
    fn test_scoped_registration_restores_previous() {
        let registry = AdapterRegistry::metadata();
        let original = memory();
        registry.register("primary", original.clone()).unwrap();

        {
            let replacement = memory();
            let _guard = registry.scoped("primary", replacement.clone()).unwrap();
            let _extra = registry.scoped("extra", memory()).unwrap();
            assert!(Arc::ptr_eq(&registry.find("primary").unwrap(), &replacement));
            assert_eq!(registry.len(), 2);
        }

        assert!(Arc::ptr_eq(&registry.find("primary").unwrap(), &original));
        assert!(!registry.contains("extra"));
    }

    #[tokio::test]
    async fn test_storage_adapter_for_routes_by_prefix() {
        let registry = StorageAdapterRegistry::storage();
        let store = Arc::new(MemoryBlobStore::new());
        registry.register("memory", store.clone()).unwrap();

        let handle = store.upload(b"x", "x.txt", &"owner".into()).await.unwrap();
        assert_eq!(registry.adapter_for(handle.id()).unwrap().backend_name(), "memory");
        assert_eq!(registry.find_file(handle.id()).await.unwrap().bytes().unwrap(), b"x");

        let err = registry.adapter_for("s3://bucket/key").unwrap_err();
        assert_eq!(err.to_string(), "no storage adapter handles 's3://bucket/key'");
    }
}
