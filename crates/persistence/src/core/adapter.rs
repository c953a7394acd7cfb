//! Metadata adapters and resource factories.

use std::sync::Arc;

use crate::error::StorageResult;
use crate::types::{Resource, ResourceTypes};

use super::persister::Persister;
use super::query::QueryService;

/// A persister and query service bound to one backend.
///
/// Adapters are cheap handles (usually an `Arc` around shared backend
/// state) and are registered by name in an
/// [`AdapterRegistry`](crate::registry::AdapterRegistry).
pub trait MetadataAdapter: Send + Sync {
    /// Returns a short name for the backend (e.g. `"sqlite"`).
    fn backend_name(&self) -> &'static str;

    /// Returns the adapter's persister.
    fn persister(&self) -> Arc<dyn Persister>;

    /// Returns the adapter's query service.
    fn query_service(&self) -> Arc<dyn QueryService>;

    /// Returns the resource types records are reconstructed with.
    fn resource_types(&self) -> &Arc<ResourceTypes>;
}

impl std::fmt::Debug for dyn MetadataAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataAdapter")
            .field("backend", &self.backend_name())
            .finish_non_exhaustive()
    }
}

/// Bidirectional translation between resources and one backend's records.
///
/// `to_record` followed by `to_resource` yields an equivalent resource (same
/// identifier, kind, membership and attribute values, up to value-mapper
/// normalization). Both directions reject kinds that are not registered in
/// [`resource_types`](Self::resource_types), so nothing unreadable is ever
/// written.
pub trait ResourceFactory: Send + Sync {
    /// The backend-native record type.
    type Record;

    /// Converts a resource into a record. Resources without an identifier
    /// get a freshly generated one.
    fn to_record(&self, resource: &Resource) -> StorageResult<Self::Record>;

    /// Reconstructs a resource from a record.
    fn to_resource(&self, record: Self::Record) -> StorageResult<Resource>;

    /// Returns the type registry used for dispatch.
    fn resource_types(&self) -> &ResourceTypes;
}
