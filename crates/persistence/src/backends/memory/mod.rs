//! In-memory backend.
//!
//! Records live in an ordered map owned by one [`MemoryAdapter`] instance.
//! Clones of the adapter share the map; separately constructed adapters
//! never do. Individual operations are atomic with respect to each other,
//! but there is no multi-operation isolation.
//!
//! The backend is used directly in tests and as the staging area of the
//! buffered indexing persister.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use trellis_persistence::backends::memory::MemoryAdapter;
//! use trellis_persistence::core::MetadataAdapter;
//! use trellis_persistence::types::{ResourceDefinition, ResourceTypes};
//!
//! let types = Arc::new(ResourceTypes::new().with(ResourceDefinition::new("Book")));
//! let adapter = MemoryAdapter::new(types);
//! assert_eq!(adapter.backend_name(), "memory");
//! assert!(adapter.is_empty());
//! ```

mod backend;
mod storage;

pub use backend::{MemoryAdapter, MemoryFactory};
pub use storage::{MemoryPersister, MemoryQueryService};
