//! Trellis Metadata Persistence Layer
//!
//! This crate stores and retrieves typed metadata resources through
//! interchangeable backends. Every backend exposes the same pair of
//! services, a [`Persister`](core::Persister) for writes and a
//! [`QueryService`](core::QueryService) for reads, so callers never depend
//! on the storage technology.
//!
//! # Features
//!
//! - **Resource model**: typed resources with ordered membership, arbitrary
//!   attributes and backend-assigned identity and timestamps
//! - **Value mapping**: open, registry-based conversion between attribute
//!   values and each backend's native representation
//! - **Decorators**: composite, buffered-index, append and parent-cleanup
//!   persisters that wrap any backend
//! - **Registries**: named metadata and blob storage adapters, built from a
//!   JSON configuration
//!
//! # Backend Features
//!
//! Enable backends with feature flags in `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! trellis-persistence = { version = "0.1", features = ["elasticsearch"] }
//! ```
//!
//! - `sqlite` (default) - JSON documents in SQLite, in-memory or file
//! - `elasticsearch` - Elasticsearch as the engine of the search-index backend
//!
//! The in-memory backend and the in-process search index are always
//! available.
//!
//! # Architecture
//!
//! - [`types`] - Resources, identifiers, attribute values and pagination
//! - [`error`] - Error types for all operations
//! - [`mapping`] - Value mappers per backend value family
//! - [`core`] - Adapter, persister and query service traits
//! - [`backends`] - Memory, SQLite and search-index implementations
//! - [`composite`] - Persister decorators
//! - [`registry`] - Adapter registries and [`PersistenceContext`]
//! - [`storage`] - Blob storage adapters
//! - [`config`] - JSON configuration
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use trellis_persistence::backends::memory::MemoryAdapter;
//! use trellis_persistence::core::MetadataAdapter;
//! use trellis_persistence::types::{Resource, ResourceDefinition, ResourceTypes};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let types = Arc::new(
//!     ResourceTypes::new()
//!         .with(ResourceDefinition::new("Book"))
//!         .with(ResourceDefinition::new("Page")),
//! );
//! let adapter = MemoryAdapter::new(types);
//! let persister = adapter.persister();
//! let query = adapter.query_service();
//!
//! let page = persister.save(&Resource::new("Page").with("title", "Preface")).await.unwrap();
//! let book = persister
//!     .save(&Resource::new("Book").with_members([page.id().unwrap()]))
//!     .await
//!     .unwrap();
//!
//! let members = query.find_members(&book).await.unwrap();
//! assert_eq!(members[0].get("title").and_then(|v| v.as_str()), Some("Preface"));
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod composite;
pub mod config;
pub mod core;
pub mod error;
pub mod mapping;
pub mod registry;
pub mod storage;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{StorageError, StorageResult};
pub use types::{PropertyValue, Resource, ResourceId, ResourceTypes};

// Re-export core traits
pub use core::{MetadataAdapter, Persister, QueryService, QueryServiceExt, ResourceFactory};

// Re-export registries and configuration
pub use config::PersistenceConfig;
pub use registry::{AdapterRegistry, PersistenceContext, StorageAdapterRegistry};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
