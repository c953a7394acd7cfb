//! Metadata adapter implementations.
//!
//! Each backend provides a [`ResourceFactory`](crate::core::ResourceFactory),
//! a [`Persister`](crate::core::Persister), a
//! [`QueryService`](crate::core::QueryService) and the adapter bundling them.
//!
//! # Available Backends
//!
//! | Backend | Feature | Description |
//! |---------|---------|-------------|
//! | Memory | - | Process-local map, for tests and staging |
//! | SQLite | `sqlite` | JSON documents in one table, in-memory or file-based |
//! | Search index | - | Flat term documents in an [`index::IndexClient`] |
//! | Elasticsearch | `elasticsearch` | Index client for a real cluster |
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "sqlite")]
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use trellis_persistence::backends::sqlite::SqliteAdapter;
//! use trellis_persistence::types::{ResourceDefinition, ResourceTypes};
//!
//! let types = Arc::new(ResourceTypes::new().with(ResourceDefinition::new("Book")));
//!
//! // In-memory database
//! let adapter = SqliteAdapter::in_memory(types.clone())?;
//!
//! // Or a file-based database
//! let adapter = SqliteAdapter::open("./data/metadata.db", types)?;
//! adapter.init_schema()?;
//! # Ok(())
//! # }
//! ```

pub mod index;
pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "elasticsearch")]
pub mod elasticsearch;
