//! SQLite document backend.
//!
//! Each resource is one row of `orm_resources`; its attributes live in a
//! JSON document in the `metadata` column and are queried with SQLite's
//! JSON1 functions. Both in-memory databases (for tests) and file-based
//! databases are supported.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use trellis_persistence::backends::sqlite::SqliteAdapter;
//! use trellis_persistence::types::{ResourceDefinition, ResourceTypes};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let types = ResourceTypes::new().with(ResourceDefinition::new("Book"));
//! let adapter = SqliteAdapter::in_memory(Arc::new(types))?;
//! adapter.init_schema()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE orm_resources (
//!     id TEXT NOT NULL PRIMARY KEY,
//!     internal_resource TEXT NOT NULL,
//!     metadata TEXT NOT NULL DEFAULT '{}',  -- attribute document
//!     created_at TEXT NOT NULL,
//!     updated_at TEXT NOT NULL,
//!     lock_version INTEGER
//! );
//! ```

mod backend;
mod factory;
mod schema;
mod storage;

pub use backend::{SqliteAdapter, SqliteBackendConfig};
pub use factory::{DocumentFactory, DocumentRecord, RawRow};
pub use schema::{SCHEMA_VERSION, get_schema_version, initialize_schema};
pub use storage::{SqlitePersister, SqliteQueryService};
