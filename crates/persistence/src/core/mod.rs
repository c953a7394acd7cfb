//! Core persistence traits.
//!
//! - [`MetadataAdapter`] - A persister and query service bound to one backend
//! - [`Persister`] - Create, update and delete of single resource records
//! - [`QueryService`] - Lookups, relationship queries and paged scans
//! - [`ResourceFactory`] - Resource to backend record translation
//!
//! ```text
//! MetadataAdapter
//!     ├── Persister ──────┐
//!     └── QueryService    ├── ResourceFactory ── ValueMapper
//!             └── QueryServiceExt (find_all, find_all_of_type)
//! ```
//!
//! Decorators in [`crate::composite`] implement [`Persister`] themselves, so
//! they can wrap any backend and each other.

mod adapter;
mod persister;
mod query;

pub use adapter::{MetadataAdapter, ResourceFactory};
pub use persister::{Persister, SaveStamp, StoredMeta};
pub use query::{QueryService, QueryServiceExt, ResourceScan};
