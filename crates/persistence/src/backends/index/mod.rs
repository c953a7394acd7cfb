//! Search-index backend.
//!
//! Resources are flattened into documents of string terms (see
//! [`crate::mapping::index`]) and handed to an [`IndexClient`]. The
//! in-process [`MemoryIndex`] ships with the crate; the Elasticsearch client
//! lives behind the `elasticsearch` feature.
//!
//! # Document layout
//!
//! | Field | Content |
//! |-------|---------|
//! | `id` | resource identifier (sort key) |
//! | `internal_resource_ssi` | type tag |
//! | `created_at_dtsi`, `updated_at_dtsi` | RFC 3339 timestamps |
//! | `member_ids_ssim` | `id-` terms in member order |
//! | `<attr>_ssi` / `<attr>_ssim` | single value / list of terms |
//! | `<attr>_nsim` | terms inside lists nested in a list, write-only |
//! | `<attr>_tsim` | text copy of string values, write-only |
//! | indexer fields | e.g. `read_access_group_ssim`, write-only |

mod backend;
mod client;
mod factory;
mod storage;

pub use backend::{IndexAdapter, IndexBackendConfig};
pub use client::{ID_FIELD, IndexClient, IndexDocument, IndexQuery, MemoryIndex, document_id};
pub use factory::{
    AccessControlsIndexer, CREATED_AT_FIELD, ESCAPE_PREFIX, IndexFactory, Indexer, KIND_FIELD,
    LOCK_VERSION_FIELD, MEMBER_IDS_FIELD, NESTED_SUFFIX, UPDATED_AT_FIELD,
};
pub use storage::{IndexPersister, IndexQueryService};
