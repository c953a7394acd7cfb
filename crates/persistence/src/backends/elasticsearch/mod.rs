//! Elasticsearch engine for the search-index backend.
//!
//! [`ElasticsearchIndexClient`] implements
//! [`IndexClient`](crate::backends::index::IndexClient) over a single index.
//! Term fields are mapped as `keyword`; pages are read in `id` order with
//! `search_after`.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use trellis_persistence::backends::elasticsearch::{ElasticsearchConfig, ElasticsearchIndexClient};
//! use trellis_persistence::backends::index::IndexAdapter;
//!
//! let client = ElasticsearchIndexClient::new(ElasticsearchConfig {
//!     nodes: vec!["http://localhost:9200".to_string()],
//!     ..Default::default()
//! })?;
//! let adapter = IndexAdapter::new(Arc::new(client), types);
//! ```

mod backend;
mod schema;
mod storage;

pub use backend::{ElasticsearchAuth, ElasticsearchConfig, ElasticsearchIndexClient};
pub use schema::{create_index_mapping, to_query_dsl};
