//! The search-engine seam and the in-process engine.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::ops::Bound;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::error::{MappingError, StorageError, StorageResult};
use crate::types::ResourceId;

/// A flat index document: field name to string term or list of terms.
pub type IndexDocument = Map<String, Value>;

/// Field every document is keyed and sorted by.
pub const ID_FIELD: &str = "id";

/// Returns the document's key.
pub fn document_id(document: &IndexDocument) -> StorageResult<ResourceId> {
    document
        .get(ID_FIELD)
        .and_then(Value::as_str)
        .map(ResourceId::new)
        .ok_or_else(|| {
            StorageError::Mapping(MappingError::InvalidRecord {
                id: String::new(),
                message: "index document has no id field".to_string(),
            })
        })
}

/// Filter over index documents.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexQuery {
    /// Every document.
    MatchAll,
    /// Documents whose `field` holds `value`, alone or in a list.
    Term {
        /// Field name.
        field: String,
        /// Exact term.
        value: String,
    },
    /// Documents matching at least one query.
    AnyOf(Vec<IndexQuery>),
    /// Documents matching every query.
    AllOf(Vec<IndexQuery>),
}

impl IndexQuery {
    /// Builds a term query.
    pub fn term(field: impl Into<String>, value: impl Into<String>) -> Self {
        IndexQuery::Term {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Returns `true` if the document satisfies the query.
    pub fn matches(&self, document: &IndexDocument) -> bool {
        match self {
            IndexQuery::MatchAll => true,
            IndexQuery::Term { field, value } => match document.get(field) {
                Some(Value::String(s)) => s == value,
                Some(Value::Array(items)) => items.iter().any(|v| v.as_str() == Some(value.as_str())),
                _ => false,
            },
            IndexQuery::AnyOf(queries) => queries.iter().any(|q| q.matches(document)),
            IndexQuery::AllOf(queries) => queries.iter().all(|q| q.matches(document)),
        }
    }
}

/// A search engine holding flat documents keyed by [`ID_FIELD`].
///
/// Writes are visible to the next read.
#[async_trait]
pub trait IndexClient: Debug + Send + Sync {
    /// Short engine name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Identifies the index this client writes to, stable across restarts
    /// for persistent engines.
    fn location(&self) -> String;

    /// Adds or replaces a document.
    async fn add(&self, document: IndexDocument) -> StorageResult<()>;

    /// Fetches a document by key.
    async fn get(&self, id: &ResourceId) -> StorageResult<Option<IndexDocument>>;

    /// Removes a document, returning whether it existed.
    async fn delete(&self, id: &ResourceId) -> StorageResult<bool>;

    /// Returns up to `limit` matching documents with keys after `after`,
    /// in key order.
    async fn query(
        &self,
        query: &IndexQuery,
        after: Option<&ResourceId>,
        limit: usize,
    ) -> StorageResult<Vec<IndexDocument>>;

    /// Counts matching documents.
    async fn count(&self, query: &IndexQuery) -> StorageResult<u64>;

    /// Removes every document.
    async fn clear(&self) -> StorageResult<()>;
}

/// In-process [`IndexClient`].
#[derive(Debug)]
pub struct MemoryIndex {
    location: String,
    documents: RwLock<BTreeMap<ResourceId, IndexDocument>>,
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self {
            location: format!("memory:{}", uuid::Uuid::new_v4()),
            documents: RwLock::new(BTreeMap::new()),
        }
    }
}

impl MemoryIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of documents.
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    /// Returns `true` if the index holds no documents.
    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }
}

#[async_trait]
impl IndexClient for MemoryIndex {
    fn name(&self) -> &'static str {
        "memory-index"
    }

    fn location(&self) -> String {
        self.location.clone()
    }

    async fn add(&self, document: IndexDocument) -> StorageResult<()> {
        let id = document_id(&document)?;
        self.documents.write().insert(id, document);
        Ok(())
    }

    async fn get(&self, id: &ResourceId) -> StorageResult<Option<IndexDocument>> {
        Ok(self.documents.read().get(id).cloned())
    }

    async fn delete(&self, id: &ResourceId) -> StorageResult<bool> {
        Ok(self.documents.write().remove(id).is_some())
    }

    async fn query(
        &self,
        query: &IndexQuery,
        after: Option<&ResourceId>,
        limit: usize,
    ) -> StorageResult<Vec<IndexDocument>> {
        let lower = after.map_or(Bound::Unbounded, |id| Bound::Excluded(id.clone()));
        Ok(self
            .documents
            .read()
            .range((lower, Bound::Unbounded))
            .map(|(_, doc)| doc)
            .filter(|doc| query.matches(doc))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count(&self, query: &IndexQuery) -> StorageResult<u64> {
        let documents = self.documents.read();
        Ok(documents.values().filter(|doc| query.matches(doc)).count() as u64)
    }

    async fn clear(&self) -> StorageResult<()> {
        self.documents.write().clear();
        Ok(())
    }
}
