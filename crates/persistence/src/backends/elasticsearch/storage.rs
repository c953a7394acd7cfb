//! IndexClient implementation for Elasticsearch.

use async_trait::async_trait;
use elasticsearch::params::Refresh;
use elasticsearch::{CountParts, DeleteByQueryParts, DeleteParts, GetParts, IndexParts, SearchParts};
use serde_json::{Value, json};

use crate::backends::index::{ID_FIELD, IndexClient, IndexDocument, IndexQuery, document_id};
use crate::error::StorageResult;
use crate::types::ResourceId;

use super::backend::{ElasticsearchIndexClient, internal_error};
use super::schema::to_query_dsl;

const NOT_FOUND: u16 = 404;

/// Builds the search body for one page in key order.
pub(super) fn search_body(query: &IndexQuery, after: Option<&ResourceId>, limit: usize) -> Value {
    let mut body = json!({
        "query": to_query_dsl(query),
        "sort": [{ ID_FIELD: "asc" }],
        "size": limit,
    });
    if let Some(after) = after {
        body["search_after"] = json!([after.as_str()]);
    }
    body
}

fn source_of(hit: &Value) -> Option<IndexDocument> {
    hit.get("_source").and_then(Value::as_object).cloned()
}

#[async_trait]
impl IndexClient for ElasticsearchIndexClient {
    fn name(&self) -> &'static str {
        "elasticsearch"
    }

    fn location(&self) -> String {
        format!(
            "{}/{}",
            self.config().nodes.first().map(String::as_str).unwrap_or_default(),
            self.index()
        )
    }

    async fn add(&self, document: IndexDocument) -> StorageResult<()> {
        let id = document_id(&document)?;
        self.ensure_index().await?;

        let response = self
            .client()
            .index(IndexParts::IndexId(self.index(), id.as_str()))
            .refresh(Refresh::True)
            .body(Value::Object(document))
            .send()
            .await
            .map_err(|e| internal_error(format!("Failed to index document: {}", e)))?;

        let status = response.status_code();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(internal_error(format!(
                "Failed to index document (status {}): {}",
                status, body
            )));
        }
        Ok(())
    }

    async fn get(&self, id: &ResourceId) -> StorageResult<Option<IndexDocument>> {
        let response = self
            .client()
            .get(GetParts::IndexId(self.index(), id.as_str()))
            .send()
            .await
            .map_err(|e| internal_error(format!("Failed to get document: {}", e)))?;

        if response.status_code().as_u16() == NOT_FOUND {
            return Ok(None);
        }
        if !response.status_code().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(internal_error(format!("Failed to get document: {}", body)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| internal_error(format!("Failed to parse ES response: {}", e)))?;
        Ok(source_of(&body))
    }

    async fn delete(&self, id: &ResourceId) -> StorageResult<bool> {
        let response = self
            .client()
            .delete(DeleteParts::IndexId(self.index(), id.as_str()))
            .refresh(Refresh::True)
            .send()
            .await
            .map_err(|e| internal_error(format!("Failed to delete document: {}", e)))?;

        let status = response.status_code();
        if status.as_u16() == NOT_FOUND {
            return Ok(false);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(internal_error(format!(
                "Failed to delete document (status {}): {}",
                status, body
            )));
        }
        Ok(true)
    }

    async fn query(
        &self,
        query: &IndexQuery,
        after: Option<&ResourceId>,
        limit: usize,
    ) -> StorageResult<Vec<IndexDocument>> {
        let index = self.index();
        let response = self
            .client()
            .search(SearchParts::Index(&[index]))
            .body(search_body(query, after, limit))
            .send()
            .await
            .map_err(|e| internal_error(format!("Search failed: {}", e)))?;

        if !response.status_code().is_success() {
            let body = response.text().await.unwrap_or_default();
            // Nothing has been written yet.
            if body.contains("index_not_found_exception") {
                return Ok(Vec::new());
            }
            return Err(internal_error(format!("Search failed: {}", body)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| internal_error(format!("Failed to parse search response: {}", e)))?;

        let documents: Vec<IndexDocument> = body
            .get("hits")
            .and_then(|h| h.get("hits"))
            .and_then(Value::as_array)
            .map(|hits| hits.iter().filter_map(source_of).collect())
            .unwrap_or_default();
        tracing::debug!(index = %index, count = documents.len(), "Elasticsearch search");
        Ok(documents)
    }

    async fn count(&self, query: &IndexQuery) -> StorageResult<u64> {
        let response = self
            .client()
            .count(CountParts::Index(&[self.index()]))
            .body(json!({ "query": to_query_dsl(query) }))
            .send()
            .await
            .map_err(|e| internal_error(format!("Count failed: {}", e)))?;

        if !response.status_code().is_success() {
            let body = response.text().await.unwrap_or_default();
            if body.contains("index_not_found_exception") {
                return Ok(0);
            }
            return Err(internal_error(format!("Count failed: {}", body)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| internal_error(format!("Failed to parse count response: {}", e)))?;
        Ok(body.get("count").and_then(Value::as_u64).unwrap_or(0))
    }

    async fn clear(&self) -> StorageResult<()> {
        let response = self
            .client()
            .delete_by_query(DeleteByQueryParts::Index(&[self.index()]))
            .refresh(true)
            .body(json!({ "query": { "match_all": {} } }))
            .send()
            .await
            .map_err(|e| internal_error(format!("Failed to clear index: {}", e)))?;

        let status = response.status_code();
        if !status.is_success() && status.as_u16() != NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            return Err(internal_error(format!(
                "Failed to clear index (status {}): {}",
                status, body
            )));
        }
        tracing::info!(index = %self.index(), "Cleared Elasticsearch index");
        Ok(())
    }
}
