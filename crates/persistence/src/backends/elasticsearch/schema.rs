//! Index mapping and query translation.

use elasticsearch::indices::{IndicesCreateParts, IndicesExistsParts};
use serde_json::{Value, json};

use crate::backends::index::{ID_FIELD, IndexQuery};
use crate::error::StorageResult;

use super::backend::{ElasticsearchConfig, ElasticsearchIndexClient, internal_error};

/// Creates the index settings and mapping.
///
/// Every string field is an exact-match `keyword`, except the `*_tsim`
/// text copies.
pub fn create_index_mapping(config: &ElasticsearchConfig) -> Value {
    json!({
        "settings": {
            "number_of_shards": config.number_of_shards,
            "number_of_replicas": config.number_of_replicas
        },
        "mappings": {
            "dynamic_templates": [
                {
                    "text_copies": {
                        "match": "*_tsim",
                        "match_mapping_type": "string",
                        "mapping": { "type": "text" }
                    }
                },
                {
                    "terms": {
                        "match_mapping_type": "string",
                        "mapping": { "type": "keyword" }
                    }
                }
            ],
            "properties": {
                ID_FIELD: { "type": "keyword" }
            }
        }
    })
}

/// Translates a query to the Elasticsearch query DSL.
pub fn to_query_dsl(query: &IndexQuery) -> Value {
    match query {
        IndexQuery::MatchAll => json!({ "match_all": {} }),
        IndexQuery::Term { field, value } => json!({ "term": { field.as_str(): value } }),
        IndexQuery::AnyOf(queries) if queries.is_empty() => {
            json!({ "bool": { "must_not": { "match_all": {} } } })
        }
        IndexQuery::AnyOf(queries) => json!({
            "bool": {
                "should": queries.iter().map(to_query_dsl).collect::<Vec<_>>(),
                "minimum_should_match": 1
            }
        }),
        IndexQuery::AllOf(queries) => json!({
            "bool": { "filter": queries.iter().map(to_query_dsl).collect::<Vec<_>>() }
        }),
    }
}

/// Ensures the client's index exists, creating it if necessary.
pub async fn ensure_index(client: &ElasticsearchIndexClient) -> StorageResult<()> {
    let index = client.index();

    let exists_response = client
        .client()
        .indices()
        .exists(IndicesExistsParts::Index(&[index]))
        .send()
        .await
        .map_err(|e| internal_error(format!("Failed to check index existence: {}", e)))?;

    if exists_response.status_code().is_success() {
        return Ok(());
    }

    let response = client
        .client()
        .indices()
        .create(IndicesCreateParts::Index(index))
        .body(create_index_mapping(client.config()))
        .send()
        .await
        .map_err(|e| internal_error(format!("Failed to create index {}: {}", index, e)))?;

    let status = response.status_code();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        // Another client created it first.
        if body.contains("resource_already_exists_exception") {
            return Ok(());
        }
        return Err(internal_error(format!(
            "Failed to create index {} (status {}): {}",
            index, status, body
        )));
    }

    tracing::info!(index = %index, "Created Elasticsearch index");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_structure() {
        let mapping = create_index_mapping(&ElasticsearchConfig::default());
        assert_eq!(mapping["settings"]["number_of_shards"], 1);
        assert_eq!(mapping["mappings"]["properties"]["id"]["type"], "keyword");
        let templates = mapping["mappings"]["dynamic_templates"].as_array().unwrap();
        assert_eq!(templates[0]["text_copies"]["mapping"]["type"], "text");
        assert_eq!(templates[1]["terms"]["mapping"]["type"], "keyword");
    }

    #[test]
    fn test_query_translation() {
        let query = IndexQuery::AllOf(vec![
            IndexQuery::term("internal_resource_ssi", "Book"),
            IndexQuery::AnyOf(vec![
                IndexQuery::term("pages_ssi", "id-p1"),
                IndexQuery::term("pages_ssim", "id-p1"),
            ]),
        ]);
        let dsl = to_query_dsl(&query);
        assert_eq!(
            dsl["bool"]["filter"][0],
            json!({"term": {"internal_resource_ssi": "Book"}})
        );
        assert_eq!(dsl["bool"]["filter"][1]["bool"]["minimum_should_match"], 1);
        assert_eq!(
            to_query_dsl(&IndexQuery::AnyOf(vec![])),
            json!({"bool": {"must_not": {"match_all": {}}}})
        );
    }
}
