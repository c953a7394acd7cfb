//! Persister and QueryService implementations for SQLite.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params, params_from_iter};

use crate::core::{MetadataAdapter, Persister, QueryService, ResourceFactory, SaveStamp};
use crate::error::{StorageError, StorageResult};
use crate::types::{ALTERNATE_IDS, PageRequest, Resource, ResourceId, ResourcePage};

use super::SqliteAdapter;
use super::factory::{DocumentRecord, RawRow};

/// `json_tree` rows of attribute `?1`, descending through arrays only.
///
/// Scalars are quoted so that every attribute value parses as JSON.
const ATTRIBUTE_ELEMENTS: &str = "FROM json_each(r.metadata) a,
         json_tree(CASE WHEN a.type IN ('object', 'array') THEN a.value
                        ELSE json_quote(a.value) END) t
    WHERE a.key = ?1 AND instr(t.fullkey, '.') = 0";

/// Matches a `{"id": ?2}` reference object.
const IS_REFERENCE_TO: &str = "t.type = 'object'
        AND json_extract(t.value, '$.id') = ?2
        AND (SELECT count(*) FROM json_each(t.value)) = 1";

fn select_sql(tail: &str) -> String {
    format!(
        "SELECT {} FROM orm_resources r {}",
        DocumentRecord::COLUMNS,
        tail
    )
}

/// Persister writing into a [`SqliteAdapter`].
#[derive(Debug, Clone)]
pub struct SqlitePersister {
    adapter: SqliteAdapter,
}

impl SqlitePersister {
    /// Creates a persister for the adapter.
    pub fn new(adapter: SqliteAdapter) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl Persister for SqlitePersister {
    fn adapter(&self) -> Arc<dyn MetadataAdapter> {
        Arc::new(self.adapter.clone())
    }

    async fn save(&self, resource: &Resource) -> StorageResult<Resource> {
        let factory = self.adapter.factory();
        let scope = factory.scope();
        let mut conn = self.adapter.get_connection()?;
        // Immediate so the lock-token check and the write see the same row.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let stored = match resource.id() {
            Some(id) => tx
                .query_row(
                    &select_sql("WHERE r.id = ?1"),
                    params![id.as_str()],
                    RawRow::from_row,
                )
                .optional()?
                .map(DocumentRecord::try_from)
                .transpose()?
                .map(|record| record.stored_meta())
                .transpose()?,
            None => None,
        };

        let stamp = SaveStamp::prepare(
            factory.resource_types(),
            scope,
            resource,
            stored.as_ref(),
        )?;
        let record = factory.to_record(&stamp.apply(scope, resource))?;
        let metadata = serde_json::to_string(&record.metadata)?;

        tx.execute(
            "INSERT INTO orm_resources
                (id, internal_resource, metadata, created_at, updated_at, lock_version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                internal_resource = excluded.internal_resource,
                metadata = excluded.metadata,
                updated_at = excluded.updated_at,
                lock_version = excluded.lock_version",
            params![
                record.id,
                record.internal_resource,
                metadata,
                record.created_at,
                record.updated_at,
                record.lock_version,
            ],
        )?;
        tx.commit()?;

        tracing::debug!(
            id = %record.id,
            kind = %record.internal_resource,
            created = stored.is_none(),
            "Saved resource in SQLite"
        );
        factory.to_resource(record)
    }

    async fn delete(&self, resource: &Resource) -> StorageResult<()> {
        let Some(id) = resource.id() else {
            return Ok(());
        };
        let conn = self.adapter.get_connection()?;
        let affected = conn.execute("DELETE FROM orm_resources WHERE id = ?1", params![id.as_str()])?;
        tracing::debug!(id = %id, existed = affected > 0, "Deleted resource from SQLite");
        Ok(())
    }

    async fn wipe(&self) -> StorageResult<()> {
        let conn = self.adapter.get_connection()?;
        let affected = conn.execute("DELETE FROM orm_resources", [])?;
        tracing::info!(removed = affected, "Wiped SQLite resources");
        Ok(())
    }
}

/// Query service reading from a [`SqliteAdapter`].
#[derive(Debug, Clone)]
pub struct SqliteQueryService {
    adapter: SqliteAdapter,
}

impl SqliteQueryService {
    /// Creates a query service for the adapter.
    pub fn new(adapter: SqliteAdapter) -> Self {
        Self { adapter }
    }

    /// Runs a `SELECT` over [`DocumentRecord::COLUMNS`] and reconstructs the rows.
    fn load<P: rusqlite::Params>(
        &self,
        conn: &Connection,
        sql: &str,
        params: P,
    ) -> StorageResult<Vec<Resource>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, RawRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        let factory = self.adapter.factory();
        rows.into_iter()
            .map(|raw| factory.to_resource(DocumentRecord::try_from(raw)?))
            .collect()
    }
}

#[async_trait]
impl QueryService for SqliteQueryService {
    fn adapter(&self) -> Arc<dyn MetadataAdapter> {
        Arc::new(self.adapter.clone())
    }

    async fn find_by_id(&self, id: &ResourceId) -> StorageResult<Resource> {
        let conn = self.adapter.get_connection()?;
        self.load(&conn, &select_sql("WHERE r.id = ?1"), params![id.as_str()])?
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::not_found(id.as_str()))
    }

    async fn find_many_by_ids(&self, ids: &[ResourceId]) -> StorageResult<Vec<Resource>> {
        let mut seen = HashSet::new();
        let unique: Vec<&ResourceId> = ids.iter().filter(|id| seen.insert(*id)).collect();
        if unique.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; unique.len()].join(", ");
        let conn = self.adapter.get_connection()?;
        let mut found: HashMap<ResourceId, Resource> = self
            .load(
                &conn,
                &select_sql(&format!("WHERE r.id IN ({})", placeholders)),
                params_from_iter(unique.iter().map(|id| id.as_str())),
            )?
            .into_iter()
            .filter_map(|r| r.id().cloned().map(|id| (id, r)))
            .collect();

        Ok(unique.into_iter().filter_map(|id| found.remove(id)).collect())
    }

    async fn find_by_alternate_identifier(&self, id: &ResourceId) -> StorageResult<Resource> {
        let sql = select_sql(&format!(
            "WHERE EXISTS (SELECT 1 {} AND (
                (t.type = 'text' AND t.atom = ?2)
                OR ({})
                OR (t.type = 'object' AND json_extract(t.value, '$.\"@id\"') = ?2)))
             ORDER BY r.id LIMIT 1",
            ATTRIBUTE_ELEMENTS, IS_REFERENCE_TO
        ));
        let conn = self.adapter.get_connection()?;
        self.load(&conn, &sql, params![ALTERNATE_IDS, id.as_str()])?
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::not_found(id.as_str()))
    }

    async fn fetch_page(
        &self,
        kind: Option<&str>,
        page: &PageRequest,
    ) -> StorageResult<ResourcePage> {
        let after = page.after_id().map(|id| id.as_str().to_string());
        let conn = self.adapter.get_connection()?;
        let fetched = self.load(
            &conn,
            &select_sql(
                "WHERE (?1 IS NULL OR r.internal_resource = ?1)
                   AND (?2 IS NULL OR r.id > ?2)
                 ORDER BY r.id LIMIT ?3",
            ),
            params![kind, after, (page.limit + 1) as i64],
        )?;
        Ok(ResourcePage::from_overfetch(fetched, page.limit))
    }

    async fn count_all_of_type(&self, kind: &str) -> StorageResult<u64> {
        let conn = self.adapter.get_connection()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM orm_resources WHERE internal_resource = ?1",
            params![kind],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    async fn find_inverse_references_by(
        &self,
        resource: &Resource,
        property: &str,
    ) -> StorageResult<Vec<Resource>> {
        let Some(id) = resource.id() else {
            return Ok(Vec::new());
        };
        let sql = select_sql(&format!(
            "WHERE EXISTS (SELECT 1 {} AND {}) ORDER BY r.id",
            ATTRIBUTE_ELEMENTS, IS_REFERENCE_TO
        ));
        let conn = self.adapter.get_connection()?;
        self.load(&conn, &sql, params![property, id.as_str()])
    }

    async fn find_parents(&self, resource: &Resource) -> StorageResult<Vec<Resource>> {
        let Some(id) = resource.id() else {
            return Ok(Vec::new());
        };
        let conn = self.adapter.get_connection()?;
        self.load(
            &conn,
            &select_sql(
                "WHERE EXISTS (
                    SELECT 1 FROM json_each(r.metadata, '$.member_ids') m
                    WHERE json_extract(m.value, '$.id') = ?1)
                 ORDER BY r.id",
            ),
            params![id.as_str()],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConcurrencyError;
    use crate::types::{Capability, PropertyValue, ResourceDefinition, ResourceTypes};

    fn adapter() -> SqliteAdapter {
        let types = ResourceTypes::new()
            .with(ResourceDefinition::new("Book").with_capability(Capability::OptimisticLocking))
            .with(ResourceDefinition::new("Page"));
        let adapter = SqliteAdapter::in_memory(Arc::new(types)).unwrap();
        adapter.init_schema().unwrap();
        adapter
    }

    #[tokio::test]
    async fn test_update_keeps_row_and_created_at() {
        let adapter = adapter();
        let persister = adapter.persister();
        let first = persister
            .save(&Resource::new("Page").with("number", 1))
            .await
            .unwrap();
        let second = persister.save(&first.clone().with("number", 2)).await.unwrap();

        assert_eq!(second.id(), first.id());
        assert_eq!(second.created_at(), first.created_at());
        assert!(second.updated_at() > first.updated_at());
        assert_eq!(adapter.query_service().count_all_of_type("Page").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_stale_lock_token_is_rejected() {
        let adapter = adapter();
        let persister = adapter.persister();
        let saved = persister.save(&Resource::new("Book")).await.unwrap();
        assert_eq!(saved.lock_token(adapter.factory().scope()), Some(1));

        persister.save(&saved).await.unwrap();
        let err = persister.save(&saved).await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::Concurrency(ConcurrencyError::StaleLockToken { expected: 1, actual: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_inverse_references_match_whole_references_only() {
        let adapter = adapter();
        let persister = adapter.persister();
        let target = persister.save(&Resource::new("Page").with_id("p1")).await.unwrap();

        persister
            .save(&Resource::new("Book").with_id("single").with("pages", ResourceId::new("p1")))
            .await
            .unwrap();
        persister
            .save(
                &Resource::new("Book")
                    .with_id("nested-list")
                    .with(
                        "pages",
                        PropertyValue::List(vec![
                            PropertyValue::from("x"),
                            PropertyValue::List(vec![ResourceId::new("p1").into()]),
                        ]),
                    ),
            )
            .await
            .unwrap();
        persister
            .save(&Resource::new("Book").with_id("string").with("pages", "p1"))
            .await
            .unwrap();
        persister
            .save(
                &Resource::new("Book")
                    .with_id("embedded")
                    .with("pages", Resource::new("Page").with("source", ResourceId::new("p1"))),
            )
            .await
            .unwrap();
        persister
            .save(&Resource::new("Book").with_id("other-attr").with("cover", ResourceId::new("p1")))
            .await
            .unwrap();

        let found = adapter
            .query_service()
            .find_inverse_references_by(&target, "pages")
            .await
            .unwrap();
        let ids: Vec<&str> = found.iter().map(|r| r.id().unwrap().as_str()).collect();
        assert_eq!(ids, vec!["nested-list", "single"]);
    }

    #[tokio::test]
    async fn test_alternate_identifier_forms() {
        let adapter = adapter();
        let persister = adapter.persister();
        persister
            .save(&Resource::new("Book").with_id("b1").with(ALTERNATE_IDS, vec!["isbn-1", "isbn-2"]))
            .await
            .unwrap();
        persister
            .save(&Resource::new("Book").with_id("b2").with(ALTERNATE_IDS, ResourceId::new("legacy-7")))
            .await
            .unwrap();
        persister
            .save(&Resource::new("Book").with_id("b3").with(ALTERNATE_IDS, "solo"))
            .await
            .unwrap();

        let query = adapter.query_service();
        let by = |id: &'static str| {
            let query = query.clone();
            async move { query.find_by_alternate_identifier(&ResourceId::new(id)).await }
        };
        assert_eq!(by("isbn-2").await.unwrap().id().unwrap().as_str(), "b1");
        assert_eq!(by("legacy-7").await.unwrap().id().unwrap().as_str(), "b2");
        assert_eq!(by("solo").await.unwrap().id().unwrap().as_str(), "b3");
        assert!(by("b1").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_odd_attribute_names_are_queried_safely() {
        let adapter = adapter();
        let persister = adapter.persister();
        let target = persister.save(&Resource::new("Page").with_id("p1")).await.unwrap();
        persister
            .save(&Resource::new("Book").with_id("b1").with("it's \"quoted\".x", ResourceId::new("p1")))
            .await
            .unwrap();

        let found = adapter
            .query_service()
            .find_inverse_references_by(&target, "it's \"quoted\".x")
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.db");
        let types = Arc::new(ResourceTypes::new().with(ResourceDefinition::new("Page")));

        let adapter = SqliteAdapter::open(&path, types.clone()).unwrap();
        adapter.init_schema().unwrap();
        let saved = adapter
            .persister()
            .save(&Resource::new("Page").with("title", "Intro"))
            .await
            .unwrap();
        drop(adapter);

        let reopened = SqliteAdapter::open(&path, types).unwrap();
        reopened.init_schema().unwrap();
        let found = reopened
            .query_service()
            .find_by_id(saved.id().unwrap())
            .await
            .unwrap();
        assert_eq!(found.get("title"), Some(&PropertyValue::from("Intro")));
        assert_eq!(found.created_at(), saved.created_at());
    }
}
