//! Resource to document-row translation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::core::{ResourceFactory, StoredMeta};
use crate::error::{MappingError, StorageError, StorageResult};
use crate::mapping::document::{
    self, DocumentReader, DocumentWriter, format_datetime, parse_datetime,
};
use crate::types::{Resource, ResourceId, ResourceTypes};

/// One row of the `orm_resources` table.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRecord {
    /// Primary key.
    pub id: String,
    /// Type tag.
    pub internal_resource: String,
    /// Attribute document, including `member_ids`.
    pub metadata: Map<String, Value>,
    /// RFC 3339 creation time.
    pub created_at: String,
    /// RFC 3339 modification time.
    pub updated_at: String,
    /// Optimistic lock version.
    pub lock_version: Option<i64>,
}

impl DocumentRecord {
    /// Column list matching [`RawRow::from_row`].
    pub const COLUMNS: &'static str =
        "id, internal_resource, metadata, created_at, updated_at, lock_version";

    /// Returns the persistence metadata of the row.
    pub fn stored_meta(&self) -> StorageResult<StoredMeta> {
        Ok(StoredMeta {
            created_at: self.parse_time("created_at", &self.created_at)?,
            updated_at: self.parse_time("updated_at", &self.updated_at)?,
            lock_token: self.lock_version.map(|v| v as u64),
        })
    }

    fn parse_time(&self, column: &str, value: &str) -> StorageResult<DateTime<Utc>> {
        parse_datetime(value).ok_or_else(|| {
            StorageError::Mapping(MappingError::InvalidRecord {
                id: self.id.clone(),
                message: format!("{} is not an RFC 3339 timestamp: {}", column, value),
            })
        })
    }
}

/// A row as read from SQLite, before the metadata column is parsed.
#[derive(Debug, Clone)]
pub struct RawRow {
    id: String,
    internal_resource: String,
    metadata: String,
    created_at: String,
    updated_at: String,
    lock_version: Option<i64>,
}

impl RawRow {
    /// Reads a row selected with [`DocumentRecord::COLUMNS`].
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            internal_resource: row.get(1)?,
            metadata: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
            lock_version: row.get(5)?,
        })
    }
}

impl TryFrom<RawRow> for DocumentRecord {
    type Error = StorageError;

    fn try_from(row: RawRow) -> StorageResult<Self> {
        let metadata = match serde_json::from_str::<Value>(&row.metadata)? {
            Value::Object(map) => map,
            other => {
                return Err(StorageError::Mapping(MappingError::InvalidRecord {
                    id: row.id,
                    message: format!("metadata is not an object: {}", other),
                }));
            }
        };
        Ok(DocumentRecord {
            id: row.id,
            internal_resource: row.internal_resource,
            metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
            lock_version: row.lock_version,
        })
    }
}

/// Translates resources to `orm_resources` rows through the document mappers.
pub struct DocumentFactory {
    types: Arc<ResourceTypes>,
    writer: DocumentWriter,
    reader: DocumentReader,
    scope: String,
}

impl std::fmt::Debug for DocumentFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentFactory")
            .field("types", &self.types.len())
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl DocumentFactory {
    /// Creates a factory issuing lock tokens under `scope`.
    pub fn new(types: Arc<ResourceTypes>, scope: impl Into<String>) -> Self {
        Self {
            types,
            writer: document::writer(),
            reader: document::reader(),
            scope: scope.into(),
        }
    }

    /// Returns the lock-token scope.
    pub fn scope(&self) -> &str {
        &self.scope
    }
}

impl ResourceFactory for DocumentFactory {
    type Record = DocumentRecord;

    fn to_record(&self, resource: &Resource) -> StorageResult<DocumentRecord> {
        self.types.resolve(resource.kind())?;
        let now = Utc::now();
        let id = resource
            .id()
            .cloned()
            .unwrap_or_else(ResourceId::generate);
        Ok(DocumentRecord {
            id: id.into_inner(),
            internal_resource: resource.kind().to_string(),
            metadata: document::write_attributes(resource, &self.writer)?,
            created_at: format_datetime(&resource.created_at().unwrap_or(now)),
            updated_at: format_datetime(&resource.updated_at().unwrap_or(now)),
            lock_version: resource.lock_token(&self.scope).map(|v| v as i64),
        })
    }

    fn to_resource(&self, record: DocumentRecord) -> StorageResult<Resource> {
        let definition = self.types.resolve(&record.internal_resource)?;
        let meta = record.stored_meta()?;

        let mut resource = Resource::new(definition.name());
        document::read_attributes(&mut resource, &record.metadata, &self.reader)?;
        resource.set_persisted(ResourceId::new(record.id), meta.created_at, meta.updated_at);
        resource.set_lock_token(&self.scope, meta.lock_token);
        Ok(resource)
    }

    fn resource_types(&self) -> &ResourceTypes {
        &self.types
    }
}
