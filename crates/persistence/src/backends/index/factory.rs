//! Resource to index-document translation.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::core::{ResourceFactory, StoredMeta};
use crate::error::{MappingError, StorageError, StorageResult};
use crate::mapping::document::{format_datetime, parse_datetime};
use crate::mapping::index::{self, TermReader, TermWriter};
use crate::types::{HasAccessControls, PropertyValue, Resource, ResourceId, ResourceTypes};

use super::client::{ID_FIELD, IndexDocument};

/// Type tag field.
pub const KIND_FIELD: &str = "internal_resource_ssi";
/// Creation time field.
pub const CREATED_AT_FIELD: &str = "created_at_dtsi";
/// Modification time field.
pub const UPDATED_AT_FIELD: &str = "updated_at_dtsi";
/// Ordered member identifiers, as `id-` terms.
pub const MEMBER_IDS_FIELD: &str = "member_ids_ssim";
/// Optimistic lock version.
pub const LOCK_VERSION_FIELD: &str = "lock_version_isi";

/// Suffix of single-valued attribute fields.
pub const SINGLE_SUFFIX: &str = "_ssi";
/// Suffix of multi-valued attribute fields.
pub const MULTI_SUFFIX: &str = "_ssim";
/// Suffix of the full-text copy of string attributes.
pub const TEXT_SUFFIX: &str = "_tsim";
/// Suffix of the flattened terms of lists nested inside a list attribute.
pub const NESTED_SUFFIX: &str = "_nsim";
/// Prefix of attribute fields renamed to stay clear of fixed and indexer
/// fields.
pub const ESCAPE_PREFIX: &str = "attr_";

const FIXED_FIELDS: [&str; 6] = [
    ID_FIELD,
    KIND_FIELD,
    CREATED_AT_FIELD,
    UPDATED_AT_FIELD,
    MEMBER_IDS_FIELD,
    LOCK_VERSION_FIELD,
];

/// Contributes derived fields to index documents.
///
/// Indexer fields are write-only: they are skipped when a document is read
/// back into a resource.
pub trait Indexer: Send + Sync {
    /// Indexer name for logs.
    fn name(&self) -> &'static str;

    /// Every field this indexer may emit.
    fn fields(&self) -> &[&'static str];

    /// Computes the fields for one resource.
    fn to_fields(&self, resource: &Resource, types: &ResourceTypes) -> BTreeMap<String, Vec<String>>;
}

/// Emits permission lists for kinds with access controls.
#[derive(Debug, Default, Clone, Copy)]
pub struct AccessControlsIndexer;

impl AccessControlsIndexer {
    /// Readable-by groups.
    pub const READ_GROUP: &'static str = "read_access_group_ssim";
    /// Readable-by users.
    pub const READ_PERSON: &'static str = "read_access_person_ssim";
    /// Editable-by groups.
    pub const EDIT_GROUP: &'static str = "edit_access_group_ssim";
    /// Editable-by users.
    pub const EDIT_PERSON: &'static str = "edit_access_person_ssim";

    const FIELDS: [&'static str; 4] = [
        Self::READ_GROUP,
        Self::READ_PERSON,
        Self::EDIT_GROUP,
        Self::EDIT_PERSON,
    ];
}

impl Indexer for AccessControlsIndexer {
    fn name(&self) -> &'static str {
        "access_controls"
    }

    fn fields(&self) -> &[&'static str] {
        &Self::FIELDS
    }

    fn to_fields(&self, resource: &Resource, types: &ResourceTypes) -> BTreeMap<String, Vec<String>> {
        let Some(acl) = types.access_controls(resource) else {
            return BTreeMap::new();
        };
        let owned = |values: Vec<&str>| values.into_iter().map(str::to_string).collect();
        BTreeMap::from([
            (Self::READ_GROUP.to_string(), owned(acl.read_groups())),
            (Self::READ_PERSON.to_string(), owned(acl.read_users())),
            (Self::EDIT_GROUP.to_string(), owned(acl.edit_groups())),
            (Self::EDIT_PERSON.to_string(), owned(acl.edit_users())),
        ])
    }
}

/// Translates resources to flat index documents through the term mappers.
pub struct IndexFactory {
    types: Arc<ResourceTypes>,
    writer: TermWriter,
    reader: TermReader,
    indexers: Vec<Arc<dyn Indexer>>,
    scope: String,
}

impl std::fmt::Debug for IndexFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexFactory")
            .field("scope", &self.scope)
            .field(
                "indexers",
                &self.indexers.iter().map(|i| i.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl IndexFactory {
    /// Creates a factory with the access-control indexer installed.
    pub fn new(types: Arc<ResourceTypes>, scope: impl Into<String>) -> Self {
        Self {
            types,
            writer: index::writer(),
            reader: index::reader(),
            indexers: vec![Arc::new(AccessControlsIndexer)],
            scope: scope.into(),
        }
    }

    /// Adds an indexer.
    pub fn with_indexer(mut self, indexer: Arc<dyn Indexer>) -> Self {
        self.indexers.push(indexer);
        self
    }

    /// Returns the lock-token scope.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Reads the persistence metadata of a stored document.
    pub fn stored_meta(&self, document: &IndexDocument) -> StorageResult<StoredMeta> {
        Ok(StoredMeta {
            created_at: time_field(document, CREATED_AT_FIELD)?,
            updated_at: time_field(document, UPDATED_AT_FIELD)?,
            lock_token: document.get(LOCK_VERSION_FIELD).and_then(Value::as_u64),
        })
    }

    fn is_indexer_field(&self, field: &str) -> bool {
        self.indexers.iter().any(|i| i.fields().contains(&field))
    }

    /// Returns the stem every field of `attribute` is built from.
    ///
    /// A name whose fields would collide with a fixed or indexer field gets
    /// [`ESCAPE_PREFIX`], as does any name already starting with it.
    pub fn field_stem<'a>(&self, attribute: &'a str) -> Cow<'a, str> {
        let collides = [SINGLE_SUFFIX, MULTI_SUFFIX].into_iter().any(|suffix| {
            let field = format!("{attribute}{suffix}");
            FIXED_FIELDS.contains(&field.as_str()) || self.is_indexer_field(&field)
        });
        if collides || attribute.starts_with(ESCAPE_PREFIX) {
            Cow::Owned(format!("{ESCAPE_PREFIX}{attribute}"))
        } else {
            Cow::Borrowed(attribute)
        }
    }

    /// Returns the field a single-valued attribute is indexed under.
    pub fn single_field(&self, attribute: &str) -> String {
        format!("{}{SINGLE_SUFFIX}", self.field_stem(attribute))
    }

    /// Returns the field a list attribute is indexed under.
    pub fn multi_field(&self, attribute: &str) -> String {
        format!("{}{MULTI_SUFFIX}", self.field_stem(attribute))
    }

    /// Returns the field holding the terms of lists nested in `attribute`.
    pub fn nested_field(&self, attribute: &str) -> String {
        format!("{}{NESTED_SUFFIX}", self.field_stem(attribute))
    }

    /// Terms of every scalar inside the lists nested in a list value.
    fn nested_terms(&self, value: &PropertyValue) -> StorageResult<Vec<String>> {
        let mut terms = Vec::new();
        if let PropertyValue::List(items) = value {
            for item in items {
                if let PropertyValue::List(inner) = item {
                    self.leaf_terms(inner, &mut terms)?;
                }
            }
        }
        Ok(terms)
    }

    fn leaf_terms(&self, items: &[PropertyValue], terms: &mut Vec<String>) -> StorageResult<()> {
        for item in items {
            match item {
                PropertyValue::List(inner) => self.leaf_terms(inner, terms)?,
                leaf => terms.push(self.writer.map(leaf)?),
            }
        }
        Ok(())
    }

    fn terms(&self, value: &PropertyValue) -> StorageResult<Value> {
        match value {
            PropertyValue::List(items) => items
                .iter()
                .map(|item| self.writer.map(item).map(Value::String))
                .collect::<StorageResult<Vec<_>>>()
                .map(Value::Array),
            single => self.writer.map(single).map(Value::String),
        }
    }
}

fn attribute_name(stem: &str) -> &str {
    stem.strip_prefix(ESCAPE_PREFIX).unwrap_or(stem)
}

fn time_field(document: &IndexDocument, field: &str) -> StorageResult<chrono::DateTime<Utc>> {
    document
        .get(field)
        .and_then(Value::as_str)
        .and_then(parse_datetime)
        .ok_or_else(|| invalid(document, format!("missing or malformed {field}")))
}

fn invalid(document: &IndexDocument, message: String) -> StorageError {
    StorageError::Mapping(MappingError::InvalidRecord {
        id: document
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        message,
    })
}

impl ResourceFactory for IndexFactory {
    type Record = IndexDocument;

    fn to_record(&self, resource: &Resource) -> StorageResult<IndexDocument> {
        self.types.resolve(resource.kind())?;
        let now = Utc::now();
        let id = resource.id().cloned().unwrap_or_else(ResourceId::generate);

        let mut document = IndexDocument::new();
        document.insert(ID_FIELD.to_string(), Value::from(id.as_str()));
        document.insert(KIND_FIELD.to_string(), Value::from(resource.kind()));
        document.insert(
            CREATED_AT_FIELD.to_string(),
            Value::from(format_datetime(&resource.created_at().unwrap_or(now))),
        );
        document.insert(
            UPDATED_AT_FIELD.to_string(),
            Value::from(format_datetime(&resource.updated_at().unwrap_or(now))),
        );
        document.insert(
            MEMBER_IDS_FIELD.to_string(),
            resource
                .member_ids()
                .iter()
                .map(|m| Value::from(index::id_term(m)))
                .collect(),
        );
        if let Some(token) = resource.lock_token(&self.scope) {
            document.insert(LOCK_VERSION_FIELD.to_string(), Value::from(token));
        }

        for (name, value) in resource.attributes() {
            let stem = self.field_stem(name);
            let field = match value {
                PropertyValue::List(_) => format!("{stem}{MULTI_SUFFIX}"),
                _ => format!("{stem}{SINGLE_SUFFIX}"),
            };
            document.insert(field, self.terms(value)?);

            let nested = self.nested_terms(value)?;
            if !nested.is_empty() {
                document.insert(format!("{stem}{NESTED_SUFFIX}"), Value::from(nested));
            }
            let text = value.strings();
            if !text.is_empty() {
                document.insert(format!("{stem}{TEXT_SUFFIX}"), Value::from(text));
            }
        }

        for indexer in &self.indexers {
            for (field, values) in indexer.to_fields(resource, &self.types) {
                document.insert(field, Value::from(values));
            }
        }

        Ok(document)
    }

    fn to_resource(&self, document: IndexDocument) -> StorageResult<Resource> {
        let kind = document
            .get(KIND_FIELD)
            .and_then(Value::as_str)
            .ok_or_else(|| invalid(&document, format!("missing {KIND_FIELD}")))?;
        let definition = self.types.resolve(kind)?;
        let id = super::client::document_id(&document)?;
        let meta = self.stored_meta(&document)?;

        let mut resource = Resource::new(definition.name());
        let members = document
            .get(MEMBER_IDS_FIELD)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for term in members {
            match term.as_str().map(|t| self.reader.map(t)).transpose()? {
                Some(PropertyValue::Id(member)) => resource.push_member(member),
                _ => {
                    return Err(StorageError::Mapping(MappingError::NotAReference {
                        attribute: MEMBER_IDS_FIELD.to_string(),
                    }));
                }
            }
        }

        for (field, value) in &document {
            if FIXED_FIELDS.contains(&field.as_str())
                || self.is_indexer_field(field)
                || field.ends_with(TEXT_SUFFIX)
                || field.ends_with(NESTED_SUFFIX)
            {
                continue;
            }
            if let Some(stem) = field.strip_suffix(MULTI_SUFFIX) {
                let items = value.as_array().map(Vec::as_slice).unwrap_or_default();
                let values = items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|term| self.reader.map(term))
                    .collect::<StorageResult<Vec<_>>>()?;
                resource.try_set(attribute_name(stem), PropertyValue::List(values))?;
            } else if let Some(stem) = field.strip_suffix(SINGLE_SUFFIX) {
                if let Some(term) = value.as_str() {
                    resource.try_set(attribute_name(stem), self.reader.map(term)?)?;
                }
            } else {
                tracing::warn!(field = %field, id = %id, "Ignoring unrecognized index field");
            }
        }

        resource.set_persisted(id, meta.created_at, meta.updated_at);
        resource.set_lock_token(&self.scope, meta.lock_token);
        Ok(resource)
    }

    fn resource_types(&self) -> &ResourceTypes {
        &self.types
    }
}
