//! JSON document value family.
//!
//! Attribute values are stored as JSON inside a document column. Scalars are
//! written as plain JSON; values that would otherwise be indistinguishable
//! are written as small marker objects:
//!
//! | Value | JSON |
//! |-------|------|
//! | `Id` | `{"id": "..."}` |
//! | `Uri` | `{"@id": "..."}` |
//! | `Decimal` | `{"@value": "1.50", "@type": XSD_DECIMAL}` |
//! | `Literal` | `{"@value": "...", "@language"?: "..", "@type"?: ".."}` |
//! | `DateTime` | RFC 3339 string |
//! | `String` parseable as a date-time | `{"@value": "...", "@type": XSD_STRING}` |
//! | `Nested` | `{"internal_resource": kind, ...}` |
//! | `Json` | `{"@json": value}` |

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value, json};

use crate::error::{MappingError, StorageError, StorageResult};
use crate::types::{Literal, PropertyValue, Resource, ResourceId};

use super::{ValueMapper, ValueTransform, parses};

/// Datatype IRI for decimals.
pub const XSD_DECIMAL: &str = "http://www.w3.org/2001/XMLSchema#decimal";

/// Datatype IRI for plain strings.
pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";

const INTERNAL_RESOURCE: &str = "internal_resource";

/// Mapper from attribute values to JSON.
pub type DocumentWriter = ValueMapper<PropertyValue, Value>;

/// Mapper from JSON to attribute values.
pub type DocumentReader = ValueMapper<Value, PropertyValue>;

/// Builds the writer family.
pub fn writer() -> DocumentWriter {
    ValueMapper::new(WriteScalar)
        .with(WriteNested)
        .with(WriteId)
        .with(WriteUri)
        .with(WriteDecimal)
        .with(WriteLiteral)
        .with(WriteDateTime)
        .with(WriteAmbiguousString)
        .with(WriteList)
        .with(WriteJson)
}

/// Builds the reader family.
pub fn reader() -> DocumentReader {
    ValueMapper::new(ReadScalar)
        .with(ReadNested)
        .with(ReadDecimal)
        .with(ReadLiteral)
        .with(ReadUri)
        .with(ReadId)
        .with(ReadJson)
        .with(ReadDateTime)
        .with(ReadList)
}

/// Formats a timestamp the way documents store it.
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parses a stored timestamp.
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Writes attributes and membership into a JSON object.
///
/// Used both for nested resources and by the document factory for the
/// metadata column.
pub fn write_attributes(
    resource: &Resource,
    writer: &DocumentWriter,
) -> StorageResult<Map<String, Value>> {
    let mut object = Map::new();
    for (name, value) in resource.attributes() {
        object.insert(name.clone(), writer.map(value)?);
    }
    object.insert(
        "member_ids".to_string(),
        Value::Array(
            resource
                .member_ids()
                .iter()
                .map(|id| json!({ "id": id.as_str() }))
                .collect(),
        ),
    );
    Ok(object)
}

/// Reads attributes and membership from a JSON object into the resource.
///
/// Reserved keys are skipped.
pub fn read_attributes(
    resource: &mut Resource,
    object: &Map<String, Value>,
    reader: &DocumentReader,
) -> StorageResult<()> {
    if let Some(members) = object.get("member_ids") {
        resource.set_member_ids(read_member_ids(members)?);
    }
    for (name, value) in object {
        if crate::types::RESERVED_ATTRIBUTES.contains(&name.as_str()) {
            continue;
        }
        resource.set(name.clone(), reader.map(value)?);
    }
    Ok(())
}

fn read_member_ids(members: &Value) -> StorageResult<Vec<ResourceId>> {
    let invalid = || {
        StorageError::Mapping(MappingError::NotAReference {
            attribute: "member_ids".to_string(),
        })
    };
    members
        .as_array()
        .ok_or_else(invalid)?
        .iter()
        .map(|m| {
            m.get("id")
                .and_then(Value::as_str)
                .map(ResourceId::new)
                .ok_or_else(invalid)
        })
        .collect()
}

fn single_key<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    let object = value.as_object()?;
    if object.len() != 1 {
        return None;
    }
    object.get(key)?.as_str()
}

// ----------------------------------------------------------------------------
// Writers
// ----------------------------------------------------------------------------

struct WriteNested;

impl ValueTransform<PropertyValue, Value> for WriteNested {
    fn name(&self) -> &'static str {
        "nested_resource"
    }

    fn handles(&self, value: &PropertyValue) -> bool {
        matches!(value, PropertyValue::Nested(_))
    }

    fn result(&self, value: &PropertyValue, mapper: &DocumentWriter) -> StorageResult<Value> {
        let PropertyValue::Nested(resource) = value else {
            return Ok(Value::Null);
        };
        let mut object = write_attributes(resource, mapper)?;
        object.insert(INTERNAL_RESOURCE.to_string(), json!(resource.kind()));
        if let Some(id) = resource.id() {
            object.insert("id".to_string(), json!(id.as_str()));
        }
        Ok(Value::Object(object))
    }
}

struct WriteId;

impl ValueTransform<PropertyValue, Value> for WriteId {
    fn name(&self) -> &'static str {
        "id"
    }

    fn handles(&self, value: &PropertyValue) -> bool {
        matches!(value, PropertyValue::Id(_))
    }

    fn result(&self, value: &PropertyValue, _mapper: &DocumentWriter) -> StorageResult<Value> {
        match value {
            PropertyValue::Id(id) => Ok(json!({ "id": id.as_str() })),
            _ => Ok(Value::Null),
        }
    }
}

struct WriteUri;

impl ValueTransform<PropertyValue, Value> for WriteUri {
    fn name(&self) -> &'static str {
        "uri"
    }

    fn handles(&self, value: &PropertyValue) -> bool {
        matches!(value, PropertyValue::Uri(_))
    }

    fn result(&self, value: &PropertyValue, _mapper: &DocumentWriter) -> StorageResult<Value> {
        match value {
            PropertyValue::Uri(uri) => Ok(json!({ "@id": uri })),
            _ => Ok(Value::Null),
        }
    }
}

struct WriteDecimal;

impl ValueTransform<PropertyValue, Value> for WriteDecimal {
    fn name(&self) -> &'static str {
        "decimal"
    }

    fn handles(&self, value: &PropertyValue) -> bool {
        matches!(value, PropertyValue::Decimal(_))
    }

    fn result(&self, value: &PropertyValue, _mapper: &DocumentWriter) -> StorageResult<Value> {
        match value {
            PropertyValue::Decimal(d) => Ok(json!({ "@value": d.to_string(), "@type": XSD_DECIMAL })),
            _ => Ok(Value::Null),
        }
    }
}

struct WriteLiteral;

impl ValueTransform<PropertyValue, Value> for WriteLiteral {
    fn name(&self) -> &'static str {
        "literal"
    }

    fn handles(&self, value: &PropertyValue) -> bool {
        matches!(value, PropertyValue::Literal(_))
    }

    fn result(&self, value: &PropertyValue, _mapper: &DocumentWriter) -> StorageResult<Value> {
        let PropertyValue::Literal(literal) = value else {
            return Ok(Value::Null);
        };
        let mut object = Map::new();
        object.insert("@value".to_string(), json!(literal.value));
        if let Some(language) = &literal.language {
            object.insert("@language".to_string(), json!(language));
        }
        if let Some(datatype) = &literal.datatype {
            object.insert("@type".to_string(), json!(datatype));
        }
        Ok(Value::Object(object))
    }
}

struct WriteDateTime;

impl ValueTransform<PropertyValue, Value> for WriteDateTime {
    fn name(&self) -> &'static str {
        "datetime"
    }

    fn handles(&self, value: &PropertyValue) -> bool {
        matches!(value, PropertyValue::DateTime(_))
    }

    fn result(&self, value: &PropertyValue, _mapper: &DocumentWriter) -> StorageResult<Value> {
        match value {
            PropertyValue::DateTime(dt) => Ok(json!(format_datetime(dt))),
            _ => Ok(Value::Null),
        }
    }
}

/// Strings that would read back as date-times are written as typed literals.
struct WriteAmbiguousString;

impl ValueTransform<PropertyValue, Value> for WriteAmbiguousString {
    fn name(&self) -> &'static str {
        "ambiguous_string"
    }

    fn handles(&self, value: &PropertyValue) -> bool {
        match value {
            PropertyValue::String(s) => parses(|| DateTime::parse_from_rfc3339(s)),
            _ => false,
        }
    }

    fn result(&self, value: &PropertyValue, _mapper: &DocumentWriter) -> StorageResult<Value> {
        match value {
            PropertyValue::String(s) => Ok(json!({ "@value": s, "@type": XSD_STRING })),
            _ => Ok(Value::Null),
        }
    }
}

struct WriteList;

impl ValueTransform<PropertyValue, Value> for WriteList {
    fn name(&self) -> &'static str {
        "list"
    }

    fn handles(&self, value: &PropertyValue) -> bool {
        matches!(value, PropertyValue::List(_))
    }

    fn result(&self, value: &PropertyValue, mapper: &DocumentWriter) -> StorageResult<Value> {
        match value {
            PropertyValue::List(values) => Ok(Value::Array(
                values
                    .iter()
                    .map(|v| mapper.map(v))
                    .collect::<StorageResult<_>>()?,
            )),
            _ => Ok(Value::Null),
        }
    }
}

struct WriteJson;

impl ValueTransform<PropertyValue, Value> for WriteJson {
    fn name(&self) -> &'static str {
        "json"
    }

    fn handles(&self, value: &PropertyValue) -> bool {
        matches!(value, PropertyValue::Json(_))
    }

    fn result(&self, value: &PropertyValue, _mapper: &DocumentWriter) -> StorageResult<Value> {
        match value {
            PropertyValue::Json(inner) => Ok(json!({ "@json": inner })),
            _ => Ok(Value::Null),
        }
    }
}

struct WriteScalar;

impl ValueTransform<PropertyValue, Value> for WriteScalar {
    fn name(&self) -> &'static str {
        "scalar"
    }

    fn handles(&self, _value: &PropertyValue) -> bool {
        true
    }

    fn result(&self, value: &PropertyValue, _mapper: &DocumentWriter) -> StorageResult<Value> {
        Ok(match value {
            PropertyValue::Bool(b) => json!(b),
            PropertyValue::Integer(n) => json!(n),
            PropertyValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .ok_or_else(|| {
                    StorageError::Mapping(MappingError::UnsupportedValue {
                        message: format!("non-finite float {f}"),
                    })
                })?,
            PropertyValue::String(s) => json!(s),
            _ => Value::Null,
        })
    }
}

// ----------------------------------------------------------------------------
// Readers
// ----------------------------------------------------------------------------

struct ReadNested;

impl ValueTransform<Value, PropertyValue> for ReadNested {
    fn name(&self) -> &'static str {
        "nested_resource"
    }

    fn handles(&self, value: &Value) -> bool {
        value
            .get(INTERNAL_RESOURCE)
            .is_some_and(Value::is_string)
    }

    fn result(&self, value: &Value, mapper: &DocumentReader) -> StorageResult<PropertyValue> {
        let Some(object) = value.as_object() else {
            return Ok(PropertyValue::Null);
        };
        let kind = object
            .get(INTERNAL_RESOURCE)
            .and_then(Value::as_str)
            .unwrap_or_default();
        let mut resource = Resource::new(kind);
        if let Some(id) = object.get("id").and_then(Value::as_str) {
            resource.set_id(ResourceId::new(id));
        }
        read_attributes(&mut resource, object, mapper)?;
        Ok(PropertyValue::Nested(Box::new(resource)))
    }
}

struct ReadDecimal;

impl ValueTransform<Value, PropertyValue> for ReadDecimal {
    fn name(&self) -> &'static str {
        "decimal"
    }

    fn handles(&self, value: &Value) -> bool {
        value.get("@type").and_then(Value::as_str) == Some(XSD_DECIMAL)
            && value
                .get("@value")
                .and_then(Value::as_str)
                .is_some_and(|s| parses(|| s.parse::<Decimal>()))
    }

    fn result(&self, value: &Value, _mapper: &DocumentReader) -> StorageResult<PropertyValue> {
        let parsed = value
            .get("@value")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<Decimal>().ok());
        Ok(parsed.map(PropertyValue::Decimal).unwrap_or(PropertyValue::Null))
    }
}

struct ReadLiteral;

impl ValueTransform<Value, PropertyValue> for ReadLiteral {
    fn name(&self) -> &'static str {
        "literal"
    }

    fn handles(&self, value: &Value) -> bool {
        value.get("@value").is_some_and(Value::is_string)
    }

    fn result(&self, value: &Value, _mapper: &DocumentReader) -> StorageResult<PropertyValue> {
        let text = value
            .get("@value")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let language = value
            .get("@language")
            .and_then(Value::as_str)
            .map(String::from);
        let datatype = value.get("@type").and_then(Value::as_str).map(String::from);

        if language.is_none() && datatype.as_deref() == Some(XSD_STRING) {
            return Ok(PropertyValue::String(text));
        }
        Ok(PropertyValue::Literal(Literal {
            value: text,
            language,
            datatype,
        }))
    }
}

struct ReadUri;

impl ValueTransform<Value, PropertyValue> for ReadUri {
    fn name(&self) -> &'static str {
        "uri"
    }

    fn handles(&self, value: &Value) -> bool {
        single_key(value, "@id").is_some()
    }

    fn result(&self, value: &Value, _mapper: &DocumentReader) -> StorageResult<PropertyValue> {
        Ok(single_key(value, "@id")
            .map(|s| PropertyValue::Uri(s.to_string()))
            .unwrap_or(PropertyValue::Null))
    }
}

struct ReadId;

impl ValueTransform<Value, PropertyValue> for ReadId {
    fn name(&self) -> &'static str {
        "id"
    }

    fn handles(&self, value: &Value) -> bool {
        single_key(value, "id").is_some()
    }

    fn result(&self, value: &Value, _mapper: &DocumentReader) -> StorageResult<PropertyValue> {
        Ok(single_key(value, "id")
            .map(|s| PropertyValue::Id(ResourceId::new(s)))
            .unwrap_or(PropertyValue::Null))
    }
}

struct ReadJson;

impl ValueTransform<Value, PropertyValue> for ReadJson {
    fn name(&self) -> &'static str {
        "json"
    }

    fn handles(&self, value: &Value) -> bool {
        value.as_object().is_some_and(|o| o.len() == 1 && o.contains_key("@json"))
    }

    fn result(&self, value: &Value, _mapper: &DocumentReader) -> StorageResult<PropertyValue> {
        Ok(PropertyValue::Json(
            value.get("@json").cloned().unwrap_or(Value::Null),
        ))
    }
}

struct ReadDateTime;

impl ValueTransform<Value, PropertyValue> for ReadDateTime {
    fn name(&self) -> &'static str {
        "datetime"
    }

    fn handles(&self, value: &Value) -> bool {
        value
            .as_str()
            .is_some_and(|s| parses(|| DateTime::parse_from_rfc3339(s)))
    }

    fn result(&self, value: &Value, _mapper: &DocumentReader) -> StorageResult<PropertyValue> {
        Ok(value
            .as_str()
            .and_then(parse_datetime)
            .map(PropertyValue::DateTime)
            .unwrap_or(PropertyValue::Null))
    }
}

struct ReadList;

impl ValueTransform<Value, PropertyValue> for ReadList {
    fn name(&self) -> &'static str {
        "list"
    }

    fn handles(&self, value: &Value) -> bool {
        value.is_array()
    }

    fn result(&self, value: &Value, mapper: &DocumentReader) -> StorageResult<PropertyValue> {
        let values = value
            .as_array()
            .map(|items| items.iter().map(|v| mapper.map(v)).collect::<StorageResult<Vec<_>>>())
            .transpose()?
            .unwrap_or_default();
        Ok(PropertyValue::List(values))
    }
}

struct ReadScalar;

impl ValueTransform<Value, PropertyValue> for ReadScalar {
    fn name(&self) -> &'static str {
        "scalar"
    }

    fn handles(&self, _value: &Value) -> bool {
        true
    }

    fn result(&self, value: &Value, _mapper: &DocumentReader) -> StorageResult<PropertyValue> {
        Ok(match value {
            Value::Null => PropertyValue::Null,
            Value::Bool(b) => PropertyValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => PropertyValue::Integer(i),
                None => PropertyValue::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => PropertyValue::String(s.clone()),
            other => PropertyValue::Json(other.clone()),
        })
    }
}
