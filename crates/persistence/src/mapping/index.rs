//! Search-index term family.
//!
//! Index documents store every value as a string term. Non-string values are
//! prefixed with their type so they can be recovered on read:
//! `id-`, `uri-`, `datetime-`, `integer-`, `float-`, `decimal-`, `boolean-`.
//! Values with no natural term form (literals, nested resources, nested
//! lists, opaque JSON, null) are written as `serialized-` followed by their
//! JSON document form. Plain strings are stored as-is unless they start with
//! one of these prefixes, in which case they are escaped with `string-`.

use rust_decimal::Decimal;

use crate::error::StorageResult;
use crate::types::{PropertyValue, ResourceId};

use super::document::{self, DocumentReader, DocumentWriter, format_datetime, parse_datetime};
use super::{ValueMapper, ValueTransform, parses};

/// Term type prefixes, including the string escape.
pub const PREFIXES: &[&str] = &[
    "id-",
    "uri-",
    "datetime-",
    "integer-",
    "float-",
    "decimal-",
    "boolean-",
    "serialized-",
    "string-",
];

/// Mapper from attribute values to index terms.
pub type TermWriter = ValueMapper<PropertyValue, String>;

/// Mapper from index terms to attribute values.
pub type TermReader = ValueMapper<str, PropertyValue>;

/// Builds the writer family.
pub fn writer() -> TermWriter {
    ValueMapper::new(WriteSerialized {
        documents: document::writer(),
    })
    .with(WritePrefixed)
    .with(WriteEscapedString)
    .with(WritePlainString)
}

/// Builds the reader family.
pub fn reader() -> TermReader {
    ValueMapper::new(ReadPlainString)
        .with(ReadId)
        .with(ReadUri)
        .with(ReadDateTime)
        .with(ReadInteger)
        .with(ReadFloat)
        .with(ReadDecimal)
        .with(ReadBoolean)
        .with(ReadSerialized {
            documents: document::reader(),
        })
        .with(ReadEscapedString)
}

/// Returns the term a reference to `id` is indexed under.
pub fn id_term(id: &ResourceId) -> String {
    format!("id-{}", id.as_str())
}

fn has_reserved_prefix(s: &str) -> bool {
    PREFIXES.iter().any(|p| s.starts_with(p))
}

// ----------------------------------------------------------------------------
// Writers
// ----------------------------------------------------------------------------

/// Scalars with a typed prefix.
struct WritePrefixed;

impl ValueTransform<PropertyValue, String> for WritePrefixed {
    fn name(&self) -> &'static str {
        "prefixed"
    }

    fn handles(&self, value: &PropertyValue) -> bool {
        matches!(
            value,
            PropertyValue::Id(_)
                | PropertyValue::Uri(_)
                | PropertyValue::DateTime(_)
                | PropertyValue::Integer(_)
                | PropertyValue::Float(_)
                | PropertyValue::Decimal(_)
                | PropertyValue::Bool(_)
        )
    }

    fn result(&self, value: &PropertyValue, _mapper: &TermWriter) -> StorageResult<String> {
        Ok(match value {
            PropertyValue::Id(id) => id_term(id),
            PropertyValue::Uri(uri) => format!("uri-{uri}"),
            PropertyValue::DateTime(dt) => format!("datetime-{}", format_datetime(dt)),
            PropertyValue::Integer(n) => format!("integer-{n}"),
            PropertyValue::Float(f) => format!("float-{f}"),
            PropertyValue::Decimal(d) => format!("decimal-{d}"),
            PropertyValue::Bool(b) => format!("boolean-{b}"),
            _ => String::new(),
        })
    }
}

struct WriteEscapedString;

impl ValueTransform<PropertyValue, String> for WriteEscapedString {
    fn name(&self) -> &'static str {
        "escaped_string"
    }

    fn handles(&self, value: &PropertyValue) -> bool {
        matches!(value, PropertyValue::String(s) if has_reserved_prefix(s))
    }

    fn result(&self, value: &PropertyValue, _mapper: &TermWriter) -> StorageResult<String> {
        Ok(format!("string-{}", value.as_str().unwrap_or_default()))
    }
}

struct WritePlainString;

impl ValueTransform<PropertyValue, String> for WritePlainString {
    fn name(&self) -> &'static str {
        "string"
    }

    fn handles(&self, value: &PropertyValue) -> bool {
        matches!(value, PropertyValue::String(_))
    }

    fn result(&self, value: &PropertyValue, _mapper: &TermWriter) -> StorageResult<String> {
        Ok(value.as_str().unwrap_or_default().to_string())
    }
}

struct WriteSerialized {
    documents: DocumentWriter,
}

impl ValueTransform<PropertyValue, String> for WriteSerialized {
    fn name(&self) -> &'static str {
        "serialized"
    }

    fn handles(&self, _value: &PropertyValue) -> bool {
        true
    }

    fn result(&self, value: &PropertyValue, _mapper: &TermWriter) -> StorageResult<String> {
        let json = self.documents.map(value)?;
        Ok(format!("serialized-{}", serde_json::to_string(&json)?))
    }
}

// ----------------------------------------------------------------------------
// Readers
// ----------------------------------------------------------------------------

macro_rules! prefixed_reader {
    ($name:ident, $label:literal, $prefix:literal, |$s:ident| $parse:expr) => {
        struct $name;

        impl ValueTransform<str, PropertyValue> for $name {
            fn name(&self) -> &'static str {
                $label
            }

            fn handles(&self, value: &str) -> bool {
                value
                    .strip_prefix($prefix)
                    .is_some_and(|$s| parses(|| $parse.ok_or(())))
            }

            fn result(&self, value: &str, _mapper: &TermReader) -> StorageResult<PropertyValue> {
                Ok(value
                    .strip_prefix($prefix)
                    .and_then(|$s| $parse)
                    .unwrap_or_else(|| PropertyValue::String(value.to_string())))
            }
        }
    };
}

prefixed_reader!(ReadId, "id", "id-", |s| Some(PropertyValue::Id(ResourceId::new(s))));
prefixed_reader!(ReadUri, "uri", "uri-", |s| Some(PropertyValue::Uri(s.to_string())));
prefixed_reader!(ReadDateTime, "datetime", "datetime-", |s| {
    parse_datetime(s).map(PropertyValue::DateTime)
});
prefixed_reader!(ReadInteger, "integer", "integer-", |s| {
    s.parse::<i64>().ok().map(PropertyValue::Integer)
});
prefixed_reader!(ReadFloat, "float", "float-", |s| {
    s.parse::<f64>().ok().map(PropertyValue::Float)
});
prefixed_reader!(ReadDecimal, "decimal", "decimal-", |s| {
    s.parse::<Decimal>().ok().map(PropertyValue::Decimal)
});
prefixed_reader!(ReadBoolean, "boolean", "boolean-", |s| {
    s.parse::<bool>().ok().map(PropertyValue::Bool)
});
prefixed_reader!(ReadEscapedString, "escaped_string", "string-", |s| {
    Some(PropertyValue::String(s.to_string()))
});

struct ReadSerialized {
    documents: DocumentReader,
}

impl ValueTransform<str, PropertyValue> for ReadSerialized {
    fn name(&self) -> &'static str {
        "serialized"
    }

    fn handles(&self, value: &str) -> bool {
        value
            .strip_prefix("serialized-")
            .is_some_and(|s| parses(|| serde_json::from_str::<serde_json::Value>(s)))
    }

    fn result(&self, value: &str, _mapper: &TermReader) -> StorageResult<PropertyValue> {
        let json: serde_json::Value =
            serde_json::from_str(value.strip_prefix("serialized-").unwrap_or(value))?;
        self.documents.map(&json)
    }
}

struct ReadPlainString;

impl ValueTransform<str, PropertyValue> for ReadPlainString {
    fn name(&self) -> &'static str {
        "string"
    }

    fn handles(&self, _value: &str) -> bool {
        true
    }

    fn result(&self, value: &str, _mapper: &TermReader) -> StorageResult<PropertyValue> {
        Ok(PropertyValue::String(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use serde_json::json;

    use super::*;
    use crate::types::{Literal, Resource};

    fn round_trip(value: PropertyValue) -> PropertyValue {
        let term = writer().map(&value).unwrap();
        reader().map(term.as_str()).unwrap()
    }

    #[test]
    fn test_terms() {
        let w = writer();
        assert_eq!(w.map(&PropertyValue::Id(ResourceId::new("p1"))).unwrap(), "id-p1");
        assert_eq!(w.map(&PropertyValue::Integer(-4)).unwrap(), "integer--4");
        assert_eq!(w.map(&PropertyValue::Bool(true)).unwrap(), "boolean-true");
        assert_eq!(w.map(&PropertyValue::from("plain")).unwrap(), "plain");
        assert_eq!(w.map(&PropertyValue::from("id-1")).unwrap(), "string-id-1");
    }

    #[test]
    fn test_typed_values_survive() {
        let values = vec![
            PropertyValue::Id(ResourceId::new("p1")),
            PropertyValue::Uri("http://example.org/a".to_string()),
            PropertyValue::Integer(42),
            PropertyValue::Float(2.5),
            PropertyValue::Decimal(Decimal::from_str("10.00").unwrap()),
            PropertyValue::Bool(false),
            PropertyValue::DateTime(parse_datetime("2023-01-02T03:04:05Z").unwrap()),
            PropertyValue::from("string-like"),
            PropertyValue::Literal(Literal::typed("5", "http://example.org/unit")),
            PropertyValue::from(Resource::new("Annotation").with("body", "x")),
            PropertyValue::Json(json!({"k": [1, 2]})),
            PropertyValue::Null,
        ];
        for value in values {
            assert_eq!(round_trip(value.clone()), value);
        }
    }

    #[test]
    fn test_malformed_prefix_reads_as_string() {
        let r = reader();
        assert_eq!(r.transform_for("integer-abc").name(), "string");
        assert_eq!(
            r.map("integer-abc").unwrap(),
            PropertyValue::String("integer-abc".to_string())
        );
        assert_eq!(r.transform_for("serialized-{broken").name(), "string");
    }
}
