//! Attribute values.
//!
//! A [`PropertyValue`] is the storage-neutral form of one attribute. The value
//! mappers in [`crate::mapping`] translate it to and from each backend's
//! native representation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::id::ResourceId;
use super::resource::Resource;

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// Explicitly empty value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Floating point number.
    Float(f64),
    /// Arbitrary-precision decimal.
    Decimal(Decimal),
    /// Plain string.
    String(String),
    /// Reference to another resource.
    Id(ResourceId),
    /// URI (kept distinct from plain strings).
    Uri(String),
    /// Point in time.
    DateTime(DateTime<Utc>),
    /// Language-tagged or datatype-tagged literal.
    Literal(Literal),
    /// Resource embedded by value.
    Nested(Box<Resource>),
    /// Ordered list of values.
    List(Vec<PropertyValue>),
    /// Structured value no transform recognizes, passed through untouched.
    Json(serde_json::Value),
}

/// A literal carrying a language tag and/or a datatype IRI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Literal {
    /// Lexical form.
    pub value: String,
    /// Language tag, e.g. `en`.
    pub language: Option<String>,
    /// Datatype IRI.
    pub datatype: Option<String>,
}

impl Literal {
    /// Creates a language-tagged literal.
    pub fn tagged(value: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            language: Some(language.into()),
            datatype: None,
        }
    }

    /// Creates a datatype-tagged literal.
    pub fn typed(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            language: None,
            datatype: Some(datatype.into()),
        }
    }
}

impl PropertyValue {
    /// Returns every resource identifier held by this value.
    ///
    /// A single `Id` yields itself; a list yields the identifiers of its
    /// elements in order (duplicates included). Other values yield nothing.
    pub fn ids(&self) -> Vec<&ResourceId> {
        match self {
            PropertyValue::Id(id) => vec![id],
            PropertyValue::List(values) => values.iter().flat_map(|v| v.ids()).collect(),
            _ => Vec::new(),
        }
    }

    /// Returns `true` if this value references the given identifier.
    pub fn contains_id(&self, id: &ResourceId) -> bool {
        match self {
            PropertyValue::Id(held) => held == id,
            PropertyValue::List(values) => values.iter().any(|v| v.contains_id(id)),
            _ => false,
        }
    }

    /// Returns `true` if this value names `id`, either as a reference or as
    /// a plain string.
    pub fn has_identifier(&self, id: &ResourceId) -> bool {
        self.contains_id(id) || self.strings().contains(&id.as_str())
    }

    /// Returns the string content of a `String` or `Uri` value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) | PropertyValue::Uri(s) => Some(s),
            _ => None,
        }
    }

    /// Returns string contents of this value, flattening lists.
    pub fn strings(&self) -> Vec<&str> {
        match self {
            PropertyValue::List(values) => values.iter().flat_map(|v| v.strings()).collect(),
            other => other.as_str().into_iter().collect(),
        }
    }

    /// Returns the elements of a list, or the value itself as a single element.
    pub fn as_slice(&self) -> &[PropertyValue] {
        match self {
            PropertyValue::List(values) => values,
            other => std::slice::from_ref(other),
        }
    }

    /// Returns `true` for `Null` and empty lists.
    pub fn is_empty(&self) -> bool {
        match self {
            PropertyValue::Null => true,
            PropertyValue::List(values) => values.is_empty(),
            _ => false,
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

impl From<i64> for PropertyValue {
    fn from(n: i64) -> Self {
        PropertyValue::Integer(n)
    }
}

impl From<i32> for PropertyValue {
    fn from(n: i32) -> Self {
        PropertyValue::Integer(n as i64)
    }
}

impl From<f64> for PropertyValue {
    fn from(n: f64) -> Self {
        PropertyValue::Float(n)
    }
}

impl From<Decimal> for PropertyValue {
    fn from(d: Decimal) -> Self {
        PropertyValue::Decimal(d)
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

impl From<ResourceId> for PropertyValue {
    fn from(id: ResourceId) -> Self {
        PropertyValue::Id(id)
    }
}

impl From<&ResourceId> for PropertyValue {
    fn from(id: &ResourceId) -> Self {
        PropertyValue::Id(id.clone())
    }
}

impl From<DateTime<Utc>> for PropertyValue {
    fn from(dt: DateTime<Utc>) -> Self {
        PropertyValue::DateTime(dt)
    }
}

impl From<Literal> for PropertyValue {
    fn from(l: Literal) -> Self {
        PropertyValue::Literal(l)
    }
}

impl From<Resource> for PropertyValue {
    fn from(r: Resource) -> Self {
        PropertyValue::Nested(Box::new(r))
    }
}

impl From<serde_json::Value> for PropertyValue {
    fn from(v: serde_json::Value) -> Self {
        PropertyValue::Json(v)
    }
}

impl<T: Into<PropertyValue>> From<Vec<T>> for PropertyValue {
    fn from(values: Vec<T>) -> Self {
        PropertyValue::List(values.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_preserve_order_and_duplicates() {
        let a = ResourceId::new("a");
        let b = ResourceId::new("b");
        let value = PropertyValue::from(vec![a.clone(), b.clone(), a.clone()]);
        assert_eq!(value.ids(), vec![&a, &b, &a]);
        assert!(value.contains_id(&b));
        assert!(!value.contains_id(&ResourceId::new("c")));
    }

    #[test]
    fn test_strings_flatten_lists() {
        let value = PropertyValue::from(vec!["x", "y"]);
        assert_eq!(value.strings(), vec!["x", "y"]);
        assert_eq!(PropertyValue::Integer(3).strings(), Vec::<&str>::new());
    }

    #[test]
    fn test_is_empty() {
        assert!(PropertyValue::Null.is_empty());
        assert!(PropertyValue::List(vec![]).is_empty());
        assert!(!PropertyValue::from("x").is_empty());
    }
}
