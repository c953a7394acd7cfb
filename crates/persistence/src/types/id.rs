//! Resource identifier type.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An opaque, stable resource identifier.
///
/// Identifiers are assigned by a persister on first save and never change
/// afterwards. References between resources are always expressed as
/// `ResourceId` values, never as embedded copies.
///
/// # Examples
///
/// ```
/// use trellis_persistence::types::ResourceId;
///
/// let id = ResourceId::new("book-1");
/// assert_eq!(id.as_str(), "book-1");
///
/// let generated = ResourceId::generate();
/// assert_ne!(generated, ResourceId::generate());
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    /// Creates an identifier from the given string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random (v4 UUID) identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the identifier and returns the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceId({})", self.0)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ResourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&ResourceId> for ResourceId {
    fn from(id: &ResourceId) -> Self {
        id.clone()
    }
}

impl AsRef<str> for ResourceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_uuid() {
        let id = ResourceId::generate();
        assert!(uuid::Uuid::parse_str(id.as_str()).is_ok());
    }

    #[test]
    fn test_display_and_debug() {
        let id = ResourceId::new("abc");
        assert_eq!(id.to_string(), "abc");
        assert_eq!(format!("{:?}", id), "ResourceId(abc)");
    }

    #[test]
    fn test_serde_transparent() {
        let id = ResourceId::new("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
        let back: ResourceId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(back, id);
    }
}
