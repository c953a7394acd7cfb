//! Pagination types for resource scans.
//!
//! Backends page through their records in identifier order (keyset
//! pagination). The position between pages is an opaque [`PageCursor`].

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};

use crate::error::{MappingError, StorageError};

use super::id::ResourceId;
use super::resource::Resource;

/// Default number of resources fetched per page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// A request for one page of resources.
#[derive(Debug, Clone)]
pub struct PageRequest {
    /// Position to continue from; `None` starts at the beginning.
    pub cursor: Option<PageCursor>,
    /// Maximum number of resources to return.
    pub limit: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            cursor: None,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    /// Creates a request for the first page.
    pub fn first(limit: usize) -> Self {
        Self {
            cursor: None,
            limit: limit.max(1),
        }
    }

    /// Creates a request continuing after the cursor.
    pub fn after(cursor: PageCursor, limit: usize) -> Self {
        Self {
            cursor: Some(cursor),
            limit: limit.max(1),
        }
    }

    /// Returns the last identifier seen, if any.
    pub fn after_id(&self) -> Option<&ResourceId> {
        self.cursor.as_ref().map(PageCursor::last_id)
    }
}

/// One page of resources.
#[derive(Debug, Clone, Default)]
pub struct ResourcePage {
    /// The resources, in identifier order.
    pub resources: Vec<Resource>,
    /// Where the next page starts, if there is one.
    pub next_cursor: Option<PageCursor>,
}

impl ResourcePage {
    /// Builds a page from `limit + 1` fetched resources.
    ///
    /// Backends fetch one extra row to learn whether another page exists;
    /// the extra row is dropped here and the cursor points at the last kept
    /// resource.
    pub fn from_overfetch(mut resources: Vec<Resource>, limit: usize) -> Self {
        let has_more = resources.len() > limit;
        resources.truncate(limit);
        let next_cursor = if has_more {
            resources
                .last()
                .and_then(Resource::id)
                .map(|id| PageCursor::new(id.clone()))
        } else {
            None
        };
        Self {
            resources,
            next_cursor,
        }
    }

    /// Returns `true` if another page follows.
    pub fn has_next(&self) -> bool {
        self.next_cursor.is_some()
    }
}

/// An opaque cursor for keyset pagination.
///
/// Cursors are base64-encoded JSON containing a format version and the
/// identifier of the last returned resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor {
    /// Cursor format version.
    version: u8,

    /// The identifier at the cursor position.
    last_id: ResourceId,
}

impl PageCursor {
    /// Creates a cursor positioned after the given identifier.
    pub fn new(last_id: ResourceId) -> Self {
        Self {
            version: 1,
            last_id,
        }
    }

    /// Returns the identifier at the cursor position.
    pub fn last_id(&self) -> &ResourceId {
        &self.last_id
    }

    /// Encodes the cursor to an opaque string.
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(&json)
    }

    /// Decodes a cursor from an opaque string.
    pub fn decode(s: &str) -> Result<Self, StorageError> {
        let invalid = || {
            StorageError::Mapping(MappingError::InvalidCursor {
                cursor: s.to_string(),
            })
        };
        let bytes = URL_SAFE_NO_PAD.decode(s).map_err(|_| invalid())?;
        serde_json::from_slice(&bytes).map_err(|_| invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_encode_decode() {
        let cursor = PageCursor::new(ResourceId::new("abc"));
        let decoded = PageCursor::decode(&cursor.encode()).unwrap();
        assert_eq!(decoded, cursor);
    }

    #[test]
    fn test_cursor_decode_rejects_garbage() {
        assert!(matches!(
            PageCursor::decode("not a cursor!"),
            Err(StorageError::Mapping(MappingError::InvalidCursor { .. }))
        ));
    }

    #[test]
    fn test_from_overfetch() {
        let resources: Vec<Resource> = ["a", "b", "c"]
            .iter()
            .map(|id| Resource::new("Page").with_id(*id))
            .collect();

        let page = ResourcePage::from_overfetch(resources.clone(), 2);
        assert_eq!(page.resources.len(), 2);
        assert_eq!(page.next_cursor.unwrap().last_id().as_str(), "b");

        let last = ResourcePage::from_overfetch(resources, 3);
        assert_eq!(last.resources.len(), 3);
        assert!(!last.has_next());
    }
}
