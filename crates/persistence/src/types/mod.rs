//! Core types for the persistence layer.
//!
//! - [`Resource`] - A storage-neutral persistable entity
//! - [`PropertyValue`] - A typed attribute value
//! - [`ResourceTypes`], [`ResourceDefinition`] - The resource-type registry
//! - [`PageRequest`], [`ResourcePage`], [`PageCursor`] - Pagination types
//!
//! # Examples
//!
//! ```
//! use trellis_persistence::types::{Capability, ResourceDefinition, ResourceTypes};
//!
//! let types = ResourceTypes::new()
//!     .with(ResourceDefinition::new("Book").with_capability(Capability::AccessControls))
//!     .with(ResourceDefinition::new("Page"));
//!
//! let book = types.instantiate("Book").unwrap();
//! assert!(types.access_controls(&book).is_some());
//! assert!(types.instantiate("Chapter").is_err());
//! ```

mod id;
mod pagination;
mod resource;
mod value;

pub use id::ResourceId;
pub use pagination::{DEFAULT_PAGE_SIZE, PageCursor, PageRequest, ResourcePage};
pub use resource::{
    ALTERNATE_IDS, AccessControlled, Capability, HasAccessControls, RESERVED_ATTRIBUTES,
    Resource, ResourceDefinition, ResourceTypes, access,
};
pub use value::{Literal, PropertyValue};
