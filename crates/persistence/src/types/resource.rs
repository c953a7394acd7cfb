//! The storage-neutral resource model and its type registry.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MappingError, ResourceError, StorageError, StorageResult};

use super::id::ResourceId;
use super::value::PropertyValue;

/// Attribute holding alternate identifiers for a resource.
pub const ALTERNATE_IDS: &str = "alternate_ids";

/// Attribute names owned by the resource model itself.
///
/// These are written by the factories as record fields and can never be
/// used as ordinary attribute names.
pub const RESERVED_ATTRIBUTES: &[&str] = &[
    "id",
    "internal_resource",
    "member_ids",
    "created_at",
    "updated_at",
    "lock_version",
];

/// Access-control attribute names.
pub mod access {
    /// Groups that may read the resource.
    pub const READ_GROUPS: &str = "read_groups";
    /// Users that may read the resource.
    pub const READ_USERS: &str = "read_users";
    /// Groups that may edit the resource.
    pub const EDIT_GROUPS: &str = "edit_groups";
    /// Users that may edit the resource.
    pub const EDIT_USERS: &str = "edit_users";

    /// All access-control attributes.
    pub const ALL: &[&str] = &[READ_GROUPS, READ_USERS, EDIT_GROUPS, EDIT_USERS];
}

/// A persistable entity, independent of any storage technology.
///
/// A resource starts life in memory without an identifier. The first save
/// assigns one together with the audit timestamps; every read reconstructs a
/// fresh copy from storage.
///
/// # Examples
///
/// ```
/// use trellis_persistence::types::{PropertyValue, Resource, ResourceId};
///
/// let mut book = Resource::new("Book").with("title", "Moby Dick");
/// book.push_member(ResourceId::new("page-1"));
///
/// assert!(!book.is_persisted());
/// assert_eq!(book.get("title"), Some(&PropertyValue::from("Moby Dick")));
/// assert_eq!(book.member_ids().len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    id: Option<ResourceId>,
    kind: String,
    member_ids: Vec<ResourceId>,
    attributes: BTreeMap<String, PropertyValue>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    lock_tokens: BTreeMap<String, u64>,
}

impl Resource {
    /// Creates a blank, unsaved resource of the given kind.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            id: None,
            kind: kind.into(),
            member_ids: Vec::new(),
            attributes: BTreeMap::new(),
            created_at: None,
            updated_at: None,
            lock_tokens: BTreeMap::new(),
        }
    }

    /// Sets the identifier (builder style).
    pub fn with_id(mut self, id: impl Into<ResourceId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets an attribute (builder style).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Replaces the membership list (builder style).
    pub fn with_members<I, T>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ResourceId>,
    {
        self.member_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the identifier, if the resource has been persisted.
    pub fn id(&self) -> Option<&ResourceId> {
        self.id.as_ref()
    }

    /// Returns the type tag.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Returns `true` once the resource carries an identifier.
    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// Returns the ordered membership list.
    pub fn member_ids(&self) -> &[ResourceId] {
        &self.member_ids
    }

    /// Replaces the membership list.
    pub fn set_member_ids(&mut self, ids: Vec<ResourceId>) {
        self.member_ids = ids;
    }

    /// Appends a member identifier. Duplicates are kept.
    pub fn push_member(&mut self, id: impl Into<ResourceId>) {
        self.member_ids.push(id.into());
    }

    /// Removes every occurrence of `id` from the membership list.
    ///
    /// Returns the number of entries removed.
    pub fn remove_member(&mut self, id: &ResourceId) -> usize {
        let before = self.member_ids.len();
        self.member_ids.retain(|m| m != id);
        before - self.member_ids.len()
    }

    /// Returns an attribute value.
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.attributes.get(name)
    }

    /// Sets an attribute value.
    ///
    /// A reserved name (see [`RESERVED_ATTRIBUTES`]) leaves the resource
    /// unchanged and logs a warning. Use [`try_set`](Self::try_set) to get
    /// an error instead.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<PropertyValue>) {
        if let Err(err) = self.try_set(name, value) {
            tracing::warn!(kind = %self.kind, error = %err, "ignoring attribute");
        }
    }

    /// Sets an attribute value, failing with
    /// [`MappingError::ReservedAttribute`] for reserved names.
    pub fn try_set(
        &mut self,
        name: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> StorageResult<()> {
        let name = name.into();
        if RESERVED_ATTRIBUTES.contains(&name.as_str()) {
            return Err(StorageError::Mapping(MappingError::ReservedAttribute {
                attribute: name,
            }));
        }
        self.attributes.insert(name, value.into());
        Ok(())
    }

    /// Removes an attribute, returning its previous value.
    pub fn remove(&mut self, name: &str) -> Option<PropertyValue> {
        self.attributes.remove(name)
    }

    /// Returns all attributes in name order.
    pub fn attributes(&self) -> &BTreeMap<String, PropertyValue> {
        &self.attributes
    }

    /// Returns when the resource was first persisted.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    /// Returns when the resource was last persisted.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Returns the optimistic lock token a given adapter issued for this copy.
    ///
    /// Tokens are scoped per adapter so a resource travelling through a
    /// chain of persisters carries one token for each of them.
    pub fn lock_token(&self, scope: &str) -> Option<u64> {
        self.lock_tokens.get(scope).copied()
    }

    /// Returns every lock token carried by this copy, keyed by adapter scope.
    pub fn lock_tokens(&self) -> &BTreeMap<String, u64> {
        &self.lock_tokens
    }

    /// Assigns identity and audit metadata. Called by persisters and factories.
    pub fn set_persisted(
        &mut self,
        id: ResourceId,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) {
        self.id = Some(id);
        self.created_at = Some(created_at);
        self.updated_at = Some(updated_at);
    }

    /// Sets the identifier.
    pub fn set_id(&mut self, id: ResourceId) {
        self.id = Some(id);
    }

    /// Sets or clears the lock token for one adapter scope.
    pub fn set_lock_token(&mut self, scope: &str, token: Option<u64>) {
        match token {
            Some(token) => {
                self.lock_tokens.insert(scope.to_string(), token);
            }
            None => {
                self.lock_tokens.remove(scope);
            }
        }
    }

    /// Returns the identifier or a `NotFound` error for unsaved resources.
    pub fn require_id(&self) -> StorageResult<&ResourceId> {
        self.id
            .as_ref()
            .ok_or_else(|| StorageError::not_found(format!("<unsaved {}>", self.kind)))
    }
}

/// An optional behaviour a resource type opts into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// The resource carries read/edit group and user lists.
    AccessControls,
    /// Saves are rejected when the caller's copy is stale.
    OptimisticLocking,
}

/// Definition of one resource type: its name, defaults and capabilities.
///
/// The definition doubles as the factory function that instantiates blank
/// resources of its kind.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDefinition {
    name: String,
    defaults: BTreeMap<String, PropertyValue>,
    capabilities: BTreeSet<Capability>,
}

impl ResourceDefinition {
    /// Creates a definition with no defaults and no capabilities.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            defaults: BTreeMap::new(),
            capabilities: BTreeSet::new(),
        }
    }

    /// Adds a capability.
    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    /// Adds a default attribute value.
    pub fn with_default(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.defaults.insert(name.into(), value.into());
        self
    }

    /// Returns the type tag.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` if the type opts into the capability.
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Returns the capabilities in a stable order.
    pub fn capabilities(&self) -> impl Iterator<Item = Capability> + '_ {
        self.capabilities.iter().copied()
    }

    /// Instantiates a blank resource carrying the type's defaults.
    pub fn build(&self) -> Resource {
        let mut resource = Resource::new(&self.name);
        if self.has_capability(Capability::AccessControls) {
            for name in access::ALL {
                resource.set(*name, PropertyValue::List(Vec::new()));
            }
        }
        for (name, value) in &self.defaults {
            resource.set(name.clone(), value.clone());
        }
        resource
    }
}

/// Registry of resource definitions, keyed by type tag.
///
/// Built at start-up and shared read-only (usually behind an `Arc`).
/// Reconstruction of stored records dispatches through [`ResourceTypes::resolve`].
#[derive(Debug, Clone, Default)]
pub struct ResourceTypes {
    definitions: BTreeMap<String, ResourceDefinition>,
}

impl ResourceTypes {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a definition, replacing any previous one with the same name.
    pub fn register(&mut self, definition: ResourceDefinition) -> &mut Self {
        self.definitions
            .insert(definition.name().to_string(), definition);
        self
    }

    /// Registers a definition (builder style).
    pub fn with(mut self, definition: ResourceDefinition) -> Self {
        self.register(definition);
        self
    }

    /// Looks up the definition for a type tag.
    pub fn resolve(&self, kind: &str) -> StorageResult<&ResourceDefinition> {
        self.definitions.get(kind).ok_or_else(|| {
            StorageError::Resource(ResourceError::UnknownResourceType {
                kind: kind.to_string(),
            })
        })
    }

    /// Instantiates a blank resource of the given kind.
    pub fn instantiate(&self, kind: &str) -> StorageResult<Resource> {
        Ok(self.resolve(kind)?.build())
    }

    /// Returns `true` if the kind is registered.
    pub fn contains(&self, kind: &str) -> bool {
        self.definitions.contains_key(kind)
    }

    /// Returns `true` if the kind is registered with the capability.
    pub fn has_capability(&self, kind: &str, capability: Capability) -> bool {
        self.definitions
            .get(kind)
            .is_some_and(|d| d.has_capability(capability))
    }

    /// Returns registered definitions in name order.
    pub fn iter(&self) -> impl Iterator<Item = &ResourceDefinition> {
        self.definitions.values()
    }

    /// Returns the number of registered types.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Returns `true` if no types are registered.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Returns an access-control view of the resource if its kind opts in.
    pub fn access_controls<'a>(&self, resource: &'a Resource) -> Option<AccessControlled<'a>> {
        self.has_capability(resource.kind(), Capability::AccessControls)
            .then_some(AccessControlled { resource })
    }
}

/// Read/edit permissions carried by a resource.
pub trait HasAccessControls {
    /// Groups that may read.
    fn read_groups(&self) -> Vec<&str>;
    /// Users that may read.
    fn read_users(&self) -> Vec<&str>;
    /// Groups that may edit.
    fn edit_groups(&self) -> Vec<&str>;
    /// Users that may edit.
    fn edit_users(&self) -> Vec<&str>;
}

/// A resource whose type has the [`Capability::AccessControls`] capability.
///
/// Obtained through [`ResourceTypes::access_controls`].
#[derive(Debug, Clone, Copy)]
pub struct AccessControlled<'a> {
    resource: &'a Resource,
}

impl AccessControlled<'_> {
    fn strings(&self, name: &str) -> Vec<&str> {
        self.resource
            .get(name)
            .map(PropertyValue::strings)
            .unwrap_or_default()
    }
}

impl HasAccessControls for AccessControlled<'_> {
    fn read_groups(&self) -> Vec<&str> {
        self.strings(access::READ_GROUPS)
    }

    fn read_users(&self) -> Vec<&str> {
        self.strings(access::READ_USERS)
    }

    fn edit_groups(&self) -> Vec<&str> {
        self.strings(access::EDIT_GROUPS)
    }

    fn edit_users(&self) -> Vec<&str> {
        self.strings(access::EDIT_USERS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types() -> ResourceTypes {
        ResourceTypes::new()
            .with(
                ResourceDefinition::new("Book")
                    .with_capability(Capability::AccessControls)
                    .with_default("language", "en"),
            )
            .with(ResourceDefinition::new("Page"))
    }

    #[test]
    fn test_remove_member_removes_all_occurrences() {
        let mut r = Resource::new("Book").with_members(["a", "b", "a"]);
        assert_eq!(r.remove_member(&ResourceId::new("a")), 2);
        assert_eq!(r.member_ids(), &[ResourceId::new("b")]);
    }

    #[test]
    fn test_reserved_attributes_are_ignored() {
        let r = Resource::new("Book").with("member_ids", "x").with("title", "t");
        assert!(r.get("member_ids").is_none());
        assert!(r.get("title").is_some());
    }

    #[test]
    fn test_try_set_rejects_reserved_names() {
        let mut r = Resource::new("Book");
        let err = r.try_set("lock_version", 3).unwrap_err();
        assert_eq!(err.to_string(), "attribute name 'lock_version' is reserved");
        assert!(r.attributes().is_empty());
        r.try_set("title", "t").unwrap();
        assert!(r.get("title").is_some());
    }

    #[test]
    fn test_instantiate_applies_defaults() {
        let book = types().instantiate("Book").unwrap();
        assert_eq!(book.kind(), "Book");
        assert_eq!(book.get("language"), Some(&PropertyValue::from("en")));
        assert_eq!(book.get(access::READ_GROUPS), Some(&PropertyValue::List(vec![])));
    }

    #[test]
    fn test_unknown_kind() {
        let err = types().instantiate("Chapter").unwrap_err();
        assert!(matches!(
            err,
            StorageError::Resource(ResourceError::UnknownResourceType { ref kind }) if kind == "Chapter"
        ));
    }

    #[test]
    fn test_access_controls_only_for_capable_kinds() {
        let types = types();
        let book = Resource::new("Book")
            .with(access::READ_GROUPS, vec!["public"])
            .with(access::EDIT_USERS, vec!["alice", "bob"]);
        let view = types.access_controls(&book).unwrap();
        assert_eq!(view.read_groups(), vec!["public"]);
        assert_eq!(view.edit_users(), vec!["alice", "bob"]);
        assert!(view.read_users().is_empty());

        let page = Resource::new("Page").with(access::READ_GROUPS, vec!["public"]);
        assert!(types.access_controls(&page).is_none());
    }

    #[test]
    fn test_require_id() {
        assert!(Resource::new("Book").require_id().unwrap_err().is_not_found());
        let r = Resource::new("Book").with_id("b1");
        assert_eq!(r.require_id().unwrap().as_str(), "b1");
    }
}
