//! The query service trait and lazy resource scans.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::types::{
    DEFAULT_PAGE_SIZE, PageCursor, PageRequest, Resource, ResourceId, ResourcePage,
};

use super::adapter::MetadataAdapter;

/// Reads resources from one backend.
///
/// Every read reconstructs a fresh resource from the stored record.
/// Relationship queries follow these rules on every backend:
///
/// - Missing targets are skipped, never reported as errors.
/// - Member and reference order is preserved, duplicates included.
/// - A resource without an identifier has no inverse references and no parents.
///
/// Scans over all resources are exposed through [`QueryServiceExt`], which
/// pulls pages from [`fetch_page`](Self::fetch_page) on demand.
#[async_trait]
pub trait QueryService: Send + Sync {
    /// Returns the adapter that owns this query service.
    fn adapter(&self) -> Arc<dyn MetadataAdapter>;

    /// Finds a resource by identifier.
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(NotFound)` - no such resource
    async fn find_by_id(&self, id: &ResourceId) -> StorageResult<Resource>;

    /// Finds the resources with the given identifiers.
    ///
    /// Results follow first-occurrence order of `ids`; duplicates are
    /// collapsed and missing identifiers skipped.
    async fn find_many_by_ids(&self, ids: &[ResourceId]) -> StorageResult<Vec<Resource>> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        for id in ids {
            if !seen.insert(id) {
                continue;
            }
            match self.find_by_id(id).await {
                Ok(resource) => found.push(resource),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(found)
    }

    /// Finds the resource listing `id` in its `alternate_ids` attribute.
    async fn find_by_alternate_identifier(&self, id: &ResourceId) -> StorageResult<Resource>;

    /// Fetches one page of resources in identifier order, optionally
    /// restricted to one kind.
    async fn fetch_page(
        &self,
        kind: Option<&str>,
        page: &PageRequest,
    ) -> StorageResult<ResourcePage>;

    /// Counts the resources of one kind.
    async fn count_all_of_type(&self, kind: &str) -> StorageResult<u64>;

    /// Returns the resource's members in `member_ids` order.
    async fn find_members(&self, resource: &Resource) -> StorageResult<Vec<Resource>> {
        self.expand(resource.member_ids()).await
    }

    /// Returns the resource's members of one kind, in `member_ids` order.
    async fn find_members_of_type(
        &self,
        resource: &Resource,
        kind: &str,
    ) -> StorageResult<Vec<Resource>> {
        let mut members = self.find_members(resource).await?;
        members.retain(|m| m.kind() == kind);
        Ok(members)
    }

    /// Dereferences the identifiers held by one attribute.
    async fn find_references_by(
        &self,
        resource: &Resource,
        property: &str,
    ) -> StorageResult<Vec<Resource>> {
        let ids: Vec<ResourceId> = resource
            .get(property)
            .map(|value| value.ids().into_iter().cloned().collect())
            .unwrap_or_default();
        self.expand(&ids).await
    }

    /// Returns every resource whose `property` references the resource.
    async fn find_inverse_references_by(
        &self,
        resource: &Resource,
        property: &str,
    ) -> StorageResult<Vec<Resource>>;

    /// Returns every resource listing the resource in its `member_ids`.
    ///
    /// Each parent appears once, however often it lists the resource.
    async fn find_parents(&self, resource: &Resource) -> StorageResult<Vec<Resource>>;

    /// Loads `ids` in order, keeping duplicates and skipping missing ones.
    async fn expand(&self, ids: &[ResourceId]) -> StorageResult<Vec<Resource>> {
        let found: HashMap<ResourceId, Resource> = self
            .find_many_by_ids(ids)
            .await?
            .into_iter()
            .filter_map(|r| r.id().cloned().map(|id| (id, r)))
            .collect();
        Ok(ids.iter().filter_map(|id| found.get(id).cloned()).collect())
    }
}

/// Lazy scans over a query service.
pub trait QueryServiceExt: QueryService {
    /// Scans every resource.
    fn find_all(&self) -> ResourceScan<'_, Self> {
        ResourceScan::new(self, None)
    }

    /// Scans every resource of one kind.
    fn find_all_of_type(&self, kind: &str) -> ResourceScan<'_, Self> {
        ResourceScan::new(self, Some(kind.to_string()))
    }
}

impl<Q: QueryService + ?Sized> QueryServiceExt for Q {}

/// A pull-based, restartable scan over a query service.
///
/// Nothing is fetched until [`next_resource`](Self::next_resource) is
/// called; pages are then requested one at a time. The scan ends when the
/// backend reports no further page.
///
/// ```ignore
/// let mut scan = query.find_all_of_type("Page").with_page_size(50);
/// while let Some(page) = scan.next_resource().await? {
///     println!("{:?}", page.id());
/// }
/// ```
pub struct ResourceScan<'a, Q: ?Sized> {
    service: &'a Q,
    kind: Option<String>,
    page_size: usize,
    buffer: VecDeque<Resource>,
    cursor: Option<PageCursor>,
    exhausted: bool,
    pages_fetched: usize,
}

impl<'a, Q: QueryService + ?Sized> ResourceScan<'a, Q> {
    fn new(service: &'a Q, kind: Option<String>) -> Self {
        Self {
            service,
            kind,
            page_size: DEFAULT_PAGE_SIZE,
            buffer: VecDeque::new(),
            cursor: None,
            exhausted: false,
            pages_fetched: 0,
        }
    }

    /// Sets how many resources are fetched per page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Returns the next resource, fetching a page when the buffer is empty.
    pub async fn next_resource(&mut self) -> StorageResult<Option<Resource>> {
        while self.buffer.is_empty() && !self.exhausted {
            let request = PageRequest {
                cursor: self.cursor.take(),
                limit: self.page_size,
            };
            let page = self
                .service
                .fetch_page(self.kind.as_deref(), &request)
                .await?;
            self.pages_fetched += 1;
            tracing::debug!(
                kind = ?self.kind,
                count = page.resources.len(),
                has_next = page.has_next(),
                "Fetched resource page"
            );
            self.exhausted = page.next_cursor.is_none();
            self.cursor = page.next_cursor;
            self.buffer.extend(page.resources);
        }
        Ok(self.buffer.pop_front())
    }

    /// Drains the scan into a vector.
    pub async fn try_collect(mut self) -> StorageResult<Vec<Resource>> {
        let mut all = Vec::new();
        while let Some(resource) = self.next_resource().await? {
            all.push(resource);
        }
        Ok(all)
    }

    /// Counts the remaining resources by draining the scan.
    pub async fn count(mut self) -> StorageResult<u64> {
        let mut n = 0;
        while self.next_resource().await?.is_some() {
            n += 1;
        }
        Ok(n)
    }

    /// Rewinds the scan to the first page.
    pub fn restart(&mut self) {
        self.buffer.clear();
        self.cursor = None;
        self.exhausted = false;
    }

    /// Returns how many pages have been requested so far.
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }
}
