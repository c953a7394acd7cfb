//! Resource fixtures.

use chrono::{TimeZone, Utc};
use trellis_persistence::core::Persister;
use trellis_persistence::types::{ALTERNATE_IDS, Literal, PropertyValue, Resource, ResourceId};

/// A page with a title.
pub fn page(title: &str) -> Resource {
    Resource::new("Page").with("title", title)
}

/// A book with a title and no members.
pub fn book(title: &str) -> Resource {
    Resource::new("Book").with("title", title)
}

/// A page carrying one attribute of every value kind that survives every
/// backend unchanged.
pub fn rich_page() -> Resource {
    Resource::new("Page")
        .with("title", "Colophon")
        .with("keywords", vec!["printing", "binding"])
        .with("page_number", 42)
        .with("ratio", 0.75)
        .with("draft", PropertyValue::Bool(false))
        .with("source", PropertyValue::Uri("http://example.com/scan/7".to_string()))
        .with(
            "printed_at",
            Utc.with_ymd_and_hms(1998, 4, 1, 9, 30, 0).unwrap(),
        )
        .with("caption", Literal::tagged("Kolophon", "de"))
        .with("looks_like_date", "2001-01-01T00:00:00Z")
        .with("escaped", "id-not-a-reference")
}

/// A resource reachable through an alternate identifier.
pub fn with_alternate_id(kind: &str, alternate: &str) -> Resource {
    Resource::new(kind).with(ALTERNATE_IDS, vec![ResourceId::new(alternate)])
}

/// Saves a Book with members `[b, a]`, both Pages, and returns
/// `(book, a, b)`.
pub async fn book_with_two_pages(persister: &dyn Persister) -> (Resource, Resource, Resource) {
    let a = persister.save(&page("a")).await.expect("save page a");
    let b = persister.save(&page("b")).await.expect("save page b");
    let book = persister
        .save(&book("Book").with_members([b.id().unwrap(), a.id().unwrap()]))
        .await
        .expect("save book");
    (book, a, b)
}

/// Returns the identifiers of `resources` in order.
pub fn ids_of(resources: &[Resource]) -> Vec<ResourceId> {
    resources.iter().filter_map(|r| r.id().cloned()).collect()
}
