//! Backend test harness.
//!
//! [`TestContext`] bundles a freshly built adapter with its persister and
//! query service. [`contract_test!`](crate::contract_test) generates one
//! `#[tokio::test]` per backend from a single body.

use std::sync::Arc;

use trellis_persistence::backends::index::{IndexAdapter, MemoryIndex};
use trellis_persistence::backends::memory::MemoryAdapter;
use trellis_persistence::core::{MetadataAdapter, Persister, QueryService};
use trellis_persistence::types::{Capability, ResourceDefinition, ResourceTypes};

/// Resource types used across the integration tests.
///
/// `Book` opts into access controls and optimistic locking; `Page`,
/// `Collection` and `Note` are plain.
pub fn test_types() -> Arc<ResourceTypes> {
    Arc::new(
        ResourceTypes::new()
            .with(
                ResourceDefinition::new("Book")
                    .with_capability(Capability::AccessControls)
                    .with_capability(Capability::OptimisticLocking),
            )
            .with(ResourceDefinition::new("Page"))
            .with(ResourceDefinition::new("Collection"))
            .with(ResourceDefinition::new("Note")),
    )
}

/// An adapter under test.
pub struct TestContext {
    pub adapter: Arc<dyn MetadataAdapter>,
    pub persister: Arc<dyn Persister>,
    pub query: Arc<dyn QueryService>,
    /// Keeps on-disk databases alive for the duration of the test.
    _dir: Option<tempfile::TempDir>,
}

impl TestContext {
    fn new(adapter: Arc<dyn MetadataAdapter>, dir: Option<tempfile::TempDir>) -> Self {
        Self {
            persister: adapter.persister(),
            query: adapter.query_service(),
            adapter,
            _dir: dir,
        }
    }

    /// In-memory backend.
    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryAdapter::new(test_types())), None)
    }

    /// SQLite backend on a temporary file.
    #[cfg(feature = "sqlite")]
    pub fn sqlite() -> Self {
        use trellis_persistence::backends::sqlite::SqliteAdapter;

        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let adapter = SqliteAdapter::open(dir.path().join("trellis.db"), test_types())
            .expect("Failed to open SQLite adapter");
        adapter.init_schema().expect("Failed to initialize schema");
        Self::new(Arc::new(adapter), Some(dir))
    }

    /// Search-index backend over the in-process index.
    pub fn index() -> Self {
        Self::new(
            Arc::new(IndexAdapter::new(Arc::new(MemoryIndex::new()), test_types())),
            None,
        )
    }

    /// Returns the backend name of the adapter under test.
    pub fn backend(&self) -> &'static str {
        self.adapter.backend_name()
    }
}

/// Defines a test that runs against every backend.
///
/// ```ignore
/// contract_test!(find_missing_is_not_found, |ctx: TestContext| async move {
///     let err = ctx.query.find_by_id(&"nope".into()).await.unwrap_err();
///     assert!(err.is_not_found());
/// });
/// ```
#[macro_export]
macro_rules! contract_test {
    ($test_name:ident, $test_fn:expr) => {
        paste::paste! {
            #[tokio::test]
            async fn [<memory_ $test_name>]() {
                let test_fn = $test_fn;
                test_fn($crate::common::harness::TestContext::memory()).await;
            }

            #[cfg(feature = "sqlite")]
            #[tokio::test]
            async fn [<sqlite_ $test_name>]() {
                let test_fn = $test_fn;
                test_fn($crate::common::harness::TestContext::sqlite()).await;
            }

            #[tokio::test]
            async fn [<index_ $test_name>]() {
                let test_fn = $test_fn;
                test_fn($crate::common::harness::TestContext::index()).await;
            }
        }
    };
}
