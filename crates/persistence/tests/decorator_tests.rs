//! Persister decorators over real backends.

mod common;

use std::sync::Arc;

use common::*;
use trellis_persistence::backends::index::{IndexAdapter, MemoryIndex};
use trellis_persistence::backends::memory::MemoryAdapter;
use trellis_persistence::composite::{
    AppendPersisterFactory, BufferedPersister, CompositePersister, ParentCleanupPersister,
    ResourceChangeSet,
};
use trellis_persistence::core::{MetadataAdapter, Persister, QueryServiceExt};
use trellis_persistence::error::StorageError;
use trellis_persistence::types::Resource;

fn primary() -> Arc<dyn MetadataAdapter> {
    #[cfg(feature = "sqlite")]
    {
        use trellis_persistence::backends::sqlite::SqliteAdapter;
        let adapter = SqliteAdapter::in_memory(test_types()).expect("Failed to open SQLite");
        adapter.init_schema().expect("Failed to initialize schema");
        Arc::new(adapter)
    }
    #[cfg(not(feature = "sqlite"))]
    {
        Arc::new(MemoryAdapter::new(test_types()))
    }
}

fn index() -> Arc<dyn MetadataAdapter> {
    Arc::new(IndexAdapter::new(Arc::new(MemoryIndex::new()), test_types()))
}

// ============================================================================
// Buffered index writes
// ============================================================================

#[tokio::test]
async fn test_buffered_writes_are_invisible_until_block_succeeds() {
    let primary = primary();
    let index = index();
    let buffered = BufferedPersister::new(primary.persister(), index.persister());

    let index_query = index.query_service();
    let saved = buffered
        .buffer_into_index(|persister| {
            let index_query = index_query.clone();
            async move {
                let saved = persister.save(&page("staged")).await?;
                let err = index_query.find_by_id(saved.id().unwrap()).await.unwrap_err();
                assert!(err.is_not_found());
                Ok(saved)
            }
        })
        .await
        .unwrap();

    let indexed = index.query_service().find_by_id(saved.id().unwrap()).await.unwrap();
    assert_eq!(indexed.created_at(), saved.created_at());
    assert!(primary.query_service().find_by_id(saved.id().unwrap()).await.is_ok());
}

#[tokio::test]
async fn test_failed_block_leaves_index_untouched() {
    let primary = primary();
    let index = index();
    let buffered = BufferedPersister::new(primary.persister(), index.persister());

    let err = buffered
        .buffer_into_index(|persister| async move {
            persister.save(&page("kept in primary")).await?;
            persister.save(&Resource::new("Chapter")).await
        })
        .await
        .unwrap_err();
    assert!(!err.is_not_found());

    assert_eq!(index.query_service().find_all().count().await.unwrap(), 0);
    assert_eq!(primary.query_service().count_all_of_type("Page").await.unwrap(), 1);
}

#[tokio::test]
async fn test_buffered_parent_and_children_reach_index() {
    let primary = primary();
    let index = index();
    let buffered = BufferedPersister::new(primary.persister(), index.persister());

    let book = buffered
        .buffer_into_index(|persister| async move {
            let a = persister.save(&page("a")).await?;
            let b = persister.save(&page("b")).await?;
            persister
                .save(&book("Book").with_members([b.id().unwrap(), a.id().unwrap()]))
                .await
        })
        .await
        .unwrap();

    let query = index.query_service();
    let members = query.find_members(&book).await.unwrap();
    assert_eq!(ids_of(&members), book.member_ids());
    let parents = query.find_parents(&members[0]).await.unwrap();
    assert_eq!(ids_of(&parents), ids_of(&[book]));
}

#[tokio::test]
async fn test_cleanup_through_buffered_persister() {
    let primary = primary();
    let index = index();
    let buffered = BufferedPersister::new(primary.persister(), index.persister());

    let (book, a, _b) = buffered
        .buffer_into_index(|persister| async move {
            Ok(book_with_two_pages(persister.as_ref()).await)
        })
        .await
        .unwrap();

    buffered
        .buffer_into_index(|persister| {
            let cleanup = ParentCleanupPersister::new(persister, primary.query_service());
            let a = a.clone();
            async move { cleanup.delete(&a).await }
        })
        .await
        .unwrap();

    for adapter in [&primary, &index] {
        let query = adapter.query_service();
        let book = query.find_by_id(book.id().unwrap()).await.unwrap();
        assert_eq!(book.member_ids().len(), 1, "{}", adapter.backend_name());
        assert!(query.find_by_id(a.id().unwrap()).await.unwrap_err().is_not_found());
    }
}

// ============================================================================
// Append
// ============================================================================

#[tokio::test]
async fn test_appends_keep_submission_order() {
    let primary = primary();
    let parent = primary.persister().save(&book("Anthology")).await.unwrap();
    let factory = AppendPersisterFactory::new(
        primary.persister(),
        primary.query_service(),
        primary.persister(),
    );

    let mut children = Vec::new();
    for title in ["one", "two", "three"] {
        let change_set = ResourceChangeSet::new(page(title)).with_append_id(parent.id().unwrap());
        let persister = factory.for_change_set(&change_set);
        children.push(persister.save(&page(title)).await.unwrap());
    }

    let parent = primary.query_service().find_by_id(parent.id().unwrap()).await.unwrap();
    assert_eq!(parent.member_ids(), &ids_of(&children)[..]);
}

#[tokio::test]
async fn test_append_reindexes_parent_through_auxiliary() {
    let primary = primary();
    let index = index();
    let chain: Arc<dyn Persister> =
        Arc::new(CompositePersister::new(primary.persister()).with(index.persister()));
    let parent = chain.save(&book("Indexed")).await.unwrap();

    let factory = AppendPersisterFactory::new(chain.clone(), primary.query_service(), chain.clone());
    let change_set = ResourceChangeSet::new(page("p")).with_append_id(parent.id().unwrap());
    let child = factory
        .for_change_set(&change_set)
        .save(&page("p"))
        .await
        .unwrap();

    let parents = index.query_service().find_parents(&child).await.unwrap();
    assert_eq!(ids_of(&parents), ids_of(&[parent]));
}

// ============================================================================
// Composite chains
// ============================================================================

#[tokio::test]
async fn test_chain_keeps_locking_in_every_backend() {
    let primary = primary();
    let index = index();
    let chain = CompositePersister::new(primary.persister()).with(index.persister());

    let first = chain.save(&book("v1")).await.unwrap();
    assert_eq!(first.lock_tokens().len(), 2);
    let second = chain.save(&first).await.unwrap();

    let err = chain.save(&first).await.unwrap_err();
    assert!(matches!(err, StorageError::Concurrency(_)));
    chain.save(&second).await.unwrap();
}

#[tokio::test]
async fn test_chain_into_memory_copy() {
    let primary = primary();
    let copy = MemoryAdapter::new(test_types());
    let chain = CompositePersister::new(primary.persister()).with(copy.persister());

    let saved = chain.save(&rich_page()).await.unwrap();
    let mirrored = copy.query_service().find_by_id(saved.id().unwrap()).await.unwrap();
    assert_eq!(mirrored.attributes(), rich_page().attributes());
    assert_eq!(mirrored.created_at(), saved.created_at());
}
