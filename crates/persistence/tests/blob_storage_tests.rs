//! Blob storage adapters and their registry.

mod common;

use std::io::Read;
use std::sync::Arc;

use common::*;
use trellis_persistence::backends::memory::MemoryAdapter;
use trellis_persistence::core::MetadataAdapter;
use trellis_persistence::error::{RegistryError, StorageError};
use trellis_persistence::registry::StorageAdapterRegistry;
use trellis_persistence::storage::{BlobStore, DiskBlobStore, MemoryBlobStore};
use trellis_persistence::types::PropertyValue;

fn registry(dir: &std::path::Path) -> StorageAdapterRegistry {
    let registry = StorageAdapterRegistry::storage();
    registry
        .register("disk", Arc::new(DiskBlobStore::new(dir).unwrap()))
        .unwrap();
    registry
        .register("memory", Arc::new(MemoryBlobStore::new()))
        .unwrap();
    registry.freeze();
    registry
}

#[tokio::test]
async fn test_file_id_is_stored_on_the_resource() {
    let dir = tempfile::tempdir().unwrap();
    let storage = registry(dir.path());
    let metadata = MemoryAdapter::new(test_types());

    let page = metadata.persister().save(&page("scan")).await.unwrap();
    let disk = storage.find("disk").unwrap();
    let handle = disk
        .upload(b"%PDF-1.7", "scan.pdf", page.id().unwrap())
        .await
        .unwrap();

    let mut page = page;
    page.set("file_identifiers", vec![PropertyValue::Uri(handle.id().to_string())]);
    let page = metadata.persister().save(&page).await.unwrap();

    let file_id = match page.get("file_identifiers").map(|v| v.as_slice()) {
        Some([PropertyValue::Uri(id)]) => id.clone(),
        other => panic!("unexpected file identifiers: {:?}", other),
    };
    let found = storage.find_file(&file_id).await.unwrap();
    let mut content = String::new();
    found.read().unwrap().read_to_string(&mut content).unwrap();
    assert_eq!(content, "%PDF-1.7");
    assert_eq!(found.original_filename(), "scan.pdf");
}

#[tokio::test]
async fn test_ids_route_to_the_issuing_store() {
    let dir = tempfile::tempdir().unwrap();
    let storage = registry(dir.path());

    for name in ["disk", "memory"] {
        let store = storage.find(name).unwrap();
        let handle = store.upload(b"x", "x.bin", &"owner".into()).await.unwrap();
        assert_eq!(storage.adapter_for(handle.id()).unwrap().backend_name(), name);

        store.delete(handle.id()).await.unwrap();
        assert!(storage.find_file(handle.id()).await.is_err());
    }

    let err = storage.adapter_for("fedora://obj/1").unwrap_err();
    assert!(matches!(err, StorageError::Registry(RegistryError::NoHandler { .. })));
}

#[tokio::test]
async fn test_memory_handles_are_independent_readers() {
    let store = MemoryBlobStore::new();
    let handle = store.upload(b"abc", "a.txt", &"o".into()).await.unwrap();

    let mut first = handle.read().unwrap();
    let mut byte = [0u8; 1];
    first.read_exact(&mut byte).unwrap();
    assert_eq!(handle.bytes().unwrap(), b"abc");
    assert_eq!(handle.size(), 3);
}
