//! In-process blob store.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{ResourceError, StorageResult};
use crate::types::ResourceId;

use super::{BlobStore, FileHandle, file_name_of};

const PROTOCOL: &str = "memory://";

struct StoredFile {
    original_filename: String,
    bytes: Arc<[u8]>,
}

/// Blob store keeping content in memory; identifiers are `memory://<uuid>`.
#[derive(Default)]
pub struct MemoryBlobStore {
    files: RwLock<BTreeMap<String, StoredFile>>,
}

impl std::fmt::Debug for MemoryBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBlobStore")
            .field("files", &self.files.read().len())
            .finish()
    }
}

impl MemoryBlobStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored files.
    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn protocol(&self) -> &'static str {
        PROTOCOL
    }

    async fn upload(
        &self,
        bytes: &[u8],
        original_filename: &str,
        owner_id: &ResourceId,
    ) -> StorageResult<FileHandle> {
        let id = format!("{}{}", PROTOCOL, Uuid::new_v4());
        let file = StoredFile {
            original_filename: file_name_of(original_filename).to_string(),
            bytes: Arc::from(bytes),
        };
        let handle =
            FileHandle::in_memory(id.clone(), file.original_filename.clone(), file.bytes.clone());
        self.files.write().insert(id, file);
        tracing::debug!(id = %handle.id(), owner = %owner_id, size = handle.size(), "Stored file");
        Ok(handle)
    }

    async fn find_by_id(&self, id: &str) -> StorageResult<FileHandle> {
        let files = self.files.read();
        let file = files
            .get(id)
            .ok_or_else(|| ResourceError::FileNotFound { id: id.to_string() })?;
        Ok(FileHandle::in_memory(
            id.to_string(),
            file.original_filename.clone(),
            file.bytes.clone(),
        ))
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        if self.files.write().remove(id).is_some() {
            tracing::debug!(id, "Deleted file");
        }
        Ok(())
    }
}
