//! Blob storage adapters.
//!
//! Binary content never lives in resource records. A [`BlobStore`] keeps the
//! bytes and hands back a [`FileHandle`] whose identifier is stored as an
//! ordinary attribute value. The identifier carries a protocol prefix
//! (`memory://`, `disk://`) so a
//! [`StorageAdapterRegistry`](crate::registry::StorageAdapterRegistry) can
//! route it back to the store that wrote it.
//!
//! | Store | Prefix | Content |
//! |-------|--------|---------|
//! | [`MemoryBlobStore`] | `memory://` | Process memory |
//! | [`DiskBlobStore`] | `disk://` | Files under a base directory |

mod disk;
mod memory;

use std::fmt;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::types::ResourceId;

pub use disk::DiskBlobStore;
pub use memory::MemoryBlobStore;

/// Narrow upload/find/delete interface over a binary store.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Returns a short name for the store (e.g. `"disk"`).
    fn backend_name(&self) -> &'static str;

    /// Returns the identifier prefix this store issues.
    fn protocol(&self) -> &'static str;

    /// Returns `true` if `id` was issued by a store of this kind.
    fn handles(&self, id: &str) -> bool {
        id.starts_with(self.protocol())
    }

    /// Stores `bytes` for the resource `owner_id`.
    async fn upload(
        &self,
        bytes: &[u8],
        original_filename: &str,
        owner_id: &ResourceId,
    ) -> StorageResult<FileHandle>;

    /// Looks up stored content.
    ///
    /// Fails with `ResourceError::FileNotFound` for unknown identifiers.
    async fn find_by_id(&self, id: &str) -> StorageResult<FileHandle>;

    /// Removes stored content. Unknown identifiers are ignored.
    async fn delete(&self, id: &str) -> StorageResult<()>;
}

impl fmt::Debug for dyn BlobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobStore")
            .field("backend", &self.backend_name())
            .field("protocol", &self.protocol())
            .finish()
    }
}

#[derive(Clone)]
enum Content {
    Bytes(Arc<[u8]>),
    Path(PathBuf),
}

/// A stored file: its identifier plus a way to read the content.
#[derive(Clone)]
pub struct FileHandle {
    id: String,
    original_filename: String,
    size: u64,
    content: Content,
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("id", &self.id)
            .field("original_filename", &self.original_filename)
            .field("size", &self.size)
            .finish()
    }
}

impl FileHandle {
    pub(crate) fn in_memory(id: String, original_filename: String, bytes: Arc<[u8]>) -> Self {
        Self {
            id,
            original_filename,
            size: bytes.len() as u64,
            content: Content::Bytes(bytes),
        }
    }

    pub(crate) fn on_disk(id: String, original_filename: String, size: u64, path: PathBuf) -> Self {
        Self {
            id,
            original_filename,
            size,
            content: Content::Path(path),
        }
    }

    /// Returns the identifier to store in resource attributes.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the filename given at upload.
    pub fn original_filename(&self) -> &str {
        &self.original_filename
    }

    /// Returns the content length in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Opens the content for reading.
    pub fn read(&self) -> StorageResult<Box<dyn Read + Send>> {
        match &self.content {
            Content::Bytes(bytes) => Ok(Box::new(Cursor::new(bytes.clone()))),
            Content::Path(path) => Ok(Box::new(std::fs::File::open(path)?)),
        }
    }

    /// Reads the whole content.
    pub fn bytes(&self) -> StorageResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.size as usize);
        self.read()?.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

/// Keeps only the final path component of an uploaded filename.
pub(crate) fn file_name_of(original_filename: &str) -> &str {
    original_filename
        .rsplit(['/', '\\'])
        .find(|part| !part.is_empty() && *part != "." && *part != "..")
        .unwrap_or("file")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_of_strips_directories() {
        assert_eq!(file_name_of("cover.png"), "cover.png");
        assert_eq!(file_name_of("../../etc/passwd"), "passwd");
        assert_eq!(file_name_of("C:\\scans\\page1.tif"), "page1.tif");
        assert_eq!(file_name_of(".."), "file");
        assert_eq!(file_name_of(""), "file");
    }

    #[test]
    fn test_memory_handle_reads_content() {
        let handle = FileHandle::in_memory(
            "memory://x".to_string(),
            "a.txt".to_string(),
            Arc::from(&b"hello"[..]),
        );
        assert_eq!(handle.size(), 5);
        assert_eq!(handle.bytes().unwrap(), b"hello");
    }
}
