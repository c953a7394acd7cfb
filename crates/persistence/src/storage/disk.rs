//! Filesystem blob store.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{BackendError, ResourceError, StorageResult};
use crate::types::ResourceId;

use super::{BlobStore, FileHandle, file_name_of};

const PROTOCOL: &str = "disk://";

/// Blob store writing files below a base directory.
///
/// Files land at `<base>/<owner>/<uuid>/<filename>` and are identified as
/// `disk://<path>`. Identifiers that resolve outside the base directory are
/// treated as unknown.
#[derive(Debug, Clone)]
pub struct DiskBlobStore {
    base_path: PathBuf,
}

impl DiskBlobStore {
    /// Creates a store rooted at `base_path`, creating the directory.
    pub fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path)?;
        let base_path = base_path.canonicalize()?;
        tracing::info!(base_path = %base_path.display(), "Disk blob store ready");
        Ok(Self { base_path })
    }

    /// Returns the base directory.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Maps an identifier back to a path inside the base directory.
    fn path_of(&self, id: &str) -> Option<PathBuf> {
        let path = Path::new(id.strip_prefix(PROTOCOL)?);
        let inside = path.starts_with(&self.base_path)
            && !path
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::CurDir));
        inside.then(|| path.to_path_buf())
    }
}

/// Turns an owner id into a single directory name.
fn owner_dir(owner_id: &ResourceId) -> String {
    owner_id
        .as_str()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[async_trait]
impl BlobStore for DiskBlobStore {
    fn backend_name(&self) -> &'static str {
        "disk"
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
        let file_name = file_name_of(original_filename);
        let dir = self
            .base_path
            .join(owner_dir(owner_id))
            .join(Uuid::new_v4().to_string());
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(file_name);
        std::fs::write(&path, bytes)?;

        let id = path
            .to_str()
            .map(|p| format!("{}{}", PROTOCOL, p))
            .ok_or_else(|| BackendError::Internal {
                backend_name: "disk".to_string(),
                message: format!("path is not valid UTF-8: {}", path.display()),
                source: None,
            })?;
        tracing::debug!(id = %id, owner = %owner_id, size = bytes.len(), "Stored file");
        Ok(FileHandle::on_disk(
            id,
            file_name.to_string(),
            bytes.len() as u64,
            path,
        ))
    }

    async fn find_by_id(&self, id: &str) -> StorageResult<FileHandle> {
        let not_found = || ResourceError::FileNotFound { id: id.to_string() };
        let path = self.path_of(id).ok_or_else(not_found)?;
        let metadata = match std::fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return Err(not_found().into()),
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(not_found().into()),
            Err(e) => return Err(e.into()),
        };
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();
        Ok(FileHandle::on_disk(id.to_string(), file_name, metadata.len(), path))
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        let Some(path) = self.path_of(id) else {
            return Ok(());
        };
        match std::fs::remove_file(&path) {
            Ok(()) => {
                if let Some(dir) = path.parent() {
                    // The per-upload directory only ever holds this file.
                    let _ = std::fs::remove_dir(dir);
                }
                tracing::debug!(id, "Deleted file");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
