//! Local filesystem payload store

use crate::error::{Error, Result};
use crate::storage::FileStore;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// Payload store over a local directory tree.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// reader either sees the previous complete payload or the new one.
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    /// Create a store rooted at the given directory
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Deterministic payload path for a resource
    pub fn payload_path(&self, resource_id: &str, file_type: &str, file_extension: &str) -> PathBuf {
        self.root
            .join(file_type)
            .join(file_extension.to_uppercase())
            .join(format!("{}.{}", resource_id, file_extension))
    }

    /// Staging sibling of the payload path, unique per token so concurrent
    /// writers never share a staging file
    fn staging_path(
        &self,
        resource_id: &str,
        file_type: &str,
        file_extension: &str,
        token: &str,
    ) -> PathBuf {
        self.payload_path(resource_id, file_type, file_extension)
            .with_extension(format!("{}.{}.tmp", file_extension, token))
    }

    async fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn store(
        &self,
        resource_id: &str,
        file_type: &str,
        file_extension: &str,
        payload: &[u8],
    ) -> Result<()> {
        let token = self.stage(resource_id, file_type, file_extension, payload).await?;
        self.publish(resource_id, file_type, file_extension, &token).await?;

        tracing::debug!(
            "Stored payload for {} at {}",
            resource_id,
            self.payload_path(resource_id, file_type, file_extension).display()
        );
        Ok(())
    }

    async fn stage(
        &self,
        resource_id: &str,
        file_type: &str,
        file_extension: &str,
        payload: &[u8],
    ) -> Result<String> {
        let path = self.payload_path(resource_id, file_type, file_extension);
        Self::ensure_parent(&path).await?;

        // Stage next to the destination so the rename stays on one filesystem
        let token = Uuid::new_v4().to_string();
        let staging = self.staging_path(resource_id, file_type, file_extension, &token);
        fs::write(&staging, payload).await?;
        Ok(token)
    }

    async fn publish(
        &self,
        resource_id: &str,
        file_type: &str,
        file_extension: &str,
        token: &str,
    ) -> Result<()> {
        let staging = self.staging_path(resource_id, file_type, file_extension, token);
        let path = self.payload_path(resource_id, file_type, file_extension);
        fs::rename(&staging, &path).await?;
        Ok(())
    }

    async fn discard(
        &self,
        resource_id: &str,
        file_type: &str,
        file_extension: &str,
        token: &str,
    ) -> Result<()> {
        let staging = self.staging_path(resource_id, file_type, file_extension, token);
        match fs::remove_file(&staging).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn load(
        &self,
        resource_id: &str,
        file_type: &str,
        file_extension: &str,
    ) -> Result<Vec<u8>> {
        let path = self.payload_path(resource_id, file_type, file_extension);
        fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(format!("no payload at {}", path.display()))
            } else {
                Error::Io(e)
            }
        })
    }

    async fn exists(
        &self,
        resource_id: &str,
        file_type: &str,
        file_extension: &str,
    ) -> Result<bool> {
        let path = self.payload_path(resource_id, file_type, file_extension);
        Ok(fs::try_exists(&path).await?)
    }
}
