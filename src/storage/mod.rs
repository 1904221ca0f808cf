//! File payload storage boundary
//!
//! Payloads live on a deterministic hierarchical path:
//! ```text
//! <root>/
//! ├── <file_type>/
//! │   └── <FILE_EXTENSION uppercased>/
//! │       ├── <resource_id>.<file_extension>
//! │       └── ...
//! └── ...
//! ```
//! Pure storage, no business logic: the [`crate::resource::ResourceManager`]
//! decides what a missing file means.

mod local;

pub use local::LocalFileStore;

use crate::error::Result;
use async_trait::async_trait;

/// Storage boundary for raw resource payloads.
///
/// A payload is append-once-then-immutable for a given version: `store` on an
/// existing key must replace the whole payload atomically so concurrent
/// readers never observe a partially written file.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Write a payload for the given resource
    async fn store(
        &self,
        resource_id: &str,
        file_type: &str,
        file_extension: &str,
        payload: &[u8],
    ) -> Result<()>;

    /// Write a payload to a private staging location without publishing it.
    /// Returns a token identifying the staged copy.
    async fn stage(
        &self,
        resource_id: &str,
        file_type: &str,
        file_extension: &str,
        payload: &[u8],
    ) -> Result<String>;

    /// Atomically swap a previously staged payload into place
    async fn publish(
        &self,
        resource_id: &str,
        file_type: &str,
        file_extension: &str,
        token: &str,
    ) -> Result<()>;

    /// Drop a staged payload that will not be published
    async fn discard(
        &self,
        resource_id: &str,
        file_type: &str,
        file_extension: &str,
        token: &str,
    ) -> Result<()>;

    /// Read a payload back
    async fn load(&self, resource_id: &str, file_type: &str, file_extension: &str)
        -> Result<Vec<u8>>;

    /// Whether a payload exists for the given resource
    async fn exists(
        &self,
        resource_id: &str,
        file_type: &str,
        file_extension: &str,
    ) -> Result<bool>;
}
