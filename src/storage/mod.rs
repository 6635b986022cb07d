//! Object storage abstraction.
//!
//! A [`MediaStore`] is bound to a single bucket. Transfers are
//! all-or-nothing: a failed upload or download leaves nothing behind under
//! the target name.

pub mod local;
pub mod s3;

use std::path::Path;
use std::time::Duration;

use thiserror::Error;

pub use local::LocalMediaStore;
pub use s3::S3MediaStore;

use crate::config::{StorageBackend, StorageConfig};

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to configure storage client: {0}")]
    ConfigError(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Presign failed: {0}")]
    PresignFailed(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    pub fn upload_failed(msg: impl Into<String>) -> Self {
        Self::UploadFailed(msg.into())
    }

    pub fn download_failed(msg: impl Into<String>) -> Self {
        Self::DownloadFailed(msg.into())
    }

    pub fn delete_failed(msg: impl Into<String>) -> Self {
        Self::DeleteFailed(msg.into())
    }
}

/// Bucket-scoped blob store.
pub trait MediaStore {
    /// Bucket this store reads and writes.
    fn bucket(&self) -> &str;

    fn upload(&self, local: &Path, key: &str) -> StorageResult<()>;

    /// Download `key` to `local`. On failure `local` does not exist.
    fn download(&self, key: &str, local: &Path) -> StorageResult<()>;

    fn delete(&self, key: &str) -> StorageResult<()>;

    /// Size of the stored object, `None` when absent.
    fn object_size(&self, key: &str) -> StorageResult<Option<u64>>;

    fn presign(&self, key: &str, expires_in: Duration) -> StorageResult<String>;

    fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.object_size(key)?.is_some())
    }
}

/// Delete an object, logging instead of propagating failures.
/// Used where the catalog row, not the blob, decides existence.
pub fn delete_and_log(store: &dyn MediaStore, key: &str) {
    match store.delete(key) {
        Ok(()) => log::info!("Deleted {}/{}", store.bucket(), key),
        Err(e) => log::warn!("Failed to delete {}/{} (ignored): {}", store.bucket(), key, e),
    }
}

/// Reject keys that could escape the bucket or address nothing.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.starts_with('/') || key.contains('\\') {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    if key.split('/').any(|part| part.is_empty() || part == "." || part == "..") {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Build the configured store.
pub fn connect(config: &StorageConfig) -> StorageResult<Box<dyn MediaStore>> {
    match &config.backend {
        StorageBackend::Local { root } => {
            Ok(Box::new(LocalMediaStore::new(root, &config.bucket)?))
        }
        StorageBackend::S3 { endpoint, region, access_key_env, secret_key_env } => {
            let access_key = std::env::var(access_key_env)
                .map_err(|_| StorageError::ConfigError(format!("{} not set", access_key_env)))?;
            let secret_key = std::env::var(secret_key_env)
                .map_err(|_| StorageError::ConfigError(format!("{} not set", secret_key_env)))?;
            Ok(Box::new(S3MediaStore::new(s3::S3Config {
                endpoint_url: endpoint.clone(),
                region: region.clone(),
                access_key_id: access_key,
                secret_access_key: secret_key,
                bucket_name: config.bucket.clone(),
            })?))
        }
    }
}
