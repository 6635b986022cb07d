// Filesystem-backed bucket: objects live at <root>/<bucket>/<key>.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::{validate_key, MediaStore, StorageError, StorageResult};

#[derive(Debug, Clone)]
pub struct LocalMediaStore {
    bucket_dir: PathBuf,
    bucket: String,
}

impl LocalMediaStore {
    pub fn new(root: &Path, bucket: &str) -> StorageResult<Self> {
        validate_key(bucket)?;
        let bucket_dir = root.join(bucket);
        fs::create_dir_all(&bucket_dir).map_err(|e| {
            StorageError::ConfigError(format!("Cannot create {}: {}", bucket_dir.display(), e))
        })?;
        Ok(Self { bucket_dir, bucket: bucket.to_string() })
    }

    fn object_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.bucket_dir.join(key))
    }
}

/// Copy `src` to `dest` through a sibling temp file so `dest` only ever
/// appears complete.
fn copy_atomic(src: &Path, dest: &Path) -> std::io::Result<u64> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = dest.with_extension(format!("partial-{}", uuid::Uuid::new_v4().simple()));
    let copied = match fs::copy(src, &tmp) {
        Ok(n) => n,
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
    };
    if let Err(e) = fs::rename(&tmp, dest) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(copied)
}

impl MediaStore for LocalMediaStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn upload(&self, local: &Path, key: &str) -> StorageResult<()> {
        let dest = self.object_path(key)?;
        log::debug!("Uploading {} to {}/{}", local.display(), self.bucket, key);
        let bytes = copy_atomic(local, &dest)
            .map_err(|e| StorageError::upload_failed(format!("{}: {}", key, e)))?;
        log::info!("Uploaded {} ({} bytes) to {}/{}", local.display(), bytes, self.bucket, key);
        Ok(())
    }

    fn download(&self, key: &str, local: &Path) -> StorageResult<()> {
        let src = self.object_path(key)?;
        if !src.is_file() {
            return Err(StorageError::not_found(key));
        }
        log::debug!("Downloading {}/{} to {}", self.bucket, key, local.display());
        copy_atomic(&src, local)
            .map_err(|e| StorageError::download_failed(format!("{}: {}", key, e)))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.object_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            // Deleting an absent object is not an error (S3 semantics)
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::delete_failed(format!("{}: {}", key, e))),
        }
    }

    fn object_size(&self, key: &str) -> StorageResult<Option<u64>> {
        let path = self.object_path(key)?;
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Backend(e.to_string())),
        }
    }

    fn presign(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        let path = self.object_path(key)?;
        if !path.is_file() {
            return Err(StorageError::not_found(key));
        }
        let expires_at = SystemTime::now()
            .checked_add(expires_in)
            .ok_or_else(|| StorageError::PresignFailed("expiry out of range".to_string()))?
            .duration_since(UNIX_EPOCH)
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?
            .as_secs();
        Ok(format!("file://{}?expires={}", path.display(), expires_at))
    }
}
