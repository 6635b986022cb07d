//! S3-compatible bucket (AWS S3, Cloudflare R2, MinIO).
//!
//! The SDK is async; the pipeline is not. Each call is driven to completion
//! on a runtime owned by the store.

use std::path::Path;
use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tokio::io::AsyncWriteExt;
use tokio::runtime::Runtime;

use super::{validate_key, MediaStore, StorageError, StorageResult};
use crate::constants::ARTIFACT_CONTENT_TYPE;

/// Connection settings for an S3-compatible endpoint.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint_url: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
}

pub struct S3MediaStore {
    client: Client,
    bucket: String,
    runtime: Runtime,
}

impl S3MediaStore {
    pub fn new(config: S3Config) -> StorageResult<Self> {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "clipsmith",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| StorageError::ConfigError(format!("Failed to start runtime: {}", e)))?;

        Ok(Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
            runtime,
        })
    }

}

/// A missing object is reported either as the operation's typed error or,
/// by some S3-compatible backends, only as a bare 404.
fn is_missing<E>(err: &SdkError<E, HttpResponse>, typed: impl Fn(&E) -> bool) -> bool {
    err.as_service_error().map_or(false, typed)
        || err.raw_response().map(|r| r.status().as_u16()) == Some(404)
}

fn detail<E: std::error::Error + 'static>(err: &SdkError<E, HttpResponse>) -> String {
    DisplayErrorContext(err).to_string()
}

impl MediaStore for S3MediaStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn upload(&self, local: &Path, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        log::debug!("Uploading {} to s3://{}/{}", local.display(), self.bucket, key);

        self.runtime.block_on(async {
            let body = ByteStream::from_path(local)
                .await
                .map_err(|e| StorageError::upload_failed(e.to_string()))?;

            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .body(body)
                .content_type(ARTIFACT_CONTENT_TYPE)
                .send()
                .await
                .map_err(|e| StorageError::upload_failed(detail(&e)))?;

            Ok::<_, StorageError>(())
        })?;

        log::info!("Uploaded {} to s3://{}/{}", local.display(), self.bucket, key);
        Ok(())
    }

    fn download(&self, key: &str, local: &Path) -> StorageResult<()> {
        validate_key(key)?;
        log::debug!("Downloading s3://{}/{} to {}", self.bucket, key, local.display());

        if let Some(parent) = local.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::download_failed(format!("Failed to create directory: {}", e)))?;
        }

        // Stream beside the target, then rename, so a short write never
        // leaves a truncated file under the final name
        let tmp = local.with_extension("partial");
        let result = self.runtime.block_on(async {
            let response = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| {
                    if is_missing(&e, GetObjectError::is_no_such_key) {
                        StorageError::not_found(key)
                    } else {
                        StorageError::download_failed(detail(&e))
                    }
                })?;

            let write_failed = |e: std::io::Error| StorageError::download_failed(format!("Failed to stream object: {}", e));
            let mut file = tokio::fs::File::create(&tmp).await.map_err(write_failed)?;
            let mut body = response.body.into_async_read();
            let copied = tokio::io::copy(&mut body, &mut file).await.map_err(write_failed)?;
            file.flush().await.map_err(write_failed)?;
            drop(file);
            tokio::fs::rename(&tmp, local).await.map_err(write_failed)?;
            Ok::<_, StorageError>(copied)
        });

        match result {
            Ok(bytes) => {
                log::debug!("Downloaded {} bytes from s3://{}/{}", bytes, self.bucket, key);
                Ok(())
            }
            Err(e) => {
                let _ = std::fs::remove_file(&tmp);
                Err(e)
            }
        }
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        self.runtime.block_on(async {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| StorageError::delete_failed(detail(&e)))
        })?;
        Ok(())
    }

    fn object_size(&self, key: &str) -> StorageResult<Option<u64>> {
        validate_key(key)?;
        self.runtime.block_on(async {
            match self.client.head_object().bucket(&self.bucket).key(key).send().await {
                Ok(head) => Ok(Some(head.content_length().unwrap_or(0).max(0) as u64)),
                Err(e) if is_missing(&e, HeadObjectError::is_not_found) => Ok(None),
                Err(e) => Err(StorageError::Backend(detail(&e))),
            }
        })
    }

    fn presign(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        validate_key(key)?;
        let presign_config = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?;

        self.runtime.block_on(async {
            let presigned = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(key)
                .presigned(presign_config)
                .await
                .map_err(|e| StorageError::PresignFailed(e.to_string()))?;
            Ok(presigned.uri().to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_failures_are_not_missing() {
        let err: SdkError<GetObjectError, HttpResponse> = SdkError::construction_failure("bad request");
        assert!(!is_missing(&err, GetObjectError::is_no_such_key));
        assert!(!is_missing(&err, |_| true));

        let err: SdkError<HeadObjectError, HttpResponse> = SdkError::timeout_error("slow");
        assert!(!is_missing(&err, HeadObjectError::is_not_found));
        assert!(detail(&err).contains("slow"));
    }

    #[test]
    fn test_store_builds_without_network() {
        let store = S3MediaStore::new(S3Config {
            endpoint_url: "http://127.0.0.1:9".into(),
            region: "auto".into(),
            access_key_id: "id".into(),
            secret_access_key: "secret".into(),
            bucket_name: "media".into(),
        })
        .unwrap();
        assert_eq!(store.bucket(), "media");
        assert!(matches!(store.download("../escape", Path::new("x")), Err(StorageError::InvalidKey(_))));
    }
}
