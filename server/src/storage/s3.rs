//! S3 storage backend with presigned download URLs

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use chrono::Duration;
use shared::error::{AppError, AppResult};

use super::StorageAdapter;

pub struct S3Storage {
    client: S3Client,
    bucket: String,
}

impl S3Storage {
    pub fn new(client: S3Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    fn transient(op: &str, e: impl std::fmt::Display) -> AppError {
        tracing::warn!(error = %e, "S3 {op} failed");
        AppError::provider_transient(format!("storage {op} failed"))
    }
}

#[async_trait]
impl StorageAdapter for S3Storage {
    async fn get_download_url(&self, key: &str, expires_in: Duration) -> AppResult<String> {
        let expires = expires_in
            .to_std()
            .map_err(|e| Self::transient("presign", e))?;
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(
                PresigningConfig::expires_in(expires)
                    .map_err(|e| Self::transient("presign", e))?,
            )
            .await
            .map_err(|e| Self::transient("presign", e))?;
        Ok(presigned.uri().to_string())
    }

    async fn upload_file(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> AppResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| Self::transient("upload", e))?;
        Ok(())
    }

    async fn delete_file(&self, key: &str) -> AppResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Self::transient("delete", e))?;
        Ok(())
    }

    async fn file_exists(&self, key: &str) -> AppResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_not_found()) =>
            {
                Ok(false)
            }
            Err(err) => Err(Self::transient("head", err)),
        }
    }
}
