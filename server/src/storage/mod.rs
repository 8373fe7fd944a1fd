//! Storage adapters
//!
//! Byte delivery is delegated to a swappable backend: S3 with presigned
//! URLs in production, the local filesystem with HMAC-signed URLs for
//! development and tests.

mod local;
mod s3;

use async_trait::async_trait;
use chrono::Duration;
use shared::error::AppResult;

pub use local::LocalStorage;
pub use s3::S3Storage;

#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// A short-lived signed URL granting one GET of `key`
    async fn get_download_url(&self, key: &str, expires_in: Duration) -> AppResult<String>;

    async fn upload_file(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> AppResult<()>;

    async fn delete_file(&self, key: &str) -> AppResult<()>;

    async fn file_exists(&self, key: &str) -> AppResult<bool>;
}
