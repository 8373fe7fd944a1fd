//! Local filesystem storage backend
//!
//! Download URLs point back at this service's `/files/{key}` route and
//! carry an HMAC over `key.expires`, so a leaked link stops working when
//! it expires just like a presigned S3 URL.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use shared::error::{AppError, AppResult, ErrorCode};
use std::path::{Component, Path, PathBuf};

use super::StorageAdapter;

pub struct LocalStorage {
    root: PathBuf,
    base_url: String,
    signing_key: String,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>, base_url: String, signing_key: String) -> Self {
        Self {
            root: root.into(),
            base_url,
            signing_key,
        }
    }

    /// Resolve a key inside the root, rejecting path traversal
    fn resolve(&self, key: &str) -> AppResult<PathBuf> {
        let rel = Path::new(key);
        if rel.components().any(|c| {
            !matches!(c, Component::Normal(_))
        }) {
            return Err(AppError::validation("invalid storage key").with_detail("key", key));
        }
        Ok(self.root.join(rel))
    }

    fn signature(&self, key: &str, expires: i64) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.signing_key.as_bytes())
            .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
        mac.update(format!("{key}.{expires}").as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Validate a signed `/files/{key}` request
    pub fn verify_signed_request(
        &self,
        key: &str,
        expires: i64,
        signature: &str,
        now: DateTime<Utc>,
    ) -> bool {
        if now.timestamp() > expires {
            return false;
        }
        let Ok(given) = hex::decode(signature) else {
            return false;
        };
        let mut mac = Hmac::<Sha256>::new_from_slice(self.signing_key.as_bytes())
            .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
        mac.update(format!("{key}.{expires}").as_bytes());
        // Constant-time comparison, same as the webhook checks
        mac.verify_slice(&given).is_ok()
    }

    /// Read a file for the signed-URL serving route
    pub async fn read_file(&self, key: &str) -> AppResult<Vec<u8>> {
        let path = self.resolve(key)?;
        tokio::fs::read(&path)
            .await
            .map_err(|_| AppError::not_found("file"))
    }
}

#[async_trait]
impl StorageAdapter for LocalStorage {
    async fn get_download_url(&self, key: &str, expires_in: Duration) -> AppResult<String> {
        if !self.file_exists(key).await? {
            return Err(AppError::not_found("file").with_detail("key", key));
        }
        let expires = (Utc::now() + expires_in).timestamp();
        let sig = self.signature(key, expires);
        Ok(format!(
            "{}/files/{key}?expires={expires}&sig={sig}",
            self.base_url
        ))
    }

    async fn upload_file(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> AppResult<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::with_message(ErrorCode::Internal, e.to_string()))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| AppError::with_message(ErrorCode::Internal, e.to_string()))
    }

    async fn delete_file(&self, key: &str) -> AppResult<()> {
        let path = self.resolve(key)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|_| AppError::not_found("file"))
    }

    async fn file_exists(&self, key: &str) -> AppResult<bool> {
        let path = self.resolve(key)?;
        Ok(tokio::fs::try_exists(&path).await.unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(dir: &tempfile::TempDir) -> LocalStorage {
        LocalStorage::new(
            dir.path(),
            "http://localhost:8080".into(),
            "sign-key".into(),
        )
    }

    #[tokio::test]
    async fn upload_exists_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let s = storage(&dir);

        assert!(!s.file_exists("products/a.pdf").await.unwrap());
        s.upload_file("products/a.pdf", b"bytes".to_vec(), "application/pdf")
            .await
            .unwrap();
        assert!(s.file_exists("products/a.pdf").await.unwrap());
        assert_eq!(s.read_file("products/a.pdf").await.unwrap(), b"bytes");
        s.delete_file("products/a.pdf").await.unwrap();
        assert!(!s.file_exists("products/a.pdf").await.unwrap());
    }

    #[tokio::test]
    async fn signed_url_verifies_until_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let s = storage(&dir);
        s.upload_file("a.zip", b"z".to_vec(), "application/zip")
            .await
            .unwrap();

        let url = s
            .get_download_url("a.zip", Duration::seconds(300))
            .await
            .unwrap();
        let expires: i64 = url.split("expires=").nth(1).unwrap()
            .split('&').next().unwrap()
            .parse().unwrap();
        let sig = url.split("sig=").nth(1).unwrap();

        assert!(s.verify_signed_request("a.zip", expires, sig, Utc::now()));
        // Past expiry
        let late = Utc::now() + Duration::seconds(301);
        assert!(!s.verify_signed_request("a.zip", expires, sig, late));
        // Wrong key
        assert!(!s.verify_signed_request("b.zip", expires, sig, Utc::now()));
        // Tampered signature
        assert!(!s.verify_signed_request("a.zip", expires, "deadbeef", Utc::now()));
    }

    #[tokio::test]
    async fn download_url_for_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let s = storage(&dir);
        let err = s
            .get_download_url("nope.pdf", Duration::seconds(60))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn path_traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let s = storage(&dir);
        assert!(s.read_file("../etc/passwd").await.is_err());
        assert!(s.file_exists("../../x").await.is_err());
    }
}
