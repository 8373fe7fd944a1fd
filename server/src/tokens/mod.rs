//! Download token service
//!
//! Two-tier design: an HS256-signed token proves authenticity cheaply and
//! carries the grant (order, files, expiry), while the persisted row is
//! the single source of truth for remaining downloads. Verification is
//! pure and never consumes a download; redemption commits by an atomic
//! conditional decrement.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared::error::{AppError, ErrorCode};
use shared::models::{DownloadToken, Order};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::db;
use crate::error::ServiceResult;
use crate::storage::StorageAdapter;

/// Claims embedded in a download token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadClaims {
    /// Order id
    pub sub: String,
    /// Token row id
    pub jti: String,
    /// Storage keys this token grants access to
    pub files: Vec<String>,
    pub user_id: Option<String>,
    pub max_downloads: i32,
    pub iat: i64,
    pub exp: i64,
}

/// Access metadata captured on redemption
#[derive(Debug, Clone, Default)]
pub struct AccessMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Clone)]
pub struct TokenService {
    secret: String,
    ttl: Duration,
    max_downloads: i32,
}

impl TokenService {
    pub fn new(secret: String, ttl: Duration, max_downloads: i32) -> Self {
        Self {
            secret,
            ttl,
            max_downloads,
        }
    }

    fn sign(&self, claims: &DownloadClaims) -> Result<String, jsonwebtoken::errors::Error> {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
    }

    /// Decode and validate a token. Returns `None` on any defect — bad
    /// signature, expiry, malformed claims. Pure check; never consumes a
    /// download.
    pub fn verify(&self, token: &str) -> Option<DownloadClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        decode::<DownloadClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .ok()
    }

    /// Issue the download token for a paid order, exactly once per order.
    ///
    /// Duplicate success webhooks race here; the UNIQUE(order_id)
    /// constraint arbitrates and losers return the already-issued row.
    pub async fn issue(
        &self,
        pool: &PgPool,
        order: &Order,
        files: Vec<String>,
        user_id: Option<String>,
    ) -> ServiceResult<DownloadToken> {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let expires_at = now + self.ttl;
        let claims = DownloadClaims {
            sub: order.id.to_string(),
            jti: id.to_string(),
            files,
            user_id,
            max_downloads: self.max_downloads,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = self.sign(&claims)?;

        let new_token = db::download_tokens::NewDownloadToken {
            id,
            order_id: order.id,
            token: &token,
            remaining_downloads: self.max_downloads,
            max_downloads: self.max_downloads,
            expires_at,
            now,
        };
        let inserted = db::download_tokens::insert_if_absent(pool, &new_token).await?;
        if !inserted {
            tracing::info!(order_id = %order.id, "Download token already issued, reusing");
        }

        db::download_tokens::find_by_order(pool, order.id)
            .await?
            .ok_or_else(|| AppError::new(ErrorCode::Internal).into())
    }

    /// Redeem one download: verify the token, fetch a short-lived signed
    /// URL from storage, then commit with a conditional decrement.
    ///
    /// The decrement is the commit point — storage failures surface as
    /// retryable errors without burning a download, and losing the
    /// decrement race yields `TokenInvalid` with the URL discarded.
    pub async fn redeem(
        &self,
        pool: &PgPool,
        storage: &Arc<dyn StorageAdapter>,
        token: &str,
        file_index: usize,
        meta: &AccessMeta,
    ) -> ServiceResult<String> {
        let claims = self
            .verify(token)
            .ok_or_else(AppError::token_invalid)?;

        let row = db::download_tokens::find_by_token(pool, token)
            .await?
            .ok_or_else(AppError::token_invalid)?;

        let now = Utc::now();
        if !row.is_valid_at(now) {
            return Err(AppError::token_invalid().into());
        }

        let key = claims
            .files
            .get(file_index)
            .ok_or_else(|| AppError::validation("unknown file for this download"))?;

        let url = storage
            .get_download_url(key, Duration::seconds(300))
            .await?;

        let redeemed = db::download_tokens::redeem(pool, token, now, meta).await?;
        if !redeemed {
            // Concurrent redemptions exhausted the counter first.
            return Err(AppError::token_invalid().into());
        }

        tracing::info!(
            order_id = %claims.sub,
            file = %key,
            remaining = row.remaining_downloads - 1,
            "Download redeemed"
        );
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new("test-secret".into(), Duration::hours(24), 5)
    }

    fn claims(expires_in: Duration) -> DownloadClaims {
        let now = Utc::now();
        DownloadClaims {
            sub: Uuid::new_v4().to_string(),
            jti: Uuid::new_v4().to_string(),
            files: vec!["products/ebook.pdf".into()],
            user_id: None,
            max_downloads: 5,
            iat: now.timestamp(),
            exp: (now + expires_in).timestamp(),
        }
    }

    #[test]
    fn signed_token_verifies() {
        let svc = service();
        let token = svc.sign(&claims(Duration::hours(1))).unwrap();
        let decoded = svc.verify(&token).unwrap();
        assert_eq!(decoded.files, vec!["products/ebook.pdf".to_string()]);
        assert_eq!(decoded.max_downloads, 5);
    }

    #[test]
    fn expired_token_fails_verification() {
        let svc = service();
        let token = svc.sign(&claims(Duration::seconds(-90))).unwrap();
        assert!(svc.verify(&token).is_none());
    }

    #[test]
    fn tampered_token_fails_verification() {
        let svc = service();
        let token = svc.sign(&claims(Duration::hours(1))).unwrap();
        let mut tampered = token.clone();
        tampered.truncate(token.len() - 2);
        assert!(svc.verify(&tampered).is_none());
    }

    #[test]
    fn token_from_another_secret_fails_verification() {
        let svc = service();
        let other = TokenService::new("other-secret".into(), Duration::hours(24), 5);
        let token = other.sign(&claims(Duration::hours(1))).unwrap();
        assert!(svc.verify(&token).is_none());
    }

    #[test]
    fn verification_is_pure_and_repeatable() {
        let svc = service();
        let token = svc.sign(&claims(Duration::hours(1))).unwrap();
        for _ in 0..10 {
            assert!(svc.verify(&token).is_some());
        }
    }
}
