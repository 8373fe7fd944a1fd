//! Download token queries

use chrono::{DateTime, Utc};
use shared::models::DownloadToken;
use sqlx::PgPool;
use uuid::Uuid;

use crate::tokens::AccessMeta;

pub struct NewDownloadToken<'a> {
    pub id: Uuid,
    pub order_id: Uuid,
    pub token: &'a str,
    pub remaining_downloads: i32,
    pub max_downloads: i32,
    pub expires_at: DateTime<Utc>,
    pub now: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct TokenRow {
    id: Uuid,
    order_id: Uuid,
    token: String,
    remaining_downloads: i32,
    max_downloads: i32,
    expires_at: DateTime<Utc>,
    last_accessed_at: Option<DateTime<Utc>>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<TokenRow> for DownloadToken {
    fn from(r: TokenRow) -> Self {
        DownloadToken {
            id: r.id,
            order_id: r.order_id,
            token: r.token,
            remaining_downloads: r.remaining_downloads,
            max_downloads: r.max_downloads,
            expires_at: r.expires_at,
            last_accessed_at: r.last_accessed_at,
            ip_address: r.ip_address,
            user_agent: r.user_agent,
            created_at: r.created_at,
        }
    }
}

const TOKEN_COLUMNS: &str = "id, order_id, token, remaining_downloads, max_downloads, expires_at, \
     last_accessed_at, ip_address, user_agent, created_at";

/// Insert unless the order already has a token. UNIQUE(order_id) makes
/// this the issue-once arbiter under concurrent duplicate webhooks.
/// Returns whether this call inserted the row.
pub async fn insert_if_absent(
    pool: &PgPool,
    token: &NewDownloadToken<'_>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO download_tokens (id, order_id, token, remaining_downloads, max_downloads,
            expires_at, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (order_id) DO NOTHING",
    )
    .bind(token.id)
    .bind(token.order_id)
    .bind(token.token)
    .bind(token.remaining_downloads)
    .bind(token.max_downloads)
    .bind(token.expires_at)
    .bind(token.now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn find_by_order(
    pool: &PgPool,
    order_id: Uuid,
) -> Result<Option<DownloadToken>, sqlx::Error> {
    let row: Option<TokenRow> = sqlx::query_as(&format!(
        "SELECT {TOKEN_COLUMNS} FROM download_tokens WHERE order_id = $1"
    ))
    .bind(order_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(Into::into))
}

pub async fn find_by_token(
    pool: &PgPool,
    token: &str,
) -> Result<Option<DownloadToken>, sqlx::Error> {
    let row: Option<TokenRow> = sqlx::query_as(&format!(
        "SELECT {TOKEN_COLUMNS} FROM download_tokens WHERE token = $1"
    ))
    .bind(token)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(Into::into))
}

/// Atomic conditional decrement — the redemption commit point. Two
/// concurrent redemptions against one remaining slot cannot both win.
pub async fn redeem(
    pool: &PgPool,
    token: &str,
    now: DateTime<Utc>,
    meta: &AccessMeta,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE download_tokens
         SET remaining_downloads = remaining_downloads - 1,
             last_accessed_at = $1, ip_address = $2, user_agent = $3
         WHERE token = $4 AND remaining_downloads > 0 AND expires_at > $1",
    )
    .bind(now)
    .bind(meta.ip_address.as_deref())
    .bind(meta.user_agent.as_deref())
    .bind(token)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}
