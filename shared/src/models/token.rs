//! Download token model
//!
//! The signed token string proves authenticity on its own; this persisted
//! row is the single source of truth for remaining downloads, so exhausted
//! or abusive tokens can be cut off even though the signature stays valid.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted download-token row, one per order
///
/// Invariant: `0 <= remaining_downloads <= max_downloads`, monotonically
/// non-increasing. Invalid once `remaining_downloads = 0` or
/// `now > expires_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadToken {
    pub id: Uuid,
    pub order_id: Uuid,
    /// Opaque signed token string handed to the buyer
    pub token: String,
    pub remaining_downloads: i32,
    pub max_downloads: i32,
    pub expires_at: DateTime<Utc>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DownloadToken {
    /// Whether the token can still admit a redemption at `now`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.remaining_downloads > 0 && now <= self.expires_at
    }
}
