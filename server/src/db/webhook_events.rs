//! Processed webhook event ledger
//!
//! INSERT-first duplicate suppression: record the event id before doing
//! any work, and let the primary key arbitrate concurrent redeliveries.

use chrono::{DateTime, Utc};
use shared::models::PaymentChannel;
use sqlx::PgPool;

/// Returns `false` when the event was already recorded, meaning this
/// delivery is a duplicate and must be acknowledged without side effects.
pub async fn record(
    pool: &PgPool,
    channel: PaymentChannel,
    event_id: &str,
    event_type: &str,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO processed_webhook_events (event_id, channel, event_type, processed_at)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (event_id) DO NOTHING",
    )
    .bind(event_id)
    .bind(channel.as_db())
    .bind(event_type)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Forget an event id after its delivery failed to process, so the
/// provider's redelivery is applied instead of suppressed as a duplicate.
pub async fn release(pool: &PgPool, event_id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM processed_webhook_events WHERE event_id = $1")
        .bind(event_id)
        .execute(pool)
        .await?;
    Ok(())
}
