//! Append-only audit trail

use sqlx::PgPool;
use uuid::Uuid;

/// Best-effort: a lost audit row is logged, never surfaced to the caller.
pub async fn log(pool: &PgPool, order_id: Option<Uuid>, action: &str, detail: &str) {
    let result = sqlx::query(
        "INSERT INTO audit_log (order_id, action, detail) VALUES ($1, $2, $3)",
    )
    .bind(order_id)
    .bind(action)
    .bind(detail)
    .execute(pool)
    .await;
    if let Err(e) = result {
        tracing::warn!(action, error = %e, "Failed to write audit row");
    }
}
