//! Provider webhook handler
//!
//! POST /api/webhook/{channel} — raw body for signature verification.
//! Order of operations: verify the signature, record the event id
//! (INSERT-first duplicate suppression), then apply. Anything the
//! adapter does not recognize is acknowledged and ignored; a delivery
//! that contradicts the order is flagged and still acknowledged so the
//! provider stops retrying.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::Utc;
use shared::error::ErrorCode;
use shared::models::PaymentChannel;

use crate::db;
use crate::orders::{self, ApplyOutcome};
use crate::state::AppState;

pub async fn handle_webhook(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let Some(channel) = PaymentChannel::parse(&channel.to_ascii_uppercase()) else {
        tracing::warn!(channel = %channel, "Webhook for unknown channel");
        return StatusCode::NOT_FOUND;
    };
    let adapter = match state.adapter(channel) {
        Ok(a) => a,
        Err(_) => {
            tracing::warn!(%channel, "Webhook for disabled channel");
            return StatusCode::NOT_FOUND;
        }
    };

    // 1. Verify before trusting a single byte of the payload
    let payload = match adapter.verify_webhook(&body, &headers).await {
        Ok(p) => p,
        Err(e) if e.code == ErrorCode::SignatureInvalid => {
            tracing::warn!(%channel, error = %e, "Webhook signature verification failed");
            return StatusCode::BAD_REQUEST;
        }
        Err(e) => {
            // Verification infrastructure failed; ask for a redelivery.
            tracing::error!(%channel, error = %e, "Webhook verification unavailable");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };
    tracing::info!(%channel, event_id = %payload.event_id, event_type = %payload.event_type, "Received webhook");

    // 2. Duplicate suppression keyed on the provider event id
    match db::webhook_events::record(
        &state.pool,
        channel,
        &payload.event_id,
        &payload.event_type,
        Utc::now(),
    )
    .await
    {
        Ok(true) => {}
        Ok(false) => {
            tracing::info!(event_id = %payload.event_id, "Duplicate webhook event, skipping");
            return StatusCode::OK;
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to record webhook event");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    }

    // 3. Map and apply
    let Some(verification) = adapter.handle_webhook(&payload) else {
        tracing::debug!(event_type = %payload.event_type, "Unhandled webhook event type");
        return StatusCode::OK;
    };

    match orders::apply_payment_verification(&state, &verification).await {
        Ok(ApplyOutcome::Transitioned) => StatusCode::OK,
        Ok(ApplyOutcome::Duplicate | ApplyOutcome::Ignored | ApplyOutcome::Flagged) => {
            StatusCode::OK
        }
        Err(e) => {
            tracing::error!(error = ?e, "Failed to apply payment verification");
            // Release the ledger entry so the provider's redelivery is
            // processed rather than skipped as a duplicate; transitions
            // themselves are conditional updates, so reapplying is safe.
            if let Err(e) = db::webhook_events::release(&state.pool, &payload.event_id).await {
                tracing::error!(event_id = %payload.event_id, error = %e, "Failed to release webhook event id");
            }
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
