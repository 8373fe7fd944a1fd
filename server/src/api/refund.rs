//! Refund endpoint
//!
//! POST /api/orders/{id}/refund — operator-initiated, guarded by the
//! shared admin key header.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::models::{Currency, OrderStatus};
use uuid::Uuid;

use crate::orders;
use crate::state::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct RefundRequest {
    /// Partial refund amount in the order currency; omit for full refund
    pub amount: Option<Decimal>,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RefundResponse {
    pub order_id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    pub currency: Currency,
    pub total: Decimal,
}

fn admin_key_matches(state: &AppState, headers: &HeaderMap) -> bool {
    let presented = headers
        .get("x-admin-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    !presented.is_empty() && presented == state.admin_api_key
}

pub async fn refund_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Option<Json<RefundRequest>>,
) -> Response {
    if !admin_key_matches(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let req = body.map(|Json(r)| r).unwrap_or_default();

    match orders::refund(&state, id, req.amount, req.reason.as_deref()).await {
        Ok(order) => Json(RefundResponse {
            order_id: order.id,
            order_number: order.order_number,
            status: order.status,
            currency: order.currency,
            total: order.total,
        })
        .into_response(),
        Err(e) => e.into_response(),
    }
}
