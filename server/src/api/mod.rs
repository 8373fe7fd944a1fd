//! API routes

pub mod checkout;
pub mod download;
pub mod files;
pub mod health;
pub mod refund;
pub mod webhook;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the combined router
pub fn create_router(state: AppState) -> Router {
    // Provider webhooks (signature-verified, raw body)
    let webhooks =
        Router::new().route("/api/webhook/{channel}", post(webhook::handle_webhook));

    // Buyer-facing checkout and downloads (no auth)
    let store = Router::new()
        .route("/api/checkout", post(checkout::create_checkout))
        .route("/api/download/{token}", get(download::redeem_download));

    // Admin actions (shared-key header)
    let admin = Router::new().route("/api/orders/{id}/refund", post(refund::refund_order));

    // Local storage backend file delivery (HMAC-signed URLs)
    let files = Router::new().route("/files/{*key}", get(files::serve_file));

    Router::new()
        .route("/health", get(health::health_check))
        .merge(store)
        .merge(webhooks)
        .merge(admin)
        .merge(files)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
