//! Download redemption endpoint
//!
//! GET /api/download/{token} — verifies the signed token, consumes one
//! download, and redirects to a short-lived storage URL. Exhausted and
//! expired tokens collapse into one buyer-facing answer so the response
//! leaks nothing about which defect it was.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use serde::Deserialize;
use shared::error::ErrorCode;

use crate::error::ServiceError;
use crate::state::AppState;
use crate::tokens::AccessMeta;

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    /// Index into the order's file list; single-file orders omit it
    #[serde(default)]
    pub file: usize,
}

fn access_meta(headers: &HeaderMap) -> AccessMeta {
    let ip_address = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_owned());
    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    AccessMeta {
        ip_address,
        user_agent,
    }
}

pub async fn redeem_download(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Query(query): Query<DownloadQuery>,
    headers: HeaderMap,
) -> Response {
    let meta = access_meta(&headers);
    match state
        .tokens
        .redeem(&state.pool, &state.storage, &token, query.file, &meta)
        .await
    {
        Ok(url) => Redirect::to(&url).into_response(),
        Err(ServiceError::App(e)) if e.code == ErrorCode::TokenInvalid => (
            StatusCode::GONE,
            "This download link is no longer valid.",
        )
            .into_response(),
        Err(ServiceError::App(e)) if e.code == ErrorCode::ProviderTransient => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Download temporarily unavailable, please retry.",
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}
