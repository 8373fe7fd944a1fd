//! Signed file delivery for the local storage backend
//!
//! GET /files/{key}?expires=&sig= — only routable when the local backend
//! is active; S3 deployments hand out presigned URLs instead.

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Deserialize;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SignedFileQuery {
    pub expires: i64,
    pub sig: String,
}

fn content_type_for(key: &str) -> &'static str {
    match key.rsplit('.').next() {
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        Some("epub") => "application/epub+zip",
        Some("mp3") => "audio/mpeg",
        Some("mp4") => "video/mp4",
        _ => "application/octet-stream",
    }
}

pub async fn serve_file(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<SignedFileQuery>,
) -> Response {
    let Some(local) = &state.local_files else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if !local.verify_signed_request(&key, query.expires, &query.sig, Utc::now()) {
        return StatusCode::FORBIDDEN.into_response();
    }
    match local.read_file(&key).await {
        Ok(bytes) => {
            let filename = key.rsplit('/').next().unwrap_or(&key).to_owned();
            (
                [
                    (header::CONTENT_TYPE, content_type_for(&key).to_owned()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{filename}\""),
                    ),
                ],
                bytes,
            )
                .into_response()
        }
        Err(e) => e.into_response(),
    }
}
