//! Unified error system for the fulfillment core
//!
//! Every failure the service surfaces maps onto one [`ErrorCode`]. Payment,
//! storage and FX adapters translate provider-specific failures into this
//! taxonomy so downstream logic never branches on provider shape.

use http::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Error taxonomy for the fulfillment core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed input, rejected pre-flight (400)
    Validation,
    /// Webhook signature/HMAC check failed — forgery signal, no mutation (400)
    SignatureInvalid,
    /// Amount/currency mismatch or payment-reference collision, flagged for review (409)
    Conflict,
    /// Expired, exhausted or corrupt download token (410)
    TokenInvalid,
    /// Resource not found (404)
    NotFound,
    /// Operation not supported by the selected provider (400)
    Unsupported,
    /// Timeout/5xx from a payment, storage or FX provider — retryable (503)
    ProviderTransient,
    /// Unexpected failure, no partial mutation (500)
    Internal,
}

impl ErrorCode {
    /// HTTP status for this error code
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Validation => StatusCode::BAD_REQUEST,
            Self::SignatureInvalid => StatusCode::BAD_REQUEST,
            Self::Conflict => StatusCode::CONFLICT,
            Self::TokenInvalid => StatusCode::GONE,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Unsupported => StatusCode::BAD_REQUEST,
            Self::ProviderTransient => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Default user-facing message
    pub fn message(&self) -> &'static str {
        match self {
            Self::Validation => "Validation failed",
            Self::SignatureInvalid => "Invalid webhook signature",
            Self::Conflict => "Conflicting payment data",
            Self::TokenInvalid => "This download link is no longer valid.",
            Self::NotFound => "Resource not found",
            Self::Unsupported => "Operation not supported",
            Self::ProviderTransient => "Upstream provider unavailable, try again",
            Self::Internal => "Internal server error",
        }
    }
}

/// Application error with structured code and optional details
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<HashMap<String, Value>>,
}

impl AppError {
    /// Create an error with the default message for the code
    pub fn new(code: ErrorCode) -> Self {
        Self {
            message: code.message().to_string(),
            code,
            details: None,
        }
    }

    /// Create an error with a custom message
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Attach a detail entry (field-level context, provider ids, ...)
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::Validation, msg)
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        let r = resource.into();
        Self::with_message(ErrorCode::NotFound, format!("{r} not found")).with_detail("resource", r)
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::Conflict, msg)
    }

    pub fn token_invalid() -> Self {
        Self::new(ErrorCode::TokenInvalid)
    }

    pub fn provider_transient(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::ProviderTransient, msg)
    }

    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.http_status();
        let body = serde_json::json!({
            "error": {
                "code": self.code,
                "message": self.message,
                "details": self.details,
            }
        });
        (status, axum::Json(body)).into_response()
    }
}

/// Convenience result alias
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            ErrorCode::TokenInvalid.http_status(),
            StatusCode::GONE
        );
        assert_eq!(
            ErrorCode::ProviderTransient.http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(ErrorCode::Conflict.http_status(), StatusCode::CONFLICT);
    }

    #[test]
    fn details_accumulate() {
        let err = AppError::validation("bad country")
            .with_detail("field", "country")
            .with_detail("value", "XX");
        assert_eq!(err.details.as_ref().map(|d| d.len()), Some(2));
    }
}
