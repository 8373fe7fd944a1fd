//! Service-layer error bridge
//!
//! Fulfillment handlers return `ServiceResult`, letting `?` carry order
//! store failures, token-signing failures, and business-rule errors
//! through one type. Infrastructure variants are logged once at the
//! response boundary and leave the process as an opaque `Internal`;
//! `App` passes its `ErrorCode` straight through to the client. Provider
//! failures never reach this type raw — the payment adapters translate
//! them into `AppError` codes (`ProviderTransient`, `SignatureInvalid`)
//! at their own boundary.

use axum::response::IntoResponse;
use shared::error::{AppError, ErrorCode};

#[derive(Debug)]
pub enum ServiceError {
    /// Order-store failure (sqlx)
    Db(sqlx::Error),
    /// Download-token signing failure
    Signing(jsonwebtoken::errors::Error),
    /// Business-rule error carrying its own `ErrorCode`
    App(AppError),
}

impl From<sqlx::Error> for ServiceError {
    fn from(e: sqlx::Error) -> Self {
        ServiceError::Db(e)
    }
}

impl From<jsonwebtoken::errors::Error> for ServiceError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        ServiceError::Signing(e)
    }
}

impl From<AppError> for ServiceError {
    fn from(e: AppError) -> Self {
        ServiceError::App(e)
    }
}

impl From<ServiceError> for AppError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::App(app_err) => app_err,
            ServiceError::Db(e) => {
                tracing::error!(error = %e, "Order store failure");
                AppError::new(ErrorCode::Internal)
            }
            ServiceError::Signing(e) => {
                tracing::error!(error = %e, "Download token signing failure");
                AppError::new(ErrorCode::Internal)
            }
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> axum::response::Response {
        let app_error: AppError = self.into();
        app_error.into_response()
    }
}

/// Convenience type alias for service-layer results
pub type ServiceResult<T> = Result<T, ServiceError>;
