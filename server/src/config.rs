//! Server configuration

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Server configuration, loaded once at startup and injected into services
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL
    pub database_url: String,
    /// HTTP port
    pub http_port: u16,
    /// Environment: development | staging | production
    pub environment: String,
    /// Public base URL of this service (download links in emails)
    pub public_base_url: String,
    /// URL to redirect after successful checkout
    pub checkout_success_url: String,
    /// URL to redirect after cancelled checkout
    pub checkout_cancel_url: String,
    /// Shared key guarding the refund endpoint
    pub admin_api_key: String,
    /// SES sender email address
    pub ses_from_email: String,
    /// Stripe secret key
    pub stripe_secret_key: String,
    /// Stripe webhook signing secret
    pub stripe_webhook_secret: String,
    /// PayPal REST credentials
    pub paypal_client_id: String,
    pub paypal_client_secret: String,
    /// PayPal webhook id (signature verification API)
    pub paypal_webhook_id: String,
    /// PayPal API base (live vs sandbox)
    pub paypal_api_base: String,
    /// Mock adapter webhook HMAC secret (dev/test checkouts)
    pub mock_webhook_secret: String,
    /// HS256 key for download tokens and local signed URLs
    pub download_token_secret: String,
    /// Download token time-to-live in hours
    pub download_ttl_hours: i64,
    /// Downloads allowed per token
    pub download_max: i32,
    /// FX rate provider base URL
    pub fx_api_base: String,
    /// FX cache freshness window in seconds
    pub fx_ttl_secs: i64,
    /// Storage backend: s3 | local
    pub storage_backend: String,
    /// S3 bucket for product files
    pub files_s3_bucket: String,
    /// Root directory for the local storage backend
    pub local_storage_root: String,
}

impl Config {
    /// Require a secret env var: must be set and non-empty in non-development environments.
    fn require_secret(name: &str, environment: &str) -> Result<String, BoxError> {
        let val = match std::env::var(name) {
            Ok(v) => v,
            Err(_) => {
                if environment != "development" {
                    return Err(format!("{name} must be set in {environment} environment").into());
                }
                format!("dev-{name}-not-for-production")
            }
        };
        if val.is_empty() && environment != "development" {
            return Err(format!("{name} must not be empty in {environment} environment").into());
        }
        Ok(val)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, BoxError> {
        let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into());

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set")?,
            http_port: std::env::var("HTTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".into()),
            checkout_success_url: std::env::var("CHECKOUT_SUCCESS_URL")
                .unwrap_or_else(|_| "https://driftwood.app/checkout/success".into()),
            checkout_cancel_url: std::env::var("CHECKOUT_CANCEL_URL")
                .unwrap_or_else(|_| "https://driftwood.app/checkout/cancel".into()),
            admin_api_key: Self::require_secret("ADMIN_API_KEY", &environment)?,
            ses_from_email: std::env::var("SES_FROM_EMAIL")
                .unwrap_or_else(|_| "orders@driftwood.app".into()),
            stripe_secret_key: Self::require_secret("STRIPE_SECRET_KEY", &environment)?,
            stripe_webhook_secret: Self::require_secret("STRIPE_WEBHOOK_SECRET", &environment)?,
            paypal_client_id: Self::require_secret("PAYPAL_CLIENT_ID", &environment)?,
            paypal_client_secret: Self::require_secret("PAYPAL_CLIENT_SECRET", &environment)?,
            paypal_webhook_id: Self::require_secret("PAYPAL_WEBHOOK_ID", &environment)?,
            paypal_api_base: std::env::var("PAYPAL_API_BASE")
                .unwrap_or_else(|_| "https://api-m.paypal.com".into()),
            mock_webhook_secret: std::env::var("MOCK_WEBHOOK_SECRET")
                .unwrap_or_else(|_| "mock-webhook-secret".into()),
            download_token_secret: Self::require_secret("DOWNLOAD_TOKEN_SECRET", &environment)?,
            download_ttl_hours: std::env::var("DOWNLOAD_TTL_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(24),
            download_max: std::env::var("DOWNLOAD_MAX")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            fx_api_base: std::env::var("FX_API_BASE")
                .unwrap_or_else(|_| "https://open.er-api.com/v6/latest".into()),
            fx_ttl_secs: std::env::var("FX_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3600),
            storage_backend: std::env::var("STORAGE_BACKEND").unwrap_or_else(|_| "local".into()),
            files_s3_bucket: std::env::var("FILES_S3_BUCKET")
                .unwrap_or_else(|_| "driftwood-product-files".into()),
            local_storage_root: std::env::var("LOCAL_STORAGE_ROOT")
                .unwrap_or_else(|_| "storage".into()),
            environment,
        })
    }
}
