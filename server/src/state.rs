//! Application state

use aws_sdk_s3::Client as S3Client;
use aws_sdk_sesv2::Client as SesClient;
use chrono::Duration;
use shared::error::{AppError, ErrorCode};
use shared::models::PaymentChannel;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::db::fx_rates::PgRateCache;
use crate::fx::{FxService, HttpRateProvider};
use crate::payments::{MockAdapter, PaymentAdapter, PaypalAdapter, StripeAdapter};
use crate::storage::{LocalStorage, S3Storage, StorageAdapter};
use crate::tokens::TokenService;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL connection pool
    pub pool: PgPool,
    /// Payment adapters by channel
    pub adapters: Arc<HashMap<PaymentChannel, Arc<dyn PaymentAdapter>>>,
    /// Product file storage backend
    pub storage: Arc<dyn StorageAdapter>,
    /// Set when the local backend is active; serves the /files routes
    pub local_files: Option<Arc<LocalStorage>>,
    /// AWS SES client for sending emails
    pub ses: SesClient,
    /// SES sender email address
    pub ses_from_email: String,
    /// FX conversion service
    pub fx: Arc<FxService>,
    /// Download token service
    pub tokens: TokenService,
    /// Public base URL of this service
    pub public_base_url: String,
    /// URL to redirect after successful checkout
    pub checkout_success_url: String,
    /// URL to redirect after cancelled checkout
    pub checkout_cancel_url: String,
    /// Shared key guarding the refund endpoint
    pub admin_api_key: String,
}

impl AppState {
    /// Create a new AppState
    pub async fn new(config: &Config) -> Result<Self, BoxError> {
        let pool = PgPool::connect(&config.database_url).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let s3 = S3Client::new(&aws_config);

        let ses = if let Ok(ses_region) = std::env::var("SES_REGION") {
            let ses_config = aws_config
                .to_builder()
                .region(aws_config::Region::new(ses_region))
                .build();
            SesClient::new(&ses_config)
        } else {
            SesClient::new(&aws_config)
        };

        let mut adapters: HashMap<PaymentChannel, Arc<dyn PaymentAdapter>> = HashMap::new();
        adapters.insert(
            PaymentChannel::Stripe,
            Arc::new(StripeAdapter::new(
                config.stripe_secret_key.clone(),
                config.stripe_webhook_secret.clone(),
            )),
        );
        adapters.insert(
            PaymentChannel::Paypal,
            Arc::new(PaypalAdapter::new(
                config.paypal_client_id.clone(),
                config.paypal_client_secret.clone(),
                config.paypal_webhook_id.clone(),
                config.paypal_api_base.clone(),
            )),
        );
        if config.environment != "production" {
            adapters.insert(
                PaymentChannel::Mock,
                Arc::new(MockAdapter::new(
                    config.mock_webhook_secret.clone(),
                    config.public_base_url.clone(),
                )),
            );
        }

        let mut local_files = None;
        let storage: Arc<dyn StorageAdapter> = match config.storage_backend.as_str() {
            "s3" => Arc::new(S3Storage::new(s3, config.files_s3_bucket.clone())),
            "local" => {
                let local = Arc::new(LocalStorage::new(
                    config.local_storage_root.clone(),
                    config.public_base_url.clone(),
                    config.download_token_secret.clone(),
                ));
                local_files = Some(local.clone());
                local
            }
            other => return Err(format!("unknown storage backend: {other}").into()),
        };

        let fx = Arc::new(FxService::new(
            Arc::new(HttpRateProvider::new(config.fx_api_base.clone())),
            Arc::new(PgRateCache::new(pool.clone())),
            Duration::seconds(config.fx_ttl_secs),
        ));

        let tokens = TokenService::new(
            config.download_token_secret.clone(),
            Duration::hours(config.download_ttl_hours),
            config.download_max,
        );

        Ok(Self {
            pool,
            adapters: Arc::new(adapters),
            storage,
            local_files,
            ses,
            ses_from_email: config.ses_from_email.clone(),
            fx,
            tokens,
            public_base_url: config.public_base_url.clone(),
            checkout_success_url: config.checkout_success_url.clone(),
            checkout_cancel_url: config.checkout_cancel_url.clone(),
            admin_api_key: config.admin_api_key.clone(),
        })
    }

    /// Look up the adapter for a channel; absent means the channel is not
    /// enabled in this environment.
    pub fn adapter(&self, channel: PaymentChannel) -> Result<Arc<dyn PaymentAdapter>, AppError> {
        self.adapters.get(&channel).cloned().ok_or_else(|| {
            AppError::with_message(
                ErrorCode::Unsupported,
                format!("payment channel {channel} is not enabled"),
            )
        })
    }
}
