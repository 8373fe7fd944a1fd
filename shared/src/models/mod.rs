//! Domain models

pub mod currency;
pub mod order;
pub mod payment;
pub mod tax;
pub mod token;

pub use currency::{round_money, Currency};
pub use order::{Order, OrderStatus, PaymentChannel};
pub use payment::{
    CheckoutSession, CheckoutSessionStatus, PaymentStatus, PaymentVerification, RefundOutcome,
    WebhookPayload,
};
pub use tax::{ProductType, TaxCalculation, TaxStrategy};
pub use token::DownloadToken;
