//! Database access layer

pub mod audit;
pub mod download_tokens;
pub mod fx_rates;
pub mod orders;
pub mod products;
pub mod webhook_events;
