//! driftwood-server — digital-goods fulfillment core
//!
//! Long-running service that:
//! - Prices and creates orders, opening provider checkout sessions
//! - Applies asynchronous payment webhooks to orders, idempotently
//! - Issues and redeems signed, usage-limited download tokens
//! - Computes jurisdiction-aware tax and cached FX conversions

pub mod api;
pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod fx;
pub mod orders;
pub mod payments;
pub mod state;
pub mod storage;
pub mod tax;
pub mod tokens;
