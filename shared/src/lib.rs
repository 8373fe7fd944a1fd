//! Shared domain types for the Driftwood fulfillment core
//!
//! Everything the server and its tests agree on lives here: the order and
//! download-token models, currency handling, the canonical payment value
//! objects adapters produce, and the unified error system.

pub mod error;
pub mod models;

pub use error::{AppError, AppResult, ErrorCode};
