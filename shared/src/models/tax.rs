//! Tax value objects

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Product classification for tax purposes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProductType {
    #[default]
    Digital,
    Physical,
    Service,
}

/// Presentation strategy for the computed tax
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaxStrategy {
    /// Displayed price already contains tax; subtotal is back-calculated
    Inclusive,
    /// Tax is added on top of the given amount
    Exclusive,
    /// Inclusive for EU/UK jurisdictions, exclusive otherwise
    #[default]
    Auto,
}

/// Result of a tax computation; all monetary fields rounded to 2 decimals
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaxCalculation {
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
    /// Percentage, e.g. 19 for German VAT
    pub tax_rate: Decimal,
    pub tax_inclusive: bool,
    /// Jurisdiction the rate was resolved from, e.g. `DE` or `US-CA`
    pub region: String,
}
