//! Supported currencies and money rounding

use rust_decimal::prelude::*;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Currencies the checkout accepts
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
    Cad,
    Aud,
    Nzd,
    Chf,
    Sek,
    Nok,
    Dkk,
    Pln,
    Jpy,
}

impl Currency {
    /// Parse an ISO 4217 code, case-insensitive
    pub fn parse(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "USD" => Some(Self::Usd),
            "EUR" => Some(Self::Eur),
            "GBP" => Some(Self::Gbp),
            "CAD" => Some(Self::Cad),
            "AUD" => Some(Self::Aud),
            "NZD" => Some(Self::Nzd),
            "CHF" => Some(Self::Chf),
            "SEK" => Some(Self::Sek),
            "NOK" => Some(Self::Nok),
            "DKK" => Some(Self::Dkk),
            "PLN" => Some(Self::Pln),
            "JPY" => Some(Self::Jpy),
            _ => None,
        }
    }

    /// ISO 4217 code, as stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Eur => "EUR",
            Self::Gbp => "GBP",
            Self::Cad => "CAD",
            Self::Aud => "AUD",
            Self::Nzd => "NZD",
            Self::Chf => "CHF",
            Self::Sek => "SEK",
            Self::Nok => "NOK",
            Self::Dkk => "DKK",
            Self::Pln => "PLN",
            Self::Jpy => "JPY",
        }
    }

    /// ISO 4217 minor-unit exponent (JPY has no minor unit)
    pub fn exponent(&self) -> u32 {
        match self {
            Self::Jpy => 0,
            _ => 2,
        }
    }

    /// Convert a major-unit amount to provider minor units (Stripe style)
    pub fn to_minor_units(&self, amount: Decimal) -> Option<i64> {
        let scaled = amount * Decimal::from(10i64.pow(self.exponent()));
        scaled
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
    }

    /// Convert provider minor units back to a major-unit amount
    pub fn from_minor_units(&self, minor: i64) -> Decimal {
        Decimal::from(minor) / Decimal::from(10i64.pow(self.exponent()))
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Round a monetary amount to 2 decimals, half-up.
///
/// Applied only at final output boundaries; intermediate values stay at
/// full precision.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
