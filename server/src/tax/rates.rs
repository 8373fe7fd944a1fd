//! Rate tables
//!
//! Standard VAT/GST rates by country plus a US state table. Digital-goods
//! rates only; reduced-rate categories are out of scope.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// EU member states (VAT area, ISO alpha-2)
const EU_COUNTRIES: [&str; 27] = [
    "AT", "BE", "BG", "HR", "CY", "CZ", "DK", "EE", "FI", "FR", "DE", "GR", "HU", "IE", "IT",
    "LV", "LT", "LU", "MT", "NL", "PL", "PT", "RO", "SK", "SI", "ES", "SE",
];

pub fn is_eu_country(country: &str) -> bool {
    EU_COUNTRIES.contains(&country)
}

/// Standard VAT/GST rate for a country, where this service collects it
pub fn vat_rate(country: &str) -> Option<Decimal> {
    let rate = match country {
        // EU VAT schedule
        "AT" => dec!(20),
        "BE" => dec!(21),
        "BG" => dec!(20),
        "HR" => dec!(25),
        "CY" => dec!(19),
        "CZ" => dec!(21),
        "DK" => dec!(25),
        "EE" => dec!(22),
        "FI" => dec!(24),
        "FR" => dec!(20),
        "DE" => dec!(19),
        "GR" => dec!(24),
        "HU" => dec!(27),
        "IE" => dec!(23),
        "IT" => dec!(22),
        "LV" => dec!(21),
        "LT" => dec!(21),
        "LU" => dec!(17),
        "MT" => dec!(18),
        "NL" => dec!(21),
        "PL" => dec!(23),
        "PT" => dec!(23),
        "RO" => dec!(19),
        "SK" => dec!(20),
        "SI" => dec!(22),
        "ES" => dec!(21),
        "SE" => dec!(25),
        // Select non-EU jurisdictions
        "GB" => dec!(20),
        "NO" => dec!(25),
        "CH" => dec!(8.1),
        "AU" => dec!(10),
        "NZ" => dec!(15),
        "JP" => dec!(10),
        "CA" => dec!(5),
        _ => return None,
    };
    Some(rate)
}

/// Combined state-level sales tax for US states this service collects in.
/// Absence of an entry means a rate of 0.
pub fn state_rate(state: &str) -> Option<Decimal> {
    let rate = match state {
        "CA" => dec!(7.25),
        "NY" => dec!(8.875),
        "TX" => dec!(6.25),
        "FL" => dec!(6.0),
        "IL" => dec!(6.25),
        "PA" => dec!(6.0),
        "WA" => dec!(6.5),
        "MA" => dec!(6.25),
        "NJ" => dec!(6.625),
        "AZ" => dec!(5.6),
        _ => return None,
    };
    Some(rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eu_membership() {
        assert!(is_eu_country("DE"));
        assert!(is_eu_country("MT"));
        assert!(!is_eu_country("GB"));
        assert!(!is_eu_country("US"));
    }

    #[test]
    fn every_eu_country_has_a_rate() {
        for c in EU_COUNTRIES {
            assert!(vat_rate(c).is_some(), "missing rate for {c}");
        }
    }

    #[test]
    fn no_tax_states_are_absent() {
        assert_eq!(state_rate("OR"), None);
        assert_eq!(state_rate("MT"), None);
        assert_eq!(state_rate("DE"), None);
    }
}
