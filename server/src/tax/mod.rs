//! Jurisdiction-aware tax computation
//!
//! Pure Decimal arithmetic; only the final monetary outputs are rounded
//! (2 decimals, half-up). The inclusive strategy back-calculates the
//! subtotal from a tax-inclusive display price.

mod rates;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use shared::error::{AppError, AppResult};
use shared::models::{round_money, ProductType, TaxCalculation, TaxStrategy};

pub use rates::{is_eu_country, state_rate, vat_rate};

const HUNDRED: Decimal = dec!(100);

/// Input for one tax computation
#[derive(Debug, Clone)]
pub struct TaxRequest {
    /// Total (inclusive) or subtotal (exclusive), depending on strategy
    pub amount: Decimal,
    /// ISO 3166-1 alpha-2, case-insensitive
    pub country: String,
    /// US state code, where applicable
    pub region: Option<String>,
    pub vat_number: Option<String>,
    pub product_type: ProductType,
    pub strategy: TaxStrategy,
}

/// Syntactic VAT-number check: two-letter country prefix followed by
/// 2–12 alphanumerics. No registry lookup.
pub fn is_valid_vat_number(vat: &str) -> bool {
    let vat = vat.trim().replace(' ', "");
    if !vat.is_ascii() || vat.len() < 4 || vat.len() > 14 {
        return false;
    }
    let (prefix, rest) = vat.split_at(2);
    prefix.chars().all(|c| c.is_ascii_alphabetic())
        && !rest.is_empty()
        && rest.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Resolve the applicable rate and the jurisdiction label it came from
fn resolve_rate(req: &TaxRequest, country: &str) -> (Decimal, String) {
    // B2B reverse charge: a syntactically valid VAT number shifts the
    // liability to the buyer for EU digital sales.
    if is_eu_country(country)
        && req.product_type == ProductType::Digital
        && req
            .vat_number
            .as_deref()
            .is_some_and(is_valid_vat_number)
    {
        return (Decimal::ZERO, country.to_string());
    }

    if country == "US" {
        return match req.region.as_deref() {
            Some(region) => {
                let region = region.to_ascii_uppercase();
                // No table entry means a rate of 0, not "unknown".
                let rate = state_rate(&region).unwrap_or(Decimal::ZERO);
                (rate, format!("US-{region}"))
            }
            None => (Decimal::ZERO, "US".to_string()),
        };
    }

    (
        vat_rate(country).unwrap_or(Decimal::ZERO),
        country.to_string(),
    )
}

/// Compute subtotal/tax/total for one amount and jurisdiction.
pub fn calculate(req: &TaxRequest) -> AppResult<TaxCalculation> {
    if req.amount <= Decimal::ZERO {
        return Err(AppError::validation("amount must be positive")
            .with_detail("amount", req.amount.to_string()));
    }
    let country = req.country.trim().to_ascii_uppercase();
    if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(AppError::validation("country must be an ISO 3166-1 alpha-2 code")
            .with_detail("country", req.country.clone()));
    }

    let (rate, region) = resolve_rate(req, &country);

    let inclusive = match req.strategy {
        TaxStrategy::Inclusive => true,
        TaxStrategy::Exclusive => false,
        TaxStrategy::Auto => is_eu_country(&country) || country == "GB",
    };

    let (subtotal, tax_amount, total) = if rate.is_zero() {
        let amount = round_money(req.amount);
        (amount, Decimal::ZERO, amount)
    } else if inclusive {
        // Back-calculate: the given amount is the tax-inclusive total.
        // Tax is derived from the rounded subtotal so the sum identity
        // subtotal + tax = total holds exactly.
        let total = round_money(req.amount);
        let subtotal = round_money(req.amount / (Decimal::ONE + rate / HUNDRED));
        (subtotal, total - subtotal, total)
    } else {
        let subtotal = round_money(req.amount);
        let tax = round_money(req.amount * rate / HUNDRED);
        (subtotal, tax, subtotal + tax)
    };

    Ok(TaxCalculation {
        subtotal,
        tax_amount,
        total,
        tax_rate: rate,
        tax_inclusive: inclusive,
        region,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(amount: Decimal, country: &str) -> TaxRequest {
        TaxRequest {
            amount,
            country: country.into(),
            region: None,
            vat_number: None,
            product_type: ProductType::Digital,
            strategy: TaxStrategy::Auto,
        }
    }

    #[test]
    fn german_inclusive_back_calculation() {
        let calc = calculate(&req(dec!(49.99), "DE")).unwrap();
        assert_eq!(calc.tax_rate, dec!(19));
        assert!(calc.tax_inclusive);
        assert_eq!(calc.subtotal, dec!(42.01));
        assert_eq!(calc.tax_amount, dec!(7.98));
        assert_eq!(calc.total, dec!(49.99));
        assert_eq!(calc.region, "DE");
    }

    #[test]
    fn california_exclusive() {
        let mut r = req(dec!(49.99), "US");
        r.region = Some("CA".into());
        let calc = calculate(&r).unwrap();
        assert_eq!(calc.tax_rate, dec!(7.25));
        assert!(!calc.tax_inclusive);
        assert_eq!(calc.subtotal, dec!(49.99));
        assert_eq!(calc.tax_amount, dec!(3.62));
        assert_eq!(calc.total, dec!(53.61));
        assert_eq!(calc.region, "US-CA");
    }

    #[test]
    fn inclusive_sum_identity_holds() {
        for amount in [dec!(0.99), dec!(10.00), dec!(49.99), dec!(123.45)] {
            let calc = calculate(&req(amount, "FR")).unwrap();
            assert_eq!(calc.subtotal + calc.tax_amount, calc.total);
            assert_eq!(calc.total, amount);
        }
    }

    #[test]
    fn valid_eu_vat_number_reverse_charges_digital() {
        let mut r = req(dec!(49.99), "DE");
        r.vat_number = Some("DE123456789".into());
        let calc = calculate(&r).unwrap();
        assert_eq!(calc.tax_rate, Decimal::ZERO);
        assert_eq!(calc.tax_amount, Decimal::ZERO);
        assert_eq!(calc.subtotal, calc.total);
    }

    #[test]
    fn vat_number_does_not_exempt_physical_goods() {
        let mut r = req(dec!(49.99), "DE");
        r.vat_number = Some("DE123456789".into());
        r.product_type = ProductType::Physical;
        let calc = calculate(&r).unwrap();
        assert_eq!(calc.tax_rate, dec!(19));
    }

    #[test]
    fn malformed_vat_number_is_ignored() {
        let mut r = req(dec!(49.99), "DE");
        r.vat_number = Some("12345".into());
        let calc = calculate(&r).unwrap();
        assert_eq!(calc.tax_rate, dec!(19));
    }

    #[test]
    fn us_state_without_entry_is_zero_not_unknown() {
        let mut r = req(dec!(20.00), "US");
        r.region = Some("OR".into());
        let calc = calculate(&r).unwrap();
        assert_eq!(calc.tax_rate, Decimal::ZERO);
        assert_eq!(calc.subtotal, calc.total);
        assert_eq!(calc.tax_amount, Decimal::ZERO);
        assert_eq!(calc.region, "US-OR");
    }

    #[test]
    fn unknown_country_defaults_to_zero_rate() {
        let calc = calculate(&req(dec!(20.00), "BR")).unwrap();
        assert_eq!(calc.tax_rate, Decimal::ZERO);
        assert_eq!(calc.total, dec!(20.00));
    }

    #[test]
    fn explicit_strategy_overrides_auto() {
        let mut r = req(dec!(100.00), "DE");
        r.strategy = TaxStrategy::Exclusive;
        let calc = calculate(&r).unwrap();
        assert_eq!(calc.subtotal, dec!(100.00));
        assert_eq!(calc.tax_amount, dec!(19.00));
        assert_eq!(calc.total, dec!(119.00));
    }

    #[test]
    fn zero_rate_is_identical_under_both_strategies() {
        for strategy in [TaxStrategy::Inclusive, TaxStrategy::Exclusive] {
            let mut r = req(dec!(15.00), "HK");
            r.strategy = strategy;
            let calc = calculate(&r).unwrap();
            assert_eq!(calc.subtotal, dec!(15.00));
            assert_eq!(calc.total, dec!(15.00));
            assert_eq!(calc.tax_amount, Decimal::ZERO);
        }
    }

    #[test]
    fn rejects_non_positive_amount_and_bad_country() {
        assert!(calculate(&req(Decimal::ZERO, "DE")).is_err());
        assert!(calculate(&req(dec!(10), "DEU")).is_err());
        assert!(calculate(&req(dec!(10), "D1")).is_err());
    }

    #[test]
    fn country_is_case_insensitive() {
        let calc = calculate(&req(dec!(49.99), "de")).unwrap();
        assert_eq!(calc.tax_rate, dec!(19));
    }

    #[test]
    fn vat_number_syntax() {
        assert!(is_valid_vat_number("DE123456789"));
        assert!(is_valid_vat_number("FRXX999999999"));
        assert!(is_valid_vat_number("NL 1234 5678 9B01"));
        assert!(!is_valid_vat_number("123456789"));
        assert!(!is_valid_vat_number("D"));
        assert!(!is_valid_vat_number("DE12-3456"));
    }
}
