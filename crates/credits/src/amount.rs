//! Credit quantities (tons CO2e) and their validation rules.

use crate::error::CreditError;

/// Remainders at or below this are treated as zero when a credit is drawn down.
pub const AMOUNT_EPSILON: f64 = 1e-9;

/// Validate a requested quantity: finite and strictly positive.
pub fn validate_amount(amount: f64) -> Result<f64, CreditError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(CreditError::InvalidAmount(amount));
    }
    Ok(amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_amounts_pass() {
        assert_eq!(validate_amount(0.5), Ok(0.5));
        assert_eq!(validate_amount(100.0), Ok(100.0));
    }

    #[test]
    fn zero_negative_and_non_finite_amounts_fail() {
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(validate_amount(bad), Err(CreditError::InvalidAmount(_))));
        }
    }
}
