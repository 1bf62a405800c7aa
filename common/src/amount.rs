//! Amount normalization.
//!
//! Malformed amounts become 0 instead of propagating NaN into prices.

/// Normalize a numeric amount: NaN and infinities become 0, everything else
/// (including negative values and zero) passes through unchanged.
pub fn normalize_amount(amount: f64) -> f64 {
    if amount.is_finite() {
        amount
    } else {
        0.0
    }
}

/// Normalize a textual amount. Anything that does not parse as a finite
/// number becomes 0.
pub fn normalize_amount_str(text: &str) -> f64 {
    text.trim()
        .parse::<f64>()
        .map(normalize_amount)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_finite_becomes_zero() {
        assert_eq!(normalize_amount(f64::NAN), 0.0);
        assert_eq!(normalize_amount(f64::INFINITY), 0.0);
        assert_eq!(normalize_amount(f64::NEG_INFINITY), 0.0);
    }

    #[test]
    fn test_sign_and_zero_pass_through() {
        assert_eq!(normalize_amount(-12.5), -12.5);
        assert_eq!(normalize_amount(0.0), 0.0);
        assert_eq!(normalize_amount(99.99), 99.99);
    }

    #[test]
    fn test_text_amounts() {
        assert_eq!(normalize_amount_str(" 42.5 "), 42.5);
        assert_eq!(normalize_amount_str("-3"), -3.0);
        assert_eq!(normalize_amount_str("abc"), 0.0);
        assert_eq!(normalize_amount_str("NaN"), 0.0);
        assert_eq!(normalize_amount_str(""), 0.0);
    }
}
