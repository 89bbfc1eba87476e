//! Price display formatting.

/// Format an amount and currency code as a fixed two-decimal display string,
/// e.g. `"19.90 USD"`.
///
/// Returns `None` unless both parts are present - a missing price renders as
/// absent, not as zero or a placeholder number.
#[must_use]
pub fn format_price(amount: Option<f64>, currency: Option<&str>) -> Option<String> {
    match (amount, currency) {
        (Some(amount), Some(code)) if !code.is_empty() => Some(format!("{amount:.2} {code}")),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_price() {
        assert_eq!(
            format_price(Some(19.9), Some("USD")),
            Some("19.90 USD".to_string())
        );
    }

    #[test]
    fn test_format_price_missing_amount() {
        assert_eq!(format_price(None, Some("USD")), None);
    }

    #[test]
    fn test_format_price_missing_currency() {
        assert_eq!(format_price(Some(19.9), None), None);
        assert_eq!(format_price(Some(19.9), Some("")), None);
    }

    #[test]
    fn test_format_price_pads_whole_amounts() {
        assert_eq!(
            format_price(Some(100.0), Some("UAH")),
            Some("100.00 UAH".to_string())
        );
    }
}
