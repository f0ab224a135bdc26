pub mod logging;

use rust_decimal::Decimal;

/// Masks a secret for use in logs, keeping only a short prefix
pub fn mask_secret(secret: &str) -> String {
    let visible: String = secret.chars().take(5).collect();
    if secret.chars().count() <= 8 {
        return "[REDACTED]".to_string();
    }
    format!("{}...[REDACTED]", visible)
}

/// Formats a monetary amount for display with two decimal places
pub fn format_amount(amount: Decimal, currency: &str) -> String {
    format!("{} {:.2}", currency, amount.round_dp(2))
}

/// Removes duplicates while keeping the order of first appearance
pub fn dedup_preserving_order(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("sk-test0123456789"), "sk-te...[REDACTED]");
        assert_eq!(mask_secret("short"), "[REDACTED]");
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(dec!(9500), "USD"), "USD 9500.00");
        assert_eq!(format_amount(dec!(15000.456), "EUR"), "EUR 15000.46");
    }

    #[test]
    fn test_dedup_preserving_order() {
        let items = vec!["b", "a", "b", "c", "a"].into_iter().map(String::from);
        assert_eq!(dedup_preserving_order(items), vec!["b", "a", "c"]);
    }
}
