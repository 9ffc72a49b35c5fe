//! Formatting helpers for amounts stored as cents.

/// Formats cents as a dollar string, e.g. `-1050` becomes `-$10.50`.
#[must_use]
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}${}.{:02}", abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_cents() {
        assert_eq!(format_cents(0), "$0.00");
        assert_eq!(format_cents(1050), "$10.50");
        assert_eq!(format_cents(-7), "-$0.07");
        assert_eq!(format_cents(i64::MIN), "-$92233720368547758.08");
    }
}
