use crate::aggregate::Compliance;

/// Formats a number with comma thousands separators and no decimals
///
/// # Examples
/// ```
/// use sales_dashboard::format::format_thousands;
/// assert_eq!(format_thousands(1234567.4), "1,234,567");
/// assert_eq!(format_thousands(42.0), "42");
/// ```
pub fn format_thousands(value: f64) -> String {
    let rounded = value.round() as i64;
    let digits = rounded.unsigned_abs().to_string();
    let mut result = String::new();
    for (i, ch) in digits.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(ch);
    }
    if rounded < 0 {
        result.push('-');
    }
    result.chars().rev().collect()
}

/// `$1,234` style money value
pub fn format_currency(value: f64) -> String {
    format!("${}", format_thousands(value))
}

pub fn format_percent(value: f64) -> String {
    format!("{:.2}%", value)
}

/// Compliance as shown on a card: a percentage or `N/A`
pub fn format_compliance(compliance: &Compliance) -> String {
    compliance.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_thousands() {
        assert_eq!(format_thousands(0.0), "0");
        assert_eq!(format_thousands(999.0), "999");
        assert_eq!(format_thousands(1000.0), "1,000");
        assert_eq!(format_thousands(1234567890.0), "1,234,567,890");
        assert_eq!(format_thousands(-1500.0), "-1,500");
    }

    #[test]
    fn test_currency_and_percent() {
        assert_eq!(format_currency(150.0), "$150");
        assert_eq!(format_percent(83.3333), "83.33%");
        assert_eq!(format_compliance(&Compliance::Undefined), "N/A");
    }
}
