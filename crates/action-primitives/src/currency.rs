//! Displayed-amount parsing.

/// Parses a displayed currency amount such as `$ 1,132,090.50`.
///
/// `$`, thousands separators and whitespace are stripped. A lone `-` or an
/// empty string is zero. Text around the figure (`"Total $ 95"`) falls back
/// to its digits. `None` when no figure is present at all.
pub fn parse_currency(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != '$' && *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() || cleaned == "-" {
        return Some(0.0);
    }
    if let Ok(value) = cleaned.parse::<f64>() {
        return value.is_finite().then_some(value);
    }
    let digits: String = cleaned
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse::<f64>().ok()
}
