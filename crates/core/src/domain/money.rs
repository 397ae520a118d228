use rust_decimal::{Decimal, RoundingStrategy};

/// Parses a Colombian-formatted amount such as `$1.299.900`, `1299900` or
/// `1.299.900,50`. A trailing group of exactly three digits marks the separators
/// as thousands separators; otherwise the last separator is the decimal point.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let cleaned: String =
        raw.chars().filter(|ch| ch.is_ascii_digit() || matches!(ch, '.' | ',')).collect();
    if !cleaned.chars().any(|ch| ch.is_ascii_digit()) {
        return None;
    }

    let normalized = match cleaned.rfind(['.', ',']) {
        None => cleaned,
        Some(index) => {
            let fraction = &cleaned[index + 1..];
            let integer_part: String =
                cleaned[..index].chars().filter(|ch| ch.is_ascii_digit()).collect();
            if fraction.len() == 3 {
                format!("{integer_part}{fraction}")
            } else if fraction.is_empty() {
                integer_part
            } else {
                format!("{integer_part}.{fraction}")
            }
        }
    };

    if normalized.is_empty() {
        return None;
    }
    normalized.parse::<Decimal>().ok()
}

/// Formats an amount as whole pesos with `.` thousands separators: `$1.499.900`.
pub fn format_cop(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    let digits = rounded.abs().trunc().to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    format!("{sign}${grouped}")
}
