//! Display formatting for money, counts and ratios.
//!
//! Money renders as `£1,234.56` (symbol, grouped thousands, two decimals),
//! negatives as `-£1,234.56`. Impressions render as whole grouped numbers.

use crate::types::Currency;

/// `#,##0.00` with the currency symbol in front.
pub fn format_money(amount: f64, currency: Currency) -> String {
    let body = format_grouped(amount.abs(), 2);
    if amount < 0.0 && body.chars().any(|c| c.is_ascii_digit() && c != '0') {
        format!("-{}{body}", currency.symbol())
    } else {
        format!("{}{body}", currency.symbol())
    }
}

/// `#,##0`, e.g. impressions.
pub fn format_count(value: f64) -> String {
    let body = format_grouped(value.abs(), 0);
    if value < 0.0 && body != "0" {
        format!("-{body}")
    } else {
        body
    }
}

/// A fraction as a percentage: `0.529` with 1 decimal → `52.9%`.
pub fn format_percent(ratio: f64, decimals: usize) -> String {
    format!("{:.*}%", decimals, ratio * 100.0)
}

fn format_grouped(value: f64, decimals: usize) -> String {
    let body = format!("{value:.decimals$}");
    match body.split_once('.') {
        Some((int_part, frac)) => format!("{}.{frac}", group_digits(int_part)),
        None => group_digits(&body),
    }
}

fn group_digits(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i != 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}
