//! Fixed-precision rendering of metric values.

use crate::metric::{label, MetricValue};

/// Shown for a metric the payload did not carry.
pub const PLACEHOLDER: &str = "-";

pub fn decimals_for(metric: &str) -> usize {
    match metric {
        label::TURNOVER => 1,
        label::THRESHOLD | label::SHARPE_STEP => 3,
        _ => 4,
    }
}

pub fn format(metric: &str, value: &MetricValue) -> String {
    match value {
        MetricValue::Missing => PLACEHOLDER.to_string(),
        MetricValue::Text(s) => s.clone(),
        MetricValue::Number(v) => to_fixed(*v, decimals_for(metric)),
    }
}

/// Fixed-point rendering with ties rounded away from zero, so `1.25` at one
/// decimal is `1.3`. Non-finite values render as `NaN`, `Infinity`, `-Infinity`.
pub fn to_fixed(value: f64, decimals: usize) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }

    // 40 guard digits are enough to tell an exact binary tie from a near tie
    // at the precisions used here.
    let expanded = std::format!("{:.*}", decimals + 40, value.abs());
    let (int_part, frac_part) = expanded.split_once('.').unwrap_or((expanded.as_str(), ""));

    let mut digits: Vec<u8> = int_part
        .bytes()
        .chain(frac_part.bytes().take(decimals))
        .map(|b| b - b'0')
        .collect();
    let round_up = frac_part.as_bytes().get(decimals).map_or(false, |b| *b >= b'5');

    if round_up {
        let mut idx = digits.len();
        loop {
            if idx == 0 {
                digits.insert(0, 1);
                break;
            }
            idx -= 1;
            if digits[idx] == 9 {
                digits[idx] = 0;
            } else {
                digits[idx] += 1;
                break;
            }
        }
    }

    let split = digits.len() - decimals;
    let mut out = String::with_capacity(digits.len() + 2);
    if value < 0.0 {
        out.push('-');
    }
    out.extend(digits[..split].iter().map(|d| char::from(b'0' + d)));
    if decimals > 0 {
        out.push('.');
        out.extend(digits[split..].iter().map(|d| char::from(b'0' + d)));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(metric: &str, v: f64) -> String {
        format(metric, &MetricValue::Number(v))
    }

    #[test]
    fn test_metric_specific_precision() {
        assert_eq!(fmt("Turnover", 1.25), "1.3");
        assert_eq!(fmt("Threshold", 0.3333), "0.333");
        assert_eq!(fmt("Sharpe(step)", 0.5), "0.500");
        assert_eq!(fmt("AP", 0.71234), "0.7123");
        assert_eq!(fmt("Exposure", 0.5), "0.5000");
    }

    #[test]
    fn test_missing_and_text() {
        assert_eq!(format("x", &MetricValue::Missing), "-");
        assert_eq!(format("AP", &MetricValue::Text("n/a".into())), "n/a");
    }

    #[test]
    fn test_non_finite_tags() {
        assert_eq!(fmt("AP", f64::NAN), "NaN");
        assert_eq!(fmt("AP", f64::INFINITY), "Infinity");
        assert_eq!(fmt("AP", f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_rounding_carries_and_signs() {
        assert_eq!(to_fixed(9.96, 1), "10.0");
        assert_eq!(to_fixed(0.99996, 4), "1.0000");
        assert_eq!(to_fixed(-0.03125, 4), "-0.0313");
        assert_eq!(to_fixed(-1.25, 1), "-1.3");
        assert_eq!(to_fixed(-0.0, 4), "0.0000");
        assert_eq!(to_fixed(2.5, 0), "3");
        assert_eq!(to_fixed(1234.0, 1), "1234.0");
    }

    #[test]
    fn test_near_tie_rounds_down() {
        // 1.005 is stored slightly below the tie
        assert_eq!(to_fixed(1.005, 2), "1.00");
        assert_eq!(to_fixed(0.125, 2), "0.13");
    }
}
