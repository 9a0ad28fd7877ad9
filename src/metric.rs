//! Metric values as they arrive from the service, and the badges derived from them.

use serde::Serialize;
use serde_json::Value;

use crate::format::format;
use crate::severity::{classify, Severity};

/// Display labels. Severity thresholds and decimal precision key off these.
pub mod label {
    pub const MAX_DRAWDOWN: &str = "Max Drawdown";
    pub const SHARPE_STEP: &str = "Sharpe(step)";
    pub const SHARPE: &str = "Sharpe";
    pub const EXPOSURE: &str = "Exposure";
    pub const TURNOVER: &str = "Turnover";
    pub const PRECISION: &str = "Precision@thr";
    pub const RECALL: &str = "Recall@thr";
    pub const F1: &str = "F1@thr";
    pub const AP: &str = "AP";
    pub const BRIER: &str = "Brier";
    pub const THRESHOLD: &str = "Threshold";
    pub const ACCURACY: &str = "Accuracy";
    pub const AUC: &str = "AUC";
    pub const MSE: &str = "MSE";
    pub const R2: &str = "R2";
}

/// A raw metric value: a number, a non-numeric token, or nothing at all.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Missing,
    Number(f64),
    Text(String),
}

impl MetricValue {
    pub fn from_json(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => MetricValue::Missing,
            Some(Value::Number(n)) => n
                .as_f64()
                .map(MetricValue::Number)
                .unwrap_or_else(|| MetricValue::Text(n.to_string())),
            Some(Value::String(s)) => MetricValue::Text(s.clone()),
            Some(other) => MetricValue::Text(other.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            MetricValue::Number(v) => Some(*v),
            _ => None,
        }
    }
}

impl Default for MetricValue {
    fn default() -> Self {
        MetricValue::Missing
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Number(v)
    }
}

impl From<Option<f64>> for MetricValue {
    fn from(v: Option<f64>) -> Self {
        v.map(MetricValue::Number).unwrap_or(MetricValue::Missing)
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        MetricValue::Text(v.to_string())
    }
}

/// One displayed metric, recomputed on every result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricBadge {
    pub label: String,
    pub raw_value: MetricValue,
    pub severity: Severity,
    pub display_text: String,
}

pub fn badge(label: &str, value: impl Into<MetricValue>) -> MetricBadge {
    let raw_value = value.into();
    MetricBadge {
        label: label.to_string(),
        severity: classify(label, &raw_value),
        display_text: format(label, &raw_value),
        raw_value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_variants() {
        assert_eq!(MetricValue::from_json(None), MetricValue::Missing);
        assert_eq!(MetricValue::from_json(Some(&Value::Null)), MetricValue::Missing);
        assert_eq!(MetricValue::from_json(Some(&json!(0.5))), MetricValue::Number(0.5));
        assert_eq!(MetricValue::from_json(Some(&json!(3))), MetricValue::Number(3.0));
        assert_eq!(
            MetricValue::from_json(Some(&json!("n/a"))),
            MetricValue::Text("n/a".to_string())
        );
        assert_eq!(
            MetricValue::from_json(Some(&json!(true))),
            MetricValue::Text("true".to_string())
        );
    }

    #[test]
    fn test_badge_combines_severity_and_text() {
        let b = badge(label::SHARPE_STEP, 1.23456);
        assert_eq!(b.severity, Severity::Good);
        assert_eq!(b.display_text, "1.235");
        assert_eq!(b.raw_value, MetricValue::Number(1.23456));

        let missing = badge(label::AP, None::<f64>);
        assert_eq!(missing.severity, Severity::Neutral);
        assert_eq!(missing.display_text, "-");
    }

    #[test]
    fn test_text_badge_is_neutral_and_verbatim() {
        let b = badge(label::BRIER, "pending");
        assert_eq!(b.severity, Severity::Neutral);
        assert_eq!(b.display_text, "pending");
    }
}
