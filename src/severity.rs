//! Severity tiers for metric badges.
//!
//! | metric        | good      | warn       | otherwise |
//! |---------------|-----------|------------|-----------|
//! | Sharpe(step)  | >= 1.0    | >= 0.2     | bad       |
//! | Max Drawdown  | >= -0.05  | >= -0.20   | bad       |
//! | Precision@thr | >= 0.6    | >= 0.4     | bad       |
//! | Recall@thr    | >= 0.8    | >= 0.6     | bad       |
//! | F1@thr        | >= 0.6    | >= 0.4     | bad       |
//! | AP            | >= 0.7    | >= 0.5     | bad       |
//! | Brier         | < 0.1     | < 0.2      | bad       |
//!
//! Any other label is neutral.

use serde::Serialize;

use crate::metric::{label, MetricValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Good,
    Warn,
    Bad,
    Neutral,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Good => "good",
            Severity::Warn => "warn",
            Severity::Bad => "bad",
            Severity::Neutral => "neutral",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Rule {
    /// Inclusive lower bounds.
    AtLeast { good: f64, warn: f64 },
    /// Exclusive upper bounds.
    Below { good: f64, warn: f64 },
}

fn rule_for(metric: &str) -> Option<Rule> {
    let rule = match metric {
        label::SHARPE_STEP | label::SHARPE => Rule::AtLeast { good: 1.0, warn: 0.2 },
        label::MAX_DRAWDOWN => Rule::AtLeast { good: -0.05, warn: -0.20 },
        label::PRECISION => Rule::AtLeast { good: 0.6, warn: 0.4 },
        label::RECALL => Rule::AtLeast { good: 0.8, warn: 0.6 },
        label::F1 => Rule::AtLeast { good: 0.6, warn: 0.4 },
        label::AP => Rule::AtLeast { good: 0.7, warn: 0.5 },
        label::BRIER => Rule::Below { good: 0.1, warn: 0.2 },
        _ => return None,
    };
    Some(rule)
}

pub fn classify(metric: &str, value: &MetricValue) -> Severity {
    match value {
        MetricValue::Number(v) => classify_number(metric, *v),
        MetricValue::Missing | MetricValue::Text(_) => Severity::Neutral,
    }
}

/// NaN fails every comparison and lands in `Bad` for a known metric.
pub fn classify_number(metric: &str, value: f64) -> Severity {
    match rule_for(metric) {
        None => Severity::Neutral,
        Some(Rule::AtLeast { good, warn }) => {
            if value >= good {
                Severity::Good
            } else if value >= warn {
                Severity::Warn
            } else {
                Severity::Bad
            }
        }
        Some(Rule::Below { good, warn }) => {
            if value < good {
                Severity::Good
            } else if value < warn {
                Severity::Warn
            } else {
                Severity::Bad
            }
        }
    }
}
