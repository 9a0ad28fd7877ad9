//! Payload shapes as the compute service sends them. Everything is optional.
//! Metric fields stay raw JSON so a stray token renders as text instead of
//! failing the whole payload.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{WorkbenchError, WorkbenchResult};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BacktestPayload {
    pub threshold: Option<Value>,
    pub series: Option<SeriesPayload>,
    pub risk: Option<RiskPayload>,
    pub classification: Option<ClassificationPayload>,
    pub curves: Option<CurvesPayload>,
    pub ret_hist: Option<HistogramPayload>,
    pub artifacts_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeriesPayload {
    /// Timestamps arrive as strings or bare numbers.
    #[serde(default)]
    pub ts: Vec<Value>,
    pub ret: Option<Vec<f64>>,
    pub signals: Option<Vec<f64>>,
    pub pnl: Option<Vec<f64>>,
    pub step_pnl: Option<Vec<f64>>,
    pub drawdown: Option<Vec<f64>>,
    pub y_test: Option<Vec<f64>>,
    pub y_prob: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RiskPayload {
    pub max_drawdown: Option<Value>,
    pub sharpe_step: Option<Value>,
    pub exposure: Option<Value>,
    pub turnover: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClassificationPayload {
    pub tp: Option<Value>,
    pub fp: Option<Value>,
    pub tn: Option<Value>,
    #[serde(rename = "fn")]
    pub fn_: Option<Value>,
    pub precision_at_threshold: Option<Value>,
    pub recall_at_threshold: Option<Value>,
    pub f1_at_threshold: Option<Value>,
    pub average_precision: Option<Value>,
    pub brier: Option<Value>,
    pub accuracy: Option<Value>,
    pub auc: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CurvesPayload {
    pub pr: Option<PrPayload>,
    pub calibration: Option<CalibrationPayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrPayload {
    pub precision: Vec<f64>,
    pub recall: Vec<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CalibrationPayload {
    pub mean_pred: Vec<f64>,
    pub frac_pos: Vec<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistogramPayload {
    pub edges: Vec<f64>,
    pub counts: Vec<f64>,
}

/// Training meta. Metric keys vary in case, so they stay a loose map.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrainPayload {
    pub model_name: Option<String>,
    pub model: Option<String>,
    pub task: Option<String>,
    pub metrics: Option<Map<String, Value>>,
    pub roc: Option<Value>,
    pub artifacts_dir: Option<String>,
    pub factors: Option<Vec<String>>,
    pub horizon: Option<Value>,
    pub eps: Option<f64>,
    pub test_size: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FactorMetaPayload {
    pub category: Option<String>,
    pub desc: Option<String>,
    pub formula: Option<String>,
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelMetaPayload {
    pub name: Option<String>,
    pub desc: Option<String>,
    pub task: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FactorSeriesPayload {
    #[serde(default)]
    pub x: Vec<Value>,
    #[serde(default)]
    pub y: Vec<Option<f64>>,
}

pub fn decode<T: serde::de::DeserializeOwned>(what: &str, value: Value) -> WorkbenchResult<T> {
    serde_json::from_value(value)
        .map_err(|e| WorkbenchError::malformed(format!("{} payload: {}", what, e)))
}

/// Renders a timestamp cell the way it would appear on an axis.
pub fn axis_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
