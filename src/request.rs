//! Outbound train/backtest requests.
//!
//! A backtest reuses the last training artifact whenever one is recorded, even
//! if the selected factor changed since; only without an artifact does it fall
//! back to naming factor and model.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::{WorkbenchError, WorkbenchResult};
use crate::logging::log_request;
use crate::selection::SelectionState;

pub mod param {
    pub const FACTOR: &str = "factor";
    pub const MODEL: &str = "model";
    pub const HORIZON: &str = "horizon";
    pub const EPS: &str = "eps";
    pub const DROP_EQUAL: &str = "drop_equal";
    pub const SCALE: &str = "scale";
    pub const ARTIFACTS_DIR: &str = "artifacts_dir";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Train,
    Backtest,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Train => "train",
            RequestKind::Backtest => "backtest",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BacktestMode {
    /// Carries only the artifact directory and horizon.
    Reuse,
    /// Carries factor, model and horizon.
    Fresh,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn to_json(&self) -> Value {
        match self {
            ParamValue::Text(s) => Value::String(s.clone()),
            ParamValue::Int(i) => Value::from(*i),
            ParamValue::Float(f) => Value::from(*f),
            ParamValue::Bool(b) => Value::Bool(*b),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Text(s) => f.write_str(s),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// One outbound action. Built fresh per action and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestSpec {
    kind: RequestKind,
    params: BTreeMap<String, ParamValue>,
}

impl RequestSpec {
    fn new(kind: RequestKind, params: Vec<(&str, ParamValue)>) -> Self {
        Self {
            kind,
            params: params
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    pub fn params(&self) -> &BTreeMap<String, ParamValue> {
        &self.params
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.params.get(key)
    }

    pub fn factor(&self) -> Option<&str> {
        self.get(param::FACTOR).and_then(ParamValue::as_str)
    }

    pub fn model(&self) -> Option<&str> {
        self.get(param::MODEL).and_then(ParamValue::as_str)
    }

    pub fn artifacts_dir(&self) -> Option<&str> {
        self.get(param::ARTIFACTS_DIR).and_then(ParamValue::as_str)
    }

    pub fn backtest_mode(&self) -> Option<BacktestMode> {
        match self.kind {
            RequestKind::Train => None,
            RequestKind::Backtest if self.artifacts_dir().is_some() => Some(BacktestMode::Reuse),
            RequestKind::Backtest => Some(BacktestMode::Fresh),
        }
    }

    /// Canonical `key=value&...` encoding in key order.
    pub fn canonical(&self) -> String {
        let pairs: Vec<String> = self
            .params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        format!("{}?{}", self.kind, pairs.join("&"))
    }

    /// Short stable id for correlating a request with its log records.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.canonical().as_bytes());
        hex::encode(&digest[..8])
    }

    fn params_json(&self) -> Map<String, Value> {
        self.params
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect()
    }

    fn log_built(&self) {
        let mode = match self.backtest_mode() {
            None => "train",
            Some(BacktestMode::Reuse) => "reuse",
            Some(BacktestMode::Fresh) => "fresh",
        };
        log_request(self.kind.as_str(), &self.fingerprint(), mode, self.params_json());
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainInputs {
    pub model: String,
    pub horizon: u32,
    /// Half-width of the "no change" label band.
    pub eps: f64,
    /// Drop samples whose label falls inside the band.
    pub drop_equal: bool,
    pub scale: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestInputs {
    pub model: String,
    pub horizon: u32,
}

fn check_horizon(horizon: u32) -> WorkbenchResult<i64> {
    if horizon == 0 {
        return Err(WorkbenchError::InvalidInput {
            field: param::HORIZON,
            reason: "must be a positive integer".to_string(),
        });
    }
    Ok(i64::from(horizon))
}

fn check_model(model: &str) -> WorkbenchResult<String> {
    let model = model.trim();
    if model.is_empty() {
        return Err(WorkbenchError::InvalidInput {
            field: param::MODEL,
            reason: "no model chosen".to_string(),
        });
    }
    Ok(model.to_string())
}

fn check_eps(eps: f64) -> WorkbenchResult<f64> {
    if !eps.is_finite() || eps < 0.0 {
        return Err(WorkbenchError::InvalidInput {
            field: param::EPS,
            reason: format!("expected a finite non-negative number, got {}", eps),
        });
    }
    Ok(eps)
}

fn require_factor(selection: &SelectionState, action: RequestKind) -> WorkbenchResult<String> {
    selection
        .selected_factor()
        .map(str::to_string)
        .ok_or(WorkbenchError::MissingSelection { action })
}

pub fn build_train(
    selection: &SelectionState,
    inputs: &TrainInputs,
) -> WorkbenchResult<RequestSpec> {
    let factor = require_factor(selection, RequestKind::Train)?;
    let model = check_model(&inputs.model)?;
    let horizon = check_horizon(inputs.horizon)?;
    let eps = check_eps(inputs.eps)?;

    let spec = RequestSpec::new(
        RequestKind::Train,
        vec![
            (param::FACTOR, ParamValue::Text(factor)),
            (param::MODEL, ParamValue::Text(model)),
            (param::HORIZON, ParamValue::Int(horizon)),
            (param::EPS, ParamValue::Float(eps)),
            (param::DROP_EQUAL, ParamValue::Bool(inputs.drop_equal)),
            (param::SCALE, ParamValue::Bool(inputs.scale)),
        ],
    );
    spec.log_built();
    Ok(spec)
}

pub fn build_backtest(
    selection: &SelectionState,
    inputs: &BacktestInputs,
) -> WorkbenchResult<RequestSpec> {
    let horizon = check_horizon(inputs.horizon)?;

    let spec = match selection.artifacts_dir() {
        Some(dir) => RequestSpec::new(
            RequestKind::Backtest,
            vec![
                (param::ARTIFACTS_DIR, ParamValue::Text(dir.to_string())),
                (param::HORIZON, ParamValue::Int(horizon)),
            ],
        ),
        None => {
            let factor = require_factor(selection, RequestKind::Backtest)?;
            let model = check_model(&inputs.model)?;
            RequestSpec::new(
                RequestKind::Backtest,
                vec![
                    (param::FACTOR, ParamValue::Text(factor)),
                    (param::MODEL, ParamValue::Text(model)),
                    (param::HORIZON, ParamValue::Int(horizon)),
                ],
            )
        }
    };
    spec.log_built();
    Ok(spec)
}
