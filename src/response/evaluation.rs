//! Backtest and training payloads decided once into tagged outcomes.

use serde::Serialize;
use serde_json::{Map, Value};

use super::wire::{
    axis_label, decode, BacktestPayload, ClassificationPayload, RiskPayload, TrainPayload,
};
use crate::error::{WorkbenchError, WorkbenchResult};
use crate::logging::log_response_shape;
use crate::metric::MetricValue;

pub const TRUE_CLASS_LABELS: [&str; 2] = ["True 0", "True 1"];
pub const PREDICTED_CLASS_LABELS: [&str; 2] = ["Pred 0", "Pred 1"];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RiskMetrics {
    pub max_drawdown: MetricValue,
    pub sharpe_step: MetricValue,
    pub exposure: MetricValue,
    pub turnover: MetricValue,
}

impl From<RiskPayload> for RiskMetrics {
    fn from(r: RiskPayload) -> Self {
        Self {
            max_drawdown: MetricValue::from_json(r.max_drawdown.as_ref()),
            sharpe_step: MetricValue::from_json(r.sharpe_step.as_ref()),
            exposure: MetricValue::from_json(r.exposure.as_ref()),
            turnover: MetricValue::from_json(r.turnover.as_ref()),
        }
    }
}

/// A confusion count; any non-negative JSON number is accepted, anything else is absent.
fn count(value: Option<&Value>) -> Option<u64> {
    value
        .and_then(Value::as_f64)
        .filter(|n| n.is_finite() && *n >= 0.0)
        .map(|n| n.round() as u64)
}

/// Rows are the true class, columns the predicted class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    pub cells: [[u64; 2]; 2],
}

impl ConfusionMatrix {
    /// Needs both `tn` and `tp`; any other absent cell counts as zero.
    pub fn from_counts(
        tn: Option<u64>,
        fp: Option<u64>,
        fn_: Option<u64>,
        tp: Option<u64>,
    ) -> Option<Self> {
        match (tn, tp) {
            (Some(tn), Some(tp)) => Some(Self {
                cells: [[tn, fp.unwrap_or(0)], [fn_.unwrap_or(0), tp]],
            }),
            _ => None,
        }
    }

    pub fn total(&self) -> u64 {
        self.cells.iter().flatten().sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClassificationMetrics {
    pub precision: MetricValue,
    pub recall: MetricValue,
    pub f1: MetricValue,
    pub average_precision: MetricValue,
    pub brier: MetricValue,
    pub accuracy: MetricValue,
    pub auc: MetricValue,
    pub confusion: Option<ConfusionMatrix>,
}

impl From<ClassificationPayload> for ClassificationMetrics {
    fn from(c: ClassificationPayload) -> Self {
        Self {
            precision: MetricValue::from_json(c.precision_at_threshold.as_ref()),
            recall: MetricValue::from_json(c.recall_at_threshold.as_ref()),
            f1: MetricValue::from_json(c.f1_at_threshold.as_ref()),
            average_precision: MetricValue::from_json(c.average_precision.as_ref()),
            brier: MetricValue::from_json(c.brier.as_ref()),
            accuracy: MetricValue::from_json(c.accuracy.as_ref()),
            auc: MetricValue::from_json(c.auc.as_ref()),
            confusion: ConfusionMatrix::from_counts(
                count(c.tn.as_ref()),
                count(c.fp.as_ref()),
                count(c.fn_.as_ref()),
                count(c.tp.as_ref()),
            ),
        }
    }
}

/// Paired points; PR is (recall, precision), calibration is
/// (mean predicted, observed fraction), ROC is (fpr, tpr).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Curve {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl Curve {
    pub fn new(name: &str, x: Vec<f64>, y: Vec<f64>) -> WorkbenchResult<Self> {
        if x.len() != y.len() {
            return Err(WorkbenchError::malformed(format!(
                "{} curve has {} x points but {} y points",
                name,
                x.len(),
                y.len()
            )));
        }
        Ok(Self { x, y })
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReturnHistogram {
    pub edges: Vec<f64>,
    pub counts: Vec<f64>,
    pub centers: Vec<f64>,
}

impl ReturnHistogram {
    pub fn new(edges: Vec<f64>, counts: Vec<f64>) -> WorkbenchResult<Self> {
        let centers = bin_centers(&edges, &counts)?;
        Ok(Self {
            edges,
            counts,
            centers,
        })
    }
}

/// Midpoint of each consecutive edge pair. There is one fewer center than
/// edges, and that must equal the number of counts.
pub fn bin_centers(edges: &[f64], counts: &[f64]) -> WorkbenchResult<Vec<f64>> {
    if edges.is_empty() || edges.len() - 1 != counts.len() {
        return Err(WorkbenchError::malformed(format!(
            "histogram has {} edges for {} counts",
            edges.len(),
            counts.len()
        )));
    }
    Ok(edges.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect())
}

/// Series on the shared time axis.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Timeline {
    pub ts: Vec<String>,
    pub pnl: Option<Vec<f64>>,
    pub drawdown: Option<Vec<f64>>,
    pub truth: Option<Vec<f64>>,
}

impl Timeline {
    /// Endpoints for a reference line spanning the whole series.
    pub fn span(&self) -> Option<(&str, &str)> {
        match (self.ts.first(), self.ts.last()) {
            (Some(first), Some(last)) => Some((first.as_str(), last.as_str())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvaluationOutcome {
    ClassificationWithProbabilities {
        metrics: ClassificationMetrics,
        probabilities: Vec<f64>,
        threshold: f64,
        pr: Option<Curve>,
        calibration: Option<Curve>,
    },
    ClassificationWithSignals {
        metrics: ClassificationMetrics,
        signals: Vec<f64>,
    },
    /// No classification section; signals are shown if present.
    Regression { signals: Option<Vec<f64>> },
}

impl EvaluationOutcome {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::ClassificationWithProbabilities { .. } => "classification_with_probabilities",
            Self::ClassificationWithSignals { .. } => "classification_with_signals",
            Self::Regression { .. } => "regression",
        }
    }

    pub fn metrics(&self) -> Option<&ClassificationMetrics> {
        match self {
            Self::ClassificationWithProbabilities { metrics, .. }
            | Self::ClassificationWithSignals { metrics, .. } => Some(metrics),
            Self::Regression { .. } => None,
        }
    }
}

/// Parsed backtest outcome. Read-only; dropped when the next action starts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationResult {
    pub threshold: MetricValue,
    pub risk: Option<RiskMetrics>,
    pub timeline: Timeline,
    pub histogram: Option<ReturnHistogram>,
    pub outcome: EvaluationOutcome,
    pub artifacts_dir: Option<String>,
}

fn check_len(name: &str, series: Option<&Vec<f64>>, expected: usize) -> WorkbenchResult<()> {
    match series {
        Some(values) if expected > 0 && values.len() != expected => {
            Err(WorkbenchError::malformed(format!(
                "series.{} has {} points for {} timestamps",
                name,
                values.len(),
                expected
            )))
        }
        _ => Ok(()),
    }
}

pub fn interpret_backtest(value: Value) -> WorkbenchResult<EvaluationResult> {
    let payload: BacktestPayload = decode("backtest", value)?;
    let series = payload.series.unwrap_or_default();
    let ts: Vec<String> = series.ts.iter().map(axis_label).collect();

    for (name, values) in [
        ("pnl", series.pnl.as_ref()),
        ("drawdown", series.drawdown.as_ref()),
        ("y_test", series.y_test.as_ref()),
        ("y_prob", series.y_prob.as_ref()),
        ("signals", series.signals.as_ref()),
    ] {
        check_len(name, values, ts.len())?;
    }

    let threshold = MetricValue::from_json(payload.threshold.as_ref());
    let histogram = payload
        .ret_hist
        .map(|h| ReturnHistogram::new(h.edges, h.counts))
        .transpose()?;

    let outcome = match payload.classification {
        Some(classification) => {
            let metrics = ClassificationMetrics::from(classification);
            match (series.y_prob, series.signals) {
                (Some(probabilities), _) => {
                    let threshold = threshold.as_number().ok_or_else(|| {
                        WorkbenchError::malformed(
                            "probability series without a numeric decision threshold",
                        )
                    })?;
                    let curves = payload.curves.unwrap_or_default();
                    let pr = curves
                        .pr
                        .map(|p| Curve::new("precision-recall", p.recall, p.precision))
                        .transpose()?;
                    let calibration = curves
                        .calibration
                        .map(|c| Curve::new("calibration", c.mean_pred, c.frac_pos))
                        .transpose()?;
                    EvaluationOutcome::ClassificationWithProbabilities {
                        metrics,
                        probabilities,
                        threshold,
                        pr,
                        calibration,
                    }
                }
                (None, Some(signals)) => {
                    EvaluationOutcome::ClassificationWithSignals { metrics, signals }
                }
                (None, None) => {
                    return Err(WorkbenchError::malformed(
                        "classification result carries neither probabilities nor signals",
                    ))
                }
            }
        }
        None => EvaluationOutcome::Regression {
            signals: series.signals,
        },
    };

    let result = EvaluationResult {
        threshold,
        risk: payload.risk.map(RiskMetrics::from),
        timeline: Timeline {
            ts,
            pnl: series.pnl,
            drawdown: series.drawdown,
            truth: series.y_test,
        },
        histogram,
        outcome,
        artifacts_dir: payload.artifacts_dir.filter(|d| !d.is_empty()),
    };

    let (pr, calibration) = match &result.outcome {
        EvaluationOutcome::ClassificationWithProbabilities { pr, calibration, .. } => {
            (pr.is_some(), calibration.is_some())
        }
        _ => (false, false),
    };
    log_response_shape(
        "backtest",
        result.outcome.tag(),
        &[
            ("risk", result.risk.is_some()),
            ("pr", pr),
            ("calibration", calibration),
            (
                "confusion",
                result.outcome.metrics().and_then(|m| m.confusion).is_some(),
            ),
            ("histogram", result.histogram.is_some()),
        ],
    );
    Ok(result)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrainingOutcome {
    Classification {
        accuracy: MetricValue,
        auc: MetricValue,
        roc: Option<Curve>,
    },
    Regression {
        mse: MetricValue,
        r2: MetricValue,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingResult {
    pub model_name: Option<String>,
    pub task: String,
    pub factors: Vec<String>,
    pub test_size: Option<f64>,
    pub artifacts_dir: Option<String>,
    pub outcome: TrainingOutcome,
}

/// First present key wins; an absent metric reads as NaN.
fn lookup_metric(metrics: &Map<String, Value>, keys: &[&str]) -> MetricValue {
    keys.iter()
        .map(|k| MetricValue::from_json(metrics.get(*k)))
        .find(|v| *v != MetricValue::Missing)
        .unwrap_or(MetricValue::Number(f64::NAN))
}

fn roc_curve(roc: Option<&Value>) -> WorkbenchResult<Option<Curve>> {
    let roc = match roc {
        Some(Value::Object(map)) => map,
        _ => return Ok(None),
    };
    if !matches!(roc.get("fpr"), Some(Value::Array(_))) {
        return Ok(None);
    }
    let points = |key: &str| -> WorkbenchResult<Vec<f64>> {
        let raw = roc.get(key).cloned().unwrap_or(Value::Null);
        decode(&format!("roc.{}", key), raw)
    };
    Curve::new("roc", points("fpr")?, points("tpr")?).map(Some)
}

pub fn interpret_training(value: Value) -> WorkbenchResult<TrainingResult> {
    let payload: TrainPayload = decode("train", value)?;
    let task = payload
        .task
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "classification".to_string());
    let metrics = payload.metrics.unwrap_or_default();

    let outcome = if task == "regression" {
        TrainingOutcome::Regression {
            mse: lookup_metric(&metrics, &["mse", "MSE"]),
            r2: lookup_metric(&metrics, &["r2", "R2"]),
        }
    } else {
        TrainingOutcome::Classification {
            accuracy: lookup_metric(&metrics, &["accuracy", "Accuracy"]),
            auc: lookup_metric(&metrics, &["auc", "AUC"]),
            roc: roc_curve(payload.roc.as_ref())?,
        }
    };

    let result = TrainingResult {
        model_name: payload.model_name.or(payload.model),
        task,
        factors: payload.factors.unwrap_or_default(),
        test_size: payload.test_size,
        artifacts_dir: payload.artifacts_dir.filter(|d| !d.is_empty()),
        outcome,
    };

    let roc = matches!(&result.outcome, TrainingOutcome::Classification { roc: Some(_), .. });
    log_response_shape(
        "train",
        &result.task,
        &[("roc", roc), ("artifacts_dir", result.artifacts_dir.is_some())],
    );
    Ok(result)
}
