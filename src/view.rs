//! Render-ready view model.
//!
//! Panels are replaced wholesale on each result and cleared before a new
//! request goes out, so an in-flight call never shows stale charts. A panel
//! that does not apply to the result carries an explicit `NotAvailable`
//! reason instead of an empty chart.

use std::fmt;

use serde::Serialize;

use crate::error::WorkbenchError;
use crate::format::{to_fixed, PLACEHOLDER};
use crate::metric::{badge, label, MetricBadge, MetricValue};
use crate::response::{
    ConfusionMatrix, Curve, EvaluationOutcome, EvaluationResult, FactorCatalog, FactorMeta,
    FactorSeries, ModelOption, Timeline, TrainingOutcome, TrainingResult,
    PREDICTED_CLASS_LABELS, TRUE_CLASS_LABELS,
};

// =============================================================================
// Status lines
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Ok,
    Loading,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusLine {
    pub text: String,
    pub kind: StatusKind,
}

impl StatusLine {
    pub fn idle() -> Self {
        Self {
            text: String::new(),
            kind: StatusKind::Ok,
        }
    }

    pub fn loading(text: &str) -> Self {
        Self {
            text: text.to_string(),
            kind: StatusKind::Loading,
        }
    }

    pub fn done() -> Self {
        Self {
            text: "Done.".to_string(),
            kind: StatusKind::Ok,
        }
    }

    pub fn error(err: &WorkbenchError) -> Self {
        Self {
            text: format!("Error: {}", err),
            kind: StatusKind::Error,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.text.is_empty() && self.kind == StatusKind::Ok
    }
}

impl Default for StatusLine {
    fn default() -> Self {
        Self::idle()
    }
}

// =============================================================================
// Panels and charts
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "content", rename_all = "snake_case")]
pub enum PanelState<T> {
    Empty,
    NotAvailable(String),
    Ready(T),
}

impl<T> PanelState<T> {
    pub fn not_available(reason: &str) -> Self {
        PanelState::NotAvailable(reason.to_string())
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            PanelState::Ready(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, PanelState::Empty)
    }
}

impl<T> Default for PanelState<T> {
    fn default() -> Self {
        PanelState::Empty
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStyle {
    Line,
    DottedLine,
    Step,
    Markers,
    LineMarkers,
    Bar,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trace<X> {
    pub name: String,
    pub x: Vec<X>,
    pub y: Vec<f64>,
    pub style: TraceStyle,
}

impl<X> Trace<X> {
    pub fn new(name: &str, x: Vec<X>, y: Vec<f64>, style: TraceStyle) -> Self {
        Self {
            name: name.to_string(),
            x,
            y,
            style,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chart<X> {
    pub title: String,
    pub x_title: String,
    pub y_title: String,
    pub traces: Vec<Trace<X>>,
}

impl<X> Chart<X> {
    pub fn new(title: &str, x_title: &str, y_title: &str, traces: Vec<Trace<X>>) -> Self {
        Self {
            title: title.to_string(),
            x_title: x_title.to_string(),
            y_title: y_title.to_string(),
            traces,
        }
    }

    pub fn trace(&self, name: &str) -> Option<&Trace<X>> {
        self.traces.iter().find(|t| t.name == name)
    }
}

pub type TimeChart = Chart<String>;
pub type CurveChart = Chart<f64>;

/// Confusion matrix, rows = true class, columns = predicted class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Heatmap {
    pub title: String,
    pub rows: [&'static str; 2],
    pub columns: [&'static str; 2],
    pub cells: [[u64; 2]; 2],
}

impl From<ConfusionMatrix> for Heatmap {
    fn from(m: ConfusionMatrix) -> Self {
        Self {
            title: "Confusion Matrix".to_string(),
            rows: TRUE_CLASS_LABELS,
            columns: PREDICTED_CLASS_LABELS,
            cells: m.cells,
        }
    }
}

/// Title-embedded metric at its own precision; non-numbers pass through.
fn title_value(value: &MetricValue, decimals: usize) -> String {
    match value {
        MetricValue::Number(v) => to_fixed(*v, decimals),
        MetricValue::Text(s) => s.clone(),
        MetricValue::Missing => PLACEHOLDER.to_string(),
    }
}

fn diagonal(name: &str) -> Trace<f64> {
    Trace::new(name, vec![0.0, 1.0], vec![0.0, 1.0], TraceStyle::DottedLine)
}

fn time_panel(
    timeline: &Timeline,
    series: Option<&Vec<f64>>,
    title: &str,
    y_title: &str,
) -> PanelState<TimeChart> {
    match series {
        Some(values) => PanelState::Ready(Chart::new(
            title,
            "Time",
            y_title,
            vec![Trace::new(y_title, timeline.ts.clone(), values.clone(), TraceStyle::Line)],
        )),
        None => PanelState::NotAvailable(format!("No {} series.", y_title)),
    }
}

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CatalogView {
    pub status: StatusLine,
    pub factors: FactorCatalog,
    pub models: Vec<ModelOption>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FactorView {
    pub status: StatusLine,
    pub name: Option<String>,
    pub meta: FactorMeta,
    pub series: PanelState<TimeChart>,
}

impl FactorView {
    pub fn opened(name: &str, meta: FactorMeta) -> Self {
        Self {
            status: StatusLine::loading("Computing…"),
            name: Some(name.to_string()),
            meta,
            series: PanelState::Empty,
        }
    }

    pub fn series_chart(name: &str, series: &FactorSeries) -> TimeChart {
        Chart::new(
            &format!("{} over time", name),
            "Time",
            name,
            vec![Trace::new(name, series.x.clone(), series.y.clone(), TraceStyle::Line)],
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainView {
    pub status: StatusLine,
    pub model_name: String,
    pub task: String,
    pub metrics: Vec<MetricBadge>,
    pub roc: PanelState<CurveChart>,
}

impl Default for TrainView {
    fn default() -> Self {
        Self {
            status: StatusLine::idle(),
            model_name: PLACEHOLDER.to_string(),
            task: PLACEHOLDER.to_string(),
            metrics: Vec::new(),
            roc: PanelState::Empty,
        }
    }
}

impl TrainView {
    /// `requested_model` stands in when the payload does not name the model.
    pub fn from_result(result: &TrainingResult, requested_model: &str) -> Self {
        let (metrics, roc) = match &result.outcome {
            TrainingOutcome::Classification { accuracy, auc, roc } => {
                let roc = match roc {
                    Some(curve) => PanelState::Ready(Chart::new(
                        "ROC Curve",
                        "FPR",
                        "TPR",
                        vec![
                            Trace::new("ROC", curve.x.clone(), curve.y.clone(), TraceStyle::Line),
                            diagonal("Chance"),
                        ],
                    )),
                    None => PanelState::not_available("No ROC curve."),
                };
                (
                    vec![badge(label::ACCURACY, accuracy.clone()), badge(label::AUC, auc.clone())],
                    roc,
                )
            }
            TrainingOutcome::Regression { mse, r2 } => (
                vec![badge(label::MSE, mse.clone()), badge(label::R2, r2.clone())],
                PanelState::not_available("No ROC curve (regression task)."),
            ),
        };

        Self {
            status: StatusLine::idle(),
            model_name: result
                .model_name
                .clone()
                .unwrap_or_else(|| requested_model.to_string()),
            task: result.task.clone(),
            metrics,
            roc,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BacktestView {
    pub status: StatusLine,
    pub badges: Vec<MetricBadge>,
    pub pnl: PanelState<TimeChart>,
    pub drawdown: PanelState<TimeChart>,
    pub prediction: PanelState<TimeChart>,
    pub pr: PanelState<CurveChart>,
    pub calibration: PanelState<CurveChart>,
    pub confusion: PanelState<Heatmap>,
    pub histogram: PanelState<CurveChart>,
}

impl BacktestView {
    pub fn from_result(result: &EvaluationResult) -> Self {
        let risk = result.risk.clone().unwrap_or_default();
        let metrics = result.outcome.metrics().cloned().unwrap_or_default();

        let badges = vec![
            badge(label::MAX_DRAWDOWN, risk.max_drawdown),
            badge(label::SHARPE_STEP, risk.sharpe_step),
            badge(label::EXPOSURE, risk.exposure),
            badge(label::TURNOVER, risk.turnover),
            badge(label::PRECISION, metrics.precision.clone()),
            badge(label::RECALL, metrics.recall.clone()),
            badge(label::F1, metrics.f1.clone()),
            badge(label::AP, metrics.average_precision.clone()),
            badge(label::BRIER, metrics.brier.clone()),
            badge(label::THRESHOLD, result.threshold.clone()),
        ];

        let timeline = &result.timeline;
        let (prediction, pr, calibration) = match &result.outcome {
            EvaluationOutcome::ClassificationWithProbabilities {
                probabilities,
                threshold,
                pr,
                calibration,
                ..
            } => {
                let mut traces = vec![Trace::new(
                    "Prob(1)",
                    timeline.ts.clone(),
                    probabilities.clone(),
                    TraceStyle::Line,
                )];
                if let Some((first, last)) = timeline.span() {
                    traces.push(Trace::new(
                        &format!("Threshold={}", to_fixed(*threshold, 3)),
                        vec![first.to_string(), last.to_string()],
                        vec![*threshold, *threshold],
                        TraceStyle::DottedLine,
                    ));
                }
                (
                    PanelState::Ready(prediction_chart(timeline, traces)),
                    pr_panel(pr.as_ref(), &metrics.average_precision),
                    calibration_panel(calibration.as_ref(), &metrics.brier),
                )
            }
            EvaluationOutcome::ClassificationWithSignals { signals, .. } => (
                PanelState::Ready(prediction_chart(
                    timeline,
                    vec![signal_trace(timeline, signals)],
                )),
                PanelState::not_available("No PR curve (no probabilities)."),
                PanelState::not_available("No calibration (no probabilities)."),
            ),
            EvaluationOutcome::Regression { signals } => (
                match signals {
                    Some(signals) => PanelState::Ready(prediction_chart(
                        timeline,
                        vec![signal_trace(timeline, signals)],
                    )),
                    None => PanelState::not_available("No prediction series."),
                },
                PanelState::not_available("No PR curve (no probabilities)."),
                PanelState::not_available("No calibration (no probabilities)."),
            ),
        };

        let confusion = match metrics.confusion {
            Some(m) => PanelState::Ready(Heatmap::from(m)),
            None => PanelState::not_available("No confusion matrix."),
        };

        let histogram = match &result.histogram {
            Some(h) => PanelState::Ready(Chart::new(
                "Future Return Distribution",
                "ret",
                "count",
                vec![Trace::new("ret", h.centers.clone(), h.counts.clone(), TraceStyle::Bar)],
            )),
            None => PanelState::not_available("No return histogram."),
        };

        Self {
            status: StatusLine::idle(),
            badges,
            pnl: time_panel(timeline, timeline.pnl.as_ref(), "Cumulative PnL", "PnL"),
            drawdown: time_panel(timeline, timeline.drawdown.as_ref(), "Drawdown", "Drawdown"),
            prediction,
            pr,
            calibration,
            confusion,
            histogram,
        }
    }

    pub fn badge(&self, label: &str) -> Option<&MetricBadge> {
        self.badges.iter().find(|b| b.label == label)
    }
}

fn signal_trace(timeline: &Timeline, signals: &[f64]) -> Trace<String> {
    Trace::new("Signal (0/1)", timeline.ts.clone(), signals.to_vec(), TraceStyle::Step)
}

/// Appends the ground-truth markers when the payload carries them.
fn prediction_chart(timeline: &Timeline, mut traces: Vec<Trace<String>>) -> TimeChart {
    if let Some(truth) = &timeline.truth {
        traces.push(Trace::new(
            "Truth (0/1)",
            timeline.ts.clone(),
            truth.clone(),
            TraceStyle::Markers,
        ));
    }
    Chart::new("Prediction vs Truth", "Time", "Prob / Class", traces)
}

fn pr_panel(curve: Option<&Curve>, average_precision: &MetricValue) -> PanelState<CurveChart> {
    match curve {
        Some(c) => PanelState::Ready(Chart::new(
            &format!("Precision–Recall (AP={})", title_value(average_precision, 3)),
            "Recall",
            "Precision",
            vec![Trace::new("PR", c.x.clone(), c.y.clone(), TraceStyle::Line)],
        )),
        None => PanelState::not_available("No PR curve."),
    }
}

fn calibration_panel(curve: Option<&Curve>, brier: &MetricValue) -> PanelState<CurveChart> {
    match curve {
        Some(c) => PanelState::Ready(Chart::new(
            &format!("Calibration (Brier={})", title_value(brier, 4)),
            "Mean predicted prob",
            "Empirical fraction of positives",
            vec![
                diagonal("Perfect"),
                Trace::new("Reliability", c.x.clone(), c.y.clone(), TraceStyle::LineMarkers),
            ],
        )),
        None => PanelState::not_available("No calibration curve."),
    }
}

// =============================================================================
// View model
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ViewModel {
    pub catalog: CatalogView,
    pub factor: FactorView,
    pub train: TrainView,
    pub backtest: BacktestView,
}

impl ViewModel {
    pub fn clear_train(&mut self) {
        self.train = TrainView::default();
    }

    pub fn clear_backtest(&mut self) {
        self.backtest = BacktestView::default();
    }
}

// =============================================================================
// Text rendering
// =============================================================================

impl<X> fmt::Display for Chart<X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let traces: Vec<String> = self
            .traces
            .iter()
            .map(|t| format!("{}: {} pts", t.name, t.y.len()))
            .collect();
        write!(f, "{} [{}]", self.title, traces.join(", "))
    }
}

impl fmt::Display for Heatmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}: {} {} | {}: {} {}]",
            self.title,
            self.rows[0],
            self.cells[0][0],
            self.cells[0][1],
            self.rows[1],
            self.cells[1][0],
            self.cells[1][1]
        )
    }
}

impl<T: fmt::Display> fmt::Display for PanelState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PanelState::Empty => f.write_str("-"),
            PanelState::NotAvailable(reason) => write!(f, "n/a ({})", reason),
            PanelState::Ready(content) => write!(f, "{}", content),
        }
    }
}

fn write_badges(f: &mut fmt::Formatter<'_>, badges: &[MetricBadge]) -> fmt::Result {
    for b in badges {
        writeln!(f, "  {:<14} {:>12}  [{}]", b.label, b.display_text, b.severity.as_str())?;
    }
    Ok(())
}

impl fmt::Display for ViewModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.catalog.factors.is_empty() || !self.catalog.status.is_idle() {
            writeln!(f, "[catalog] {}", self.catalog.status.text)?;
            for (category, factors) in &self.catalog.factors.categories {
                let names: Vec<&str> = factors.keys().map(String::as_str).collect();
                writeln!(f, "  {}: {}", category, names.join(", "))?;
            }
            for model in &self.catalog.models {
                writeln!(f, "  model {}", model.caption())?;
            }
        }
        if let Some(name) = &self.factor.name {
            writeln!(f, "[factor] {} {}", name, self.factor.status.text)?;
            if !self.factor.meta.desc.is_empty() {
                writeln!(f, "  {}", self.factor.meta.desc)?;
            }
            writeln!(f, "  series: {}", self.factor.series)?;
        }
        if !self.train.status.is_idle() || self.train.model_name != PLACEHOLDER {
            writeln!(f, "[train] {}", self.train.status.text)?;
            writeln!(f, "  model: {}  task: {}", self.train.model_name, self.train.task)?;
            write_badges(f, &self.train.metrics)?;
            writeln!(f, "  roc: {}", self.train.roc)?;
        }
        let bt = &self.backtest;
        if !bt.status.is_idle() || !bt.badges.is_empty() {
            writeln!(f, "[backtest] {}", bt.status.text)?;
            write_badges(f, &bt.badges)?;
            writeln!(f, "  pnl: {}", bt.pnl)?;
            writeln!(f, "  drawdown: {}", bt.drawdown)?;
            writeln!(f, "  prediction: {}", bt.prediction)?;
            writeln!(f, "  pr: {}", bt.pr)?;
            writeln!(f, "  calibration: {}", bt.calibration)?;
            writeln!(f, "  confusion: {}", bt.confusion)?;
            writeln!(f, "  histogram: {}", bt.histogram)?;
        }
        Ok(())
    }
}
