//! Response interpretation.
//!
//! `wire` mirrors what the service sends, with every field optional. The
//! interpreters decide the shape once: a backtest becomes one of
//! [`EvaluationOutcome`]'s variants and a training run one of
//! [`TrainingOutcome`]'s, so downstream code matches exhaustively instead of
//! probing for fields.

pub mod catalog;
pub mod evaluation;
pub mod wire;

pub use catalog::{
    interpret_catalog, interpret_factor_series, interpret_models, FactorCatalog, FactorMeta,
    FactorSeries, ModelOption,
};
pub use evaluation::{
    bin_centers, interpret_backtest, interpret_training, ClassificationMetrics, ConfusionMatrix,
    Curve, EvaluationOutcome, EvaluationResult, ReturnHistogram, RiskMetrics, Timeline,
    TrainingOutcome, TrainingResult, PREDICTED_CLASS_LABELS, TRUE_CLASS_LABELS,
};
