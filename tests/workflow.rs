use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Notify;

use factorbench::config::Config;
use factorbench::request::{BacktestMode, RequestKind, RequestSpec};
use factorbench::service::ComputeService;
use factorbench::view::{PanelState, StatusKind};
use factorbench::workflow::Phase;
use factorbench::{Workbench, WorkbenchError, WorkbenchResult};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Factors,
    Series(String),
    Models,
    Train(RequestSpec),
    Backtest(RequestSpec),
}

type Script = Mutex<VecDeque<WorkbenchResult<Value>>>;

/// In-memory service replaying queued responses and recording every call.
#[derive(Default)]
struct ScriptedService {
    calls: Mutex<Vec<Call>>,
    factors: Script,
    series: Script,
    models: Script,
    train: Script,
    backtest: Script,
    gate_next_train: AtomicBool,
    train_started: Notify,
    train_release: Notify,
}

impl ScriptedService {
    fn push(script: &Script, response: WorkbenchResult<Value>) {
        script.lock().unwrap().push_back(response);
    }

    fn next(script: &Script) -> WorkbenchResult<Value> {
        script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(WorkbenchError::transport(None, "no scripted response")))
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn last_backtest(&self) -> RequestSpec {
        self.calls()
            .into_iter()
            .rev()
            .find_map(|c| match c {
                Call::Backtest(spec) => Some(spec),
                _ => None,
            })
            .expect("no backtest call recorded")
    }
}

#[async_trait]
impl ComputeService for ScriptedService {
    async fn list_factors(&self) -> WorkbenchResult<Value> {
        self.record(Call::Factors);
        Self::next(&self.factors)
    }

    async fn compute_factor_series(&self, factor: &str) -> WorkbenchResult<Value> {
        self.record(Call::Series(factor.to_string()));
        Self::next(&self.series)
    }

    async fn list_models(&self) -> WorkbenchResult<Value> {
        self.record(Call::Models);
        Self::next(&self.models)
    }

    async fn train(&self, spec: &RequestSpec) -> WorkbenchResult<Value> {
        self.record(Call::Train(spec.clone()));
        if self.gate_next_train.swap(false, Ordering::SeqCst) {
            self.train_started.notify_one();
            self.train_release.notified().await;
        }
        Self::next(&self.train)
    }

    async fn backtest(&self, spec: &RequestSpec) -> WorkbenchResult<Value> {
        self.record(Call::Backtest(spec.clone()));
        Self::next(&self.backtest)
    }
}

fn train_payload(dir: &str) -> Value {
    json!({
        "model_name": "logit",
        "task": "classification",
        "metrics": {"accuracy": 0.61, "auc": 0.66},
        "roc": {"fpr": [0.0, 0.4, 1.0], "tpr": [0.0, 0.7, 1.0]},
        "artifacts_dir": dir
    })
}

fn backtest_payload() -> Value {
    json!({
        "threshold": 0.42,
        "series": {
            "ts": ["100", "200", "300"],
            "pnl": [0.0, 0.01, 0.015],
            "drawdown": [0.0, 0.0, -0.002],
            "y_test": [0, 1, 0],
            "y_prob": [0.1, 0.7, 0.55]
        },
        "risk": {"max_drawdown": -0.002, "sharpe_step": 1.2, "exposure": 0.66, "turnover": 1.0},
        "classification": {
            "tp": 37, "fp": 5, "tn": 50, "fn": 8,
            "precision_at_threshold": 0.88, "recall_at_threshold": 0.82,
            "f1_at_threshold": 0.85, "average_precision": 0.75, "brier": 0.12
        },
        "curves": {
            "pr": {"precision": [0.5, 1.0], "recall": [1.0, 0.5]},
            "calibration": {"mean_pred": [0.2, 0.6], "frac_pos": [0.1, 0.5]}
        },
        "ret_hist": {"edges": [-0.02, 0.0, 0.02], "counts": [4, 6]}
    })
}

fn bench() -> Workbench<ScriptedService> {
    Workbench::new(ScriptedService::default(), Config::default())
}

async fn selected_bench() -> Workbench<ScriptedService> {
    let wb = bench();
    ScriptedService::push(&wb.service().series, Ok(json!({"x": ["1", "2"], "y": [0.1, 0.2]})));
    wb.select_factor("momentum_5").await.unwrap();
    wb
}

#[tokio::test]
async fn train_without_selection_issues_no_request() {
    let wb = bench();
    let err = wb.train(&wb.config().train_inputs()).await.unwrap_err();

    assert_eq!(
        err,
        WorkbenchError::MissingSelection {
            action: RequestKind::Train
        }
    );
    assert!(wb.service().calls().is_empty());
    assert_eq!(wb.phase(RequestKind::Train), Phase::Failed);
    assert_eq!(wb.snapshot().train.status.kind, StatusKind::Error);
}

#[tokio::test]
async fn backtest_without_selection_or_artifact_issues_no_request() {
    let wb = bench();
    let err = wb.backtest(&wb.config().backtest_inputs()).await.unwrap_err();

    assert_eq!(
        err,
        WorkbenchError::MissingSelection {
            action: RequestKind::Backtest
        }
    );
    assert!(wb.service().calls().is_empty());
}

#[tokio::test]
async fn successful_train_enables_reuse_backtest() {
    let wb = selected_bench().await;
    let svc = wb.service();
    ScriptedService::push(&svc.train, Ok(train_payload("artifacts/run1")));
    ScriptedService::push(&svc.backtest, Ok(backtest_payload()));

    wb.train(&wb.config().train_inputs()).await.unwrap();
    assert_eq!(wb.selection().artifacts_dir(), Some("artifacts/run1"));

    wb.backtest(&wb.config().backtest_inputs()).await.unwrap();
    let spec = svc.last_backtest();
    assert_eq!(spec.backtest_mode(), Some(BacktestMode::Reuse));
    assert_eq!(spec.artifacts_dir(), Some("artifacts/run1"));
    assert_eq!(spec.factor(), None);

    let view = wb.snapshot();
    assert_eq!(view.train.model_name, "logit");
    assert_eq!(view.train.status.text, "Done.");
    assert_eq!(view.backtest.status.text, "Done.");
    assert_eq!(wb.phase(RequestKind::Backtest), Phase::Success);
}

#[tokio::test]
async fn backtest_begun_during_train_sees_invalidated_artifact() {
    let wb = selected_bench().await;
    let svc = wb.service();
    ScriptedService::push(&svc.train, Ok(train_payload("artifacts/old")));
    wb.train(&wb.config().train_inputs()).await.unwrap();

    ScriptedService::push(&svc.train, Ok(train_payload("artifacts/new")));
    ScriptedService::push(&svc.backtest, Ok(backtest_payload()));
    svc.gate_next_train.store(true, Ordering::SeqCst);

    let train_inputs = wb.config().train_inputs();
    let train = wb.train(&train_inputs);
    let backtest = async {
        svc.train_started.notified().await;
        let result = wb.backtest(&wb.config().backtest_inputs()).await;
        svc.train_release.notify_one();
        result
    };
    let (trained, tested) = tokio::join!(train, backtest);
    trained.unwrap();
    tested.unwrap();

    let spec = svc.last_backtest();
    assert_eq!(spec.backtest_mode(), Some(BacktestMode::Fresh));
    assert_eq!(spec.factor(), Some("momentum_5"));
    assert_eq!(spec.model(), Some("logit"));
    assert_eq!(wb.selection().artifacts_dir(), Some("artifacts/new"));
}

#[tokio::test]
async fn stage_functions_expose_in_flight_ordering() {
    let wb = selected_bench().await;
    let cfg = wb.config().clone();
    wb.finish_train(
        &wb.begin_train(&cfg.train_inputs()).unwrap(),
        Ok(train_payload("artifacts/old")),
    )
    .unwrap();

    let train_spec = wb.begin_train(&cfg.train_inputs()).unwrap();
    assert_eq!(wb.selection().artifacts_dir(), None);
    assert_eq!(wb.phase(RequestKind::Train), Phase::Busy);

    let bt_spec = wb.begin_backtest(&cfg.backtest_inputs()).unwrap();
    assert_eq!(bt_spec.backtest_mode(), Some(BacktestMode::Fresh));

    // The backtest resolves first, the slower train afterwards.
    wb.finish_backtest(&bt_spec, Ok(backtest_payload())).unwrap();
    wb.finish_train(&train_spec, Ok(train_payload("artifacts/new"))).unwrap();

    assert_eq!(wb.selection().artifacts_dir(), Some("artifacts/new"));
    assert!(wb.snapshot().backtest.confusion.ready().is_some());
}

#[tokio::test]
async fn starting_train_clears_both_result_sections() {
    let wb = selected_bench().await;
    let cfg = wb.config().clone();
    ScriptedService::push(&wb.service().train, Ok(train_payload("artifacts/run1")));
    ScriptedService::push(&wb.service().backtest, Ok(backtest_payload()));
    wb.train(&cfg.train_inputs()).await.unwrap();
    wb.backtest(&cfg.backtest_inputs()).await.unwrap();
    assert_eq!(wb.snapshot().backtest.badges.len(), 10);

    wb.begin_train(&cfg.train_inputs()).unwrap();
    let view = wb.snapshot();
    assert!(view.backtest.badges.is_empty());
    assert!(view.backtest.pnl.is_empty());
    assert!(view.backtest.status.is_idle());
    assert_eq!(view.train.model_name, "-");
    assert!(view.train.roc.is_empty());
    assert_eq!(view.train.status.text, "Training…");
    assert_eq!(view.train.status.kind, StatusKind::Loading);
}

#[tokio::test]
async fn failed_train_leaves_panels_cleared_and_selection_intact() {
    let wb = selected_bench().await;
    let cfg = wb.config().clone();
    ScriptedService::push(
        &wb.service().train,
        Err(WorkbenchError::transport(Some(500), "boom")),
    );

    let err = wb.train(&cfg.train_inputs()).await.unwrap_err();
    assert!(err.is_transport());

    let view = wb.snapshot();
    assert_eq!(view.train.status.text, "Error: HTTP 500: boom");
    assert_eq!(view.train.status.kind, StatusKind::Error);
    assert!(view.train.metrics.is_empty());
    assert!(view.train.roc.is_empty());
    assert_eq!(wb.selection().selected_factor(), Some("momentum_5"));
    assert_eq!(wb.phase(RequestKind::Train), Phase::Failed);

    // The next action proceeds normally.
    ScriptedService::push(&wb.service().train, Ok(train_payload("artifacts/run2")));
    wb.train(&cfg.train_inputs()).await.unwrap();
    assert_eq!(wb.snapshot().train.status.text, "Done.");
    assert_eq!(wb.phase(RequestKind::Train), Phase::Success);
}

#[tokio::test]
async fn malformed_backtest_surfaces_error_without_panels() {
    let wb = selected_bench().await;
    let mut payload = backtest_payload();
    payload["ret_hist"]["counts"] = json!([1, 2, 3]);
    ScriptedService::push(&wb.service().backtest, Ok(payload));

    let err = wb.backtest(&wb.config().backtest_inputs()).await.unwrap_err();
    assert!(err.is_malformed());

    let view = wb.snapshot();
    assert_eq!(view.backtest.status.kind, StatusKind::Error);
    assert!(view.backtest.status.text.starts_with("Error: malformed response"));
    assert!(view.backtest.badges.is_empty());
    assert!(view.backtest.histogram.is_empty());
}

#[tokio::test]
async fn backtest_view_carries_confusion_and_histogram() {
    let wb = selected_bench().await;
    ScriptedService::push(&wb.service().backtest, Ok(backtest_payload()));
    wb.backtest(&wb.config().backtest_inputs()).await.unwrap();

    let view = wb.snapshot().backtest;
    assert_eq!(view.confusion.ready().unwrap().cells, [[50, 5], [8, 37]]);
    let hist = view.histogram.ready().unwrap();
    assert_eq!(hist.traces[0].y, vec![4.0, 6.0]);
    assert_eq!(hist.traces[0].x.len(), 2);
    assert_eq!(view.pr.ready().unwrap().title, "Precision–Recall (AP=0.750)");
    assert_eq!(view.calibration.ready().unwrap().title, "Calibration (Brier=0.1200)");
    assert!(view.prediction.ready().unwrap().trace("Threshold=0.420").is_some());
}

#[tokio::test]
async fn failed_series_keeps_selection() {
    let wb = bench();
    ScriptedService::push(
        &wb.service().series,
        Err(WorkbenchError::transport(Some(404), "unknown factor")),
    );
    let err = wb.select_factor("nope").await.unwrap_err();
    assert!(err.is_transport());

    assert_eq!(wb.selection().selected_factor(), Some("nope"));
    let view = wb.snapshot();
    assert_eq!(view.factor.name.as_deref(), Some("nope"));
    assert_eq!(view.factor.status.text, "Error: HTTP 404: unknown factor");
    assert_eq!(view.factor.series, PanelState::Empty);
}

#[tokio::test]
async fn catalog_fills_view_and_feeds_factor_detail() {
    let wb = bench();
    let svc = wb.service();
    ScriptedService::push(
        &svc.factors,
        Ok(json!({"Price": {"momentum_5": {"desc": "5-tick momentum", "formula": "p/p5-1"}}})),
    );
    ScriptedService::push(&svc.models, Ok(json!({"logit": {"desc": "Logistic regression"}})));
    ScriptedService::push(&svc.series, Ok(json!({"x": ["1", "2"], "y": [0.1, null]})));

    wb.load_catalog().await.unwrap();
    wb.select_factor("momentum_5").await.unwrap();

    let view = wb.snapshot();
    assert_eq!(view.catalog.factors.len(), 1);
    assert_eq!(view.catalog.models[0].caption(), "logit - Logistic regression");
    assert_eq!(view.factor.meta.formula, "p/p5-1");
    assert_eq!(view.factor.meta.category, "Price");
    assert_eq!(view.factor.series.ready().unwrap().traces[0].y.len(), 2);
    assert_eq!(
        svc.calls(),
        vec![Call::Factors, Call::Models, Call::Series("momentum_5".to_string())]
    );
}
