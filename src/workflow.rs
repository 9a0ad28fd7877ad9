//! Train and backtest as suspend/resume stages.
//!
//! Each action runs `begin_*` (validate, invalidate, clear, go busy), awaits
//! the service, then `finish_*` (interpret, update selection and view). The
//! session lock is only held inside a stage, never across the outbound call,
//! so a backtest begun while a train is in flight sees the invalidated
//! selection and both may resolve in either order. Status lines are
//! last-write-wins; nothing is cancelled.
//!
//! Phases cycle `Idle -> Busy -> {Success, Failed} -> Idle`. A resolved phase
//! is shown until the next invocation of that action settles it back to
//! `Idle` and starts it again.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::Value;

use crate::config::Config;
use crate::error::{WorkbenchError, WorkbenchResult};
use crate::logging::{log, log_failure, log_transition, obj, v_num, v_str, Domain, Level};
use crate::request::{
    build_backtest, build_train, BacktestInputs, RequestKind, RequestSpec, TrainInputs,
};
use crate::response::{
    interpret_backtest, interpret_catalog, interpret_factor_series, interpret_models,
    interpret_training, EvaluationResult, FactorSeries, TrainingResult,
};
use crate::selection::SelectionState;
use crate::service::ComputeService;
use crate::view::{BacktestView, FactorView, PanelState, StatusLine, TrainView, ViewModel};

// =============================================================================
// Phase state machine
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Busy,
    Success,
    Failed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Busy => "busy",
            Phase::Success => "success",
            Phase::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    /// Request built, call about to go out.
    Start,
    /// Request could not be built; nothing was sent.
    Reject,
    Succeed,
    Fail,
    /// A resolved phase is left behind.
    Settle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransitionError {
    pub msg: String,
}

pub fn apply_event(phase: Phase, event: PhaseEvent) -> Result<Phase, TransitionError> {
    match (phase, event) {
        // Overlapping invocations of one action share the Busy phase.
        (Phase::Idle | Phase::Busy, PhaseEvent::Start) => Ok(Phase::Busy),
        (Phase::Success | Phase::Failed, PhaseEvent::Start) => Err(TransitionError {
            msg: "resolved phase must settle before starting".to_string(),
        }),
        (Phase::Idle | Phase::Success | Phase::Failed, PhaseEvent::Settle) => Ok(Phase::Idle),
        (Phase::Busy, PhaseEvent::Settle) => Err(TransitionError {
            msg: "cannot settle while a call is in flight".to_string(),
        }),
        (Phase::Busy, PhaseEvent::Reject) => Ok(Phase::Busy),
        (_, PhaseEvent::Reject) => Ok(Phase::Failed),
        // An overlapping invocation resolving late still overwrites.
        (Phase::Busy | Phase::Success | Phase::Failed, PhaseEvent::Succeed) => Ok(Phase::Success),
        (Phase::Busy | Phase::Success | Phase::Failed, PhaseEvent::Fail) => Ok(Phase::Failed),
        (Phase::Idle, PhaseEvent::Succeed | PhaseEvent::Fail) => Err(TransitionError {
            msg: "resolution without an invocation in flight".to_string(),
        }),
    }
}

// =============================================================================
// Session
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub selection: SelectionState,
    pub view: ViewModel,
    pub train_phase: Phase,
    pub backtest_phase: Phase,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            selection: SelectionState::new(),
            view: ViewModel::default(),
            train_phase: Phase::Idle,
            backtest_phase: Phase::Idle,
        }
    }
}

impl Session {
    fn phase_mut(&mut self, kind: RequestKind) -> &mut Phase {
        match kind {
            RequestKind::Train => &mut self.train_phase,
            RequestKind::Backtest => &mut self.backtest_phase,
        }
    }

    fn status_mut(&mut self, kind: RequestKind) -> &mut StatusLine {
        match kind {
            RequestKind::Train => &mut self.view.train.status,
            RequestKind::Backtest => &mut self.view.backtest.status,
        }
    }

    fn transition(&mut self, kind: RequestKind, event: PhaseEvent) {
        let phase = self.phase_mut(kind);
        let from = *phase;
        match apply_event(from, event) {
            Ok(to) => {
                *phase = to;
                log_transition(kind.as_str(), from.as_str(), to.as_str());
            }
            Err(e) => log(
                Level::Warn,
                Domain::Workflow,
                "phase_rejected",
                obj(&[
                    ("action", v_str(kind.as_str())),
                    ("from", v_str(from.as_str())),
                    ("msg", v_str(&e.msg)),
                ]),
            ),
        }
    }

    fn start(&mut self, kind: RequestKind) {
        if matches!(*self.phase_mut(kind), Phase::Success | Phase::Failed) {
            self.transition(kind, PhaseEvent::Settle);
        }
        self.transition(kind, PhaseEvent::Start);
    }

    fn fail(&mut self, kind: RequestKind, event: PhaseEvent, err: &WorkbenchError) {
        log_failure(kind.as_str(), err.kind(), &err.to_string());
        *self.status_mut(kind) = StatusLine::error(err);
        self.transition(kind, event);
    }
}

// =============================================================================
// Workbench
// =============================================================================

/// One user session against a compute service.
pub struct Workbench<S> {
    service: S,
    config: Config,
    session: Mutex<Session>,
}

impl<S: ComputeService> Workbench<S> {
    pub fn new(service: S, config: Config) -> Self {
        Self {
            service,
            config,
            session: Mutex::new(Session::default()),
        }
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn snapshot(&self) -> ViewModel {
        self.session().view.clone()
    }

    pub fn session_snapshot(&self) -> Session {
        self.session().clone()
    }

    pub fn selection(&self) -> SelectionState {
        self.session().selection.clone()
    }

    pub fn phase(&self, kind: RequestKind) -> Phase {
        match kind {
            RequestKind::Train => self.session().train_phase,
            RequestKind::Backtest => self.session().backtest_phase,
        }
    }

    // -------------------------------------------------------------------------
    // Training
    // -------------------------------------------------------------------------

    /// Build the request, then invalidate the artifact and clear both result
    /// sections before going busy. A rejected request leaves the view as is.
    pub fn begin_train(&self, inputs: &TrainInputs) -> WorkbenchResult<RequestSpec> {
        let mut s = self.session();
        let spec = match build_train(&s.selection, inputs) {
            Ok(spec) => spec,
            Err(e) => {
                s.fail(RequestKind::Train, PhaseEvent::Reject, &e);
                return Err(e);
            }
        };
        s.selection.invalidate_artifact();
        s.view.clear_train();
        s.view.clear_backtest();
        s.view.train.status = StatusLine::loading("Training…");
        s.start(RequestKind::Train);
        Ok(spec)
    }

    pub fn finish_train(
        &self,
        spec: &RequestSpec,
        response: WorkbenchResult<Value>,
    ) -> WorkbenchResult<TrainingResult> {
        let outcome = response.and_then(interpret_training);
        let mut s = self.session();
        match outcome {
            Ok(result) => {
                if let Some(dir) = &result.artifacts_dir {
                    s.selection.record_artifact(dir.clone());
                }
                s.view.train = TrainView::from_result(&result, spec.model().unwrap_or_default());
                s.view.train.status = StatusLine::done();
                s.transition(RequestKind::Train, PhaseEvent::Succeed);
                Ok(result)
            }
            Err(e) => {
                s.fail(RequestKind::Train, PhaseEvent::Fail, &e);
                Err(e)
            }
        }
    }

    pub async fn train(&self, inputs: &TrainInputs) -> WorkbenchResult<TrainingResult> {
        let spec = self.begin_train(inputs)?;
        let response = self.service.train(&spec).await;
        self.finish_train(&spec, response)
    }

    // -------------------------------------------------------------------------
    // Backtesting
    // -------------------------------------------------------------------------

    pub fn begin_backtest(&self, inputs: &BacktestInputs) -> WorkbenchResult<RequestSpec> {
        let mut s = self.session();
        let spec = match build_backtest(&s.selection, inputs) {
            Ok(spec) => spec,
            Err(e) => {
                s.fail(RequestKind::Backtest, PhaseEvent::Reject, &e);
                return Err(e);
            }
        };
        s.view.clear_backtest();
        s.view.backtest.status = StatusLine::loading("Backtesting…");
        s.start(RequestKind::Backtest);
        Ok(spec)
    }

    pub fn finish_backtest(
        &self,
        _spec: &RequestSpec,
        response: WorkbenchResult<Value>,
    ) -> WorkbenchResult<EvaluationResult> {
        let outcome = response.and_then(interpret_backtest);
        let mut s = self.session();
        match outcome {
            Ok(result) => {
                s.view.backtest = BacktestView::from_result(&result);
                s.view.backtest.status = StatusLine::done();
                s.transition(RequestKind::Backtest, PhaseEvent::Succeed);
                Ok(result)
            }
            Err(e) => {
                s.fail(RequestKind::Backtest, PhaseEvent::Fail, &e);
                Err(e)
            }
        }
    }

    pub async fn backtest(&self, inputs: &BacktestInputs) -> WorkbenchResult<EvaluationResult> {
        let spec = self.begin_backtest(inputs)?;
        let response = self.service.backtest(&spec).await;
        self.finish_backtest(&spec, response)
    }

    // -------------------------------------------------------------------------
    // Catalog and factor detail
    // -------------------------------------------------------------------------

    pub async fn load_catalog(&self) -> WorkbenchResult<()> {
        self.session().view.catalog.status = StatusLine::loading("Loading…");

        let (factors, models) =
            tokio::join!(self.service.list_factors(), self.service.list_models());
        let parsed = factors
            .and_then(interpret_catalog)
            .and_then(|catalog| Ok((catalog, models.and_then(interpret_models)?)));

        let mut s = self.session();
        match parsed {
            Ok((catalog, models)) => {
                log(
                    Level::Info,
                    Domain::Interpret,
                    "catalog_loaded",
                    obj(&[
                        ("factors", v_num(catalog.len() as f64)),
                        ("models", v_num(models.len() as f64)),
                    ]),
                );
                s.view.catalog.factors = catalog;
                s.view.catalog.models = models;
                s.view.catalog.status = StatusLine::done();
                Ok(())
            }
            Err(e) => {
                log_failure("catalog", e.kind(), &e.to_string());
                s.view.catalog.status = StatusLine::error(&e);
                Err(e)
            }
        }
    }

    /// Selection is updated before the series call, so it sticks even if the
    /// call fails. A response for a factor no longer shown is dropped.
    pub async fn select_factor(&self, name: &str) -> WorkbenchResult<FactorSeries> {
        {
            let mut s = self.session();
            s.selection.select_factor(name);
            let meta = s.view.catalog.factors.find(name).cloned().unwrap_or_default();
            s.view.factor = FactorView::opened(name, meta);
        }

        let outcome = self
            .service
            .compute_factor_series(name)
            .await
            .and_then(interpret_factor_series);

        let mut s = self.session();
        let current = s.view.factor.name.as_deref() == Some(name);
        match &outcome {
            Ok(series) if current => {
                s.view.factor.series = PanelState::Ready(FactorView::series_chart(name, series));
                s.view.factor.status = StatusLine::done();
            }
            Err(e) => {
                log_failure("factor_series", e.kind(), &e.to_string());
                if current {
                    s.view.factor.status = StatusLine::error(e);
                }
            }
            Ok(_) => {}
        }
        outcome
    }
}
