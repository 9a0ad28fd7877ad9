//! The remote compute service boundary.
//!
//! Every call returns the raw JSON payload; shape decisions belong to
//! [`crate::response`]. No call is retried.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use url::Url;

use crate::config::Config;
use crate::error::{WorkbenchError, WorkbenchResult};
use crate::logging::{log, obj, v_num, v_str, Domain, Level, ProfileScope};
use crate::request::{param, RequestSpec};

#[async_trait]
pub trait ComputeService: Send + Sync {
    async fn list_factors(&self) -> WorkbenchResult<Value>;
    async fn compute_factor_series(&self, factor: &str) -> WorkbenchResult<Value>;
    async fn list_models(&self) -> WorkbenchResult<Value>;
    async fn train(&self, spec: &RequestSpec) -> WorkbenchResult<Value>;
    async fn backtest(&self, spec: &RequestSpec) -> WorkbenchResult<Value>;
}

/// Query pairs for a request. `drop_equal` is only sent when set.
pub fn query_for(spec: &RequestSpec) -> Vec<(String, String)> {
    spec.params()
        .iter()
        .filter(|(k, v)| !(k.as_str() == param::DROP_EQUAL && v.as_bool() == Some(false)))
        .map(|(k, v)| (k.clone(), v.to_string()))
        .collect()
}

pub struct HttpComputeService {
    client: Client,
    base: Url,
}

impl HttpComputeService {
    pub fn new(cfg: &Config) -> WorkbenchResult<Self> {
        let base = Url::parse(&cfg.base_url).map_err(|e| WorkbenchError::InvalidInput {
            field: "base_url",
            reason: e.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(WorkbenchError::InvalidInput {
                field: "base_url",
                reason: format!("{} cannot carry a path", base),
            });
        }

        let mut builder = Client::builder();
        if let Some(timeout) = cfg.timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| WorkbenchError::transport(None, e.to_string()))?;

        log(
            Level::Info,
            Domain::System,
            "service_configured",
            obj(&[
                ("base_url", v_str(base.as_str())),
                ("timeout_secs", cfg.timeout_secs.map(|s| v_num(s as f64)).unwrap_or(Value::Null)),
            ]),
        );
        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, name: &str, query: &[(String, String)]) -> WorkbenchResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| {
                WorkbenchError::transport(None, format!("{} cannot carry a path", self.base))
            })?
            .pop_if_empty()
            .extend(&["api", name]);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    async fn get_json(
        &self,
        name: &'static str,
        query: Vec<(String, String)>,
    ) -> WorkbenchResult<Value> {
        let url = self.endpoint(name, &query)?;
        let _scope = ProfileScope::with_context("compute_call", &[("endpoint", v_str(name))]);
        log(
            Level::Debug,
            Domain::Transport,
            "call",
            obj(&[("endpoint", v_str(name)), ("url", v_str(url.as_str()))]),
        );

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| WorkbenchError::transport(None, e.to_string()))?;
        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| WorkbenchError::transport(Some(status.as_u16()), e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_slice::<Value>(&body)
                .ok()
                .and_then(|v| v.get("detail").map(detail_text))
                .unwrap_or_else(|| status.canonical_reason().unwrap_or_default().to_string());
            log(
                Level::Warn,
                Domain::Transport,
                "call_failed",
                obj(&[
                    ("endpoint", v_str(name)),
                    ("status", v_num(f64::from(status.as_u16()))),
                    ("msg", v_str(&message)),
                ]),
            );
            return Err(WorkbenchError::transport(Some(status.as_u16()), message));
        }

        serde_json::from_slice(&body)
            .map_err(|e| WorkbenchError::malformed(format!("{} body is not JSON: {}", name, e)))
    }
}

fn detail_text(detail: &Value) -> String {
    match detail {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl ComputeService for HttpComputeService {
    async fn list_factors(&self) -> WorkbenchResult<Value> {
        self.get_json("factors", Vec::new()).await
    }

    async fn compute_factor_series(&self, factor: &str) -> WorkbenchResult<Value> {
        self.get_json("compute", vec![(param::FACTOR.to_string(), factor.to_string())])
            .await
    }

    async fn list_models(&self) -> WorkbenchResult<Value> {
        self.get_json("models", Vec::new()).await
    }

    async fn train(&self, spec: &RequestSpec) -> WorkbenchResult<Value> {
        self.get_json("train", query_for(spec)).await
    }

    async fn backtest(&self, spec: &RequestSpec) -> WorkbenchResult<Value> {
        self.get_json("backtest", query_for(spec)).await
    }
}
