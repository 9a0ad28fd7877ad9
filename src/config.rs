use std::time::Duration;

use serde::Serialize;

use crate::request::{BacktestInputs, TrainInputs};

/// Session defaults read from the environment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    pub base_url: String,
    pub model: String,
    pub horizon: u32,
    pub eps: f64,
    pub drop_equal: bool,
    pub scale: bool,
    /// Unset means calls wait as long as the service takes.
    pub timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            model: "logit".to_string(),
            horizon: 5,
            eps: 0.0,
            drop_equal: false,
            scale: true,
            timeout_secs: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
}

impl Config {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            base_url: std::env::var("WORKBENCH_BASE_URL").unwrap_or(d.base_url),
            model: std::env::var("WORKBENCH_MODEL").unwrap_or(d.model),
            horizon: env_parse("WORKBENCH_HORIZON").unwrap_or(d.horizon),
            eps: env_parse("WORKBENCH_EPS").unwrap_or(d.eps),
            drop_equal: env_flag("WORKBENCH_DROP_EQUAL").unwrap_or(d.drop_equal),
            scale: env_flag("WORKBENCH_SCALE").unwrap_or(d.scale),
            timeout_secs: env_parse("WORKBENCH_TIMEOUT_SECS"),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn train_inputs(&self) -> TrainInputs {
        TrainInputs {
            model: self.model.clone(),
            horizon: self.horizon,
            eps: self.eps,
            drop_equal: self.drop_equal,
            scale: self.scale,
        }
    }

    pub fn backtest_inputs(&self) -> BacktestInputs {
        BacktestInputs {
            model: self.model.clone(),
            horizon: self.horizon,
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = Config::default();
        assert_eq!(c.base_url, "http://127.0.0.1:8000");
        assert_eq!(c.timeout(), None);
        let t = c.train_inputs();
        assert_eq!(t.model, "logit");
        assert_eq!(t.horizon, 5);
        assert!(t.scale);
        assert!(!t.drop_equal);
        assert_eq!(c.backtest_inputs().horizon, 5);
    }

    #[test]
    fn test_with_model_carries_into_inputs() {
        let c = Config::default().with_model("xgb");
        assert_eq!(c.train_inputs().model, "xgb");
        assert_eq!(c.backtest_inputs().model, "xgb");
    }

    #[test]
    fn test_timeout_conversion() {
        let c = Config {
            timeout_secs: Some(30),
            ..Config::default()
        };
        assert_eq!(c.timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_env_parse_trims_and_rejects_garbage() {
        std::env::set_var("FACTORBENCH_TEST_HORIZON", " 12 ");
        std::env::set_var("FACTORBENCH_TEST_EPS", "tiny");
        assert_eq!(env_parse::<u32>("FACTORBENCH_TEST_HORIZON"), Some(12));
        assert_eq!(env_parse::<f64>("FACTORBENCH_TEST_EPS"), None);
        assert_eq!(env_parse::<u64>("FACTORBENCH_TEST_UNSET"), None);
    }
}
