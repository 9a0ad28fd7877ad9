use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use super::wire::{axis_label, decode, FactorMetaPayload, FactorSeriesPayload, ModelMetaPayload};
use crate::error::{WorkbenchError, WorkbenchResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FactorMeta {
    pub category: String,
    pub desc: String,
    pub formula: String,
    pub explanation: String,
}

/// Factors grouped by category, both levels in name order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FactorCatalog {
    pub categories: BTreeMap<String, BTreeMap<String, FactorMeta>>,
}

impl FactorCatalog {
    pub fn find(&self, factor: &str) -> Option<&FactorMeta> {
        self.categories.values().find_map(|factors| factors.get(factor))
    }

    pub fn len(&self) -> usize {
        self.categories.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelOption {
    pub id: String,
    pub desc: String,
    pub task: String,
}

impl ModelOption {
    pub fn caption(&self) -> String {
        format!("{} - {}", self.id, self.desc)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FactorSeries {
    pub x: Vec<String>,
    /// Gaps arrive as null and are kept as NaN.
    pub y: Vec<f64>,
}

pub fn interpret_catalog(value: Value) -> WorkbenchResult<FactorCatalog> {
    let raw: BTreeMap<String, BTreeMap<String, FactorMetaPayload>> = decode("factors", value)?;
    let categories = raw
        .into_iter()
        .map(|(category, factors)| {
            let factors = factors
                .into_iter()
                .map(|(name, meta)| {
                    let meta = FactorMeta {
                        category: meta.category.unwrap_or_else(|| category.clone()),
                        desc: meta.desc.unwrap_or_default(),
                        formula: meta.formula.unwrap_or_default(),
                        explanation: meta.explanation.unwrap_or_default(),
                    };
                    (name, meta)
                })
                .collect();
            (category, factors)
        })
        .collect();
    Ok(FactorCatalog { categories })
}

pub fn interpret_models(value: Value) -> WorkbenchResult<Vec<ModelOption>> {
    let raw: BTreeMap<String, ModelMetaPayload> = decode("models", value)?;
    Ok(raw
        .into_iter()
        .map(|(id, meta)| ModelOption {
            id,
            desc: meta.desc.unwrap_or_default(),
            task: meta.task.unwrap_or_else(|| "classification".to_string()),
        })
        .collect())
}

pub fn interpret_factor_series(value: Value) -> WorkbenchResult<FactorSeries> {
    let raw: FactorSeriesPayload = decode("factor series", value)?;
    if raw.x.len() != raw.y.len() {
        return Err(WorkbenchError::malformed(format!(
            "factor series has {} x values for {} y values",
            raw.x.len(),
            raw.y.len()
        )));
    }
    Ok(FactorSeries {
        x: raw.x.iter().map(axis_label).collect(),
        y: raw.y.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_catalog_grouping() {
        let catalog = interpret_catalog(json!({
            "Price": {
                "momentum_5": {"category": "Price", "desc": "5-tick momentum", "formula": "p_t/p_{t-5}-1"}
            },
            "Liquidity": {
                "spread": {"desc": "Bid-ask spread", "explanation": null}
            }
        }))
        .unwrap();
        assert_eq!(catalog.len(), 2);
        let keys: Vec<&String> = catalog.categories.keys().collect();
        assert_eq!(keys, vec!["Liquidity", "Price"]);
        let spread = catalog.find("spread").unwrap();
        assert_eq!(spread.category, "Liquidity");
        assert_eq!(spread.explanation, "");
        assert_eq!(catalog.find("momentum_5").unwrap().formula, "p_t/p_{t-5}-1");
        assert!(catalog.find("missing").is_none());
    }

    #[test]
    fn test_models_caption() {
        let models = interpret_models(json!({
            "xgb": {"name": "xgb", "desc": "Gradient boosted trees", "task": "classification"},
            "logit": {"desc": "Logistic regression"}
        }))
        .unwrap();
        assert_eq!(models[0].id, "logit");
        assert_eq!(models[0].caption(), "logit - Logistic regression");
        assert_eq!(models[1].task, "classification");
    }

    #[test]
    fn test_factor_series() {
        let series = interpret_factor_series(json!({"x": ["1", 2], "y": [0.5, null]})).unwrap();
        assert_eq!(series.x, vec!["1".to_string(), "2".to_string()]);
        assert_eq!(series.y[0], 0.5);
        assert!(series.y[1].is_nan());

        let err = interpret_factor_series(json!({"x": ["1"], "y": []})).unwrap_err();
        assert!(err.is_malformed());
    }
}
