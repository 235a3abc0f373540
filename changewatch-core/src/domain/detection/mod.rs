// changewatch-core/src/domain/detection/mod.rs

// Change detection models. Each model is a pure function of
// (config, history, newest) registered in `MODELS` under its name.
// The coordinator only ever goes through `detect`, so adding a model means
// adding a module and a registry line.

pub mod fixed_threshold;
pub mod relative_difference;
pub mod zscore;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::change::ChangeEvidence;
use crate::domain::dataset::Datapoint;
use crate::domain::error::DetectorError;
use crate::domain::variable::ChangeDetection;

pub use fixed_threshold::FixedThreshold;
pub use relative_difference::RelativeDifference;
pub use zscore::ZScore;

pub trait Detector {
    const MODEL: &'static str;
    const TITLE: &'static str;
    const DESCRIPTION: &'static str;

    type Config: DeserializeOwned + Serialize + Default;

    /// Number of prior datapoints required before `detect` may flag anything.
    fn min_history(config: &Self::Config) -> usize;

    /// `history` is ascending, strictly before `newest`, and already holds at
    /// least `min_history` points.
    fn detect(
        config: &Self::Config,
        history: &[Datapoint],
        newest: &Datapoint,
    ) -> Result<Option<ChangeEvidence>, DetectorError>;
}

pub type DetectFn =
    fn(&Value, &[Datapoint], &Datapoint) -> Result<Option<ChangeEvidence>, DetectorError>;

pub struct ModelDescriptor {
    pub name: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub default_config: fn() -> Value,
    pub detect: DetectFn,
}

/// Serializable view of a registered model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelInfo {
    pub name: String,
    pub title: String,
    pub description: String,
    pub config: Value,
}

static MODELS: &[ModelDescriptor] = &[
    descriptor::<RelativeDifference>(),
    descriptor::<FixedThreshold>(),
    descriptor::<ZScore>(),
];

const fn descriptor<D: Detector>() -> ModelDescriptor {
    ModelDescriptor {
        name: D::MODEL,
        title: D::TITLE,
        description: D::DESCRIPTION,
        default_config: default_config::<D>,
        detect: run::<D>,
    }
}

fn default_config<D: Detector>() -> Value {
    serde_json::to_value(D::Config::default()).unwrap_or(Value::Null)
}

fn run<D: Detector>(
    raw: &Value,
    history: &[Datapoint],
    newest: &Datapoint,
) -> Result<Option<ChangeEvidence>, DetectorError> {
    let config: D::Config = parse_config(D::MODEL, raw)?;
    if history.len() < D::min_history(&config) {
        return Ok(None);
    }
    D::detect(&config, history, newest)
}

fn parse_config<T: DeserializeOwned + Default>(model: &str, raw: &Value) -> Result<T, DetectorError> {
    if raw.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(raw.clone()).map_err(|e| DetectorError::InvalidConfig {
        model: model.to_string(),
        reason: e.to_string(),
    })
}

pub fn models() -> &'static [ModelDescriptor] {
    MODELS
}

pub fn find_model(name: &str) -> Option<&'static ModelDescriptor> {
    MODELS.iter().find(|m| m.name == name)
}

pub fn model_infos() -> Vec<ModelInfo> {
    MODELS
        .iter()
        .map(|m| ModelInfo {
            name: m.name.to_string(),
            title: m.title.to_string(),
            description: m.description.to_string(),
            config: (m.default_config)(),
        })
        .collect()
}

/// Configuration offered to new variables; never applied implicitly.
pub fn default_change_detection() -> Vec<ChangeDetection> {
    vec![ChangeDetection {
        id: None,
        model: RelativeDifference::MODEL.to_string(),
        config: default_config::<RelativeDifference>(),
    }]
}

/// Dispatches one configured detector.
pub fn detect(
    config: &ChangeDetection,
    history: &[Datapoint],
    newest: &Datapoint,
) -> Result<Option<ChangeEvidence>, DetectorError> {
    let model = find_model(&config.model)
        .ok_or_else(|| DetectorError::UnknownModel(config.model.clone()))?;
    (model.detect)(&config.config, history, newest)
}

pub(crate) fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}
