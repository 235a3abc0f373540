// changewatch-core/src/domain/detection/relative_difference.rs

use serde::{Deserialize, Serialize};

use super::{Detector, mean};
use crate::domain::change::ChangeEvidence;
use crate::domain::dataset::Datapoint;
use crate::domain::error::DetectorError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Filter {
    #[default]
    Mean,
    Min,
    Max,
}

impl Filter {
    fn apply(&self, values: &[f64]) -> Option<f64> {
        match self {
            Filter::Mean => mean(values.iter().copied()),
            Filter::Min => values.iter().copied().reduce(f64::min),
            Filter::Max => values.iter().copied().reduce(f64::max),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelativeDifferenceConfig {
    /// Maximum tolerated relative difference (0.2 = 20%).
    pub threshold: f64,
    /// Number of most recent points, the tested one included, summarized by `filter`.
    pub window: usize,
    /// Points required before the window.
    pub min_previous: usize,
    pub filter: Filter,
}

impl Default for RelativeDifferenceConfig {
    fn default() -> Self {
        Self {
            threshold: 0.2,
            window: 1,
            min_previous: 5,
            filter: Filter::Mean,
        }
    }
}

pub struct RelativeDifference;

impl Detector for RelativeDifference {
    const MODEL: &'static str = "relativeDifference";
    const TITLE: &'static str = "Relative difference of means";
    const DESCRIPTION: &'static str = "Compares the most recent window (min, max or mean) against the mean of the previous points and flags a relative difference above the threshold.";

    type Config = RelativeDifferenceConfig;

    fn min_history(config: &Self::Config) -> usize {
        config
            .window
            .max(1)
            .saturating_sub(1)
            .saturating_add(config.min_previous)
    }

    fn detect(
        config: &Self::Config,
        history: &[Datapoint],
        newest: &Datapoint,
    ) -> Result<Option<ChangeEvidence>, DetectorError> {
        if config.window == 0 || config.threshold.is_nan() || config.threshold < 0.0 {
            return Err(DetectorError::InvalidConfig {
                model: Self::MODEL.to_string(),
                reason: "window must be at least 1 and threshold non-negative".into(),
            });
        }

        let split = history.len().saturating_sub(config.window - 1);
        let (previous, recent) = history.split_at(split);
        let Some(previous_mean) = mean(previous.iter().map(|d| d.value)) else {
            return Ok(None);
        };
        // A zero baseline has no meaningful relative difference
        if previous_mean.abs() < f64::EPSILON {
            return Ok(None);
        }

        let window_values: Vec<f64> = recent
            .iter()
            .map(|d| d.value)
            .chain(std::iter::once(newest.value))
            .collect();
        let Some(window_value) = config.filter.apply(&window_values) else {
            return Ok(None);
        };

        let difference = window_value / previous_mean - 1.0;
        if !difference.is_finite() {
            return Err(DetectorError::Fault {
                model: Self::MODEL.to_string(),
                reason: format!("non-finite ratio {} / {}", window_value, previous_mean),
            });
        }
        if difference.abs() <= config.threshold {
            return Ok(None);
        }

        let datasets: Vec<i32> = recent
            .iter()
            .map(|d| d.dataset_id)
            .chain(std::iter::once(newest.dataset_id))
            .collect();
        Ok(Some(ChangeEvidence {
            model: Self::MODEL.to_string(),
            magnitude: difference,
            confidence: None,
            detail: format!(
                "Datasets {:?} have {:?} {:.4}, previous {} points have mean {:.4} ({:+.2}%)",
                datasets,
                config.filter,
                window_value,
                previous.len(),
                previous_mean,
                difference * 100.0
            ),
        }))
    }
}
