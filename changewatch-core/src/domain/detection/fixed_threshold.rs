// changewatch-core/src/domain/detection/fixed_threshold.rs

use serde::{Deserialize, Serialize};

use super::Detector;
use crate::domain::change::ChangeEvidence;
use crate::domain::dataset::Datapoint;
use crate::domain::error::DetectorError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bound {
    pub enabled: bool,
    pub value: f64,
    /// The bound value itself is acceptable.
    pub inclusive: bool,
}

impl Default for Bound {
    fn default() -> Self {
        Self {
            enabled: false,
            value: 0.0,
            inclusive: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixedThresholdConfig {
    pub min: Bound,
    pub max: Bound,
}

pub struct FixedThreshold;

impl Detector for FixedThreshold {
    const MODEL: &'static str = "fixedThreshold";
    const TITLE: &'static str = "Fixed threshold";
    const DESCRIPTION: &'static str =
        "Flags any value outside the configured lower and/or upper bound. Needs no history.";

    type Config = FixedThresholdConfig;

    fn min_history(_config: &Self::Config) -> usize {
        0
    }

    fn detect(
        config: &Self::Config,
        _history: &[Datapoint],
        newest: &Datapoint,
    ) -> Result<Option<ChangeEvidence>, DetectorError> {
        let value = newest.value;
        let evidence = |magnitude: f64, detail: String| ChangeEvidence {
            model: Self::MODEL.to_string(),
            magnitude,
            confidence: Some(1.0),
            detail,
        };

        let min = &config.min;
        if min.enabled && (value < min.value || (!min.inclusive && value == min.value)) {
            return Ok(Some(evidence(
                value - min.value,
                format!(
                    "Value {} is below the lower bound {} ({})",
                    value,
                    min.value,
                    if min.inclusive { "inclusive" } else { "exclusive" }
                ),
            )));
        }

        let max = &config.max;
        if max.enabled && (value > max.value || (!max.inclusive && value == max.value)) {
            return Ok(Some(evidence(
                value - max.value,
                format!(
                    "Value {} is above the upper bound {} ({})",
                    value,
                    max.value,
                    if max.inclusive { "inclusive" } else { "exclusive" }
                ),
            )));
        }

        Ok(None)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::test_support::series;
    use super::*;

    fn bounds(min: Option<(f64, bool)>, max: Option<(f64, bool)>) -> FixedThresholdConfig {
        let bound = |b: Option<(f64, bool)>| match b {
            Some((value, inclusive)) => Bound {
                enabled: true,
                value,
                inclusive,
            },
            None => Bound::default(),
        };
        FixedThresholdConfig {
            min: bound(min),
            max: bound(max),
        }
    }

    #[test]
    fn test_fires_without_history() {
        let points = series(&[120.0]);
        let res = FixedThreshold::detect(&bounds(None, Some((100.0, true))), &[], &points[0]).unwrap();
        let evidence = res.unwrap();
        assert_eq!(evidence.magnitude, 20.0);
        assert!(evidence.detail.contains("upper bound"));
    }

    #[test]
    fn test_inclusive_bound_accepts_equal_value() {
        let points = series(&[100.0]);
        let cfg = bounds(Some((100.0, true)), Some((100.0, true)));
        assert!(FixedThreshold::detect(&cfg, &[], &points[0]).unwrap().is_none());

        let cfg = bounds(Some((100.0, false)), None);
        assert!(FixedThreshold::detect(&cfg, &[], &points[0]).unwrap().is_some());
    }

    #[test]
    fn test_disabled_bounds_never_fire() {
        let points = series(&[-1e9]);
        let res = FixedThreshold::detect(&FixedThresholdConfig::default(), &[], &points[0]).unwrap();
        assert!(res.is_none());
    }
}
