// changewatch-core/src/domain/detection/zscore.rs

use serde::{Deserialize, Serialize};

use super::Detector;
use crate::domain::change::ChangeEvidence;
use crate::domain::dataset::Datapoint;
use crate::domain::error::DetectorError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ZScoreConfig {
    /// Number of standard deviations tolerated.
    pub threshold: f64,
    pub min_previous: usize,
}

impl Default for ZScoreConfig {
    fn default() -> Self {
        Self {
            threshold: 3.0,
            min_previous: 5,
        }
    }
}

/// Population mean/variance accumulated with Welford's online algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningStats {
    pub mean: f64,
    pub variance: f64,
    pub count: u64,
}

impl RunningStats {
    pub fn push(mut self, value: f64) -> Self {
        self.count += 1;
        if self.count == 1 {
            self.mean = value;
            self.variance = 0.0;
            return self;
        }
        let old_mean = self.mean;
        self.mean += (value - old_mean) / self.count as f64;
        // M2_new = M2_old + (x - old_mean) * (x - new_mean)
        let prev_m2 = self.variance * (self.count - 1) as f64;
        let m2 = prev_m2 + (value - old_mean) * (value - self.mean);
        self.variance = m2 / self.count as f64;
        self
    }

    pub fn of(values: impl IntoIterator<Item = f64>) -> Self {
        values.into_iter().fold(Self::default(), Self::push)
    }

    pub fn stddev(&self) -> f64 {
        self.variance.sqrt()
    }
}

pub struct ZScore;

impl Detector for ZScore {
    const MODEL: &'static str = "zScore";
    const TITLE: &'static str = "Z-score";
    const DESCRIPTION: &'static str = "Flags a value further than `threshold` standard deviations from the mean of the previous points.";

    type Config = ZScoreConfig;

    fn min_history(config: &Self::Config) -> usize {
        config.min_previous.max(2)
    }

    fn detect(
        config: &Self::Config,
        history: &[Datapoint],
        newest: &Datapoint,
    ) -> Result<Option<ChangeEvidence>, DetectorError> {
        if config.threshold.is_nan() || config.threshold <= 0.0 {
            return Err(DetectorError::InvalidConfig {
                model: Self::MODEL.to_string(),
                reason: "threshold must be positive".into(),
            });
        }

        let stats = RunningStats::of(history.iter().map(|d| d.value));
        let stddev = stats.stddev();
        // A flat history has no spread to measure against
        if stats.count < 2 || stddev <= 1e-9 {
            return Ok(None);
        }

        let z = (newest.value - stats.mean) / stddev;
        if !z.is_finite() {
            return Err(DetectorError::Fault {
                model: Self::MODEL.to_string(),
                reason: format!("non-finite z-score for value {}", newest.value),
            });
        }
        if z.abs() <= config.threshold {
            return Ok(None);
        }

        Ok(Some(ChangeEvidence {
            model: Self::MODEL.to_string(),
            magnitude: z,
            // Chebyshev bound on the share of points this far from the mean
            confidence: Some(1.0 - 1.0 / (z * z)),
            detail: format!(
                "Value {:.4} has z-score {:+.2} (threshold {:.2}), previous {} points have mean {:.4} and stddev {:.4}",
                newest.value, z, config.threshold, stats.count, stats.mean, stddev
            ),
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::test_support::series;
    use super::*;

    #[test]
    fn test_running_stats_match_closed_form() {
        let stats = RunningStats::of([2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(stats.count, 8);
        assert!((stats.mean - 5.0).abs() < 1e-12);
        assert!((stats.stddev() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_spike_is_flagged() {
        let values = [0.24, 0.26, 0.25, 0.23, 0.27, 0.25, 0.24, 0.26, 0.25, 0.25, 0.95];
        let points = series(&values);
        let last = points.len() - 1;
        let res = ZScore::detect(&ZScoreConfig::default(), &points[..last], &points[last]).unwrap();
        let evidence = res.unwrap();
        assert!(evidence.magnitude > 3.0);
        assert!(evidence.confidence.unwrap() > 0.88);
    }

    #[test]
    fn test_normal_value_passes() {
        let values = [0.24, 0.26, 0.25, 0.23, 0.27, 0.25];
        let points = series(&values);
        let res = ZScore::detect(&ZScoreConfig::default(), &points[..5], &points[5]).unwrap();
        assert!(res.is_none());
    }

    #[test]
    fn test_zero_variance_never_flags() {
        let points = series(&[5.0, 5.0, 5.0, 5.0, 5.0, 500.0]);
        let res = ZScore::detect(&ZScoreConfig::default(), &points[..5], &points[5]).unwrap();
        assert!(res.is_none());
    }

    #[test]
    fn test_min_history_is_at_least_two() {
        let cfg = ZScoreConfig {
            threshold: 3.0,
            min_previous: 0,
        };
        assert_eq!(ZScore::min_history(&cfg), 2);
    }
}
