// changewatch-core/src/application/detection.rs

use crate::domain::change::{ChangeEvidence, TriggerPosition};
use crate::domain::dataset::Datapoint;
use crate::domain::detection;
use crate::domain::error::DetectorError;
use crate::domain::variable::ChangeDetection;

/// A change candidate: where it fired and the merged evidence of every
/// config that flagged that datapoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub trigger: TriggerPosition,
    pub evidence: ChangeEvidence,
}

#[derive(Debug, Default)]
pub struct FoldOutcome {
    pub detections: Vec<Detection>,
    pub faults: Vec<DetectorError>,
}

/// Runs every config over a variable's ordered history.
///
/// Each config walks the history on its own. A flagged datapoint becomes the
/// start of that config's baseline: later points are only compared with
/// history from the flag onward.
pub fn fold_history(configs: &[ChangeDetection], history: &[Datapoint]) -> FoldOutcome {
    let mut outcome = FoldOutcome::default();
    // (position in history, config index, evidence)
    let mut flagged: Vec<(usize, usize, ChangeEvidence)> = Vec::new();

    for (config_index, config) in configs.iter().enumerate() {
        let mut baseline = 0;
        for (position, newest) in history.iter().enumerate() {
            match detection::detect(config, &history[baseline..position], newest) {
                Ok(Some(evidence)) => {
                    flagged.push((position, config_index, evidence));
                    baseline = position;
                }
                Ok(None) => {}
                Err(fault @ DetectorError::Fault { .. }) => outcome.faults.push(fault),
                // The config itself is unusable, no point in walking further
                Err(fault) => {
                    outcome.faults.push(fault);
                    break;
                }
            }
        }
    }

    flagged.sort_by_key(|(position, config_index, _)| (*position, *config_index));
    for (position, _, evidence) in flagged {
        match outcome.detections.last_mut() {
            Some(last) if last.trigger.dataset_id == history[position].dataset_id => {
                last.evidence.detail = format!("{}; {}", last.evidence.detail, evidence.detail);
            }
            _ => outcome.detections.push(Detection {
                trigger: TriggerPosition::from(&history[position]),
                evidence,
            }),
        }
    }
    outcome
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::detection::test_support::series;
    use serde_json::json;

    fn relative(threshold: f64, min_previous: usize) -> ChangeDetection {
        ChangeDetection {
            id: None,
            model: "relativeDifference".into(),
            config: json!({ "threshold": threshold, "window": 1, "minPrevious": min_previous }),
        }
    }

    #[test]
    fn test_worked_example_resets_baseline() {
        let history = series(&[10.0, 11.0, 10.5, 50.0, 49.0]);
        let outcome = fold_history(&[relative(2.0, 3)], &history);
        assert!(outcome.faults.is_empty());
        assert_eq!(outcome.detections.len(), 1);
        assert_eq!(outcome.detections[0].trigger.dataset_id, 4);
        assert_eq!(outcome.detections[0].trigger.value, 50.0);
    }

    #[test]
    fn test_configs_are_independent_and_coalesce() {
        let history = series(&[10.0, 10.0, 10.0, 50.0]);
        let upper = ChangeDetection {
            id: None,
            model: "fixedThreshold".into(),
            config: json!({ "max": { "enabled": true, "value": 20.0 } }),
        };
        let outcome = fold_history(&[relative(2.0, 3), upper], &history);
        assert_eq!(outcome.detections.len(), 1);
        let evidence = &outcome.detections[0].evidence;
        assert_eq!(evidence.model, "relativeDifference");
        assert!(evidence.detail.contains("upper bound"));
    }

    #[test]
    fn test_broken_config_does_not_stop_siblings() {
        let history = series(&[10.0, 10.0, 10.0, 50.0]);
        let broken = ChangeDetection {
            id: None,
            model: "relativeDifference".into(),
            config: json!({ "window": "wide" }),
        };
        let outcome = fold_history(&[broken, relative(2.0, 3)], &history);
        assert_eq!(outcome.faults.len(), 1);
        assert_eq!(outcome.detections.len(), 1);
    }

    #[test]
    fn test_detections_are_chronological() {
        let history = series(&[10.0, 10.0, 10.0, 50.0, 50.0, 50.0, 200.0]);
        let outcome = fold_history(&[relative(1.0, 3)], &history);
        let ids: Vec<i32> = outcome.detections.iter().map(|d| d.trigger.dataset_id).collect();
        assert_eq!(ids, vec![4, 7]);
    }
}
