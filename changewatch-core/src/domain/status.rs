// changewatch-core/src/domain/status.rs

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Progress of one recalculation batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecalculationStatus {
    pub percentage: u32,
    pub done: bool,
    pub total_runs: u32,
    pub errors: u32,
    pub runs_without_accessor: BTreeSet<i32>,
    pub runs_without_value: BTreeSet<i32>,
    #[serde(skip)]
    completed: u32,
}

impl RecalculationStatus {
    pub fn started(total_runs: u32) -> Self {
        Self {
            total_runs,
            ..Self::default()
        }
    }

    /// Every processed dataset advances progress, whatever its outcome.
    pub fn record_dataset(&mut self) {
        self.completed = (self.completed + 1).min(self.total_runs);
        self.percentage = if self.total_runs == 0 {
            0
        } else {
            self.completed * 100 / self.total_runs
        };
    }

    pub fn finish(&mut self) {
        self.completed = self.total_runs;
        self.percentage = 100;
        self.done = true;
    }

    /// Terminal state for a batch that could not run at all.
    pub fn fail(&mut self) {
        self.errors = self.total_runs.max(1);
        self.done = true;
    }

    pub fn has_failures(&self) -> bool {
        self.errors > 0
    }

    pub fn summary(&self, test_id: i32) -> String {
        format!(
            "Recalculation of test {} finished: {} datasets, {} errors, {} without accessor {:?}, {} without value {:?}",
            test_id,
            self.total_runs,
            self.errors,
            self.runs_without_accessor.len(),
            self.runs_without_accessor,
            self.runs_without_value.len(),
            self.runs_without_value,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_tracks_completed_datasets() {
        let mut status = RecalculationStatus::started(4);
        status.record_dataset();
        assert_eq!(status.percentage, 25);
        status.record_dataset();
        status.record_dataset();
        assert_eq!(status.percentage, 75);
        assert!(!status.done);
        status.finish();
        assert_eq!(status.percentage, 100);
        assert!(status.done);
    }

    #[test]
    fn test_fail_without_runs_still_reports_error() {
        let mut status = RecalculationStatus::started(0);
        status.fail();
        assert_eq!(status.errors, 1);
        assert!(status.done);
    }

    #[test]
    fn test_serialized_field_names() {
        let status = RecalculationStatus::started(3);
        let json = serde_json::to_value(&status).unwrap_or_default();
        assert_eq!(json["totalRuns"], 3);
        assert!(json.get("runsWithoutAccessor").is_some());
        assert!(json.get("completed").is_none());
    }
}
