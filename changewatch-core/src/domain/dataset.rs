// changewatch-core/src/domain/dataset.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Derived run data, without its label document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DatasetRef {
    pub id: i32,
    pub test_id: i32,
    pub run_id: i32,
    #[serde(default)]
    pub ordinal: i32,
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl DatasetRef {
    /// Chronological order used for every detector history: start time, then
    /// run and ordinal, then id as the final tie-breaker.
    pub fn chronological(a: &DatasetRef, b: &DatasetRef) -> Ordering {
        a.start
            .cmp(&b.start)
            .then(a.run_id.cmp(&b.run_id))
            .then(a.ordinal.cmp(&b.ordinal))
            .then(a.id.cmp(&b.id))
    }

    pub fn in_window(&self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> bool {
        in_window(self.start, from, to)
    }
}

/// Inclusive window check; `None` leaves that side open.
pub fn in_window(
    timestamp: DateTime<Utc>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> bool {
    from.is_none_or(|f| timestamp >= f) && to.is_none_or(|t| timestamp <= t)
}

/// Resolved value of one variable on one dataset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Datapoint {
    pub variable_id: i32,
    pub dataset_id: i32,
    pub run_id: i32,
    /// Position of the dataset within its run.
    #[serde(default)]
    pub ordinal: i32,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Datapoint {
    pub fn chronological(a: &Datapoint, b: &Datapoint) -> Ordering {
        a.timestamp
            .cmp(&b.timestamp)
            .then(a.run_id.cmp(&b.run_id))
            .then(a.ordinal.cmp(&b.ordinal))
            .then(a.dataset_id.cmp(&b.dataset_id))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatapointLastTimestamp {
    pub variable: i32,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ds(id: i32, run_id: i32, secs: i64) -> DatasetRef {
        let start = Utc.timestamp_opt(secs, 0).single().unwrap_or_default();
        DatasetRef {
            id,
            test_id: 1,
            run_id,
            ordinal: 0,
            start,
            stop: start,
            description: None,
        }
    }

    #[test]
    fn test_chronological_sort_is_start_then_run() {
        let mut sets = vec![ds(3, 30, 100), ds(1, 10, 200), ds(2, 20, 100)];
        sets.sort_by(DatasetRef::chronological);
        let ids: Vec<i32> = sets.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn test_datapoints_in_one_run_follow_dataset_ordinal() {
        let start = Utc.timestamp_opt(100, 0).single().unwrap_or_default();
        let dp = |dataset_id, ordinal| Datapoint {
            variable_id: 1,
            dataset_id,
            run_id: 7,
            ordinal,
            timestamp: start,
            value: 0.0,
        };
        let mut points = vec![dp(8, 1), dp(9, 0), dp(5, 2)];
        points.sort_by(Datapoint::chronological);
        let ids: Vec<i32> = points.iter().map(|d| d.dataset_id).collect();
        assert_eq!(ids, vec![9, 8, 5]);
    }

    #[test]
    fn test_window_bounds_are_inclusive_and_optional() {
        let d = ds(1, 1, 100);
        let at = |s| Utc.timestamp_opt(s, 0).single();
        assert!(d.in_window(None, None));
        assert!(d.in_window(at(100), at(100)));
        assert!(!d.in_window(at(101), None));
        assert!(!d.in_window(None, at(99)));
    }
}
