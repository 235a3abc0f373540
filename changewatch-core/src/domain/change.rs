// changewatch-core/src/domain/change.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::dataset::Datapoint;

/// What a detector reports about the datapoint under test.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvidence {
    pub model: String,
    /// Signed size of the shift, in the detector's own unit
    /// (relative difference, z-score, distance to the bound).
    pub magnitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub detail: String,
}

/// The slot a change occupies: the datapoint that confirmed it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TriggerPosition {
    pub dataset_id: i32,
    pub run_id: i32,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl From<&Datapoint> for TriggerPosition {
    fn from(dp: &Datapoint) -> Self {
        Self {
            dataset_id: dp.dataset_id,
            run_id: dp.run_id,
            timestamp: dp.timestamp,
            value: dp.value,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub id: i32,
    pub variable_id: i32,
    pub dataset_id: i32,
    pub run_id: i32,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub confirmed: bool,
    pub description: String,
    pub evidence: ChangeEvidence,
}

impl Change {
    /// Builds a fresh (unsaved) change from a detection.
    pub fn detected(variable_id: i32, trigger: &TriggerPosition, evidence: ChangeEvidence) -> Self {
        Self {
            id: 0,
            variable_id,
            dataset_id: trigger.dataset_id,
            run_id: trigger.run_id,
            timestamp: trigger.timestamp,
            value: trigger.value,
            confirmed: false,
            description: evidence.detail.clone(),
            evidence,
        }
    }

    /// Refreshes the detector-owned fields; user-owned fields are left alone.
    pub fn refresh(&mut self, trigger: &TriggerPosition, evidence: ChangeEvidence) {
        self.run_id = trigger.run_id;
        self.timestamp = trigger.timestamp;
        self.value = trigger.value;
        self.evidence = evidence;
    }
}

/// User edit of a change.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChangePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ChangePatch {
    pub fn apply(&self, change: &mut Change) {
        if let Some(confirmed) = self.confirmed {
            change.confirmed = confirmed;
        }
        if let Some(description) = &self.description {
            change.description = description.clone();
        }
    }
}

/// Marker left behind when a user deletes a change. Recalculation over the
/// same value must not bring the change back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tombstone {
    pub variable_id: i32,
    pub dataset_id: i32,
    pub value: f64,
}

impl Tombstone {
    pub fn suppresses(&self, trigger: &TriggerPosition) -> bool {
        self.dataset_id == trigger.dataset_id && self.value.to_bits() == trigger.value.to_bits()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(i32),
    Updated(i32),
    Suppressed,
}
