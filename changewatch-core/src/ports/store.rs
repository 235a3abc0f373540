// changewatch-core/src/ports/store.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::change::{Change, ChangeEvidence, ChangePatch, TriggerPosition, UpsertOutcome};
use crate::domain::dataset::{Datapoint, DatapointLastTimestamp};
use crate::domain::variable::Variable;
use crate::error::ChangewatchError;

#[async_trait]
pub trait ChangeStore: Send + Sync {
    /// Inserts or refreshes the change in slot `(variable_id, trigger.dataset_id)`.
    /// User-edited fields survive a refresh. A tombstone with the same value
    /// suppresses the write; a different value clears the tombstone.
    async fn upsert(
        &self,
        variable_id: i32,
        trigger: &TriggerPosition,
        evidence: &ChangeEvidence,
    ) -> Result<UpsertOutcome, ChangewatchError>;

    /// Changes of a variable, oldest trigger first.
    async fn list(&self, variable_id: i32) -> Result<Vec<Change>, ChangewatchError>;

    async fn get(&self, change_id: i32) -> Result<Option<Change>, ChangewatchError>;

    /// Removes a change and leaves a tombstone in its slot.
    async fn delete(&self, change_id: i32) -> Result<bool, ChangewatchError>;

    async fn update(
        &self,
        change_id: i32,
        patch: &ChangePatch,
    ) -> Result<Option<Change>, ChangewatchError>;

    /// Drops unconfirmed changes of a variable in `[from, to]` whose dataset is
    /// not in `keep`. Returns how many were removed.
    async fn prune(
        &self,
        variable_id: i32,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        keep: &[i32],
    ) -> Result<usize, ChangewatchError>;

    /// Forgets changes and tombstones of removed variables.
    async fn delete_for_variables(&self, variable_ids: &[i32]) -> Result<(), ChangewatchError>;
}

#[async_trait]
pub trait VariableStore: Send + Sync {
    /// Variables of a test, by `order` then name.
    async fn variables(&self, test_id: i32) -> Result<Vec<Variable>, ChangewatchError>;

    async fn variable(&self, variable_id: i32) -> Result<Option<Variable>, ChangewatchError>;

    /// Replaces the whole set. Returns the stored variables (with ids) and the
    /// ids of variables that were removed.
    async fn replace(
        &self,
        test_id: i32,
        variables: Vec<Variable>,
    ) -> Result<(Vec<Variable>, Vec<i32>), ChangewatchError>;
}

#[async_trait]
pub trait DatapointStore: Send + Sync {
    /// Inserts or overwrites by `(variable_id, dataset_id)`.
    async fn upsert(&self, datapoints: &[Datapoint]) -> Result<(), ChangewatchError>;

    /// Drops the datapoint of a variable on a dataset, if any.
    async fn remove(&self, variable_id: i32, dataset_id: i32) -> Result<(), ChangewatchError>;

    /// Full history of a variable in chronological order.
    async fn history(&self, variable_id: i32) -> Result<Vec<Datapoint>, ChangewatchError>;

    async fn last_timestamps(
        &self,
        variable_ids: &[i32],
    ) -> Result<Vec<DatapointLastTimestamp>, ChangewatchError>;

    async fn delete_for_variables(&self, variable_ids: &[i32]) -> Result<(), ChangewatchError>;
}
