// changewatch-core/src/infrastructure/adapters/memory.rs

// In-process implementations of every port. Used by tests and by embedders
// that keep their own persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::application::coordinator::EnginePorts;
use crate::domain::change::{
    Change, ChangeEvidence, ChangePatch, Tombstone, TriggerPosition, UpsertOutcome,
};
use crate::domain::dataset::{self, Datapoint, DatapointLastTimestamp, DatasetRef};
use crate::domain::error::DomainError;
use crate::domain::log::{CalculationLog, page_bounds};
use crate::domain::variable::Variable;
use crate::error::ChangewatchError;
use crate::infrastructure::compiler::expression::MiniJinjaEvaluator;
use crate::infrastructure::error::InfrastructureError;
use crate::ports::{
    CalculationLogSink, ChangeStore, DatapointStore, DatasetProvider, FailureNotifier,
    VariableStore,
};

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn unavailable(what: &str) -> ChangewatchError {
    ChangewatchError::Infrastructure(InfrastructureError::Io(std::io::Error::other(format!(
        "{} unavailable",
        what
    ))))
}

// --- DATASETS ---

/// Datasets in insertion order, which need not be chronological.
#[derive(Default)]
pub struct InMemoryDatasets {
    entries: Mutex<Vec<(DatasetRef, Value)>>,
    offline: AtomicBool,
}

impl InMemoryDatasets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, dataset: DatasetRef, labels: Value) {
        let mut entries = guard(&self.entries);
        entries.retain(|(d, _)| d.id != dataset.id);
        entries.push((dataset, labels));
    }

    /// Simulates an unreachable provider.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl DatasetProvider for InMemoryDatasets {
    async fn list_datasets(
        &self,
        test_id: i32,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<DatasetRef>, ChangewatchError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(unavailable("dataset provider"));
        }
        Ok(guard(&self.entries)
            .iter()
            .filter(|(d, _)| d.test_id == test_id && d.in_window(from, to))
            .map(|(d, _)| d.clone())
            .collect())
    }

    async fn label_data(&self, dataset_id: i32) -> Result<Value, ChangewatchError> {
        guard(&self.entries)
            .iter()
            .find(|(d, _)| d.id == dataset_id)
            .map(|(_, labels)| labels.clone())
            .ok_or_else(|| DomainError::DatasetNotFound(dataset_id).into())
    }
}

// --- VARIABLES ---

#[derive(Default)]
struct VariableTable {
    rows: BTreeMap<i32, Variable>,
    next_id: i32,
}

#[derive(Default)]
pub struct InMemoryVariables {
    table: Mutex<VariableTable>,
}

impl InMemoryVariables {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VariableStore for InMemoryVariables {
    async fn variables(&self, test_id: i32) -> Result<Vec<Variable>, ChangewatchError> {
        let mut variables: Vec<Variable> = guard(&self.table)
            .rows
            .values()
            .filter(|v| v.test_id == test_id)
            .cloned()
            .collect();
        variables.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name)));
        Ok(variables)
    }

    async fn variable(&self, variable_id: i32) -> Result<Option<Variable>, ChangewatchError> {
        Ok(guard(&self.table).rows.get(&variable_id).cloned())
    }

    async fn replace(
        &self,
        test_id: i32,
        variables: Vec<Variable>,
    ) -> Result<(Vec<Variable>, Vec<i32>), ChangewatchError> {
        let mut table = guard(&self.table);
        let existing: Vec<i32> = table
            .rows
            .values()
            .filter(|v| v.test_id == test_id)
            .filter_map(|v| v.id)
            .collect();

        let mut stored = Vec::with_capacity(variables.len());
        for mut variable in variables {
            variable.test_id = test_id;
            let id = match variable.id {
                Some(id) if existing.contains(&id) => id,
                _ => {
                    table.next_id += 1;
                    table.next_id
                }
            };
            variable.id = Some(id);
            stored.push(variable);
        }

        let kept: Vec<i32> = stored.iter().filter_map(|v| v.id).collect();
        let removed: Vec<i32> = existing.into_iter().filter(|id| !kept.contains(id)).collect();
        table.rows.retain(|_, v| v.test_id != test_id);
        for variable in &stored {
            table.rows.insert(variable.id_or_default(), variable.clone());
        }
        Ok((stored, removed))
    }
}

// --- DATAPOINTS ---

#[derive(Default)]
pub struct InMemoryDatapoints {
    rows: Mutex<HashMap<(i32, i32), Datapoint>>,
}

impl InMemoryDatapoints {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DatapointStore for InMemoryDatapoints {
    async fn upsert(&self, datapoints: &[Datapoint]) -> Result<(), ChangewatchError> {
        let mut rows = guard(&self.rows);
        for dp in datapoints {
            rows.insert((dp.variable_id, dp.dataset_id), dp.clone());
        }
        Ok(())
    }

    async fn remove(&self, variable_id: i32, dataset_id: i32) -> Result<(), ChangewatchError> {
        guard(&self.rows).remove(&(variable_id, dataset_id));
        Ok(())
    }

    async fn history(&self, variable_id: i32) -> Result<Vec<Datapoint>, ChangewatchError> {
        let mut history: Vec<Datapoint> = guard(&self.rows)
            .values()
            .filter(|dp| dp.variable_id == variable_id)
            .cloned()
            .collect();
        history.sort_by(Datapoint::chronological);
        Ok(history)
    }

    async fn last_timestamps(
        &self,
        variable_ids: &[i32],
    ) -> Result<Vec<DatapointLastTimestamp>, ChangewatchError> {
        let rows = guard(&self.rows);
        let mut last: BTreeMap<i32, DateTime<Utc>> = BTreeMap::new();
        for dp in rows.values().filter(|dp| variable_ids.contains(&dp.variable_id)) {
            let entry = last.entry(dp.variable_id).or_insert(dp.timestamp);
            if dp.timestamp > *entry {
                *entry = dp.timestamp;
            }
        }
        Ok(last
            .into_iter()
            .map(|(variable, ts)| DatapointLastTimestamp {
                variable,
                timestamp: ts.timestamp_millis(),
            })
            .collect())
    }

    async fn delete_for_variables(&self, variable_ids: &[i32]) -> Result<(), ChangewatchError> {
        guard(&self.rows).retain(|(variable_id, _), _| !variable_ids.contains(variable_id));
        Ok(())
    }
}

// --- CHANGES ---

#[derive(Default)]
struct ChangeTable {
    rows: BTreeMap<i32, Change>,
    tombstones: Vec<Tombstone>,
    next_id: i32,
}

#[derive(Default)]
pub struct InMemoryChanges {
    table: Mutex<ChangeTable>,
    failing_writes: AtomicU32,
}

impl InMemoryChanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` upserts fail.
    pub fn fail_next_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChangeStore for InMemoryChanges {
    async fn upsert(
        &self,
        variable_id: i32,
        trigger: &TriggerPosition,
        evidence: &ChangeEvidence,
    ) -> Result<UpsertOutcome, ChangewatchError> {
        if self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(unavailable("change store"));
        }

        let mut table = guard(&self.table);
        let tombstone = table
            .tombstones
            .iter()
            .position(|t| t.variable_id == variable_id && t.dataset_id == trigger.dataset_id);
        if let Some(index) = tombstone {
            if table.tombstones[index].suppresses(trigger) {
                return Ok(UpsertOutcome::Suppressed);
            }
            table.tombstones.remove(index);
        }

        let existing = table
            .rows
            .values_mut()
            .find(|c| c.variable_id == variable_id && c.dataset_id == trigger.dataset_id);
        if let Some(change) = existing {
            change.refresh(trigger, evidence.clone());
            return Ok(UpsertOutcome::Updated(change.id));
        }

        table.next_id += 1;
        let mut change = Change::detected(variable_id, trigger, evidence.clone());
        change.id = table.next_id;
        table.rows.insert(change.id, change);
        Ok(UpsertOutcome::Inserted(table.next_id))
    }

    async fn list(&self, variable_id: i32) -> Result<Vec<Change>, ChangewatchError> {
        let mut changes: Vec<Change> = guard(&self.table)
            .rows
            .values()
            .filter(|c| c.variable_id == variable_id)
            .cloned()
            .collect();
        changes.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        Ok(changes)
    }

    async fn get(&self, change_id: i32) -> Result<Option<Change>, ChangewatchError> {
        Ok(guard(&self.table).rows.get(&change_id).cloned())
    }

    async fn delete(&self, change_id: i32) -> Result<bool, ChangewatchError> {
        let mut table = guard(&self.table);
        let Some(change) = table.rows.remove(&change_id) else {
            return Ok(false);
        };
        table
            .tombstones
            .retain(|t| !(t.variable_id == change.variable_id && t.dataset_id == change.dataset_id));
        table.tombstones.push(Tombstone {
            variable_id: change.variable_id,
            dataset_id: change.dataset_id,
            value: change.value,
        });
        Ok(true)
    }

    async fn update(
        &self,
        change_id: i32,
        patch: &ChangePatch,
    ) -> Result<Option<Change>, ChangewatchError> {
        let mut table = guard(&self.table);
        Ok(table.rows.get_mut(&change_id).map(|change| {
            patch.apply(change);
            change.clone()
        }))
    }

    async fn prune(
        &self,
        variable_id: i32,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        keep: &[i32],
    ) -> Result<usize, ChangewatchError> {
        let mut table = guard(&self.table);
        let before = table.rows.len();
        table.rows.retain(|_, c| {
            c.variable_id != variable_id
                || c.confirmed
                || keep.contains(&c.dataset_id)
                || !dataset::in_window(c.timestamp, from, to)
        });
        Ok(before - table.rows.len())
    }

    async fn delete_for_variables(&self, variable_ids: &[i32]) -> Result<(), ChangewatchError> {
        let mut table = guard(&self.table);
        table.rows.retain(|_, c| !variable_ids.contains(&c.variable_id));
        table
            .tombstones
            .retain(|t| !variable_ids.contains(&t.variable_id));
        Ok(())
    }
}

// --- CALCULATION LOG ---

#[derive(Default)]
pub struct InMemoryLogs {
    entries: Mutex<Vec<CalculationLog>>,
}

impl InMemoryLogs {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CalculationLogSink for InMemoryLogs {
    async fn append(&self, test_id: i32, entry: CalculationLog) -> Result<(), ChangewatchError> {
        self.append_batch(test_id, vec![entry]).await
    }

    async fn append_batch(
        &self,
        test_id: i32,
        entries: Vec<CalculationLog>,
    ) -> Result<(), ChangewatchError> {
        let mut log = guard(&self.entries);
        for mut entry in entries {
            entry.id = log.len() as i64 + 1;
            entry.test_id = test_id;
            log.push(entry);
        }
        Ok(())
    }

    async fn query(
        &self,
        test_id: i32,
        page: u32,
        limit: u32,
    ) -> Result<Vec<CalculationLog>, ChangewatchError> {
        let (offset, limit) = page_bounds(page, limit);
        Ok(guard(&self.entries)
            .iter()
            .rev()
            .filter(|e| e.test_id == test_id)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count(&self, test_id: i32) -> Result<u64, ChangewatchError> {
        Ok(guard(&self.entries)
            .iter()
            .filter(|e| e.test_id == test_id)
            .count() as u64)
    }
}

// --- NOTIFIER ---

/// Keeps every notification; can be told to fail.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
    broken: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_broken(&self, broken: bool) {
        self.broken.store(broken, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        guard(&self.sent).clone()
    }
}

#[async_trait]
impl FailureNotifier for RecordingNotifier {
    async fn notify(&self, subject: &str, summary: &str) -> Result<(), ChangewatchError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(InfrastructureError::NotifierFailure("relay refused the message".into()).into());
        }
        guard(&self.sent).push((subject.to_string(), summary.to_string()));
        Ok(())
    }
}

// --- WIRING ---

/// One of each in-memory adapter, kept as concrete handles so tests can
/// seed data and inspect results.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    pub datasets: Arc<InMemoryDatasets>,
    pub variables: Arc<InMemoryVariables>,
    pub datapoints: Arc<InMemoryDatapoints>,
    pub changes: Arc<InMemoryChanges>,
    pub logs: Arc<InMemoryLogs>,
    pub notifier: Arc<RecordingNotifier>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ports(&self) -> EnginePorts {
        EnginePorts {
            datasets: self.datasets.clone(),
            variables: self.variables.clone(),
            datapoints: self.datapoints.clone(),
            changes: self.changes.clone(),
            logs: self.logs.clone(),
            notifier: self.notifier.clone(),
            expressions: Arc::new(MiniJinjaEvaluator::new()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::log::LogLevel;

    fn trigger(dataset_id: i32, value: f64) -> TriggerPosition {
        TriggerPosition {
            dataset_id,
            run_id: dataset_id * 10,
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
            value,
        }
    }

    fn evidence() -> ChangeEvidence {
        ChangeEvidence {
            model: "fixedThreshold".into(),
            magnitude: 1.0,
            confidence: Some(1.0),
            detail: "above".into(),
        }
    }

    #[tokio::test]
    async fn test_upsert_same_slot_updates() -> anyhow::Result<()> {
        let store = InMemoryChanges::new();
        let first = store.upsert(1, &trigger(4, 50.0), &evidence()).await?;
        let second = store.upsert(1, &trigger(4, 50.0), &evidence()).await?;
        assert_eq!(first, UpsertOutcome::Inserted(1));
        assert_eq!(second, UpsertOutcome::Updated(1));
        assert_eq!(store.list(1).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_tombstone_lifecycle() -> anyhow::Result<()> {
        let store = InMemoryChanges::new();
        store.upsert(1, &trigger(4, 50.0), &evidence()).await?;
        assert!(store.delete(1).await?);

        let again = store.upsert(1, &trigger(4, 50.0), &evidence()).await?;
        assert_eq!(again, UpsertOutcome::Suppressed);
        assert!(store.list(1).await?.is_empty());

        let changed = store.upsert(1, &trigger(4, 60.0), &evidence()).await?;
        assert!(matches!(changed, UpsertOutcome::Inserted(_)));
        Ok(())
    }

    #[tokio::test]
    async fn test_prune_keeps_confirmed() -> anyhow::Result<()> {
        let store = InMemoryChanges::new();
        store.upsert(1, &trigger(4, 50.0), &evidence()).await?;
        store.upsert(1, &trigger(5, 60.0), &evidence()).await?;
        store
            .update(2, &ChangePatch { confirmed: Some(true), description: None })
            .await?;

        let pruned = store.prune(1, None, None, &[]).await?;
        assert_eq!(pruned, 1);
        let left = store.list(1).await?;
        assert_eq!(left.len(), 1);
        assert!(left[0].confirmed);
        Ok(())
    }

    #[tokio::test]
    async fn test_log_paging_is_most_recent_first() -> anyhow::Result<()> {
        let logs = InMemoryLogs::new();
        let entries = (0..5)
            .map(|i| CalculationLog::new(3, LogLevel::Info, format!("entry {}", i)))
            .collect();
        logs.append_batch(3, entries).await?;
        logs.append(4, CalculationLog::new(4, LogLevel::Info, "other")).await?;

        assert_eq!(logs.count(3).await?, 5);
        let first = logs.query(3, 0, 2).await?;
        assert_eq!(first[0].message, "entry 4");
        assert_eq!(first[1].message, "entry 3");
        let last = logs.query(3, 2, 2).await?;
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].message, "entry 0");
        Ok(())
    }
}
