// changewatch-core/src/infrastructure/adapters/duckdb.rs

// One DuckDB connection backing variables, datapoints, changes and the
// calculation log. Timestamps are stored as epoch milliseconds, structured
// fields (label bindings, detector configs) as JSON text.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duckdb::{Config, Connection, OptionalExt, params, params_from_iter};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, instrument};

use crate::domain::change::{
    Change, ChangeEvidence, ChangePatch, Tombstone, TriggerPosition, UpsertOutcome,
};
use crate::domain::dataset::{self, Datapoint, DatapointLastTimestamp};
use crate::domain::log::{CalculationLog, LogLevel, page_bounds};
use crate::domain::variable::{ChangeDetection, LabelBinding, Variable};
use crate::error::ChangewatchError;
use crate::infrastructure::error::{DatabaseError, InfrastructureError};
use crate::ports::{CalculationLogSink, ChangeStore, DatapointStore, VariableStore};

const SCHEMA: &str = r#"
CREATE SEQUENCE IF NOT EXISTS variable_seq START 1;
CREATE SEQUENCE IF NOT EXISTS change_seq START 1;
CREATE SEQUENCE IF NOT EXISTS calculation_log_seq START 1;

CREATE TABLE IF NOT EXISTS variable (
    id INTEGER PRIMARY KEY,
    test_id INTEGER NOT NULL,
    name VARCHAR NOT NULL,
    var_group VARCHAR,
    var_order INTEGER NOT NULL,
    labels VARCHAR NOT NULL,
    calculation VARCHAR,
    change_detection VARCHAR NOT NULL
);

CREATE TABLE IF NOT EXISTS datapoint (
    variable_id INTEGER NOT NULL,
    dataset_id INTEGER NOT NULL,
    run_id INTEGER NOT NULL,
    ordinal INTEGER NOT NULL DEFAULT 0,
    ts BIGINT NOT NULL,
    value DOUBLE NOT NULL,
    PRIMARY KEY (variable_id, dataset_id)
);

CREATE TABLE IF NOT EXISTS variable_change (
    id INTEGER PRIMARY KEY,
    variable_id INTEGER NOT NULL,
    dataset_id INTEGER NOT NULL,
    run_id INTEGER NOT NULL,
    ts BIGINT NOT NULL,
    value DOUBLE NOT NULL,
    confirmed BOOLEAN NOT NULL,
    description VARCHAR NOT NULL,
    model VARCHAR NOT NULL,
    magnitude DOUBLE NOT NULL,
    confidence DOUBLE,
    detail VARCHAR NOT NULL,
    UNIQUE (variable_id, dataset_id)
);

CREATE TABLE IF NOT EXISTS change_tombstone (
    variable_id INTEGER NOT NULL,
    dataset_id INTEGER NOT NULL,
    value DOUBLE NOT NULL,
    PRIMARY KEY (variable_id, dataset_id)
);

CREATE TABLE IF NOT EXISTS calculation_log (
    id BIGINT PRIMARY KEY,
    test_id INTEGER NOT NULL,
    dataset_id INTEGER,
    variable_id INTEGER,
    level VARCHAR NOT NULL,
    message VARCHAR NOT NULL,
    ts BIGINT NOT NULL
);
"#;

const CHANGE_COLUMNS: &str = "id, variable_id, dataset_id, run_id, ts, value, confirmed, description, model, magnitude, confidence, detail";

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn change_from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Change> {
    Ok(Change {
        id: row.get(0)?,
        variable_id: row.get(1)?,
        dataset_id: row.get(2)?,
        run_id: row.get(3)?,
        timestamp: from_millis(row.get(4)?),
        value: row.get(5)?,
        confirmed: row.get(6)?,
        description: row.get(7)?,
        evidence: ChangeEvidence {
            model: row.get(8)?,
            magnitude: row.get(9)?,
            confidence: row.get(10)?,
            detail: row.get(11)?,
        },
    })
}

/// Raw `variable` row before its JSON columns are decoded.
struct VariableRow {
    id: i32,
    test_id: i32,
    name: String,
    group: Option<String>,
    order: i32,
    labels: String,
    calculation: Option<String>,
    change_detection: String,
}

impl VariableRow {
    fn from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            test_id: row.get(1)?,
            name: row.get(2)?,
            group: row.get(3)?,
            order: row.get(4)?,
            labels: row.get(5)?,
            calculation: row.get(6)?,
            change_detection: row.get(7)?,
        })
    }

    fn decode(self) -> Result<Variable, ChangewatchError> {
        let labels: Vec<LabelBinding> = serde_json::from_str(&self.labels)?;
        let change_detection: Vec<ChangeDetection> = serde_json::from_str(&self.change_detection)?;
        Ok(Variable {
            id: Some(self.id),
            test_id: self.test_id,
            name: self.name,
            group: self.group,
            order: self.order,
            labels,
            calculation: self.calculation,
            change_detection,
        })
    }
}

pub struct DuckDBStore {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDBStore {
    /// Opens (or creates) the database and applies the schema.
    #[instrument]
    pub fn open(db_path: &str) -> Result<Self, InfrastructureError> {
        let config = Config::default();
        let conn = if db_path == ":memory:" {
            Connection::open_in_memory_with_flags(config)?
        } else {
            if let Some(parent) = Path::new(db_path).parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            Connection::open_with_flags(db_path, config)?
        };
        conn.execute_batch(SCHEMA)?;
        info!(path = db_path, "Change store ready");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self, InfrastructureError> {
        Self::open(":memory:")
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, InfrastructureError> {
        self.conn
            .lock()
            .map_err(|_| InfrastructureError::Database(DatabaseError::Poisoned))
    }
}

// --- VARIABLES ---

#[async_trait]
impl VariableStore for DuckDBStore {
    async fn variables(&self, test_id: i32) -> Result<Vec<Variable>, ChangewatchError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, test_id, name, var_group, var_order, labels, calculation, change_detection
             FROM variable WHERE test_id = ? ORDER BY var_order, name",
        )?;
        let rows = stmt.query_map(params![test_id], VariableRow::from_row)?;

        let mut variables = Vec::new();
        for row in rows {
            variables.push(row?.decode()?);
        }
        Ok(variables)
    }

    async fn variable(&self, variable_id: i32) -> Result<Option<Variable>, ChangewatchError> {
        let row = {
            let conn = self.conn()?;
            conn.query_row(
                "SELECT id, test_id, name, var_group, var_order, labels, calculation, change_detection
                 FROM variable WHERE id = ?",
                params![variable_id],
                VariableRow::from_row,
            )
            .optional()?
        };
        row.map(VariableRow::decode).transpose()
    }

    async fn replace(
        &self,
        test_id: i32,
        variables: Vec<Variable>,
    ) -> Result<(Vec<Variable>, Vec<i32>), ChangewatchError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let existing: Vec<i32> = {
            let mut stmt = tx.prepare("SELECT id FROM variable WHERE test_id = ?")?;
            let ids = stmt.query_map(params![test_id], |row| row.get(0))?;
            ids.collect::<Result<_, _>>()?
        };

        let mut stored = Vec::with_capacity(variables.len());
        for mut variable in variables {
            variable.test_id = test_id;
            let labels = serde_json::to_string(&variable.labels)?;
            let detection = serde_json::to_string(&variable.change_detection)?;

            match variable.id.filter(|id| existing.contains(id)) {
                Some(id) => {
                    tx.execute(
                        "UPDATE variable SET name = ?, var_group = ?, var_order = ?, labels = ?,
                         calculation = ?, change_detection = ? WHERE id = ?",
                        params![
                            variable.name,
                            variable.group,
                            variable.order,
                            labels,
                            variable.calculation,
                            detection,
                            id
                        ],
                    )?;
                }
                None => {
                    let id: i32 = tx.query_row(
                        "SELECT CAST(nextval('variable_seq') AS INTEGER)",
                        [],
                        |row| row.get(0),
                    )?;
                    tx.execute(
                        "INSERT INTO variable VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                        params![
                            id,
                            test_id,
                            variable.name,
                            variable.group,
                            variable.order,
                            labels,
                            variable.calculation,
                            detection
                        ],
                    )?;
                    variable.id = Some(id);
                }
            }
            stored.push(variable);
        }

        let kept: Vec<i32> = stored.iter().filter_map(|v| v.id).collect();
        let removed: Vec<i32> = existing.into_iter().filter(|id| !kept.contains(id)).collect();
        if !removed.is_empty() {
            tx.execute(
                &format!("DELETE FROM variable WHERE id IN ({})", placeholders(removed.len())),
                params_from_iter(removed.iter()),
            )?;
        }
        tx.commit()?;

        debug!(test_id, stored = stored.len(), removed = removed.len(), "Variables replaced");
        Ok((stored, removed))
    }
}

// --- DATAPOINTS ---

#[async_trait]
impl DatapointStore for DuckDBStore {
    async fn upsert(&self, datapoints: &[Datapoint]) -> Result<(), ChangewatchError> {
        if datapoints.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare("INSERT OR REPLACE INTO datapoint VALUES (?, ?, ?, ?, ?, ?)")?;
            for dp in datapoints {
                stmt.execute(params![
                    dp.variable_id,
                    dp.dataset_id,
                    dp.run_id,
                    dp.ordinal,
                    dp.timestamp.timestamp_millis(),
                    dp.value
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    async fn remove(&self, variable_id: i32, dataset_id: i32) -> Result<(), ChangewatchError> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM datapoint WHERE variable_id = ? AND dataset_id = ?",
            params![variable_id, dataset_id],
        )?;
        Ok(())
    }

    async fn history(&self, variable_id: i32) -> Result<Vec<Datapoint>, ChangewatchError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT variable_id, dataset_id, run_id, ordinal, ts, value FROM datapoint
             WHERE variable_id = ? ORDER BY ts, run_id, ordinal, dataset_id",
        )?;
        let rows = stmt.query_map(params![variable_id], |row| {
            Ok(Datapoint {
                variable_id: row.get(0)?,
                dataset_id: row.get(1)?,
                run_id: row.get(2)?,
                ordinal: row.get(3)?,
                timestamp: from_millis(row.get(4)?),
                value: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    async fn last_timestamps(
        &self,
        variable_ids: &[i32],
    ) -> Result<Vec<DatapointLastTimestamp>, ChangewatchError> {
        if variable_ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT variable_id, MAX(ts) FROM datapoint WHERE variable_id IN ({})
             GROUP BY variable_id ORDER BY variable_id",
            placeholders(variable_ids.len())
        ))?;
        let rows = stmt.query_map(params_from_iter(variable_ids.iter()), |row| {
            Ok(DatapointLastTimestamp {
                variable: row.get(0)?,
                timestamp: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    async fn delete_for_variables(&self, variable_ids: &[i32]) -> Result<(), ChangewatchError> {
        if variable_ids.is_empty() {
            return Ok(());
        }
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "DELETE FROM datapoint WHERE variable_id IN ({})",
                placeholders(variable_ids.len())
            ),
            params_from_iter(variable_ids.iter()),
        )?;
        Ok(())
    }
}

// --- CHANGES ---

#[async_trait]
impl ChangeStore for DuckDBStore {
    async fn upsert(
        &self,
        variable_id: i32,
        trigger: &TriggerPosition,
        evidence: &ChangeEvidence,
    ) -> Result<UpsertOutcome, ChangewatchError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let tombstone: Option<f64> = tx
            .query_row(
                "SELECT value FROM change_tombstone WHERE variable_id = ? AND dataset_id = ?",
                params![variable_id, trigger.dataset_id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(value) = tombstone {
            let stone = Tombstone {
                variable_id,
                dataset_id: trigger.dataset_id,
                value,
            };
            if stone.suppresses(trigger) {
                return Ok(UpsertOutcome::Suppressed);
            }
            tx.execute(
                "DELETE FROM change_tombstone WHERE variable_id = ? AND dataset_id = ?",
                params![variable_id, trigger.dataset_id],
            )?;
        }

        let existing: Option<i32> = tx
            .query_row(
                "SELECT id FROM variable_change WHERE variable_id = ? AND dataset_id = ?",
                params![variable_id, trigger.dataset_id],
                |row| row.get(0),
            )
            .optional()?;

        let outcome = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE variable_change SET run_id = ?, ts = ?, value = ?, model = ?, magnitude = ?,
                     confidence = ?, detail = ? WHERE id = ?",
                    params![
                        trigger.run_id,
                        trigger.timestamp.timestamp_millis(),
                        trigger.value,
                        evidence.model,
                        evidence.magnitude,
                        evidence.confidence,
                        evidence.detail,
                        id
                    ],
                )?;
                UpsertOutcome::Updated(id)
            }
            None => {
                let change = Change::detected(variable_id, trigger, evidence.clone());
                let id: i32 = tx.query_row(
                    "SELECT CAST(nextval('change_seq') AS INTEGER)",
                    [],
                    |row| row.get(0),
                )?;
                tx.execute(
                    &format!(
                        "INSERT INTO variable_change ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                        CHANGE_COLUMNS
                    ),
                    params![
                        id,
                        change.variable_id,
                        change.dataset_id,
                        change.run_id,
                        change.timestamp.timestamp_millis(),
                        change.value,
                        change.confirmed,
                        change.description,
                        change.evidence.model,
                        change.evidence.magnitude,
                        change.evidence.confidence,
                        change.evidence.detail
                    ],
                )?;
                UpsertOutcome::Inserted(id)
            }
        };
        tx.commit()?;
        Ok(outcome)
    }

    async fn list(&self, variable_id: i32) -> Result<Vec<Change>, ChangewatchError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM variable_change WHERE variable_id = ? ORDER BY ts, id",
            CHANGE_COLUMNS
        ))?;
        let rows = stmt.query_map(params![variable_id], change_from_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    async fn get(&self, change_id: i32) -> Result<Option<Change>, ChangewatchError> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                &format!("SELECT {} FROM variable_change WHERE id = ?", CHANGE_COLUMNS),
                params![change_id],
                change_from_row,
            )
            .optional()?)
    }

    async fn delete(&self, change_id: i32) -> Result<bool, ChangewatchError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let slot: Option<(i32, i32, f64)> = tx
            .query_row(
                "SELECT variable_id, dataset_id, value FROM variable_change WHERE id = ?",
                params![change_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        let Some((variable_id, dataset_id, value)) = slot else {
            return Ok(false);
        };

        tx.execute("DELETE FROM variable_change WHERE id = ?", params![change_id])?;
        tx.execute(
            "INSERT OR REPLACE INTO change_tombstone VALUES (?, ?, ?)",
            params![variable_id, dataset_id, value],
        )?;
        tx.commit()?;
        Ok(true)
    }

    async fn update(
        &self,
        change_id: i32,
        patch: &ChangePatch,
    ) -> Result<Option<Change>, ChangewatchError> {
        let Some(mut change) = self.get(change_id).await? else {
            return Ok(None);
        };
        patch.apply(&mut change);

        let conn = self.conn()?;
        conn.execute(
            "UPDATE variable_change SET confirmed = ?, description = ? WHERE id = ?",
            params![change.confirmed, change.description, change_id],
        )?;
        Ok(Some(change))
    }

    async fn prune(
        &self,
        variable_id: i32,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        keep: &[i32],
    ) -> Result<usize, ChangewatchError> {
        let conn = self.conn()?;
        let candidates: Vec<(i32, i32, i64)> = {
            let mut stmt = conn.prepare(
                "SELECT id, dataset_id, ts FROM variable_change WHERE variable_id = ? AND NOT confirmed",
            )?;
            let rows = stmt.query_map(params![variable_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?;
            rows.collect::<Result<_, _>>()?
        };

        let doomed: Vec<i32> = candidates
            .into_iter()
            .filter(|(_, dataset_id, ts)| {
                !keep.contains(dataset_id) && dataset::in_window(from_millis(*ts), from, to)
            })
            .map(|(id, _, _)| id)
            .collect();
        if doomed.is_empty() {
            return Ok(0);
        }
        conn.execute(
            &format!("DELETE FROM variable_change WHERE id IN ({})", placeholders(doomed.len())),
            params_from_iter(doomed.iter()),
        )?;
        Ok(doomed.len())
    }

    async fn delete_for_variables(&self, variable_ids: &[i32]) -> Result<(), ChangewatchError> {
        if variable_ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for table in ["variable_change", "change_tombstone"] {
            tx.execute(
                &format!(
                    "DELETE FROM {} WHERE variable_id IN ({})",
                    table,
                    placeholders(variable_ids.len())
                ),
                params_from_iter(variable_ids.iter()),
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

// --- CALCULATION LOG ---

#[async_trait]
impl CalculationLogSink for DuckDBStore {
    async fn append(&self, test_id: i32, entry: CalculationLog) -> Result<(), ChangewatchError> {
        self.append_batch(test_id, vec![entry]).await
    }

    async fn append_batch(
        &self,
        test_id: i32,
        entries: Vec<CalculationLog>,
    ) -> Result<(), ChangewatchError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO calculation_log VALUES (nextval('calculation_log_seq'), ?, ?, ?, ?, ?, ?)",
            )?;
            for entry in &entries {
                stmt.execute(params![
                    test_id,
                    entry.dataset_id,
                    entry.variable_id,
                    entry.level.as_str(),
                    entry.message,
                    entry.timestamp.timestamp_millis()
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    async fn query(
        &self,
        test_id: i32,
        page: u32,
        limit: u32,
    ) -> Result<Vec<CalculationLog>, ChangewatchError> {
        let (offset, limit) = page_bounds(page, limit);
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, test_id, dataset_id, variable_id, level, message, ts
             FROM calculation_log WHERE test_id = ? ORDER BY id DESC LIMIT ? OFFSET ?",
        )?;
        let rows = stmt.query_map(params![test_id, limit as i64, offset as i64], |row| {
            let level: String = row.get(4)?;
            Ok(CalculationLog {
                id: row.get(0)?,
                test_id: row.get(1)?,
                dataset_id: row.get(2)?,
                variable_id: row.get(3)?,
                level: LogLevel::parse(&level),
                message: row.get(5)?,
                timestamp: from_millis(row.get(6)?),
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    async fn count(&self, test_id: i32) -> Result<u64, ChangewatchError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM calculation_log WHERE test_id = ?",
            params![test_id],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use anyhow::Result;
    use chrono::Duration;
    use serde_json::json;

    fn trigger(dataset_id: i32, value: f64) -> TriggerPosition {
        TriggerPosition {
            dataset_id,
            run_id: dataset_id * 10,
            timestamp: DateTime::<Utc>::UNIX_EPOCH + Duration::hours(dataset_id as i64),
            value,
        }
    }

    fn evidence(detail: &str) -> ChangeEvidence {
        ChangeEvidence {
            model: "relativeDifference".into(),
            magnitude: 3.76,
            confidence: None,
            detail: detail.into(),
        }
    }

    #[tokio::test]
    async fn test_variables_replace_keeps_ids_and_reports_removed() -> Result<()> {
        let store = DuckDBStore::in_memory()?;
        let p99 = Variable::new("p99", vec![LabelBinding::new("p99", "urn:latency:1", "$.p99")])
            .with_detection("relativeDifference", json!({ "threshold": 0.1 }));
        let p50 = Variable::new("p50", vec![LabelBinding::new("p50", "urn:latency:1", "$.p50")]);

        let (stored, removed) = store.replace(7, vec![p99, p50]).await?;
        assert!(removed.is_empty());
        let p99_id = stored[0].id.unwrap();

        let mut keep = stored[0].clone();
        keep.order = 5;
        let (stored, removed) = store.replace(7, vec![keep]).await?;
        assert_eq!(stored[0].id, Some(p99_id));
        assert_eq!(removed.len(), 1);

        let loaded = store.variables(7).await?;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].order, 5);
        assert_eq!(loaded[0].change_detection[0].config, json!({ "threshold": 0.1 }));
        assert_eq!(store.variable(p99_id).await?.map(|v| v.name), Some("p99".into()));
        Ok(())
    }

    #[tokio::test]
    async fn test_datapoint_history_is_chronological() -> Result<()> {
        let store = DuckDBStore::in_memory()?;
        let at = |h: i64| DateTime::<Utc>::UNIX_EPOCH + Duration::hours(h);
        let dp = |dataset_id: i32, h: i64, value: f64| Datapoint {
            variable_id: 1,
            dataset_id,
            run_id: dataset_id,
            ordinal: 0,
            timestamp: at(h),
            value,
        };
        DatapointStore::upsert(&store, &[dp(3, 3, 30.0), dp(1, 1, 10.0), dp(2, 2, 20.0)]).await?;
        DatapointStore::upsert(&store, &[dp(2, 2, 25.0)]).await?;
        DatapointStore::remove(&store, 1, 3).await?;

        let values: Vec<f64> = store.history(1).await?.iter().map(|d| d.value).collect();
        assert_eq!(values, vec![10.0, 25.0]);

        let last = store.last_timestamps(&[1, 2]).await?;
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].timestamp, at(2).timestamp_millis());
        Ok(())
    }

    #[tokio::test]
    async fn test_datapoints_of_one_run_follow_ordinal() -> Result<()> {
        let store = DuckDBStore::in_memory()?;
        let start = DateTime::<Utc>::UNIX_EPOCH;
        let dp = |dataset_id: i32, ordinal: i32| Datapoint {
            variable_id: 1,
            dataset_id,
            run_id: 40,
            ordinal,
            timestamp: start,
            value: 1.0,
        };
        DatapointStore::upsert(&store, &[dp(8, 1), dp(9, 0), dp(7, 2)]).await?;

        let history = store.history(1).await?;
        let ids: Vec<i32> = history.iter().map(|d| d.dataset_id).collect();
        assert_eq!(ids, vec![9, 8, 7]);
        assert_eq!(history[1].ordinal, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_change_slot_upsert_and_tombstone() -> Result<()> {
        let store = DuckDBStore::in_memory()?;
        let first = ChangeStore::upsert(&store, 1, &trigger(4, 50.0), &evidence("a")).await?;
        let UpsertOutcome::Inserted(id) = first else {
            panic!("expected insert, got {:?}", first);
        };

        store
            .update(id, &ChangePatch { confirmed: Some(true), description: Some("known".into()) })
            .await?;
        let again = ChangeStore::upsert(&store, 1, &trigger(4, 50.0), &evidence("b")).await?;
        assert_eq!(again, UpsertOutcome::Updated(id));

        let change = store.get(id).await?.expect("change exists");
        assert!(change.confirmed);
        assert_eq!(change.description, "known");
        assert_eq!(change.evidence.detail, "b");

        assert!(ChangeStore::delete(&store, id).await?);
        let suppressed = ChangeStore::upsert(&store, 1, &trigger(4, 50.0), &evidence("c")).await?;
        assert_eq!(suppressed, UpsertOutcome::Suppressed);
        let revived = ChangeStore::upsert(&store, 1, &trigger(4, 55.0), &evidence("d")).await?;
        assert!(matches!(revived, UpsertOutcome::Inserted(_)));
        Ok(())
    }

    #[tokio::test]
    async fn test_prune_respects_window_and_keep() -> Result<()> {
        let store = DuckDBStore::in_memory()?;
        for ds in 1..=3 {
            ChangeStore::upsert(&store, 1, &trigger(ds, 10.0 * ds as f64), &evidence("x")).await?;
        }
        let from = DateTime::<Utc>::UNIX_EPOCH + Duration::hours(2);
        let pruned = store.prune(1, Some(from), None, &[3]).await?;
        assert_eq!(pruned, 1);

        let left: Vec<i32> = store.list(1).await?.iter().map(|c| c.dataset_id).collect();
        assert_eq!(left, vec![1, 3]);
        Ok(())
    }

    #[tokio::test]
    async fn test_log_paging_and_count() -> Result<()> {
        let store = DuckDBStore::in_memory()?;
        let entries = (0..5)
            .map(|i| CalculationLog::new(9, LogLevel::Warning, format!("entry {}", i)))
            .collect();
        store.append_batch(9, entries).await?;

        assert_eq!(store.count(9).await?, 5);
        assert_eq!(store.count(10).await?, 0);
        let page = store.query(9, 1, 2).await?;
        let messages: Vec<&str> = page.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["entry 2", "entry 1"]);
        assert_eq!(page[0].level, LogLevel::Warning);
        Ok(())
    }
}
