// changewatch-core/src/application/alerting.rs

// Entry point for callers (CLI, embedders). Variable management goes straight
// to the stores; recalculation is delegated to the coordinator.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::application::coordinator::{EnginePorts, RecalculationCoordinator, RecalculationRequest};
use crate::domain::change::{Change, ChangePatch};
use crate::domain::dashboard::Dashboard;
use crate::domain::dataset::DatapointLastTimestamp;
use crate::domain::detection::{self, ModelInfo};
use crate::domain::error::DomainError;
use crate::domain::log::CalculationLog;
use crate::domain::project::{NotificationConfig, RecalculationConfig};
use crate::domain::status::RecalculationStatus;
use crate::domain::variable::{ChangeDetection, Variable, validate_variable_set};
use crate::error::ChangewatchError;

pub struct AlertingService {
    ports: EnginePorts,
    coordinator: Arc<RecalculationCoordinator>,
}

impl AlertingService {
    pub fn new(
        ports: EnginePorts,
        recalculation: &RecalculationConfig,
        notifications: &NotificationConfig,
    ) -> Self {
        let coordinator = RecalculationCoordinator::new(
            ports.clone(),
            recalculation.clone(),
            notifications.subject_prefix.clone(),
        );
        Self { ports, coordinator }
    }

    // --- VARIABLES ---

    pub async fn variables(&self, test_id: i32) -> Result<Vec<Variable>, ChangewatchError> {
        self.ports.variables.variables(test_id).await
    }

    /// Replaces the full variable set of a test. Datapoints and changes of
    /// variables that disappear are deleted with them.
    #[instrument(skip(self, variables), fields(count = variables.len()))]
    pub async fn replace_variables(
        &self,
        test_id: i32,
        variables: Vec<Variable>,
    ) -> Result<Vec<Variable>, ChangewatchError> {
        let variables: Vec<Variable> = variables
            .into_iter()
            .map(|v| v.normalize(test_id))
            .collect();
        validate_variable_set(test_id, &variables)?;

        let (stored, removed) = self.ports.variables.replace(test_id, variables).await?;
        if !removed.is_empty() {
            self.ports.datapoints.delete_for_variables(&removed).await?;
            self.ports.changes.delete_for_variables(&removed).await?;
        }
        info!(
            test_id,
            stored = stored.len(),
            removed = removed.len(),
            "Variables replaced"
        );
        Ok(stored)
    }

    pub async fn dashboard(&self, test_id: i32) -> Result<Dashboard, ChangewatchError> {
        let variables = self.variables(test_id).await?;
        Ok(Dashboard::build(test_id, &variables))
    }

    /// Appends copies of another test's variables (optionally a single group).
    pub async fn copy_variables(
        &self,
        from_test: i32,
        to_test: i32,
        group: Option<&str>,
    ) -> Result<Vec<Variable>, ChangewatchError> {
        let copies = self
            .variables(from_test)
            .await?
            .into_iter()
            .filter(|v| group.is_none_or(|g| v.group.as_deref() == Some(g)))
            .map(|mut v| {
                v.id = None;
                for cd in &mut v.change_detection {
                    cd.id = None;
                }
                v
            });

        let mut target = self.variables(to_test).await?;
        target.extend(copies);
        self.replace_variables(to_test, target).await
    }

    /// Renames a group; an empty `to` ungroups the variables.
    pub async fn rename_group(
        &self,
        test_id: i32,
        from: &str,
        to: &str,
    ) -> Result<Vec<Variable>, ChangewatchError> {
        let variables = self
            .variables(test_id)
            .await?
            .into_iter()
            .map(|mut v| {
                if v.group.as_deref() == Some(from) {
                    v.group = Some(to.to_string());
                }
                v
            })
            .collect();
        self.replace_variables(test_id, variables).await
    }

    // --- CHANGES ---

    pub async fn changes(&self, variable_id: i32) -> Result<Vec<Change>, ChangewatchError> {
        self.ports.changes.list(variable_id).await
    }

    pub async fn update_change(
        &self,
        change_id: i32,
        patch: &ChangePatch,
    ) -> Result<Change, ChangewatchError> {
        self.ports
            .changes
            .update(change_id, patch)
            .await?
            .ok_or_else(|| DomainError::ChangeNotFound(change_id).into())
    }

    /// Deletes a change. The same value will not be reported again.
    pub async fn delete_change(&self, change_id: i32) -> Result<bool, ChangewatchError> {
        let deleted = self.ports.changes.delete(change_id).await?;
        if deleted {
            info!(change_id, "Change deleted");
        }
        Ok(deleted)
    }

    // --- RECALCULATION ---

    pub fn recalculate(
        &self,
        test_id: i32,
        notify: bool,
        debug: bool,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> u64 {
        self.coordinator.recalculate(RecalculationRequest {
            test_id,
            notify,
            debug,
            from,
            to,
        })
    }

    pub fn recalculate_progress(&self, test_id: i32) -> Option<RecalculationStatus> {
        self.coordinator.progress(test_id)
    }

    pub async fn wait_for_recalculation(&self, test_id: i32) -> Option<RecalculationStatus> {
        self.coordinator.wait(test_id).await
    }

    // --- LOGS & DATAPOINTS ---

    pub async fn calculation_log(
        &self,
        test_id: i32,
        page: u32,
        limit: u32,
    ) -> Result<Vec<CalculationLog>, ChangewatchError> {
        self.ports.logs.query(test_id, page, limit).await
    }

    pub async fn log_count(&self, test_id: i32) -> Result<u64, ChangewatchError> {
        self.ports.logs.count(test_id).await
    }

    pub async fn find_last_datapoints(
        &self,
        variable_ids: &[i32],
    ) -> Result<Vec<DatapointLastTimestamp>, ChangewatchError> {
        self.ports.datapoints.last_timestamps(variable_ids).await
    }

    // --- CATALOGUE ---

    pub fn models() -> Vec<ModelInfo> {
        detection::model_infos()
    }

    pub fn default_change_detection() -> Vec<ChangeDetection> {
        detection::default_change_detection()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::change::{ChangeEvidence, TriggerPosition};
    use crate::domain::dataset::Datapoint;
    use crate::domain::variable::LabelBinding;
    use crate::infrastructure::adapters::MemoryBackend;
    use crate::ports::{ChangeStore, DatapointStore};
    use anyhow::Result;

    fn service(backend: &MemoryBackend) -> AlertingService {
        AlertingService::new(
            backend.ports(),
            &RecalculationConfig::default(),
            &NotificationConfig::default(),
        )
    }

    fn var(name: &str, group: Option<&str>) -> Variable {
        let mut v = Variable::new(name, vec![LabelBinding::new("v", "urn:x:1", "$.v")]);
        v.group = group.map(str::to_string);
        v
    }

    #[tokio::test]
    async fn test_replace_assigns_ids_and_cascades_removals() -> Result<()> {
        let backend = MemoryBackend::new();
        let svc = service(&backend);

        let stored = svc
            .replace_variables(1, vec![var("p50", None), var("p99", None)])
            .await?;
        let p99 = stored.iter().find(|v| v.name == "p99").unwrap().id.unwrap();

        DatapointStore::upsert(
            backend.datapoints.as_ref(),
            &[Datapoint {
                variable_id: p99,
                dataset_id: 1,
                run_id: 1,
                ordinal: 0,
                timestamp: Utc::now(),
                value: 1.0,
            }],
        )
        .await?;
        let trigger = TriggerPosition {
            dataset_id: 1,
            run_id: 1,
            timestamp: Utc::now(),
            value: 1.0,
        };
        let evidence = ChangeEvidence {
            model: "fixedThreshold".into(),
            magnitude: 1.0,
            confidence: None,
            detail: "above".into(),
        };
        ChangeStore::upsert(backend.changes.as_ref(), p99, &trigger, &evidence).await?;

        let keep: Vec<Variable> = stored.into_iter().filter(|v| v.name == "p50").collect();
        svc.replace_variables(1, keep).await?;

        assert_eq!(svc.variables(1).await?.len(), 1);
        assert!(svc.changes(p99).await?.is_empty());
        assert!(svc.find_last_datapoints(&[p99]).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_replace_rejects_duplicates() -> Result<()> {
        let backend = MemoryBackend::new();
        let svc = service(&backend);
        let res = svc
            .replace_variables(1, vec![var("p99", Some("g")), var("p99", Some("g"))])
            .await;
        assert!(matches!(
            res,
            Err(ChangewatchError::Domain(DomainError::DuplicateVariable { .. }))
        ));
        assert!(svc.variables(1).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_copy_one_group_then_rename() -> Result<()> {
        let backend = MemoryBackend::new();
        let svc = service(&backend);
        svc.replace_variables(
            1,
            vec![var("read", Some("io")), var("write", Some("io")), var("cpu", None)],
        )
        .await?;

        let copied = svc.copy_variables(1, 2, Some("io")).await?;
        assert_eq!(copied.len(), 2);
        assert!(copied.iter().all(|v| v.test_id == 2 && v.id.is_some()));

        // Copying again collides on (group, name)
        assert!(svc.copy_variables(1, 2, Some("io")).await.is_err());

        let renamed = svc.rename_group(2, "io", "disk").await?;
        assert!(renamed.iter().all(|v| v.group.as_deref() == Some("disk")));

        let dashboard = svc.dashboard(1).await?;
        let names: Vec<&str> = dashboard.panels.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["cpu", "io"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_missing_change() -> Result<()> {
        let backend = MemoryBackend::new();
        let svc = service(&backend);
        let res = svc.update_change(99, &ChangePatch::default()).await;
        assert!(matches!(
            res,
            Err(ChangewatchError::Domain(DomainError::ChangeNotFound(99)))
        ));
        assert!(!svc.delete_change(99).await?);
        Ok(())
    }

    #[test]
    fn test_catalogue() {
        let models = AlertingService::models();
        assert_eq!(models.len(), 3);
        let defaults = AlertingService::default_change_detection();
        assert_eq!(defaults[0].model, "relativeDifference");
    }
}
