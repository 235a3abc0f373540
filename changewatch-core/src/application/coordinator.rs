// changewatch-core/src/application/coordinator.rs

// Bulk recalculation of a test. One batch per test at a time: a new request
// cancels the running batch and replaces its status.
//
// Phase 1 evaluates every variable on every dataset with bounded concurrency
// and persists the datapoints. Phase 2 folds each variable's ordered history
// through its detectors and writes the changes that fall in the window.

use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::application::calculation::VariableCalculator;
use crate::application::change_writer::{ChangeWriter, with_retry};
use crate::application::detection::fold_history;
use crate::application::ports::ExpressionEngine;
use crate::domain::change::UpsertOutcome;
use crate::domain::dataset::{self, Datapoint, DatasetRef};
use crate::domain::log::{CalculationLog, LogLevel};
use crate::domain::project::RecalculationConfig;
use crate::domain::status::RecalculationStatus;
use crate::domain::variable::Variable;
use crate::error::ChangewatchError;
use crate::ports::{
    CalculationLogSink, ChangeStore, DatapointStore, DatasetProvider, FailureNotifier,
    VariableStore,
};

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything the engine talks to.
#[derive(Clone)]
pub struct EnginePorts {
    pub datasets: Arc<dyn DatasetProvider>,
    pub variables: Arc<dyn VariableStore>,
    pub datapoints: Arc<dyn DatapointStore>,
    pub changes: Arc<dyn ChangeStore>,
    pub logs: Arc<dyn CalculationLogSink>,
    pub notifier: Arc<dyn FailureNotifier>,
    pub expressions: Arc<dyn ExpressionEngine>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecalculationRequest {
    pub test_id: i32,
    pub notify: bool,
    pub debug: bool,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

struct Batch {
    generation: u64,
    cancelled: AtomicBool,
    status: watch::Sender<RecalculationStatus>,
}

impl Batch {
    fn new(generation: u64) -> Self {
        let (status, _) = watch::channel(RecalculationStatus::default());
        Self {
            generation,
            cancelled: AtomicBool::new(false),
            status,
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Applies a mutation unless the batch was superseded.
    fn update(&self, mutate: impl FnOnce(&mut RecalculationStatus)) {
        if !self.is_cancelled() {
            self.status.send_modify(mutate);
        }
    }

    fn supersede(&self) {
        self.cancelled.store(true, Ordering::Release);
        // Releases anyone waiting on this batch
        self.status.send_modify(|s| s.done = true);
    }

    fn snapshot(&self) -> RecalculationStatus {
        self.status.borrow().clone()
    }
}

/// Aggregated result of evaluating all variables on one dataset.
#[derive(Debug, Default)]
struct DatasetOutcome {
    dataset_id: i32,
    without_accessor: bool,
    without_value: bool,
    errors: u32,
}

pub struct RecalculationCoordinator {
    ports: EnginePorts,
    calculator: VariableCalculator,
    writer: ChangeWriter,
    settings: RecalculationConfig,
    subject_prefix: String,
    batches: Mutex<HashMap<i32, Arc<Batch>>>,
    generation: AtomicU64,
}

impl RecalculationCoordinator {
    pub fn new(
        ports: EnginePorts,
        settings: RecalculationConfig,
        subject_prefix: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            calculator: VariableCalculator::new(ports.expressions.clone()),
            writer: ChangeWriter::new(ports.changes.clone(), settings.retry.clone()),
            ports,
            settings,
            subject_prefix: subject_prefix.into(),
            batches: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        })
    }

    fn batches(&self) -> MutexGuard<'_, HashMap<i32, Arc<Batch>>> {
        self.batches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current(&self, test_id: i32) -> Option<Arc<Batch>> {
        self.batches().get(&test_id).cloned()
    }

    /// Starts a batch in the background and returns its generation number.
    /// A running batch of the same test is cancelled; its status is dropped.
    pub fn recalculate(self: &Arc<Self>, request: RecalculationRequest) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let batch = Arc::new(Batch::new(generation));

        let previous = self.batches().insert(request.test_id, batch.clone());
        if let Some(previous) = previous {
            if !previous.snapshot().done {
                info!(
                    test_id = request.test_id,
                    superseded = previous.generation,
                    generation,
                    "Superseding running recalculation"
                );
            }
            previous.supersede();
        }

        let coordinator = Arc::clone(self);
        let supervised = batch.clone();
        let test_id = request.test_id;
        tokio::spawn(async move {
            let worker = tokio::spawn(async move {
                coordinator.run(request, batch).await;
            });
            // A dead worker must not leave waiters hanging
            if let Err(e) = worker.await {
                error!(test_id, generation, error = %e, "Recalculation task died");
                supervised.update(RecalculationStatus::fail);
            }
        });
        generation
    }

    /// Snapshot of the latest batch of a test.
    pub fn progress(&self, test_id: i32) -> Option<RecalculationStatus> {
        self.current(test_id).map(|batch| batch.snapshot())
    }

    /// Waits until the latest batch of a test is done, following supersedes.
    pub async fn wait(&self, test_id: i32) -> Option<RecalculationStatus> {
        loop {
            let batch = self.current(test_id)?;
            let mut updates = batch.status.subscribe();
            // The sender lives in `batch`, so this only ends on `done`
            let _ = updates.wait_for(|s| s.done).await;
            if !batch.is_cancelled() {
                return Some(batch.snapshot());
            }
        }
    }

    #[instrument(skip(self, batch), fields(test_id = request.test_id, generation = batch.generation))]
    async fn run(&self, request: RecalculationRequest, batch: Arc<Batch>) {
        let started = Instant::now();

        let (variables, datasets) = match self.plan(&request).await {
            Ok(plan) => plan,
            Err(e) => {
                self.abort(&request, &batch, e).await;
                return;
            }
        };
        let total = datasets.len() as u32;
        batch.update(|s| *s = RecalculationStatus::started(total));
        info!(
            datasets = total,
            variables = variables.len(),
            "Recalculation started"
        );

        // Phase 1: datapoints
        let workers = self.settings.workers.max(1);
        let pending: Vec<_> = datasets
            .iter()
            .map(|dataset| self.evaluate_dataset(&request, dataset, &variables, &batch))
            .collect();
        let mut evaluations = futures::stream::iter(pending).buffer_unordered(workers);
        while let Some(outcome) = evaluations.next().await {
            if batch.is_cancelled() {
                info!("Recalculation superseded, stopping");
                return;
            }
            batch.update(|s| {
                s.record_dataset();
                s.errors += outcome.errors;
                if outcome.without_accessor {
                    s.runs_without_accessor.insert(outcome.dataset_id);
                }
                if outcome.without_value {
                    s.runs_without_value.insert(outcome.dataset_id);
                }
            });
        }
        drop(evaluations);

        // Phase 2: changes
        let pending: Vec<_> = variables
            .iter()
            .map(|variable| self.detect_changes(&request, variable, &batch))
            .collect();
        let mut detections = futures::stream::iter(pending).buffer_unordered(workers);
        while let Some(errors) = detections.next().await {
            if batch.is_cancelled() {
                info!("Recalculation superseded, stopping");
                return;
            }
            batch.update(|s| s.errors += errors);
        }
        drop(detections);

        let status = batch.snapshot();
        if request.notify && status.has_failures() && !batch.is_cancelled() {
            self.notify_failures(request.test_id, &status).await;
        }
        batch.update(RecalculationStatus::finish);
        info!(
            errors = status.errors,
            without_accessor = status.runs_without_accessor.len(),
            without_value = status.runs_without_value.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Recalculation finished"
        );
    }

    async fn plan(
        &self,
        request: &RecalculationRequest,
    ) -> Result<(Vec<Variable>, Vec<DatasetRef>), ChangewatchError> {
        let variables = self.ports.variables.variables(request.test_id).await?;
        let mut datasets = self
            .ports
            .datasets
            .list_datasets(request.test_id, request.from, request.to)
            .await?;
        datasets.sort_by(DatasetRef::chronological);
        Ok((variables, datasets))
    }

    /// Infrastructure fault: the batch ends failed.
    async fn abort(&self, request: &RecalculationRequest, batch: &Batch, cause: ChangewatchError) {
        error!(error = %cause, "Recalculation aborted");
        let entry = CalculationLog::new(
            request.test_id,
            LogLevel::Error,
            format!("Recalculation aborted: {}", cause),
        );
        if let Err(e) = self.ports.logs.append(request.test_id, entry).await {
            warn!(error = %e, "Could not record the abort in the calculation log");
        }

        batch.update(RecalculationStatus::fail);
        if request.notify && !batch.is_cancelled() {
            self.notify_failures(request.test_id, &batch.snapshot()).await;
        }
    }

    async fn evaluate_dataset(
        &self,
        request: &RecalculationRequest,
        dataset: &DatasetRef,
        variables: &[Variable],
        batch: &Batch,
    ) -> DatasetOutcome {
        let test_id = request.test_id;
        let mut outcome = DatasetOutcome {
            dataset_id: dataset.id,
            ..DatasetOutcome::default()
        };
        if batch.is_cancelled() {
            return outcome;
        }

        let mut logs = Vec::new();
        let document = match self.ports.datasets.label_data(dataset.id).await {
            Ok(document) => document,
            Err(e) => {
                warn!(dataset_id = dataset.id, error = %e, "Cannot load label data");
                outcome.errors += 1;
                let mut entry = CalculationLog::new(
                    test_id,
                    LogLevel::Error,
                    format!("Cannot load label data of dataset {}: {}", dataset.id, e),
                );
                entry.dataset_id = Some(dataset.id);
                logs.push(entry);
                outcome.errors += self.flush_logs(test_id, logs).await;
                return outcome;
            }
        };

        let mut datapoints = Vec::new();
        let mut stale = Vec::new();
        for variable in variables {
            let Some(variable_id) = variable.id else {
                continue;
            };
            let evaluation = self.calculator.evaluate(variable, &document);
            match &evaluation.result {
                Ok(value) => {
                    datapoints.push(Datapoint {
                        variable_id,
                        dataset_id: dataset.id,
                        run_id: dataset.run_id,
                        ordinal: dataset.ordinal,
                        timestamp: dataset.start,
                        value: *value,
                    });
                    if request.debug {
                        logs.push(
                            CalculationLog::new(test_id, LogLevel::Debug, evaluation.trace(variable))
                                .for_evaluation(dataset.id, variable_id),
                        );
                    }
                }
                Err(e) => {
                    if e.is_missing_value() {
                        outcome.without_value = true;
                    } else {
                        outcome.without_accessor = true;
                    }
                    debug!(dataset_id = dataset.id, variable = %variable.name, error = %e, "No datapoint");
                    stale.push(variable_id);
                    logs.push(
                        CalculationLog::new(test_id, LogLevel::Warning, evaluation.trace(variable))
                            .for_evaluation(dataset.id, variable_id),
                    );
                }
            }
        }

        if batch.is_cancelled() {
            return outcome;
        }

        let points = &datapoints;
        if let Err(e) = with_retry(&self.settings.retry, "store datapoints", || {
            self.ports.datapoints.upsert(points)
        })
        .await
        {
            error!(dataset_id = dataset.id, error = %e, "Datapoints lost");
            outcome.errors += 1;
        }
        // A value that disappeared must not linger in the history
        for variable_id in stale {
            if let Err(e) = with_retry(&self.settings.retry, "remove datapoint", || {
                self.ports.datapoints.remove(variable_id, dataset.id)
            })
            .await
            {
                error!(dataset_id = dataset.id, variable_id, error = %e, "Stale datapoint kept");
                outcome.errors += 1;
            }
        }

        outcome.errors += self.flush_logs(test_id, logs).await;
        outcome
    }

    /// Folds one variable's history and writes its changes. Returns the
    /// number of failures.
    async fn detect_changes(
        &self,
        request: &RecalculationRequest,
        variable: &Variable,
        batch: &Batch,
    ) -> u32 {
        let Some(variable_id) = variable.id else {
            return 0;
        };
        if batch.is_cancelled() {
            return 0;
        }

        let history = match with_retry(&self.settings.retry, "load history", || {
            self.ports.datapoints.history(variable_id)
        })
        .await
        {
            Ok(history) => history,
            Err(e) => {
                error!(variable_id, error = %e, "Cannot load history");
                return 1;
            }
        };

        let outcome = fold_history(&variable.change_detection, &history);
        let mut errors = outcome.faults.len() as u32;
        let logs: Vec<CalculationLog> = outcome
            .faults
            .iter()
            .map(|fault| {
                warn!(variable_id, error = %fault, "Detector fault");
                let mut entry = CalculationLog::new(
                    request.test_id,
                    LogLevel::Warning,
                    format!("Variable '{}': {}", variable.name, fault),
                );
                entry.variable_id = Some(variable_id);
                entry
            })
            .collect();

        if batch.is_cancelled() {
            return errors;
        }

        let mut keep = Vec::new();
        for detection in outcome
            .detections
            .iter()
            .filter(|d| dataset::in_window(d.trigger.timestamp, request.from, request.to))
        {
            keep.push(detection.trigger.dataset_id);
            match self.writer.write(variable_id, detection).await {
                Ok(UpsertOutcome::Suppressed) => {
                    debug!(variable_id, dataset_id = detection.trigger.dataset_id, "Change suppressed by tombstone");
                }
                Ok(result) => debug!(variable_id, ?result, "Change recorded"),
                Err(e) => {
                    error!(variable_id, error = %e, "Change lost");
                    errors += 1;
                }
            }
        }

        match self
            .writer
            .prune(variable_id, request.from, request.to, &keep)
            .await
        {
            Ok(0) => {}
            Ok(pruned) => info!(variable_id, pruned, "Removed changes no longer detected"),
            Err(e) => {
                error!(variable_id, error = %e, "Cannot prune changes");
                errors += 1;
            }
        }

        errors + self.flush_logs(request.test_id, logs).await
    }

    /// Appends one dataset's (or variable's) log entries in a single batch.
    async fn flush_logs(&self, test_id: i32, logs: Vec<CalculationLog>) -> u32 {
        if logs.is_empty() {
            return 0;
        }
        match with_retry(&self.settings.retry, "append calculation log", || {
            self.ports.logs.append_batch(test_id, logs.clone())
        })
        .await
        {
            Ok(()) => 0,
            Err(e) => {
                error!(test_id, error = %e, "Calculation log entries lost");
                1
            }
        }
    }

    async fn notify_failures(&self, test_id: i32, status: &RecalculationStatus) {
        let subject = format!(
            "{} Recalculation of test {} had {} errors",
            self.subject_prefix, test_id, status.errors
        );
        let summary = status.summary(test_id);
        match tokio::time::timeout(
            NOTIFY_TIMEOUT,
            self.ports.notifier.notify(&subject, &summary),
        )
        .await
        {
            Ok(Ok(())) => info!(test_id, "Failure notification sent"),
            Ok(Err(e)) => warn!(test_id, error = %e, "Failure notification not delivered"),
            Err(_) => warn!(test_id, "Failure notification timed out"),
        }
    }
}
