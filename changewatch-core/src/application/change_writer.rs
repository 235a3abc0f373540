// changewatch-core/src/application/change_writer.rs

use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::application::detection::Detection;
use crate::domain::change::UpsertOutcome;
use crate::domain::project::RetryConfig;
use crate::error::ChangewatchError;
use crate::ports::ChangeStore;

/// Runs a store operation, retrying with exponential backoff.
/// Exhaustion turns the last error into `PersistenceExhausted`.
pub async fn with_retry<T, F, Fut>(
    retry: &RetryConfig,
    operation: &str,
    mut op: F,
) -> Result<T, ChangewatchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ChangewatchError>>,
{
    let attempts = retry.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= attempts => {
                warn!(operation, attempts, error = %e, "Giving up");
                return Err(ChangewatchError::PersistenceExhausted {
                    attempts,
                    reason: format!("{}: {}", operation, e),
                });
            }
            Err(e) => {
                let delay = retry.backoff(attempt);
                debug!(operation, attempt, ?delay, error = %e, "Retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Writes detections into the change store with idempotent slot semantics.
#[derive(Clone)]
pub struct ChangeWriter {
    store: Arc<dyn ChangeStore>,
    retry: RetryConfig,
}

impl ChangeWriter {
    pub fn new(store: Arc<dyn ChangeStore>, retry: RetryConfig) -> Self {
        Self { store, retry }
    }

    pub async fn write(
        &self,
        variable_id: i32,
        detection: &Detection,
    ) -> Result<UpsertOutcome, ChangewatchError> {
        with_retry(&self.retry, "upsert change", || {
            self.store
                .upsert(variable_id, &detection.trigger, &detection.evidence)
        })
        .await
    }

    /// Removes unconfirmed changes in the window that were not detected again.
    pub async fn prune(
        &self,
        variable_id: i32,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        keep: &[i32],
    ) -> Result<usize, ChangewatchError> {
        with_retry(&self.retry, "prune changes", || {
            self.store.prune(variable_id, from, to, keep)
        })
        .await
    }
}
