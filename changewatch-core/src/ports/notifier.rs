// changewatch-core/src/ports/notifier.rs

use async_trait::async_trait;

use crate::error::ChangewatchError;

/// Operator side channel. Constructed once and injected; callers treat
/// delivery as best-effort.
#[async_trait]
pub trait FailureNotifier: Send + Sync {
    async fn notify(&self, subject: &str, summary: &str) -> Result<(), ChangewatchError>;
}
