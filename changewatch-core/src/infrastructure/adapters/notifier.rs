// changewatch-core/src/infrastructure/adapters/notifier.rs

use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{error, info};

use crate::domain::project::NotificationConfig;
use crate::error::ChangewatchError;
use crate::infrastructure::error::InfrastructureError;
use crate::infrastructure::fs::atomic_write;
use crate::ports::FailureNotifier;

/// Reports failures to the log only.
pub struct TracingNotifier;

#[async_trait]
impl FailureNotifier for TracingNotifier {
    async fn notify(&self, subject: &str, summary: &str) -> Result<(), ChangewatchError> {
        error!(subject, summary, "Recalculation failures");
        Ok(())
    }
}

/// Drops one RFC 822 style message per notification into a spool directory,
/// where a mail relay picks it up.
pub struct SpoolNotifier {
    spool_dir: PathBuf,
    recipient: String,
    sequence: AtomicU64,
}

impl SpoolNotifier {
    pub fn new(spool_dir: impl Into<PathBuf>, recipient: impl Into<String>) -> Self {
        Self {
            spool_dir: spool_dir.into(),
            recipient: recipient.into(),
            sequence: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl FailureNotifier for SpoolNotifier {
    async fn notify(&self, subject: &str, summary: &str) -> Result<(), ChangewatchError> {
        let now = Utc::now();
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let path = self
            .spool_dir
            .join(format!("{}-{:04}.eml", now.format("%Y%m%dT%H%M%S%3f"), sequence));
        let message = format!(
            "To: {}\r\nSubject: {}\r\nDate: {}\r\n\r\n{}\r\n",
            self.recipient,
            subject,
            now.to_rfc2822(),
            summary
        );

        let spool_dir = self.spool_dir.clone();
        let target = path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), InfrastructureError> {
            std::fs::create_dir_all(&spool_dir)?;
            atomic_write(&target, message)
        })
        .await
        .map_err(|e| InfrastructureError::NotifierFailure(e.to_string()))??;

        info!(path = ?path, "Failure notification spooled");
        Ok(())
    }
}

/// Spool notifier when an admin address is configured, log-only otherwise.
pub fn notifier_for(config: &NotificationConfig, project_dir: &Path) -> Arc<dyn FailureNotifier> {
    match &config.admin_mail {
        Some(recipient) => Arc::new(SpoolNotifier::new(
            project_dir.join(&config.spool_path),
            recipient.clone(),
        )),
        None => Arc::new(TracingNotifier),
    }
}
