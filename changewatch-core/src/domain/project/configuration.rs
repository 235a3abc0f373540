// src/domain/project/configuration.rs

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,

    /// Directory of dataset JSON files, relative to the project root.
    #[serde(rename = "datasets-path", default = "default_datasets_path")]
    pub datasets_path: String,

    /// DuckDB file holding variables, datapoints, changes and logs.
    /// `:memory:` keeps everything in process.
    #[serde(rename = "database-path", default = "default_database_path")]
    pub database_path: String,

    #[serde(default)]
    pub recalculation: RecalculationConfig,

    #[serde(default)]
    pub notifications: NotificationConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RecalculationConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for RecalculationConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RetryConfig {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(rename = "backoff-ms", default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl RetryConfig {
    /// Delay before retry number `attempt` (1-based): doubles each time.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.backoff_ms.saturating_mul(factor))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct NotificationConfig {
    /// Without an address failures are only logged.
    #[serde(rename = "admin-mail", default)]
    pub admin_mail: Option<String>,
    #[serde(rename = "subject-prefix", default = "default_subject_prefix")]
    pub subject_prefix: String,
    #[serde(rename = "spool-path", default = "default_spool_path")]
    pub spool_path: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            admin_mail: None,
            subject_prefix: default_subject_prefix(),
            spool_path: default_spool_path(),
        }
    }
}

fn default_version() -> String {
    "1.0".to_string()
}
fn default_datasets_path() -> String {
    "datasets".to_string()
}
fn default_database_path() -> String {
    "target/changewatch.duckdb".to_string()
}
fn default_workers() -> usize {
    8
}
fn default_attempts() -> u32 {
    3
}
fn default_backoff_ms() -> u64 {
    50
}
fn default_subject_prefix() -> String {
    "[Changewatch]".to_string()
}
fn default_spool_path() -> String {
    "target/outbox".to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let cfg: ProjectConfig = serde_yaml::from_str("name: demo").unwrap();
        assert_eq!(cfg.datasets_path, "datasets");
        assert_eq!(cfg.recalculation.workers, 8);
        assert_eq!(cfg.recalculation.retry.attempts, 3);
        assert_eq!(cfg.notifications.admin_mail, None);
    }

    #[test]
    fn test_kebab_case_keys() {
        let yaml = r#"
name: demo
database-path: ":memory:"
recalculation:
  workers: 2
  retry: { attempts: 5, backoff-ms: 10 }
notifications:
  admin-mail: ops@example.com
  subject-prefix: "[perf]"
"#;
        let cfg: ProjectConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.database_path, ":memory:");
        assert_eq!(cfg.recalculation.retry.backoff_ms, 10);
        assert_eq!(cfg.notifications.admin_mail.as_deref(), Some("ops@example.com"));
        assert_eq!(cfg.notifications.subject_prefix, "[perf]");
    }

    #[test]
    fn test_backoff_doubles() {
        let retry = RetryConfig::default();
        assert_eq!(retry.backoff(1), Duration::from_millis(50));
        assert_eq!(retry.backoff(2), Duration::from_millis(100));
        assert_eq!(retry.backoff(3), Duration::from_millis(200));
    }
}
