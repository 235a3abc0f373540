// changewatch-core/src/domain/project/mod.rs

pub mod configuration;
pub use configuration::{NotificationConfig, ProjectConfig, RecalculationConfig, RetryConfig};
