// changewatch-core/src/domain/log.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "debug" => LogLevel::Debug,
            "warning" => LogLevel::Warning,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

/// One diagnostic trace line of a calculation. `id` is assigned by the sink
/// and gives the most-recent-first order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CalculationLog {
    #[serde(default)]
    pub id: i64,
    pub test_id: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable_id: Option<i32>,
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl CalculationLog {
    pub fn new(test_id: i32, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            id: 0,
            test_id,
            dataset_id: None,
            variable_id: None,
            level,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn for_evaluation(mut self, dataset_id: i32, variable_id: i32) -> Self {
        self.dataset_id = Some(dataset_id);
        self.variable_id = Some(variable_id);
        self
    }
}

/// Offset/limit pair for 0-based paging.
pub fn page_bounds(page: u32, limit: u32) -> (usize, usize) {
    let limit = limit.max(1) as usize;
    (page as usize * limit, limit)
}
