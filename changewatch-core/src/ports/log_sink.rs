// changewatch-core/src/ports/log_sink.rs

use async_trait::async_trait;

use crate::domain::log::CalculationLog;
use crate::error::ChangewatchError;

#[async_trait]
pub trait CalculationLogSink: Send + Sync {
    async fn append(&self, test_id: i32, entry: CalculationLog) -> Result<(), ChangewatchError>;

    /// Entries are durable, and visible to `count`, once this returns.
    async fn append_batch(
        &self,
        test_id: i32,
        entries: Vec<CalculationLog>,
    ) -> Result<(), ChangewatchError>;

    /// Most recent first, 0-based pages.
    async fn query(
        &self,
        test_id: i32,
        page: u32,
        limit: u32,
    ) -> Result<Vec<CalculationLog>, ChangewatchError>;

    async fn count(&self, test_id: i32) -> Result<u64, ChangewatchError>;
}
