// changewatch-core/src/ports/dataset.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::dataset::DatasetRef;
use crate::error::ChangewatchError;

#[async_trait]
pub trait DatasetProvider: Send + Sync {
    /// Datasets of a test whose start falls in `[from, to]`. Either side may be open.
    async fn list_datasets(
        &self,
        test_id: i32,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<DatasetRef>, ChangewatchError>;

    /// Label document of one dataset (schema-tagged objects).
    async fn label_data(&self, dataset_id: i32) -> Result<Value, ChangewatchError>;
}
