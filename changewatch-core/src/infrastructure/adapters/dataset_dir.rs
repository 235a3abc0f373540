// changewatch-core/src/infrastructure/adapters/dataset_dir.rs

// Datasets stored as one JSON file each:
//   { "id": 1, "testId": 7, "runId": 100, "start": "...", "stop": "...",
//     "data": [ { "$schema": "urn:latency:1", "p99": 12.5 } ] }

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};
use walkdir::WalkDir;

use crate::domain::dataset::DatasetRef;
use crate::domain::error::DomainError;
use crate::error::ChangewatchError;
use crate::infrastructure::error::InfrastructureError;
use crate::ports::DatasetProvider;

#[derive(Deserialize)]
struct DatasetFile {
    #[serde(flatten)]
    dataset: DatasetRef,
    #[serde(default)]
    data: Value,
}

pub struct DatasetDirectory {
    root: PathBuf,
    index: HashMap<i32, (DatasetRef, PathBuf)>,
}

impl DatasetDirectory {
    /// Indexes every `*.json` file below `root`. Files that are not datasets
    /// are skipped with a warning.
    #[instrument]
    pub fn open(root: &Path) -> Result<Self, InfrastructureError> {
        if !root.is_dir() {
            return Err(InfrastructureError::ConfigError(format!(
                "Datasets directory {:?} does not exist",
                root
            )));
        }

        let mut index = HashMap::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|e| InfrastructureError::Io(std::io::Error::other(e)))?;
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match read_dataset(path) {
                Ok(file) => {
                    if let Some((_, previous)) = index.get(&file.dataset.id) {
                        warn!(id = file.dataset.id, first = ?previous, ignored = ?path, "Duplicate dataset id");
                        continue;
                    }
                    index.insert(file.dataset.id, (file.dataset, path.to_path_buf()));
                }
                Err(e) => warn!(path = ?path, error = %e, "Skipping file"),
            }
        }

        info!(datasets = index.len(), "Dataset directory indexed");
        Ok(Self {
            root: root.to_path_buf(),
            index,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

fn read_dataset(path: &Path) -> Result<DatasetFile, InfrastructureError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[async_trait]
impl DatasetProvider for DatasetDirectory {
    async fn list_datasets(
        &self,
        test_id: i32,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<DatasetRef>, ChangewatchError> {
        Ok(self
            .index
            .values()
            .filter(|(d, _)| d.test_id == test_id && d.in_window(from, to))
            .map(|(d, _)| d.clone())
            .collect())
    }

    async fn label_data(&self, dataset_id: i32) -> Result<Value, ChangewatchError> {
        let (_, path) = self
            .index
            .get(&dataset_id)
            .ok_or(DomainError::DatasetNotFound(dataset_id))?;
        let path = path.clone();
        let file = tokio::task::spawn_blocking(move || read_dataset(&path))
            .await
            .map_err(|e| ChangewatchError::InternalError(e.to_string()))??;
        Ok(file.data)
    }
}
