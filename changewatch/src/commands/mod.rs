// changewatch/src/commands/mod.rs

pub mod changes;
pub mod dashboard;
pub mod last_datapoints;
pub mod log;
pub mod models;
pub mod recalculate;
pub mod variables;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use comfy_table::Table;
use comfy_table::presets::UTF8_FULL;
use changewatch_core::application::{AlertingService, EnginePorts};
use changewatch_core::domain::project::ProjectConfig;
use changewatch_core::infrastructure::adapters::{DatasetDirectory, DuckDBStore, notifier_for};
use changewatch_core::infrastructure::compiler::MiniJinjaEvaluator;
use changewatch_core::infrastructure::config::{
    database_location, datasets_dir, load_project_config,
};
use tracing::info;

/// A loaded project: its configuration and the service wired on DuckDB and
/// the dataset directory.
pub struct Workspace {
    pub config: ProjectConfig,
    pub service: AlertingService,
}

pub fn open(project_dir: &Path) -> anyhow::Result<Workspace> {
    let config = load_project_config(project_dir).with_context(|| {
        format!(
            "Failed to load project configuration from {:?}",
            project_dir
        )
    })?;

    let db_path = database_location(&config, project_dir);
    let store = Arc::new(
        DuckDBStore::open(&db_path)
            .with_context(|| format!("Failed to initialize DuckDB at {}", db_path))?,
    );

    let datasets_root = datasets_dir(&config, project_dir);
    let datasets = Arc::new(
        DatasetDirectory::open(&datasets_root)
            .with_context(|| format!("Failed to index datasets in {:?}", datasets_root))?,
    );

    info!(db = %db_path, datasets = datasets.len(), "Workspace opened");

    let ports = EnginePorts {
        datasets,
        variables: store.clone(),
        datapoints: store.clone(),
        changes: store.clone(),
        logs: store,
        notifier: notifier_for(&config.notifications, project_dir),
        expressions: Arc::new(MiniJinjaEvaluator::new()),
    };
    let service = AlertingService::new(ports, &config.recalculation, &config.notifications);

    Ok(Workspace { config, service })
}

pub fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(header);
    table
}
