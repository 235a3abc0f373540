// changewatch/src/commands/variables.rs
//
// USE CASE: List or import the variables of a test.

use std::path::{Path, PathBuf};

use anyhow::Context;
use changewatch_core::infrastructure::config::load_variables;

pub async fn execute(project_dir: &Path, test_id: i32, import: Option<PathBuf>) -> anyhow::Result<()> {
    let workspace = super::open(project_dir)?;

    if let Some(path) = import {
        let variables = load_variables(&path)
            .with_context(|| format!("Failed to read variables from {:?}", path))?;
        let stored = workspace
            .service
            .replace_variables(test_id, variables)
            .await
            .with_context(|| format!("Failed to import variables into test {}", test_id))?;
        println!("📝 Imported {} variables into test {}", stored.len(), test_id);
    }

    let variables = workspace.service.variables(test_id).await?;
    if variables.is_empty() {
        println!("No variables defined for test {}", test_id);
        return Ok(());
    }

    let mut table = super::table(vec!["Id", "Name", "Group", "Order", "Labels", "Calculation", "Detectors"]);
    for v in &variables {
        let labels: Vec<String> = v
            .labels
            .iter()
            .map(|b| format!("{} = {}:{}", b.name, b.accessor.schema, b.accessor.jsonpath))
            .collect();
        let detectors: Vec<&str> = v.change_detection.iter().map(|cd| cd.model.as_str()).collect();
        table.add_row(vec![
            v.id_or_default().to_string(),
            v.name.clone(),
            v.group.clone().unwrap_or_default(),
            v.order.to_string(),
            labels.join("\n"),
            v.calculation.clone().unwrap_or_default(),
            detectors.join(", "),
        ]);
    }
    println!("{table}");
    Ok(())
}
