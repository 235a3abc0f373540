// changewatch/src/commands/log.rs
//
// USE CASE: Page through the calculation log of a test.

use std::path::Path;

pub async fn execute(project_dir: &Path, test_id: i32, page: u32, limit: u32) -> anyhow::Result<()> {
    let workspace = super::open(project_dir)?;
    let total = workspace.service.log_count(test_id).await?;
    let entries = workspace
        .service
        .calculation_log(test_id, page, limit)
        .await?;

    let mut table = super::table(vec!["Id", "Level", "Dataset", "Variable", "Message"]);
    for e in &entries {
        table.add_row(vec![
            e.id.to_string(),
            e.level.as_str().to_string(),
            e.dataset_id.map(|d| d.to_string()).unwrap_or_default(),
            e.variable_id.map(|v| v.to_string()).unwrap_or_default(),
            e.message.clone(),
        ]);
    }
    println!("{table}");
    println!("📜 Page {} ({} entries of {})", page, entries.len(), total);
    Ok(())
}
