// changewatch/src/commands/changes.rs
//
// USE CASE: Review detected changes (list, confirm, delete).

use std::path::Path;

use changewatch_core::domain::change::ChangePatch;

pub async fn list(project_dir: &Path, variable_id: i32) -> anyhow::Result<()> {
    let workspace = super::open(project_dir)?;
    let changes = workspace.service.changes(variable_id).await?;
    if changes.is_empty() {
        println!("No changes for variable {}", variable_id);
        return Ok(());
    }

    let mut table = super::table(vec![
        "Id", "Dataset", "Run", "Timestamp", "Value", "Model", "Magnitude", "Confirmed", "Description",
    ]);
    for c in &changes {
        table.add_row(vec![
            c.id.to_string(),
            c.dataset_id.to_string(),
            c.run_id.to_string(),
            c.timestamp.to_rfc3339(),
            c.value.to_string(),
            c.evidence.model.clone(),
            format!("{:.3}", c.evidence.magnitude),
            if c.confirmed { "✅" } else { "" }.to_string(),
            c.description.clone(),
        ]);
    }
    println!("{table}");
    Ok(())
}

pub async fn delete(project_dir: &Path, change_id: i32) -> anyhow::Result<()> {
    let workspace = super::open(project_dir)?;
    if !workspace.service.delete_change(change_id).await? {
        anyhow::bail!("❌ Change {} not found", change_id);
    }
    println!("🗑️  Change {} deleted", change_id);
    Ok(())
}

pub async fn confirm(
    project_dir: &Path,
    change_id: i32,
    description: Option<String>,
) -> anyhow::Result<()> {
    let workspace = super::open(project_dir)?;
    let patch = ChangePatch {
        confirmed: Some(true),
        description,
    };
    let change = workspace.service.update_change(change_id, &patch).await?;
    println!(
        "✅ Change {} confirmed (variable {}, dataset {})",
        change.id, change.variable_id, change.dataset_id
    );
    Ok(())
}
