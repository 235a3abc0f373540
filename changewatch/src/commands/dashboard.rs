// changewatch/src/commands/dashboard.rs

use std::path::Path;

pub async fn execute(project_dir: &Path, test_id: i32) -> anyhow::Result<()> {
    let workspace = super::open(project_dir)?;
    let dashboard = workspace.service.dashboard(test_id).await?;

    println!("📊 Dashboard of test {}", dashboard.test_id);
    for panel in &dashboard.panels {
        println!("\n▸ {}", panel.name);
        for v in &panel.variables {
            println!("   ➜ {} (id {})", v.name, v.id_or_default());
        }
    }
    Ok(())
}
