// changewatch/src/commands/recalculate.rs
//
// USE CASE: Recalculate datapoints and changes of a test.

use std::path::Path;

use chrono::{DateTime, Utc};

fn window_bound(millis: Option<i64>, flag: &str) -> anyhow::Result<Option<DateTime<Utc>>> {
    match millis {
        None => Ok(None),
        Some(ms) => DateTime::from_timestamp_millis(ms)
            .map(Some)
            .ok_or_else(|| anyhow::anyhow!("--{} {} is not a valid timestamp", flag, ms)),
    }
}

pub async fn execute(
    project_dir: &Path,
    test_id: i32,
    from: Option<i64>,
    to: Option<i64>,
    notify: bool,
    debug: bool,
) -> anyhow::Result<()> {
    let start = std::time::Instant::now();
    let from = window_bound(from, "from")?;
    let to = window_bound(to, "to")?;

    println!("⚙️  Loading configuration...");
    let workspace = super::open(project_dir)?;
    println!(
        "   Project: {} (v{})",
        workspace.config.name, workspace.config.version
    );

    println!("🔄 Recalculating test {}...", test_id);
    workspace
        .service
        .recalculate(test_id, notify, debug, from, to);
    let status = workspace
        .service
        .wait_for_recalculation(test_id)
        .await
        .ok_or_else(|| anyhow::anyhow!("No recalculation recorded for test {}", test_id))?;

    println!("   Datasets: {}", status.total_runs);
    if !status.runs_without_accessor.is_empty() {
        println!(
            "   ⚠️  {} without accessor: {:?}",
            status.runs_without_accessor.len(),
            status.runs_without_accessor
        );
    }
    if !status.runs_without_value.is_empty() {
        println!(
            "   ⚠️  {} without value: {:?}",
            status.runs_without_value.len(),
            status.runs_without_value
        );
    }

    if status.has_failures() {
        anyhow::bail!("❌ Recalculation finished with {} errors", status.errors);
    }
    println!("\n✨ SUCCESS! Recalculation finished in {:.2?}", start.elapsed());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_bounds() -> anyhow::Result<()> {
        assert_eq!(window_bound(None, "from")?, None);
        let bound = window_bound(Some(1_700_000_000_000), "from")?;
        assert_eq!(bound.map(|b| b.timestamp()), Some(1_700_000_000));
        assert!(window_bound(Some(i64::MAX), "to").is_err());
        Ok(())
    }
}
