// changewatch/src/commands/last_datapoints.rs

use std::path::Path;

use chrono::DateTime;

pub async fn execute(project_dir: &Path, variable_ids: Vec<i32>) -> anyhow::Result<()> {
    let workspace = super::open(project_dir)?;
    let last = workspace
        .service
        .find_last_datapoints(&variable_ids)
        .await?;

    let mut table = super::table(vec!["Variable", "Last datapoint"]);
    for entry in &last {
        let when = DateTime::from_timestamp_millis(entry.timestamp)
            .map(|ts| ts.to_rfc3339())
            .unwrap_or_else(|| entry.timestamp.to_string());
        table.add_row(vec![entry.variable.to_string(), when]);
    }
    println!("{table}");
    Ok(())
}
