// changewatch/src/commands/models.rs

use changewatch_core::application::AlertingService;

pub fn execute() -> anyhow::Result<()> {
    let mut table = super::table(vec!["Model", "Title", "Default config"]);
    for model in AlertingService::models() {
        table.add_row(vec![
            model.name,
            model.title,
            serde_json::to_string(&model.config)?,
        ]);
    }
    println!("{table}");
    Ok(())
}
