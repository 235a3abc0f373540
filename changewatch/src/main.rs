// changewatch/src/main.rs

mod cli;
mod commands;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG=changewatch_core=debug changewatch recalculate ... to see the details
    init_tracing();

    let cli = Cli::parse();
    let project_dir = cli.project_dir;

    match cli.command {
        Commands::Recalculate {
            test,
            from,
            to,
            notify,
            debug,
        } => commands::recalculate::execute(&project_dir, test, from, to, notify, debug).await,
        Commands::Variables { test, import } => {
            commands::variables::execute(&project_dir, test, import).await
        }
        Commands::Changes { variable } => commands::changes::list(&project_dir, variable).await,
        Commands::DeleteChange { id } => commands::changes::delete(&project_dir, id).await,
        Commands::ConfirmChange { id, description } => {
            commands::changes::confirm(&project_dir, id, description).await
        }
        Commands::Log { test, page, limit } => {
            commands::log::execute(&project_dir, test, page, limit).await
        }
        Commands::LastDatapoints { variable } => {
            commands::last_datapoints::execute(&project_dir, variable).await
        }
        Commands::Dashboard { test } => commands::dashboard::execute(&project_dir, test).await,
        Commands::Models => commands::models::execute(),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
