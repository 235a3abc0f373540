// changewatch/src/cli.rs
//
// Single source of truth for all CLI definitions (Clap structs).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "changewatch")]
#[command(about = "Computes variables over test datasets and detects changes", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Project directory (holds changewatch.yaml)
    #[arg(long, global = true, default_value = ".")]
    pub project_dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 🔄 Recalculates datapoints and changes of a test
    Recalculate {
        #[arg(long)]
        test: i32,

        /// Window start, epoch milliseconds
        #[arg(long)]
        from: Option<i64>,

        /// Window end, epoch milliseconds
        #[arg(long)]
        to: Option<i64>,

        /// Notify the administrator if errors occur
        #[arg(long)]
        notify: bool,

        /// Record a trace of every evaluation in the calculation log
        #[arg(long)]
        debug: bool,
    },

    /// 📋 Lists (or imports) the variables of a test
    Variables {
        #[arg(long)]
        test: i32,

        /// YAML file replacing the whole variable set
        #[arg(long)]
        import: Option<PathBuf>,
    },

    /// 📈 Lists the changes detected on a variable
    Changes {
        #[arg(long)]
        variable: i32,
    },

    /// 🗑️ Deletes a change (it will not be reported again for the same value)
    DeleteChange {
        #[arg(long)]
        id: i32,
    },

    /// ✅ Confirms a change
    ConfirmChange {
        #[arg(long)]
        id: i32,

        #[arg(long)]
        description: Option<String>,
    },

    /// 📜 Shows the calculation log of a test, most recent first
    Log {
        #[arg(long)]
        test: i32,

        /// 0-based page
        #[arg(long, default_value = "0")]
        page: u32,

        #[arg(long, default_value = "20")]
        limit: u32,
    },

    /// 🕒 Shows the most recent datapoint timestamp of variables
    LastDatapoints {
        #[arg(long, num_args = 1.., required = true)]
        variable: Vec<i32>,
    },

    /// 📊 Shows the dashboard panels of a test
    Dashboard {
        #[arg(long)]
        test: i32,
    },

    /// 🧮 Lists the change detection models
    Models,
}
