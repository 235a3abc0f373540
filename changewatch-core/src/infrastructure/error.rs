// changewatch-core/src/infrastructure/error.rs

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum DatabaseError {
    #[error("DuckDB Engine Error: {0}")]
    #[diagnostic(
        code(changewatch::infra::database::duckdb),
        help("An error occurred inside the storage engine.")
    )]
    DuckDB(#[from] duckdb::Error),

    #[error("Database lock poisoned")]
    #[diagnostic(code(changewatch::infra::database::poisoned))]
    Poisoned,
}

#[derive(Error, Debug, Diagnostic)]
pub enum InfrastructureError {
    // --- DATABASE (Abstracted) ---
    #[error(transparent)]
    #[diagnostic(transparent)]
    Database(#[from] DatabaseError),

    // --- FILESYSTEM (IO) ---
    #[error("File System Error: {0}")]
    #[diagnostic(
        code(changewatch::infra::io),
        help("Check file permissions or path validity.")
    )]
    Io(#[from] std::io::Error),

    // --- CONFIG / YAML ---
    #[error("YAML Parsing Error: {0}")]
    #[diagnostic(
        code(changewatch::infra::yaml),
        help("Check your YAML syntax (indentation, types).")
    )]
    YamlError(#[from] serde_yaml::Error),

    #[error("JSON Error: {0}")]
    #[diagnostic(code(changewatch::infra::json))]
    Json(#[from] serde_json::Error),

    #[error("Configuration Error: {0}")]
    ConfigError(String),

    #[error("Project configuration not found at '{0}'")]
    #[diagnostic(code(changewatch::infra::config_missing))]
    ConfigNotFound(String),

    // --- EXPRESSIONS ---
    #[error("Expression Error: {0}")]
    #[diagnostic(
        code(changewatch::infra::expression),
        help("Calculations use minijinja expression syntax, e.g. `read + write`.")
    )]
    ExpressionError(#[from] minijinja::Error),

    // --- NOTIFICATIONS ---
    #[error("Notification delivery failed: {0}")]
    #[diagnostic(code(changewatch::infra::notifier))]
    NotifierFailure(String),
}

// Shortcut for `?` on duckdb calls
impl From<duckdb::Error> for InfrastructureError {
    fn from(err: duckdb::Error) -> Self {
        InfrastructureError::Database(DatabaseError::DuckDB(err))
    }
}
