// changewatch-core/src/error.rs

use crate::domain::error::DomainError;
use crate::infrastructure::error::InfrastructureError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChangewatchError {
    // --- DOMAIN ERRORS (variables, changes, detectors) ---
    #[error(transparent)]
    Domain(#[from] DomainError),

    // --- INFRASTRUCTURE ERRORS (storage, IO, parsing) ---
    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),

    // --- APPLICATION ERRORS ---
    #[error("Persistence failed after {attempts} attempts: {reason}")]
    PersistenceExhausted { attempts: u32, reason: String },

    #[error("Internal Error: {0}")]
    InternalError(String),
}

impl From<std::io::Error> for ChangewatchError {
    fn from(err: std::io::Error) -> Self {
        ChangewatchError::Infrastructure(InfrastructureError::Io(err))
    }
}

impl From<duckdb::Error> for ChangewatchError {
    fn from(err: duckdb::Error) -> Self {
        ChangewatchError::Infrastructure(InfrastructureError::from(err))
    }
}

impl From<serde_json::Error> for ChangewatchError {
    fn from(err: serde_json::Error) -> Self {
        ChangewatchError::Infrastructure(InfrastructureError::Json(err))
    }
}
