// changewatch-core/src/domain/error.rs

use miette::Diagnostic;
use thiserror::Error;

use crate::domain::variable::Accessor;

#[derive(Error, Debug, Diagnostic)]
pub enum DomainError {
    #[error("Invalid variable definition: {0}")]
    #[diagnostic(
        code(changewatch::domain::variable),
        help("Check names, label bindings and change detection configs.")
    )]
    InvalidVariable(String),

    #[error("Duplicate variable '{name}' in group '{group}' of test {test_id}")]
    #[diagnostic(
        code(changewatch::domain::duplicate_variable),
        help("Variable names must be unique within a (test, group) pair.")
    )]
    DuplicateVariable {
        test_id: i32,
        group: String,
        name: String,
    },

    #[error("Variable {0} not found")]
    #[diagnostic(code(changewatch::domain::variable_not_found))]
    VariableNotFound(i32),

    #[error("Change {0} not found")]
    #[diagnostic(code(changewatch::domain::change_not_found))]
    ChangeNotFound(i32),

    #[error("Dataset {0} not found")]
    #[diagnostic(code(changewatch::domain::dataset_not_found))]
    DatasetNotFound(i32),

    #[error("Unknown change detection model '{0}'")]
    #[diagnostic(
        code(changewatch::domain::unknown_model),
        help("Run `changewatch models` to list the registered detectors.")
    )]
    UnknownModel(String),
}

/// Failure of one variable evaluation on one dataset.
///
/// These never abort a recalculation; the coordinator folds them into the
/// status counters.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("Accessor(s) not found: {}", format_accessors(.0))]
    AccessorNotFound(Vec<Accessor>),

    #[error("Value is not numeric: {0}")]
    ValueNotNumeric(String),

    #[error("Calculation failed: {0}")]
    CalculationFailed(String),
}

impl EvaluationError {
    /// Both non-numeric values and failed expressions count as "no value".
    pub fn is_missing_value(&self) -> bool {
        matches!(
            self,
            EvaluationError::ValueNotNumeric(_) | EvaluationError::CalculationFailed(_)
        )
    }
}

fn format_accessors(accessors: &[Accessor]) -> String {
    accessors
        .iter()
        .map(|a| format!("{}:{}", a.schema, a.jsonpath))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectorError {
    #[error("Unknown change detection model '{0}'")]
    UnknownModel(String),

    #[error("Invalid configuration for '{model}': {reason}")]
    InvalidConfig { model: String, reason: String },

    #[error("Detector '{model}' failed: {reason}")]
    Fault { model: String, reason: String },
}
