// changewatch-core/src/application/calculation.rs

// Turns a dataset's label document into one number per variable:
// resolve every binding, then either take the single value or evaluate the
// calculation expression with the bindings as named inputs.

use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

use crate::application::ports::ExpressionEngine;
use crate::domain::error::EvaluationError;
use crate::domain::labels::{LabelResolver, ResolveError};
use crate::domain::variable::Variable;

/// Result of one variable evaluation, with the inputs it saw.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub inputs: Map<String, Value>,
    pub result: Result<f64, EvaluationError>,
}

impl Evaluation {
    /// Human readable trace for the calculation log.
    pub fn trace(&self, variable: &Variable) -> String {
        let inputs = Value::Object(self.inputs.clone());
        let expression = variable.calculation.as_deref().unwrap_or("<single label>");
        match &self.result {
            Ok(value) => format!(
                "Variable '{}': inputs {} with {} gave {}",
                variable.name, inputs, expression, value
            ),
            Err(e) => format!(
                "Variable '{}': inputs {} with {} failed: {}",
                variable.name, inputs, expression, e
            ),
        }
    }
}

#[derive(Clone)]
pub struct VariableCalculator {
    engine: Arc<dyn ExpressionEngine>,
}

impl VariableCalculator {
    pub fn new(engine: Arc<dyn ExpressionEngine>) -> Self {
        Self { engine }
    }

    pub fn evaluate(&self, variable: &Variable, document: &Value) -> Evaluation {
        let mut inputs = Map::new();
        let mut missing = Vec::new();
        let mut reported = HashSet::new();
        let mut invalid = Vec::new();

        for binding in &variable.labels {
            match LabelResolver::resolve(document, &binding.accessor) {
                Ok(value) => {
                    inputs.insert(binding.name.clone(), value);
                }
                // Accessors are identified by schema, report each one once
                Err(ResolveError::NotFound { .. }) => {
                    if reported.insert(&binding.accessor) {
                        missing.push(binding.accessor.clone());
                    }
                }
                Err(e @ ResolveError::InvalidPath { .. }) => invalid.push(e.to_string()),
            }
        }

        let result = if !missing.is_empty() {
            Err(EvaluationError::AccessorNotFound(missing))
        } else if !invalid.is_empty() {
            Err(EvaluationError::CalculationFailed(invalid.join("; ")))
        } else {
            self.compute(variable, &inputs)
        };

        Evaluation { inputs, result }
    }

    fn compute(&self, variable: &Variable, inputs: &Map<String, Value>) -> Result<f64, EvaluationError> {
        let Some(expression) = variable.calculation.as_deref() else {
            return match (variable.labels.len(), inputs.values().next()) {
                (1, Some(value)) => coerce(value).ok_or_else(|| {
                    EvaluationError::ValueNotNumeric(value.to_string())
                }),
                (n, _) => Err(EvaluationError::CalculationFailed(format!(
                    "{} labels but no calculation to combine them",
                    n
                ))),
            };
        };

        let value = self
            .engine
            .evaluate(expression, inputs)
            .map_err(|e| EvaluationError::CalculationFailed(e.to_string()))?;
        if value.is_null() {
            return Err(EvaluationError::CalculationFailed(format!(
                "'{}' produced no value",
                expression
            )));
        }
        coerce(&value).ok_or_else(|| {
            EvaluationError::CalculationFailed(format!(
                "'{}' produced a non-numeric result: {}",
                expression, value
            ))
        })
    }
}

/// JSON numbers and numeric strings, as long as they are finite.
fn coerce(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}
