use serde_json::{Map, Value};

use crate::error::ChangewatchError;

/// Evaluates a calculation expression with named inputs bound.
pub trait ExpressionEngine: Send + Sync {
    fn evaluate(&self, expression: &str, inputs: &Map<String, Value>) -> Result<Value, ChangewatchError>;
}
