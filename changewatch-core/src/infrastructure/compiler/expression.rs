// changewatch-core/src/infrastructure/compiler/expression.rs

// Calculation expressions are minijinja expressions evaluated against the
// variable's label bindings, e.g. `read + write` or `samples | mean`.

use minijinja::{Environment, Error, ErrorKind, UndefinedBehavior};
use serde_json::{Map, Value};

use crate::application::ports::ExpressionEngine;
use crate::error::ChangewatchError;
use crate::infrastructure::error::InfrastructureError;

pub struct MiniJinjaEvaluator {
    env: Environment<'static>,
}

impl MiniJinjaEvaluator {
    pub fn new() -> Self {
        let mut env = Environment::new();
        // A binding that is misspelled must fail, not evaluate to nothing
        env.set_undefined_behavior(UndefinedBehavior::Strict);

        env.add_filter("mean", |values: Vec<f64>| -> Result<f64, Error> {
            if values.is_empty() {
                return Err(Error::new(
                    ErrorKind::InvalidOperation,
                    "mean of an empty list",
                ));
            }
            Ok(values.iter().sum::<f64>() / values.len() as f64)
        });

        Self { env }
    }

    pub fn eval(
        &self,
        expression: &str,
        inputs: &Map<String, Value>,
    ) -> Result<Value, InfrastructureError> {
        let compiled = self.env.compile_expression(expression)?;
        let result = compiled.eval(minijinja::Value::from_serialize(inputs))?;
        Ok(serde_json::to_value(&result)?)
    }
}

impl Default for MiniJinjaEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpressionEngine for MiniJinjaEvaluator {
    fn evaluate(&self, expression: &str, inputs: &Map<String, Value>) -> Result<Value, ChangewatchError> {
        self.eval(expression, inputs).map_err(ChangewatchError::Infrastructure)
    }
}
