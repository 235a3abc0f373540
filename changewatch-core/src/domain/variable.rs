// changewatch-core/src/domain/variable.rs

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::LazyLock;

use regex::Regex;
use validator::{Validate, ValidationError};

use crate::domain::detection;
use crate::domain::error::DomainError;

static BINDING_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok());

/// One labeled value inside a dataset: `(schema, jsonpath)`.
///
/// Identity is the schema alone. Two accessors reading different paths of the
/// same schema compare equal, so failure tracking (which datasets lack which
/// accessor) is schema-scoped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Accessor {
    pub schema: String,
    pub jsonpath: String,
}

impl Accessor {
    pub fn new(schema: impl Into<String>, jsonpath: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            jsonpath: jsonpath.into(),
        }
    }
}

impl PartialEq for Accessor {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema
    }
}

impl Eq for Accessor {}

impl Hash for Accessor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.schema.hash(state);
    }
}

/// A named input of a variable. The name is what the calculation expression sees.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct LabelBinding {
    #[validate(custom(function = "validate_binding_name"))]
    pub name: String,
    #[serde(flatten)]
    pub accessor: Accessor,
}

impl LabelBinding {
    pub fn new(name: impl Into<String>, schema: &str, jsonpath: &str) -> Self {
        Self {
            name: name.into(),
            accessor: Accessor::new(schema, jsonpath),
        }
    }
}

/// Tagged detector configuration: `model` selects a registered detector,
/// `config` carries its parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeDetection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i32>,
    pub model: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i32>,
    #[serde(default)]
    pub test_id: i32,
    #[validate(length(min = 1, message = "Variable name cannot be empty"))]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default)]
    pub order: i32,
    #[validate(
        length(min = 1, message = "A variable needs at least one label"),
        nested
    )]
    pub labels: Vec<LabelBinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calculation: Option<String>,
    #[serde(default)]
    pub change_detection: Vec<ChangeDetection>,
}

impl Variable {
    pub fn new(name: impl Into<String>, labels: Vec<LabelBinding>) -> Self {
        Self {
            id: None,
            test_id: 0,
            name: name.into(),
            group: None,
            order: 0,
            labels,
            calculation: None,
            change_detection: Vec::new(),
        }
    }

    pub fn with_calculation(mut self, calculation: impl Into<String>) -> Self {
        self.calculation = Some(calculation.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_detection(mut self, model: &str, config: serde_json::Value) -> Self {
        self.change_detection.push(ChangeDetection {
            id: None,
            model: model.to_string(),
            config,
        });
        self
    }

    /// Persisted variables always carry an id; unsaved ones report 0.
    pub fn id_or_default(&self) -> i32 {
        self.id.unwrap_or_default()
    }

    /// Trims blank calculations and groups so that `""` means "none".
    pub fn normalize(mut self, test_id: i32) -> Self {
        self.test_id = test_id;
        if self
            .calculation
            .as_deref()
            .is_some_and(|c| c.trim().is_empty())
        {
            self.calculation = None;
        }
        if self.group.as_deref().is_some_and(|g| g.trim().is_empty()) {
            self.group = None;
        }
        self
    }
}

/// Validates a full replacement set for one test.
pub fn validate_variable_set(test_id: i32, variables: &[Variable]) -> Result<(), DomainError> {
    let mut seen: HashSet<(Option<&str>, &str)> = HashSet::new();

    for variable in variables {
        variable
            .validate()
            .map_err(|e| DomainError::InvalidVariable(format!("{}: {}", variable.name, e)))?;

        let mut bindings = HashSet::new();
        if let Some(dup) = variable.labels.iter().find(|b| !bindings.insert(b.name.as_str())) {
            return Err(DomainError::InvalidVariable(format!(
                "{}: binding '{}' is declared twice",
                variable.name, dup.name
            )));
        }

        if !seen.insert((variable.group.as_deref(), variable.name.as_str())) {
            return Err(DomainError::DuplicateVariable {
                test_id,
                group: variable.group.clone().unwrap_or_default(),
                name: variable.name.clone(),
            });
        }

        for cd in &variable.change_detection {
            if detection::find_model(&cd.model).is_none() {
                return Err(DomainError::UnknownModel(cd.model.clone()));
            }
        }
    }
    Ok(())
}

#[allow(clippy::ptr_arg)]
fn validate_binding_name(name: &String) -> Result<(), ValidationError> {
    match BINDING_NAME.as_ref() {
        Some(re) if re.is_match(name) => Ok(()),
        _ => {
            let mut err = ValidationError::new("binding_name");
            err.message = Some(format!("'{}' is not a valid identifier", name).into());
            Err(err)
        }
    }
}
